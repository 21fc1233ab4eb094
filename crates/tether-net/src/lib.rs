//! Network thread: TCP accept loop, framing, compression, encryption.
//!
//! Everything here runs on its own OS thread and talks to the rest of the
//! process only through the command channel. Clients that only ping the
//! server list are answered locally; login connections become sessions.

pub mod codec;
pub mod connection;
pub mod server;
pub mod status;

pub use codec::{FrameDecoder, FrameEncoder, FrameError, MAX_FRAME_LEN};
pub use connection::{ConnectionMap, IdGenerator, Upgrade};
pub use server::{NetConfig, ServerThread, ThreadHandle};
pub use status::StatusResponder;
