//! Command channel between the network thread and the main thread.
//!
//! The two execution contexts share nothing but a pair of ordered byte-message
//! queues. Every message is a single opcode byte followed by an
//! opcode-specific, big-endian payload (see [`command`]). The queues are
//! unbounded; neither side ever blocks when sending.

pub mod channel;
pub mod command;

pub use channel::{MainEndpoint, NetworkEndpoint, NetworkThread, command_channel};
pub use command::{CommandError, MainCommand, NetworkCommand, SessionId, opcode};
