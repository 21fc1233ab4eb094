//! Main-thread half of the protocol bridge.
//!
//! Sessions opened by the network thread are registered here, their packets
//! are decoded according to the session's authentication state, and play
//! packets are handed to the host through a [`Translator`]. Everything in
//! this crate runs on the main thread.

pub mod context;
pub mod dispatch;
pub mod host;
pub mod interface;
pub mod registry;

pub use context::{AuthStatus, SessionContext, SessionState};
pub use dispatch::{DispatchError, Route};
pub use host::{HostServer, NativeId, NativeSession, QueryInfo, SessionInfo, Translator};
pub use interface::{CONNECTION_CLOSED, InterfaceOptions, ProtocolInterface};
pub use registry::{RegistryError, Session, SessionRegistry};
