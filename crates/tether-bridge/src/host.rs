//! The contract between the bridge and the host server.
//!
//! The host owns one [`NativeSession`] per logged-in client, created by
//! [`HostServer::accept`]. A [`Translator`] maps packets between the wire
//! vocabulary and the host's own.

use std::fmt;

use tether_command::SessionId;
use tether_wire::{ClientboundPacket, EncryptionResponse, ServerboundPlay};

use crate::context::SessionContext;

/// Identity of a native session, independent of the network session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(pub u64);

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native:{}", self.0)
    }
}

/// What the network thread reported about a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Network-assigned id.
    pub id: SessionId,
    /// Remote address.
    pub address: String,
    /// Remote port.
    pub port: u16,
}

/// Player counts advertised in the server list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryInfo {
    /// Players currently online.
    pub online_players: u32,
    /// Player limit.
    pub max_players: u32,
}

/// Host-side object for one client connection.
pub trait NativeSession {
    /// The host's own packet type.
    type Packet;

    /// Stable identity, used for the reverse index.
    fn native_id(&self) -> NativeId;

    /// Deliver one translated packet.
    fn handle_packet(&mut self, packet: Self::Packet, ctx: &mut SessionContext<'_>);

    /// The client sent login-start. Offline hosts usually finish the login
    /// here; online hosts send an encryption request.
    fn begin_authentication(&mut self, name: &str, online_mode: bool, ctx: &mut SessionContext<'_>);

    /// The client answered the encryption request (online mode only).
    fn process_authentication(&mut self, response: EncryptionResponse, ctx: &mut SessionContext<'_>);

    /// An acknowledgement queued with `queue_ack` is due.
    fn handle_ack(&mut self, ack_id: u32);

    /// The session is gone. Called after it was removed from the registry.
    fn close(&mut self, reason: &str);
}

/// The host server: creates native sessions and reports player counts.
pub trait HostServer {
    /// Native session type.
    type Session: NativeSession;

    /// A new connection arrived.
    fn accept(&mut self, info: &SessionInfo) -> Self::Session;

    /// Current player counts.
    fn query_info(&self) -> QueryInfo;
}

/// Bidirectional packet mapping. An empty result drops the packet.
pub trait Translator<S: NativeSession> {
    /// Wire packet from the client → native packets for the host.
    fn to_host(&mut self, session: &S, packet: ServerboundPlay) -> Vec<S::Packet>;

    /// Native packet from the host → wire packets for the client.
    fn to_wire(&mut self, session: &S, packet: &S::Packet) -> Vec<Box<dyn ClientboundPacket>>;
}
