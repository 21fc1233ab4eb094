//! Per-session state and the handle given to native callbacks.

use tether_command::{MainCommand, MainEndpoint, SessionId};
use tether_wire::ClientboundPacket;
use tracing::warn;

/// Authentication lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// Only login packets are legal.
    #[default]
    PreAuth,
    /// Play packets are dispatched. Terminal.
    Authenticated,
}

/// Bridge-side bookkeeping for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Authentication status.
    pub status: AuthStatus,
    /// Name from the first login-start; `Some` while authentication is pending.
    pub login_name: Option<String>,
    /// Compression threshold once enabled.
    pub compression: Option<u32>,
    /// Whether encryption was enabled.
    pub encrypted: bool,
}

impl SessionState {
    /// Login-start was accepted but the host has not authenticated yet.
    pub fn is_pending_authentication(&self) -> bool {
        self.status == AuthStatus::PreAuth && self.login_name.is_some()
    }
}

/// Send a command, logging when the network thread is gone.
pub(crate) fn emit(endpoint: &MainEndpoint, command: &MainCommand) {
    if let Err(e) = endpoint.send(command) {
        warn!(opcode = command.opcode(), "Dropped command: {e}");
    }
}

/// Handed to [`NativeSession`](crate::NativeSession) callbacks.
///
/// Everything sent through the context goes out in call order, interleaved
/// correctly with packets sent through the interface. A requested
/// disconnect is carried out once the callback returns.
pub struct SessionContext<'a> {
    endpoint: &'a MainEndpoint,
    id: SessionId,
    state: &'a mut SessionState,
    threshold: Option<u32>,
    disconnect: Option<String>,
}

impl<'a> SessionContext<'a> {
    pub(crate) fn new(
        endpoint: &'a MainEndpoint,
        id: SessionId,
        state: &'a mut SessionState,
        threshold: Option<u32>,
    ) -> Self {
        Self {
            endpoint,
            id,
            state,
            threshold,
            disconnect: None,
        }
    }

    /// Network id of the session.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Read-only view of the session state.
    pub fn state(&self) -> &SessionState {
        self.state
    }

    /// Encode and send a wire packet, bypassing the translator.
    pub fn send(&mut self, packet: &dyn ClientboundPacket) {
        self.send_raw(packet.to_bytes());
    }

    /// Send an already encoded wire packet (id byte plus body).
    pub fn send_raw(&mut self, packet: Vec<u8>) {
        emit(
            self.endpoint,
            &MainCommand::SendPacket {
                target: self.id,
                packet,
            },
        );
    }

    /// Configured compression threshold, `None` when compression is off.
    pub fn compression_threshold(&self) -> Option<u32> {
        self.threshold
    }

    /// Switch the connection to compressed frames.
    ///
    /// Send the wire `SetCompression` packet first. Returns `false` when
    /// compression is disabled or already on.
    pub fn set_compression(&mut self) -> bool {
        let Some(threshold) = self.threshold else {
            return false;
        };
        if self.state.compression.is_some() {
            return false;
        }
        self.state.compression = Some(threshold);
        emit(
            self.endpoint,
            &MainCommand::SetCompression {
                target: self.id,
                threshold,
            },
        );
        true
    }

    /// Switch the connection to AES/CFB8. Returns `false` if already on.
    pub fn enable_encryption(&mut self, secret: &[u8]) -> bool {
        if self.state.encrypted {
            return false;
        }
        self.state.encrypted = true;
        emit(
            self.endpoint,
            &MainCommand::EnableEncryption {
                target: self.id,
                secret: secret.to_vec(),
            },
        );
        true
    }

    /// Mark the session authenticated. There is no way back.
    pub fn authenticate(&mut self) {
        self.state.status = AuthStatus::Authenticated;
        self.state.login_name = None;
    }

    /// Close the session after the current callback. The first reason wins.
    pub fn disconnect(&mut self, reason: impl Into<String>) {
        if self.disconnect.is_none() {
            self.disconnect = Some(reason.into());
        }
    }

    pub(crate) fn take_disconnect(&mut self) -> Option<String> {
        self.disconnect.take()
    }
}
