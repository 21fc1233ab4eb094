//! Packet routing by authentication state.
//!
//! In play, packet ids without a decoder are ignored so newer clients can
//! send packets the bridge does not know. Before authentication only the
//! login packets are legal and anything else ends the session.

use tether_wire::{
    DecodeError, EncryptionResponse, LOGIN_DECODERS, LoginStart, PLAY_DECODERS, PacketReader,
    ServerboundLogin, ServerboundPacket, ServerboundPlay,
};

use crate::context::AuthStatus;

/// Where a packet goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Decoded play packet for the translator.
    Play(ServerboundPlay),
    /// Login-start for the native session.
    LoginStart(LoginStart),
    /// Encryption response for the native session (online mode only).
    EncryptionResponse(EncryptionResponse),
    /// Play packet id without a decoder.
    Ignored(u8),
    /// Packet not allowed before authentication; the session must close.
    Violation(u8),
}

/// Why a packet was dropped.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The packet had no id byte.
    #[error("empty packet")]
    Empty,

    /// The body did not match the packet layout.
    #[error("failed to decode packet 0x{id:02X}: {source}")]
    Decode {
        /// Packet id.
        id: u8,
        /// Underlying decode error.
        #[source]
        source: DecodeError,
    },
}

/// Reason given when a packet is illegal before authentication.
pub fn violation_reason(id: u8) -> String {
    format!("Unexpected packet 0x{id:02X}")
}

/// Decode `packet` (id byte plus body) for a session in `status`.
pub fn route(status: AuthStatus, online_mode: bool, packet: &[u8]) -> Result<Route, DispatchError> {
    let Some(&id) = packet.first() else {
        return Err(DispatchError::Empty);
    };
    let mut reader = PacketReader::with_offset(packet, 1);
    let decode_err = |source: DecodeError| DispatchError::Decode { id, source };

    match status {
        AuthStatus::Authenticated => match PLAY_DECODERS[id as usize] {
            Some(decode) => decode(&mut reader).map(Route::Play).map_err(decode_err),
            None => Ok(Route::Ignored(id)),
        },
        AuthStatus::PreAuth => {
            if id == EncryptionResponse::ID && !online_mode {
                return Ok(Route::Violation(id));
            }
            match LOGIN_DECODERS[id as usize] {
                Some(decode) => match decode(&mut reader).map_err(decode_err)? {
                    ServerboundLogin::LoginStart(p) => Ok(Route::LoginStart(p)),
                    ServerboundLogin::EncryptionResponse(p) => Ok(Route::EncryptionResponse(p)),
                },
                None => Ok(Route::Violation(id)),
            }
        }
    }
}
