//! Handshake and status packets.
//!
//! These never leave the network thread: the server list ping is answered
//! there and only login connections are reported to the main thread.

use crate::ServerboundPacket;
use crate::buffer::{DecodeError, PacketReader, PacketWriter};
use crate::clientbound::ClientboundPacket;

/// State the client asks to switch to after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Server list ping.
    Status,
    /// Player login.
    Login,
}

/// The first packet of every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Client protocol version.
    pub protocol_version: i32,
    /// Host name the client connected to.
    pub server_address: String,
    /// Port the client connected to.
    pub server_port: u16,
    /// Requested next state.
    pub next_state: NextState,
}

impl ServerboundPacket for Handshake {
    const ID: u8 = 0x00;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let protocol_version = r.read_var_int()?;
        let server_address = r.read_string(255)?;
        let server_port = r.read_u16()?;
        let next_state = match r.read_var_int()? {
            1 => NextState::Status,
            2 => NextState::Login,
            other => {
                return Err(DecodeError::InvalidValue {
                    field: "next state",
                    value: other as i64,
                });
            }
        };
        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }
}

/// Status request (empty body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRequest;

impl ServerboundPacket for StatusRequest {
    const ID: u8 = 0x00;

    fn decode(_: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(StatusRequest)
    }
}

/// Latency probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPing {
    /// Opaque payload echoed in the pong.
    pub payload: i64,
}

impl ServerboundPacket for StatusPing {
    const ID: u8 = 0x01;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            payload: r.read_i64()?,
        })
    }
}

/// Server list JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// Status document.
    pub json: String,
}

impl ClientboundPacket for StatusResponse {
    fn id(&self) -> u8 {
        0x00
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.json);
    }
}

/// Echo of a [`StatusPing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPong {
    /// Payload copied from the ping.
    pub payload: i64,
}

impl ClientboundPacket for StatusPong {
    fn id(&self) -> u8 {
        0x01
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_i64(self.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_bytes(next_state: i32) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_var_int(340)
            .write_string("localhost")
            .write_u16(25565)
            .write_var_int(next_state);
        w.into_inner()
    }

    #[test]
    fn test_handshake_login() {
        let bytes = handshake_bytes(2);
        let hs = Handshake::decode(&mut PacketReader::new(&bytes)).unwrap();
        assert_eq!(hs.protocol_version, 340);
        assert_eq!(hs.server_address, "localhost");
        assert_eq!(hs.server_port, 25565);
        assert_eq!(hs.next_state, NextState::Login);
    }

    #[test]
    fn test_handshake_rejects_unknown_state() {
        let bytes = handshake_bytes(3);
        assert!(matches!(
            Handshake::decode(&mut PacketReader::new(&bytes)),
            Err(DecodeError::InvalidValue { value: 3, .. })
        ));
    }

    #[test]
    fn test_pong_echoes_ping() {
        let ping_body = 0x0102_0304_0506_0708i64.to_be_bytes();
        let ping = StatusPing::decode(&mut PacketReader::new(&ping_body)).unwrap();
        let pong = StatusPong {
            payload: ping.payload,
        }
        .to_bytes();
        assert_eq!(pong[0], 0x01);
        assert_eq!(&pong[1..], &ping_body);
    }
}
