//! Typed commands and their byte layout.
//!
//! ```text
//! +-----------------+------------------------------------------+
//! | opcode (1 byte) | payload (opcode specific, big-endian)    |
//! +-----------------+------------------------------------------+
//! ```
//!
//! | Opcode              | Payload                                          |
//! |---------------------|--------------------------------------------------|
//! | `SEND_PACKET`       | u32 session id, raw wire packet                  |
//! | `OPEN_SESSION`      | u32 id, u8 address length, address, u16 port     |
//! | `CLOSE_SESSION`     | u32 id                                           |
//! | `SET_OPTION`        | u8 key length, key, remaining = UTF-8 JSON value |
//! | `SET_COMPRESSION`   | u32 id, u32 threshold                            |
//! | `ENABLE_ENCRYPTION` | u32 id, remaining = shared secret                |
//! | `SHUTDOWN`          | none                                             |
//! | `EMERGENCY_SHUTDOWN`| none                                             |

use std::fmt;

/// Opcode byte values. `SEND_PACKET` and `CLOSE_SESSION` are used in both
/// directions.
pub mod opcode {
    /// Raw wire packet for (or from) a session.
    pub const SEND_PACKET: u8 = 0x01;
    /// A client finished its handshake and wants to log in.
    pub const OPEN_SESSION: u8 = 0x02;
    /// Tear down a session.
    pub const CLOSE_SESSION: u8 = 0x03;
    /// Key/value option for the network thread.
    pub const SET_OPTION: u8 = 0x04;
    /// Enable threshold compression on a session.
    pub const SET_COMPRESSION: u8 = 0x05;
    /// Enable stream encryption on a session.
    pub const ENABLE_ENCRYPTION: u8 = 0x06;
    /// Close every connection and stop the network thread.
    pub const SHUTDOWN: u8 = 0xFE;
    /// Stop the network thread immediately.
    pub const EMERGENCY_SHUTDOWN: u8 = 0xFF;
}

/// Session identifier assigned by the network thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised while decoding a command frame or using a closed channel.
///
/// Both ends of the channel belong to the same process, so a decode error
/// means the other side is broken, not that a client misbehaved.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    /// The frame had no opcode byte.
    #[error("empty command frame")]
    Empty,

    /// The opcode is not valid for this direction.
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    /// The payload ended before a fixed-size field.
    #[error("truncated payload for opcode 0x{opcode:02X}: needed {needed} bytes, {available} available")]
    Truncated {
        /// Opcode of the frame being decoded.
        opcode: u8,
        /// Bytes required by the next field.
        needed: usize,
        /// Bytes left in the payload.
        available: usize,
    },

    /// Bytes were left over after the last field of a fixed layout.
    #[error("{extra} trailing bytes after payload for opcode 0x{opcode:02X}")]
    Trailing {
        /// Opcode of the frame being decoded.
        opcode: u8,
        /// Number of unread bytes.
        extra: usize,
    },

    /// A text field was not valid UTF-8.
    #[error("invalid UTF-8 in payload for opcode 0x{0:02X}")]
    InvalidUtf8(u8),

    /// The receiving side of the channel is gone.
    #[error("command channel disconnected")]
    Disconnected,
}

/// Commands sent from the main thread to the network thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainCommand {
    /// Stop immediately, without flushing connections.
    EmergencyShutdown,
    /// Close every connection and stop.
    Shutdown,
    /// Set a network-thread option. `value` is a JSON document.
    SetOption {
        /// Option name (at most 255 bytes).
        key: String,
        /// JSON-encoded value.
        value: String,
    },
    /// Close the socket behind a session.
    CloseSession {
        /// Session to close.
        id: SessionId,
    },
    /// Write a raw wire packet to a session.
    SendPacket {
        /// Destination session.
        target: SessionId,
        /// Packet id byte followed by the packet body.
        packet: Vec<u8>,
    },
    /// Start compressing frames larger than `threshold` bytes.
    SetCompression {
        /// Session to upgrade.
        target: SessionId,
        /// Minimum packet size that gets compressed.
        threshold: u32,
    },
    /// Start encrypting the stream with the given shared secret.
    EnableEncryption {
        /// Session to upgrade.
        target: SessionId,
        /// Shared secret negotiated during login.
        secret: Vec<u8>,
    },
}

/// Commands sent from the network thread to the main thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    /// A wire packet arrived from a session.
    SendPacket {
        /// Session the packet came from.
        source: SessionId,
        /// Packet id byte followed by the packet body.
        packet: Vec<u8>,
    },
    /// A new client wants to log in.
    OpenSession {
        /// Id assigned by the network thread.
        id: SessionId,
        /// Remote address.
        address: String,
        /// Remote port.
        port: u16,
    },
    /// The socket behind a session is gone.
    CloseSession {
        /// Session that closed.
        id: SessionId,
    },
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Clamp a string to at most 255 bytes without splitting a character.
fn short_str(s: &str) -> &[u8] {
    if s.len() <= u8::MAX as usize {
        return s.as_bytes();
    }
    let mut end = u8::MAX as usize;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}

impl MainCommand {
    /// Opcode of this command.
    pub fn opcode(&self) -> u8 {
        match self {
            MainCommand::EmergencyShutdown => opcode::EMERGENCY_SHUTDOWN,
            MainCommand::Shutdown => opcode::SHUTDOWN,
            MainCommand::SetOption { .. } => opcode::SET_OPTION,
            MainCommand::CloseSession { .. } => opcode::CLOSE_SESSION,
            MainCommand::SendPacket { .. } => opcode::SEND_PACKET,
            MainCommand::SetCompression { .. } => opcode::SET_COMPRESSION,
            MainCommand::EnableEncryption { .. } => opcode::ENABLE_ENCRYPTION,
        }
    }

    /// Serialize into a single command frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode()];
        match self {
            MainCommand::EmergencyShutdown | MainCommand::Shutdown => {}
            MainCommand::SetOption { key, value } => {
                let key = short_str(key);
                out.push(key.len() as u8);
                out.extend_from_slice(key);
                out.extend_from_slice(value.as_bytes());
            }
            MainCommand::CloseSession { id } => {
                out.extend_from_slice(&id.0.to_be_bytes());
            }
            MainCommand::SendPacket { target, packet } => {
                out.reserve(4 + packet.len());
                out.extend_from_slice(&target.0.to_be_bytes());
                out.extend_from_slice(packet);
            }
            MainCommand::SetCompression { target, threshold } => {
                out.extend_from_slice(&target.0.to_be_bytes());
                out.extend_from_slice(&threshold.to_be_bytes());
            }
            MainCommand::EnableEncryption { target, secret } => {
                out.extend_from_slice(&target.0.to_be_bytes());
                out.extend_from_slice(secret);
            }
        }
        out
    }

    /// Parse a command frame produced by [`MainCommand::encode`].
    pub fn decode(frame: &[u8]) -> Result<Self, CommandError> {
        let (&op, payload) = frame.split_first().ok_or(CommandError::Empty)?;
        let mut payload = Payload::new(op, payload);
        let command = match op {
            opcode::EMERGENCY_SHUTDOWN => MainCommand::EmergencyShutdown,
            opcode::SHUTDOWN => MainCommand::Shutdown,
            opcode::SET_OPTION => {
                let len = payload.u8()? as usize;
                let key = payload.string(len)?;
                let value = payload.rest_string()?;
                MainCommand::SetOption { key, value }
            }
            opcode::CLOSE_SESSION => MainCommand::CloseSession {
                id: SessionId(payload.u32()?),
            },
            opcode::SEND_PACKET => MainCommand::SendPacket {
                target: SessionId(payload.u32()?),
                packet: payload.rest().to_vec(),
            },
            opcode::SET_COMPRESSION => MainCommand::SetCompression {
                target: SessionId(payload.u32()?),
                threshold: payload.u32()?,
            },
            opcode::ENABLE_ENCRYPTION => MainCommand::EnableEncryption {
                target: SessionId(payload.u32()?),
                secret: payload.rest().to_vec(),
            },
            other => return Err(CommandError::UnknownOpcode(other)),
        };
        payload.finish()?;
        Ok(command)
    }
}

impl NetworkCommand {
    /// Opcode of this command.
    pub fn opcode(&self) -> u8 {
        match self {
            NetworkCommand::SendPacket { .. } => opcode::SEND_PACKET,
            NetworkCommand::OpenSession { .. } => opcode::OPEN_SESSION,
            NetworkCommand::CloseSession { .. } => opcode::CLOSE_SESSION,
        }
    }

    /// Serialize into a single command frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode()];
        match self {
            NetworkCommand::SendPacket { source, packet } => {
                out.reserve(4 + packet.len());
                out.extend_from_slice(&source.0.to_be_bytes());
                out.extend_from_slice(packet);
            }
            NetworkCommand::OpenSession { id, address, port } => {
                let address = short_str(address);
                out.extend_from_slice(&id.0.to_be_bytes());
                out.push(address.len() as u8);
                out.extend_from_slice(address);
                out.extend_from_slice(&port.to_be_bytes());
            }
            NetworkCommand::CloseSession { id } => {
                out.extend_from_slice(&id.0.to_be_bytes());
            }
        }
        out
    }

    /// Parse a command frame produced by [`NetworkCommand::encode`].
    pub fn decode(frame: &[u8]) -> Result<Self, CommandError> {
        let (&op, payload) = frame.split_first().ok_or(CommandError::Empty)?;
        let mut payload = Payload::new(op, payload);
        let command = match op {
            opcode::SEND_PACKET => NetworkCommand::SendPacket {
                source: SessionId(payload.u32()?),
                packet: payload.rest().to_vec(),
            },
            opcode::OPEN_SESSION => {
                let id = SessionId(payload.u32()?);
                let len = payload.u8()? as usize;
                let address = payload.string(len)?;
                let port = payload.u16()?;
                NetworkCommand::OpenSession { id, address, port }
            }
            opcode::CLOSE_SESSION => NetworkCommand::CloseSession {
                id: SessionId(payload.u32()?),
            },
            other => return Err(CommandError::UnknownOpcode(other)),
        };
        payload.finish()?;
        Ok(command)
    }
}

// ---------------------------------------------------------------------------
// Payload cursor
// ---------------------------------------------------------------------------

struct Payload<'a> {
    opcode: u8,
    data: &'a [u8],
}

impl<'a> Payload<'a> {
    fn new(opcode: u8, data: &'a [u8]) -> Self {
        Self { opcode, data }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CommandError> {
        if self.data.len() < n {
            return Err(CommandError::Truncated {
                opcode: self.opcode,
                needed: n,
                available: self.data.len(),
            });
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, CommandError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CommandError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CommandError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, len: usize) -> Result<String, CommandError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CommandError::InvalidUtf8(self.opcode))
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    fn finish(&self) -> Result<(), CommandError> {
        match self.data.len() {
            0 => Ok(()),
            extra => Err(CommandError::Trailing {
                opcode: self.opcode,
                extra,
            }),
        }
    }

    fn rest_string(&mut self) -> Result<String, CommandError> {
        let opcode = self.opcode;
        String::from_utf8(self.rest().to_vec()).map_err(|_| CommandError::InvalidUtf8(opcode))
    }
}
