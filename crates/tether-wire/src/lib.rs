//! Client-facing wire packets (Java Edition 1.12.2, protocol 340).
//!
//! Only the vocabulary the bridge needs is modelled here: every serverbound
//! login and play packet the dispatcher accepts, the handshake/status packets
//! answered by the network thread, and the clientbound packets used by the
//! login sequence. A packet on the wire is its id byte followed by its body.

pub mod buffer;
pub mod clientbound;
pub mod handshake;
pub mod login;
pub mod play;
pub mod types;
pub mod varint;

pub use buffer::{DecodeError, PacketReader, PacketWriter};
pub use clientbound::{ClientboundPacket, chat_text};
pub use handshake::{Handshake, NextState};
pub use login::{EncryptionResponse, LOGIN_DECODERS, LoginDecoder, LoginStart, ServerboundLogin};
pub use play::{PLAY_DECODERS, PlayDecoder, ServerboundPlay, decode_play};
pub use types::{Hand, Position, Slot};

/// Protocol version number spoken by the bridge.
pub const PROTOCOL_VERSION: i32 = 340;

/// Human-readable game version for status responses.
pub const VERSION_NAME: &str = "1.12.2";

/// A packet that can be decoded from its body (the bytes after the id).
pub trait ServerboundPacket: Sized {
    /// Packet id byte.
    const ID: u8;

    /// Decode the body. The reader is positioned just past the id byte.
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError>;
}
