//! Serverbound packets of the login state.

use crate::ServerboundPacket;
use crate::buffer::{DecodeError, PacketReader};

/// Login start: the client announces its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    /// Requested player name (at most 16 characters).
    pub name: String,
}

impl ServerboundPacket for LoginStart {
    const ID: u8 = 0x00;

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string(16)?,
        })
    }
}

/// Encryption response: RSA-encrypted shared secret and verify token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    /// Shared secret, still encrypted with the server's public key.
    pub shared_secret: Vec<u8>,
    /// Verify token, still encrypted with the server's public key.
    pub verify_token: Vec<u8>,
}

impl ServerboundPacket for EncryptionResponse {
    const ID: u8 = 0x01;

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            shared_secret: reader.read_byte_array()?,
            verify_token: reader.read_byte_array()?,
        })
    }
}

/// A decoded login-state packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerboundLogin {
    /// See [`LoginStart`].
    LoginStart(LoginStart),
    /// See [`EncryptionResponse`].
    EncryptionResponse(EncryptionResponse),
}

/// Decoder for one login packet id.
pub type LoginDecoder = fn(&mut PacketReader<'_>) -> Result<ServerboundLogin, DecodeError>;

fn decode_login_start(reader: &mut PacketReader<'_>) -> Result<ServerboundLogin, DecodeError> {
    LoginStart::decode(reader).map(ServerboundLogin::LoginStart)
}

fn decode_encryption_response(
    reader: &mut PacketReader<'_>,
) -> Result<ServerboundLogin, DecodeError> {
    EncryptionResponse::decode(reader).map(ServerboundLogin::EncryptionResponse)
}

/// Login-state decoders indexed by packet id.
pub static LOGIN_DECODERS: [Option<LoginDecoder>; 256] = {
    let mut table: [Option<LoginDecoder>; 256] = [None; 256];
    table[LoginStart::ID as usize] = Some(decode_login_start);
    table[EncryptionResponse::ID as usize] = Some(decode_encryption_response);
    table
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PacketWriter;

    #[test]
    fn test_login_start_decodes_name() {
        let mut writer = PacketWriter::with_id(LoginStart::ID);
        writer.write_string("Alice");
        let bytes = writer.into_inner();

        let decoder = LOGIN_DECODERS[bytes[0] as usize].unwrap();
        let packet = decoder(&mut PacketReader::with_offset(&bytes, 1)).unwrap();
        assert_eq!(
            packet,
            ServerboundLogin::LoginStart(LoginStart {
                name: "Alice".to_string()
            })
        );
    }

    #[test]
    fn test_encryption_response_decodes_arrays() {
        let mut writer = PacketWriter::with_id(EncryptionResponse::ID);
        writer.write_byte_array(&[1; 128]).write_byte_array(&[2; 128]);
        let bytes = writer.into_inner();

        let decoder = LOGIN_DECODERS[bytes[0] as usize].unwrap();
        match decoder(&mut PacketReader::with_offset(&bytes, 1)).unwrap() {
            ServerboundLogin::EncryptionResponse(resp) => {
                assert_eq!(resp.shared_secret, vec![1; 128]);
                assert_eq!(resp.verify_token, vec![2; 128]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_only_two_login_ids() {
        let known = LOGIN_DECODERS.iter().filter(|d| d.is_some()).count();
        assert_eq!(known, 2);
        assert!(LOGIN_DECODERS[0xFF].is_none());
    }
}
