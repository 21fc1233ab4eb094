//! Clientbound packets used by the login sequence and a minimal play session.

use std::fmt;

use crate::buffer::PacketWriter;

/// A packet the server sends to the client.
pub trait ClientboundPacket: fmt::Debug + Send {
    /// Packet id byte.
    fn id(&self) -> u8;

    /// Append the body (everything after the id byte).
    fn encode(&self, writer: &mut PacketWriter);

    /// Encode id and body into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = PacketWriter::with_id(self.id());
        self.encode(&mut writer);
        writer.into_inner()
    }
}

/// Wrap plain text in a chat component JSON object.
pub fn chat_text(text: &str) -> String {
    serde_json::json!({ "text": text }).to_string()
}

// ---------------------------------------------------------------------------
// Login state
// ---------------------------------------------------------------------------

/// Refuse the login with a chat-component reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDisconnect {
    /// Reason as chat JSON.
    pub reason: String,
}

impl ClientboundPacket for LoginDisconnect {
    fn id(&self) -> u8 {
        0x00
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.reason);
    }
}

/// Ask the client to start the encryption handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    /// Server id string, empty on modern servers.
    pub server_id: String,
    /// DER-encoded RSA public key.
    pub public_key: Vec<u8>,
    /// Random token the client must echo back encrypted.
    pub verify_token: Vec<u8>,
}

impl ClientboundPacket for EncryptionRequest {
    fn id(&self) -> u8 {
        0x01
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.server_id)
            .write_byte_array(&self.public_key)
            .write_byte_array(&self.verify_token);
    }
}

/// Finish the login and switch the connection to the play state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    /// Hyphenated player UUID.
    pub uuid: String,
    /// Player name.
    pub username: String,
}

impl ClientboundPacket for LoginSuccess {
    fn id(&self) -> u8 {
        0x02
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.uuid).write_string(&self.username);
    }
}

/// Enable compression for every following frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCompression {
    /// Minimum packet size that gets compressed.
    pub threshold: i32,
}

impl ClientboundPacket for SetCompression {
    fn id(&self) -> u8 {
        0x03
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_var_int(self.threshold);
    }
}

// ---------------------------------------------------------------------------
// Play state
// ---------------------------------------------------------------------------

/// Chat line shown to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Chat component JSON.
    pub json: String,
    /// 0 = chat box, 1 = system message, 2 = action bar.
    pub position: i8,
}

impl ClientboundPacket for ChatMessage {
    fn id(&self) -> u8 {
        0x0F
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.json).write_i8(self.position);
    }
}

/// Kick the player during play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Reason as chat JSON.
    pub reason: String,
}

impl ClientboundPacket for Disconnect {
    fn id(&self) -> u8 {
        0x1A
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.reason);
    }
}

/// Liveness probe; the client echoes the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    /// Arbitrary id.
    pub id: i64,
}

impl ClientboundPacket for KeepAlive {
    fn id(&self) -> u8 {
        0x1F
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_i64(self.id);
    }
}

/// First play packet: the player's entity and world parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    /// Player's entity id.
    pub entity_id: i32,
    /// 0 survival, 1 creative, 2 adventure, 3 spectator.
    pub gamemode: u8,
    /// -1 nether, 0 overworld, 1 end.
    pub dimension: i32,
    /// 0 peaceful to 3 hard.
    pub difficulty: u8,
    /// Tab list size hint.
    pub max_players: u8,
    /// `default`, `flat`, ...
    pub level_type: String,
    /// Hide coordinates on the debug screen.
    pub reduced_debug_info: bool,
}

impl ClientboundPacket for JoinGame {
    fn id(&self) -> u8 {
        0x23
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_i32(self.entity_id)
            .write_u8(self.gamemode)
            .write_i32(self.dimension)
            .write_u8(self.difficulty)
            .write_u8(self.max_players)
            .write_string(&self.level_type)
            .write_bool(self.reduced_debug_info);
    }
}

/// Teleport the player; must be confirmed with the same teleport id.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPositionAndLook {
    /// X.
    pub x: f64,
    /// Y.
    pub y: f64,
    /// Z.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Bit set of relative axes.
    pub flags: i8,
    /// Id echoed by the client's teleport confirm.
    pub teleport_id: i32,
}

impl ClientboundPacket for PlayerPositionAndLook {
    fn id(&self) -> u8 {
        0x2F
    }

    fn encode(&self, w: &mut PacketWriter) {
        w.write_f64(self.x)
            .write_f64(self.y)
            .write_f64(self.z)
            .write_f32(self.yaw)
            .write_f32(self.pitch)
            .write_i8(self.flags)
            .write_var_int(self.teleport_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PacketReader;

    #[test]
    fn test_chat_text_escapes() {
        assert_eq!(chat_text("hi"), r#"{"text":"hi"}"#);
        assert_eq!(chat_text("say \"x\""), r#"{"text":"say \"x\""}"#);
    }

    #[test]
    fn test_login_success_layout() {
        let bytes = LoginSuccess {
            uuid: "00000000-0000-0000-0000-000000000000".to_string(),
            username: "Alice".to_string(),
        }
        .to_bytes();
        assert_eq!(bytes[0], 0x02);

        let mut r = PacketReader::with_offset(&bytes, 1);
        assert_eq!(r.read_string(36).unwrap().len(), 36);
        assert_eq!(r.read_string(16).unwrap(), "Alice");
        assert!(r.is_empty());
    }

    #[test]
    fn test_set_compression_is_varint() {
        let bytes = SetCompression { threshold: 256 }.to_bytes();
        assert_eq!(bytes, vec![0x03, 0x80, 0x02]);
    }

    #[test]
    fn test_keep_alive_is_eight_bytes() {
        let bytes = KeepAlive { id: 1 }.to_bytes();
        assert_eq!(bytes, vec![0x1F, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_join_game_layout() {
        let bytes = JoinGame {
            entity_id: 7,
            gamemode: 1,
            dimension: 0,
            difficulty: 0,
            max_players: 20,
            level_type: "flat".to_string(),
            reduced_debug_info: false,
        }
        .to_bytes();
        let mut r = PacketReader::with_offset(&bytes, 1);
        assert_eq!(r.read_i32().unwrap(), 7);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_i32().unwrap(), 0);
        assert_eq!(r.read_u8().unwrap(), 0);
        assert_eq!(r.read_u8().unwrap(), 20);
        assert_eq!(r.read_string(16).unwrap(), "flat");
        assert!(!r.read_bool().unwrap());
        assert!(r.is_empty());
    }

    #[test]
    fn test_boxed_packets_keep_their_ids() {
        let packets: Vec<Box<dyn ClientboundPacket>> = vec![
            Box::new(Disconnect {
                reason: chat_text("bye"),
            }),
            Box::new(ChatMessage {
                json: chat_text("hello"),
                position: 0,
            }),
            Box::new(PlayerPositionAndLook {
                x: 0.0,
                y: 64.0,
                z: 0.0,
                yaw: 0.0,
                pitch: 0.0,
                flags: 0,
                teleport_id: 1,
            }),
        ];
        let ids: Vec<u8> = packets.iter().map(|p| p.to_bytes()[0]).collect();
        assert_eq!(ids, vec![0x1A, 0x0F, 0x2F]);
    }
}
