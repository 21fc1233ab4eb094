//! Compound field types shared by several packets.

use crate::buffer::{DecodeError, PacketReader};

/// Block position packed into a single long (26 bits x, 12 bits y, 26 bits z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl Position {
    /// Create a position.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Pack into the wire representation.
    pub fn pack(self) -> i64 {
        ((self.x as i64 & 0x3FF_FFFF) << 38)
            | ((self.y as i64 & 0xFFF) << 26)
            | (self.z as i64 & 0x3FF_FFFF)
    }

    /// Unpack the wire representation, sign-extending each axis.
    pub fn unpack(value: i64) -> Self {
        Self {
            x: (value >> 38) as i32,
            y: ((value << 26) >> 52) as i32,
            z: ((value << 38) >> 38) as i32,
        }
    }
}

/// Which hand an interaction uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    /// Main hand.
    Main,
    /// Off hand.
    Off,
}

impl Hand {
    /// Read a VarInt hand discriminant.
    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        match reader.read_var_int()? {
            0 => Ok(Hand::Main),
            1 => Ok(Hand::Off),
            other => Err(DecodeError::InvalidValue {
                field: "hand",
                value: other as i64,
            }),
        }
    }
}

/// Inventory slot contents.
///
/// The item's NBT compound is kept as raw bytes. Both packets that carry a
/// slot end with it, so the NBT is simply the rest of the body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slot {
    /// Item id, `-1` for an empty slot.
    pub item_id: i16,
    /// Stack size.
    pub count: i8,
    /// Damage / metadata value.
    pub damage: i16,
    /// Raw NBT bytes (`[0x00]` when the item has no tag).
    pub nbt: Vec<u8>,
}

impl Slot {
    /// Whether this is the empty slot.
    pub fn is_empty(&self) -> bool {
        self.item_id == -1
    }

    /// Read a slot that extends to the end of the packet.
    pub fn read_trailing(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let item_id = reader.read_i16()?;
        if item_id == -1 {
            return Ok(Slot {
                item_id,
                ..Slot::default()
            });
        }
        let count = reader.read_i8()?;
        let damage = reader.read_i16()?;
        let nbt = reader.read_rest().to_vec();
        Ok(Slot {
            item_id,
            count,
            damage,
            nbt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PacketWriter;

    #[test]
    fn test_position_packs_negative_axes() {
        let pos = Position::new(-33, 64, 1_000_000);
        assert_eq!(Position::unpack(pos.pack()), pos);

        let low = Position::new(18_357_644, -1, -20_882_616);
        assert_eq!(Position::unpack(low.pack()), low);
    }

    #[test]
    fn test_position_bit_layout() {
        let packed = Position::new(1, 2, 3).pack();
        assert_eq!(packed >> 38, 1);
        assert_eq!((packed >> 26) & 0xFFF, 2);
        assert_eq!(packed & 0x3FF_FFFF, 3);
    }

    #[test]
    fn test_hand_rejects_unknown() {
        let mut writer = PacketWriter::new();
        writer.write_var_int(2);
        let bytes = writer.into_inner();
        assert!(Hand::read(&mut PacketReader::new(&bytes)).is_err());
    }

    #[test]
    fn test_empty_slot_has_no_tail() {
        let mut writer = PacketWriter::new();
        writer.write_i16(-1);
        let bytes = writer.into_inner();
        let slot = Slot::read_trailing(&mut PacketReader::new(&bytes)).unwrap();
        assert!(slot.is_empty());
        assert!(slot.nbt.is_empty());
    }

    #[test]
    fn test_slot_keeps_raw_nbt() {
        let mut writer = PacketWriter::new();
        writer.write_i16(276).write_i8(1).write_i16(0).write_u8(0x00);
        let bytes = writer.into_inner();
        let slot = Slot::read_trailing(&mut PacketReader::new(&bytes)).unwrap();
        assert_eq!(slot.item_id, 276);
        assert_eq!(slot.count, 1);
        assert_eq!(slot.nbt, vec![0x00]);
    }
}
