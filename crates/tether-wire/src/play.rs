//! Serverbound packets of the play state.
//!
//! [`PLAY_DECODERS`] is the fixed dispatch table: one decoder per known
//! packet id, `None` for ids the bridge does not implement.

use crate::ServerboundPacket;
use crate::buffer::{DecodeError, PacketReader};
use crate::types::{Hand, Position, Slot};

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// Client confirms a server-initiated teleport.
#[derive(Debug, Clone, PartialEq)]
pub struct TeleportConfirm {
    /// Id from the matching position-and-look packet.
    pub teleport_id: i32,
}

impl ServerboundPacket for TeleportConfirm {
    const ID: u8 = 0x00;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            teleport_id: r.read_var_int()?,
        })
    }
}

/// Tab completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct TabComplete {
    /// Text typed so far.
    pub text: String,
    /// Whether the text should be treated as a command.
    pub assume_command: bool,
    /// Block the player is looking at, if any.
    pub looked_at_block: Option<Position>,
}

impl ServerboundPacket for TabComplete {
    const ID: u8 = 0x01;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let text = r.read_string(32_767)?;
        let assume_command = r.read_bool()?;
        let looked_at_block = if r.read_bool()? {
            Some(r.read_position()?)
        } else {
            None
        };
        Ok(Self {
            text,
            assume_command,
            looked_at_block,
        })
    }
}

/// Chat message or command.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    /// Raw text (at most 256 characters).
    pub message: String,
}

impl ServerboundPacket for Chat {
    const ID: u8 = 0x02;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            message: r.read_string(256)?,
        })
    }
}

/// Respawn or statistics request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientStatus {
    /// 0 = perform respawn, 1 = request stats.
    pub action: i32,
}

impl ServerboundPacket for ClientStatus {
    const ID: u8 = 0x03;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            action: r.read_var_int()?,
        })
    }
}

/// Client locale and display settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Locale such as `en_us`.
    pub locale: String,
    /// Render distance in chunks.
    pub view_distance: i8,
    /// 0 = enabled, 1 = commands only, 2 = hidden.
    pub chat_mode: i32,
    /// Whether chat colours are shown.
    pub chat_colors: bool,
    /// Skin part bit mask.
    pub displayed_skin_parts: u8,
    /// Main hand.
    pub main_hand: Hand,
}

impl ServerboundPacket for ClientSettings {
    const ID: u8 = 0x04;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            locale: r.read_string(16)?,
            view_distance: r.read_i8()?,
            chat_mode: r.read_var_int()?,
            chat_colors: r.read_bool()?,
            displayed_skin_parts: r.read_u8()?,
            main_hand: Hand::read(r)?,
        })
    }
}

/// Reply to a rejected inventory transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmTransaction {
    /// Window id.
    pub window_id: i8,
    /// Transaction number.
    pub action_number: i16,
    /// Whether the action was accepted.
    pub accepted: bool,
}

impl ServerboundPacket for ConfirmTransaction {
    const ID: u8 = 0x05;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            window_id: r.read_i8()?,
            action_number: r.read_i16()?,
            accepted: r.read_bool()?,
        })
    }
}

/// Enchantment table selection.
#[derive(Debug, Clone, PartialEq)]
pub struct EnchantItem {
    /// Window id.
    pub window_id: i8,
    /// Position of the chosen enchantment (0–2).
    pub enchantment: i8,
}

impl ServerboundPacket for EnchantItem {
    const ID: u8 = 0x06;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            window_id: r.read_i8()?,
            enchantment: r.read_i8()?,
        })
    }
}

/// Click inside an inventory window.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickWindow {
    /// Window id.
    pub window_id: u8,
    /// Clicked slot.
    pub slot: i16,
    /// Mouse button.
    pub button: i8,
    /// Transaction number.
    pub action_number: i16,
    /// Inventory operation mode.
    pub mode: i32,
    /// Item in the clicked slot.
    pub clicked_item: Slot,
}

impl ServerboundPacket for ClickWindow {
    const ID: u8 = 0x07;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            window_id: r.read_u8()?,
            slot: r.read_i16()?,
            button: r.read_i8()?,
            action_number: r.read_i16()?,
            mode: r.read_var_int()?,
            clicked_item: Slot::read_trailing(r)?,
        })
    }
}

/// Inventory window closed.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseWindow {
    /// Window id.
    pub window_id: u8,
}

impl ServerboundPacket for CloseWindow {
    const ID: u8 = 0x08;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            window_id: r.read_u8()?,
        })
    }
}

/// Plugin channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginMessage {
    /// Channel name.
    pub channel: String,
    /// Opaque channel payload.
    pub data: Vec<u8>,
}

impl ServerboundPacket for PluginMessage {
    const ID: u8 = 0x09;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            channel: r.read_string(20)?,
            data: r.read_rest().to_vec(),
        })
    }
}

/// Kind of entity interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum UseEntityAction {
    /// Right click.
    Interact {
        /// Hand used.
        hand: Hand,
    },
    /// Left click.
    Attack,
    /// Right click at a point on the entity's hitbox.
    InteractAt {
        /// Target point, relative to the entity.
        target: [f32; 3],
        /// Hand used.
        hand: Hand,
    },
}

/// Interaction with an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct UseEntity {
    /// Target entity id.
    pub target: i32,
    /// What the player did.
    pub action: UseEntityAction,
}

impl ServerboundPacket for UseEntity {
    const ID: u8 = 0x0A;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let target = r.read_var_int()?;
        let action = match r.read_var_int()? {
            0 => UseEntityAction::Interact { hand: Hand::read(r)? },
            1 => UseEntityAction::Attack,
            2 => {
                let target = [r.read_f32()?, r.read_f32()?, r.read_f32()?];
                UseEntityAction::InteractAt {
                    target,
                    hand: Hand::read(r)?,
                }
            }
            other => {
                return Err(DecodeError::InvalidValue {
                    field: "use entity type",
                    value: other as i64,
                });
            }
        };
        Ok(Self { target, action })
    }
}

/// Keep-alive echo.
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAlive {
    /// Id from the server's keep-alive.
    pub id: i64,
}

impl ServerboundPacket for KeepAlive {
    const ID: u8 = 0x0B;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self { id: r.read_i64()? })
    }
}

/// On-ground flag only.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Whether the player stands on a block.
    pub on_ground: bool,
}

impl ServerboundPacket for Player {
    const ID: u8 = 0x0C;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            on_ground: r.read_bool()?,
        })
    }
}

/// Position update.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPosition {
    /// Feet X.
    pub x: f64,
    /// Feet Y.
    pub y: f64,
    /// Feet Z.
    pub z: f64,
    /// Whether the player stands on a block.
    pub on_ground: bool,
}

impl ServerboundPacket for PlayerPosition {
    const ID: u8 = 0x0D;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            x: r.read_f64()?,
            y: r.read_f64()?,
            z: r.read_f64()?,
            on_ground: r.read_bool()?,
        })
    }
}

/// Position and rotation update.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPositionAndLook {
    /// Feet X.
    pub x: f64,
    /// Feet Y.
    pub y: f64,
    /// Feet Z.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Whether the player stands on a block.
    pub on_ground: bool,
}

impl ServerboundPacket for PlayerPositionAndLook {
    const ID: u8 = 0x0E;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            x: r.read_f64()?,
            y: r.read_f64()?,
            z: r.read_f64()?,
            yaw: r.read_f32()?,
            pitch: r.read_f32()?,
            on_ground: r.read_bool()?,
        })
    }
}

/// Rotation update.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLook {
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Whether the player stands on a block.
    pub on_ground: bool,
}

impl ServerboundPacket for PlayerLook {
    const ID: u8 = 0x0F;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            yaw: r.read_f32()?,
            pitch: r.read_f32()?,
            on_ground: r.read_bool()?,
        })
    }
}

/// Recipe book click.
#[derive(Debug, Clone, PartialEq)]
pub struct CraftRecipeRequest {
    /// Window id.
    pub window_id: i8,
    /// Recipe id.
    pub recipe: i32,
    /// Shift-click: craft as many as possible.
    pub make_all: bool,
}

impl ServerboundPacket for CraftRecipeRequest {
    const ID: u8 = 0x12;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            window_id: r.read_i8()?,
            recipe: r.read_var_int()?,
            make_all: r.read_bool()?,
        })
    }
}

/// Flying state change.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAbilities {
    /// Ability bit flags.
    pub flags: i8,
    /// Flying speed.
    pub flying_speed: f32,
    /// Walking speed.
    pub walking_speed: f32,
}

impl ServerboundPacket for PlayerAbilities {
    const ID: u8 = 0x13;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            flags: r.read_i8()?,
            flying_speed: r.read_f32()?,
            walking_speed: r.read_f32()?,
        })
    }
}

/// Block digging progress or item drop.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDigging {
    /// Digging status (started, cancelled, finished, drop, ...).
    pub status: i32,
    /// Target block.
    pub location: Position,
    /// Block face.
    pub face: i8,
}

impl ServerboundPacket for PlayerDigging {
    const ID: u8 = 0x14;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            status: r.read_var_int()?,
            location: r.read_position()?,
            face: r.read_i8()?,
        })
    }
}

/// Sneak, sprint, bed and horse actions.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityAction {
    /// Player's entity id.
    pub entity_id: i32,
    /// Action id.
    pub action: i32,
    /// Horse jump strength (0–100).
    pub jump_boost: i32,
}

impl ServerboundPacket for EntityAction {
    const ID: u8 = 0x15;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            entity_id: r.read_var_int()?,
            action: r.read_var_int()?,
            jump_boost: r.read_var_int()?,
        })
    }
}

/// Recipe book state.
#[derive(Debug, Clone, PartialEq)]
pub enum CraftingBookData {
    /// A recipe was shown to the player.
    DisplayedRecipe {
        /// Recipe id.
        recipe_id: i32,
    },
    /// Recipe book opened or filtered.
    Status {
        /// Whether the book is open.
        book_open: bool,
        /// Whether the craftable filter is active.
        filter_active: bool,
    },
}

impl ServerboundPacket for CraftingBookData {
    const ID: u8 = 0x17;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        match r.read_var_int()? {
            0 => Ok(CraftingBookData::DisplayedRecipe {
                recipe_id: r.read_i32()?,
            }),
            1 => Ok(CraftingBookData::Status {
                book_open: r.read_bool()?,
                filter_active: r.read_bool()?,
            }),
            other => Err(DecodeError::InvalidValue {
                field: "crafting book data type",
                value: other as i64,
            }),
        }
    }
}

/// Advancement screen navigation.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvancementTab {
    /// A tab was opened.
    OpenedTab {
        /// Identifier of the tab.
        tab_id: String,
    },
    /// The screen was closed.
    ClosedScreen,
}

impl ServerboundPacket for AdvancementTab {
    const ID: u8 = 0x19;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        match r.read_var_int()? {
            0 => Ok(AdvancementTab::OpenedTab {
                tab_id: r.read_string(32_767)?,
            }),
            1 => Ok(AdvancementTab::ClosedScreen),
            other => Err(DecodeError::InvalidValue {
                field: "advancement tab action",
                value: other as i64,
            }),
        }
    }
}

/// Hotbar selection.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldItemChange {
    /// Hotbar slot (0–8).
    pub slot: i16,
}

impl ServerboundPacket for HeldItemChange {
    const ID: u8 = 0x1A;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            slot: r.read_i16()?,
        })
    }
}

/// Creative inventory edit.
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeInventoryAction {
    /// Inventory slot.
    pub slot: i16,
    /// New contents.
    pub clicked_item: Slot,
}

impl ServerboundPacket for CreativeInventoryAction {
    const ID: u8 = 0x1B;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            slot: r.read_i16()?,
            clicked_item: Slot::read_trailing(r)?,
        })
    }
}

/// Sign text edit.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSign {
    /// Sign block.
    pub location: Position,
    /// The four lines.
    pub lines: [String; 4],
}

impl ServerboundPacket for UpdateSign {
    const ID: u8 = 0x1C;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let location = r.read_position()?;
        let lines = [
            r.read_string(384)?,
            r.read_string(384)?,
            r.read_string(384)?,
            r.read_string(384)?,
        ];
        Ok(Self { location, lines })
    }
}

/// Arm swing.
#[derive(Debug, Clone, PartialEq)]
pub struct Animate {
    /// Hand swung.
    pub hand: Hand,
}

impl ServerboundPacket for Animate {
    const ID: u8 = 0x1D;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            hand: Hand::read(r)?,
        })
    }
}

/// Block placement or block interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerBlockPlacement {
    /// Clicked block.
    pub location: Position,
    /// Clicked face.
    pub face: i32,
    /// Hand used.
    pub hand: Hand,
    /// Cursor position on the face, each in `0.0..=1.0`.
    pub cursor: [f32; 3],
}

impl ServerboundPacket for PlayerBlockPlacement {
    const ID: u8 = 0x1F;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            location: r.read_position()?,
            face: r.read_var_int()?,
            hand: Hand::read(r)?,
            cursor: [r.read_f32()?, r.read_f32()?, r.read_f32()?],
        })
    }
}

/// Use the held item without a block target.
#[derive(Debug, Clone, PartialEq)]
pub struct UseItem {
    /// Hand used.
    pub hand: Hand,
}

impl ServerboundPacket for UseItem {
    const ID: u8 = 0x20;

    fn decode(r: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            hand: Hand::read(r)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatch table
// ---------------------------------------------------------------------------

macro_rules! play_packets {
    ($($name:ident),* $(,)?) => {
        /// A decoded play-state packet.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ServerboundPlay {
            $(
                #[doc = concat!("See [`", stringify!($name), "`].")]
                $name($name),
            )*
        }

        impl ServerboundPlay {
            /// Packet id this value was decoded from.
            pub fn id(&self) -> u8 {
                match self {
                    $(ServerboundPlay::$name(_) => $name::ID,)*
                }
            }
        }

        $(
            impl From<$name> for ServerboundPlay {
                fn from(packet: $name) -> Self {
                    ServerboundPlay::$name(packet)
                }
            }
        )*

        /// Play-state decoders indexed by packet id.
        pub static PLAY_DECODERS: [Option<PlayDecoder>; 256] = {
            let mut table: [Option<PlayDecoder>; 256] = [None; 256];
            $(table[$name::ID as usize] = Some(decode_as::<$name>);)*
            table
        };
    };
}

/// Decoder for one play packet id.
pub type PlayDecoder = fn(&mut PacketReader<'_>) -> Result<ServerboundPlay, DecodeError>;

fn decode_as<P>(reader: &mut PacketReader<'_>) -> Result<ServerboundPlay, DecodeError>
where
    P: ServerboundPacket + Into<ServerboundPlay>,
{
    P::decode(reader).map(Into::into)
}

play_packets!(
    TeleportConfirm,
    TabComplete,
    Chat,
    ClientStatus,
    ClientSettings,
    ConfirmTransaction,
    EnchantItem,
    ClickWindow,
    CloseWindow,
    PluginMessage,
    UseEntity,
    KeepAlive,
    Player,
    PlayerPosition,
    PlayerPositionAndLook,
    PlayerLook,
    CraftRecipeRequest,
    PlayerAbilities,
    PlayerDigging,
    EntityAction,
    CraftingBookData,
    AdvancementTab,
    HeldItemChange,
    CreativeInventoryAction,
    UpdateSign,
    Animate,
    PlayerBlockPlacement,
    UseItem,
);

/// Decode a complete play packet (id byte plus body).
///
/// Returns `Ok(None)` for ids that have no decoder.
pub fn decode_play(packet: &[u8]) -> Result<Option<ServerboundPlay>, DecodeError> {
    let Some(&id) = packet.first() else {
        return Err(DecodeError::UnexpectedEof {
            offset: 0,
            needed: 1,
        });
    };
    match PLAY_DECODERS[id as usize] {
        Some(decoder) => decoder(&mut PacketReader::with_offset(packet, 1)).map(Some),
        None => Ok(None),
    }
}
