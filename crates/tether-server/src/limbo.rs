//! A minimal host: players log in offline, spawn in an empty world and
//! can chat with each other.
//!
//! Sessions share a [`Lobby`] with the host. Anything a session wants to
//! send in the host's own vocabulary goes to the lobby outbox, which the
//! main loop flushes through the translator.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tether_bridge::{
    AuthStatus, HostServer, NativeId, NativeSession, QueryInfo, SessionContext, SessionInfo,
    Translator,
};
use tether_wire::clientbound::{
    ChatMessage, JoinGame, KeepAlive, LoginDisconnect, LoginSuccess, PlayerPositionAndLook,
    SetCompression,
};
use tether_wire::{ClientboundPacket, EncryptionResponse, ServerboundPlay, chat_text};
use tracing::{debug, info};
use uuid::Uuid;

/// Spawn point for every player.
pub const SPAWN: (f64, f64, f64) = (0.5, 64.0, 0.5);

/// The host's packet vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum LimboPacket {
    /// The player typed a chat line.
    Chat(String),
    /// The player answered a keep-alive.
    KeepAliveReply(i64),
    /// The player moved.
    Moved {
        /// X.
        x: f64,
        /// Y.
        y: f64,
        /// Z.
        z: f64,
    },
    /// Text for the player's chat box.
    Message(String),
    /// Keep-alive probe.
    Ping(i64),
}

/// Players and outgoing traffic shared by the host and its sessions.
#[derive(Debug, Default)]
pub struct Lobby {
    players: BTreeMap<NativeId, String>,
    outbox: Vec<(NativeId, LimboPacket)>,
}

impl Lobby {
    /// Names of everyone logged in.
    pub fn names(&self) -> Vec<String> {
        self.players.values().cloned().collect()
    }

    /// Number of players logged in.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Queue a packet for one player.
    pub fn send(&mut self, target: NativeId, packet: LimboPacket) {
        self.outbox.push((target, packet));
    }

    /// Queue a packet for every player.
    pub fn broadcast(&mut self, packet: &LimboPacket) {
        let targets: Vec<NativeId> = self.players.keys().copied().collect();
        for target in targets {
            self.send(target, packet.clone());
        }
    }

    /// Take everything queued since the last call.
    pub fn take_outbox(&mut self) -> Vec<(NativeId, LimboPacket)> {
        std::mem::take(&mut self.outbox)
    }

    fn join(&mut self, id: NativeId, name: &str) {
        self.players.insert(id, name.to_string());
        self.broadcast(&LimboPacket::Message(format!("{name} joined the game")));
    }

    fn leave(&mut self, id: NativeId) {
        if let Some(name) = self.players.remove(&id) {
            self.broadcast(&LimboPacket::Message(format!("{name} left the game")));
        }
    }
}

/// UUID for a player without an account check. Stable per name.
pub fn offline_uuid(name: &str) -> Uuid {
    Uuid::new_v3(
        &Uuid::NAMESPACE_URL,
        format!("OfflinePlayer:{name}").as_bytes(),
    )
}

/// One connected client.
#[derive(Debug)]
pub struct LimboSession {
    id: NativeId,
    address: String,
    name: Option<String>,
    position: (f64, f64, f64),
    pending_keep_alive: Option<i64>,
    max_players: u32,
    lobby: Rc<RefCell<Lobby>>,
}

impl LimboSession {
    /// Send a keep-alive, or disconnect if the previous one went unanswered.
    pub fn keep_alive(&mut self, probe: i64, ctx: &mut SessionContext<'_>) {
        if ctx.state().status != AuthStatus::Authenticated {
            return;
        }
        if self.pending_keep_alive.is_some() {
            ctx.disconnect("Timed out");
            return;
        }
        self.pending_keep_alive = Some(probe);
        self.lobby.borrow_mut().send(self.id, LimboPacket::Ping(probe));
    }

    fn refuse(&self, reason: &str, ctx: &mut SessionContext<'_>) {
        ctx.send(&LoginDisconnect {
            reason: chat_text(reason),
        });
        ctx.disconnect(reason);
    }

    fn handle_chat(&mut self, text: &str) {
        let name = self.name.as_deref().unwrap_or("?");
        let mut lobby = self.lobby.borrow_mut();
        if text == "/list" {
            let reply = format!("Online ({}): {}", lobby.player_count(), lobby.names().join(", "));
            lobby.send(self.id, LimboPacket::Message(reply));
        } else {
            info!("<{name}> {text}");
            lobby.broadcast(&LimboPacket::Message(format!("<{name}> {text}")));
        }
    }
}

impl NativeSession for LimboSession {
    type Packet = LimboPacket;

    fn native_id(&self) -> NativeId {
        self.id
    }

    fn handle_packet(&mut self, packet: LimboPacket, _ctx: &mut SessionContext<'_>) {
        match packet {
            LimboPacket::Chat(text) => self.handle_chat(&text),
            LimboPacket::KeepAliveReply(id) => {
                if self.pending_keep_alive == Some(id) {
                    self.pending_keep_alive = None;
                } else {
                    debug!(native = %self.id, "Stale keep-alive {id}");
                }
            }
            LimboPacket::Moved { x, y, z } => self.position = (x, y, z),
            LimboPacket::Message(_) | LimboPacket::Ping(_) => {}
        }
    }

    fn begin_authentication(&mut self, name: &str, online_mode: bool, ctx: &mut SessionContext<'_>) {
        if online_mode {
            self.refuse("This server does not verify accounts", ctx);
            return;
        }
        if name.is_empty() {
            self.refuse("Invalid name", ctx);
            return;
        }
        if self.lobby.borrow().player_count() >= self.max_players as usize {
            self.refuse("The server is full", ctx);
            return;
        }

        if let Some(threshold) = ctx.compression_threshold() {
            ctx.send(&SetCompression {
                threshold: i32::try_from(threshold).unwrap_or(i32::MAX),
            });
            ctx.set_compression();
        }
        let uuid = offline_uuid(name);
        ctx.send(&LoginSuccess {
            uuid: uuid.hyphenated().to_string(),
            username: name.to_string(),
        });
        ctx.authenticate();

        ctx.send(&JoinGame {
            entity_id: self.id.0 as i32,
            gamemode: 3,
            dimension: 0,
            difficulty: 0,
            max_players: u8::try_from(self.max_players).unwrap_or(u8::MAX),
            level_type: "flat".to_string(),
            reduced_debug_info: false,
        });
        let (x, y, z) = SPAWN;
        ctx.send(&PlayerPositionAndLook {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            flags: 0,
            teleport_id: 1,
        });

        self.name = Some(name.to_string());
        self.lobby.borrow_mut().join(self.id, name);
        info!(native = %self.id, "{name} ({uuid}) logged in from {}", self.address);
    }

    fn process_authentication(&mut self, _response: EncryptionResponse, ctx: &mut SessionContext<'_>) {
        self.refuse("This server does not verify accounts", ctx);
    }

    fn handle_ack(&mut self, ack_id: u32) {
        debug!(native = %self.id, "Ack {ack_id}");
    }

    fn close(&mut self, reason: &str) {
        self.lobby.borrow_mut().leave(self.id);
        match &self.name {
            Some(name) => {
                let (x, y, z) = self.position;
                info!(native = %self.id, "{name} disconnected at ({x:.1}, {y:.1}, {z:.1}): {reason}");
            }
            None => debug!(native = %self.id, "Connection from {} closed: {reason}", self.address),
        }
    }
}

/// Creates [`LimboSession`]s.
#[derive(Debug)]
pub struct LimboHost {
    lobby: Rc<RefCell<Lobby>>,
    next_native: u64,
    max_players: u32,
}

impl LimboHost {
    /// Host with a player limit.
    pub fn new(max_players: u32) -> Self {
        Self {
            lobby: Rc::default(),
            next_native: 1,
            max_players,
        }
    }

    /// Shared lobby.
    pub fn lobby(&self) -> Rc<RefCell<Lobby>> {
        Rc::clone(&self.lobby)
    }
}

impl HostServer for LimboHost {
    type Session = LimboSession;

    fn accept(&mut self, info: &SessionInfo) -> LimboSession {
        let id = NativeId(self.next_native);
        self.next_native += 1;
        LimboSession {
            id,
            address: format!("{}:{}", info.address, info.port),
            name: None,
            position: SPAWN,
            pending_keep_alive: None,
            max_players: self.max_players,
            lobby: Rc::clone(&self.lobby),
        }
    }

    fn query_info(&self) -> QueryInfo {
        QueryInfo {
            online_players: self.lobby.borrow().player_count() as u32,
            max_players: self.max_players,
        }
    }
}

/// Maps between wire packets and [`LimboPacket`]s.
#[derive(Debug, Default)]
pub struct LimboTranslator;

impl Translator<LimboSession> for LimboTranslator {
    fn to_host(&mut self, _session: &LimboSession, packet: ServerboundPlay) -> Vec<LimboPacket> {
        match packet {
            ServerboundPlay::Chat(chat) => vec![LimboPacket::Chat(chat.message)],
            ServerboundPlay::KeepAlive(reply) => vec![LimboPacket::KeepAliveReply(reply.id)],
            ServerboundPlay::PlayerPosition(p) => vec![LimboPacket::Moved {
                x: p.x,
                y: p.y,
                z: p.z,
            }],
            ServerboundPlay::PlayerPositionAndLook(p) => vec![LimboPacket::Moved {
                x: p.x,
                y: p.y,
                z: p.z,
            }],
            _ => Vec::new(),
        }
    }

    fn to_wire(
        &mut self,
        _session: &LimboSession,
        packet: &LimboPacket,
    ) -> Vec<Box<dyn ClientboundPacket>> {
        match packet {
            LimboPacket::Message(text) => vec![Box::new(ChatMessage {
                json: chat_text(text),
                position: 0,
            })],
            LimboPacket::Ping(id) => vec![Box::new(KeepAlive { id: *id })],
            LimboPacket::Chat(_) | LimboPacket::KeepAliveReply(_) | LimboPacket::Moved { .. } => {
                Vec::new()
            }
        }
    }
}
