//! The network thread.
//!
//! A dedicated OS thread runs a tokio runtime with three kinds of work:
//!
//! - the accept loop, which spawns one task per client;
//! - the command task, which applies main-thread commands strictly in order;
//! - per-connection reader and writer tasks.
//!
//! Status pings are answered here and never reach the main thread. A login
//! connection is registered in the [`ConnectionMap`] before `OPEN_SESSION`
//! is emitted, so any command the main thread sends in response finds it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_command::{
    CommandError, MainCommand, NetworkCommand, NetworkEndpoint, NetworkThread, SessionId,
};
use tether_wire::handshake::{StatusPing, StatusPong, StatusRequest, StatusResponse};
use tether_wire::{
    ClientboundPacket, DecodeError, EncryptionResponse, Handshake, NextState, PacketReader,
    ServerboundPacket,
};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::codec::{FrameDecoder, FrameEncoder, FrameError, read_packet, write_packet};
use crate::connection::{Connection, ConnectionMap, IdGenerator, Upgrade};
use crate::status::StatusResponder;

/// How long a graceful shutdown waits for writers to flush.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`ServerThread`].
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Address to bind to. Default: `0.0.0.0:25565`.
    pub bind_addr: SocketAddr,
    /// Server list message.
    pub motd: String,
    /// Player limit shown in the server list until the main thread reports one.
    pub max_players: u32,
    /// Hold inbound parsing after an encryption response until the key arrives.
    pub online_mode: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 25565)),
            motd: "A Tether server".to_string(),
            max_players: 20,
            online_mode: false,
        }
    }
}

/// Errors that end a client connection early.
#[derive(Debug, thiserror::Error)]
enum ClientError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("malformed packet: {0}")]
    Decode(#[from] DecodeError),

    #[error("empty packet")]
    Empty,

    #[error("unexpected packet 0x{0:02X}")]
    Unexpected(u8),
}

/// State shared by every task on the network thread.
struct Shared {
    endpoint: NetworkEndpoint,
    connections: ConnectionMap,
    ids: IdGenerator,
    status: StatusResponder,
    online_mode: bool,
}

impl Shared {
    fn emit(&self, command: &NetworkCommand) {
        if let Err(e) = self.endpoint.send(command) {
            tracing::warn!(opcode = command.opcode(), "Dropped command: {e}");
        }
    }
}

/// How the command task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Graceful,
    Emergency,
}

/// Join handle for the network thread, usable after the
/// [`ServerThread`] itself has been handed off.
#[derive(Clone, Default)]
pub struct ThreadHandle {
    inner: Arc<Mutex<Option<std::thread::JoinHandle<()>>>>,
}

impl ThreadHandle {
    /// Wait for the thread to exit. Returns `false` if it was never started
    /// or was already joined.
    pub fn join(&self) -> bool {
        let handle = match self.inner.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    tracing::error!("Network thread panicked");
                }
                true
            }
            None => false,
        }
    }

    /// Whether the thread has been started and has exited.
    pub fn is_finished(&self) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(std::thread::JoinHandle::is_finished))
            .unwrap_or(false)
    }
}

/// The network side of the command channel.
///
/// [`bind`](Self::bind) claims the port up front so configuration errors
/// surface before the main loop starts; [`start`](NetworkThread::start)
/// spawns the thread.
pub struct ServerThread {
    config: NetConfig,
    local_addr: SocketAddr,
    listener: Option<std::net::TcpListener>,
    endpoint: Option<NetworkEndpoint>,
    handle: ThreadHandle,
}

impl ServerThread {
    /// Bind the listening socket.
    pub fn bind(config: NetConfig, endpoint: NetworkEndpoint) -> std::io::Result<Self> {
        let listener = std::net::TcpListener::bind(config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            config,
            local_addr,
            listener: Some(listener),
            endpoint: Some(endpoint),
            handle: ThreadHandle::default(),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for joining the thread once it runs.
    pub fn handle(&self) -> ThreadHandle {
        self.handle.clone()
    }
}

impl NetworkThread for ServerThread {
    fn start(&mut self) -> std::io::Result<()> {
        let (Some(listener), Some(endpoint)) = (self.listener.take(), self.endpoint.take()) else {
            return Err(std::io::Error::other("network thread already started"));
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("tether-net-worker")
            .enable_all()
            .build()?;
        let shared = Arc::new(Shared {
            endpoint,
            connections: ConnectionMap::new(),
            ids: IdGenerator::new(),
            status: StatusResponder::new(self.config.motd.clone(), self.config.max_players),
            online_mode: self.config.online_mode,
        });

        let thread = std::thread::Builder::new()
            .name("tether-net".to_string())
            .spawn(move || {
                let stop = runtime.block_on(run(listener, shared));
                match stop {
                    Stop::Graceful => runtime.shutdown_timeout(Duration::from_secs(1)),
                    Stop::Emergency => runtime.shutdown_background(),
                }
                tracing::info!("Network thread stopped ({stop:?})");
            })?;

        if let Ok(mut slot) = self.handle.inner.lock() {
            *slot = Some(thread);
        }
        tracing::info!("Server listening on {}", self.local_addr);
        Ok(())
    }
}

async fn run(listener: std::net::TcpListener, shared: Arc<Shared>) -> Stop {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to register listener: {e}");
            return Stop::Graceful;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let endpoint = shared.endpoint.clone();
    tokio::task::spawn_blocking(move || pump_commands(&endpoint, &tx));

    let accept = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
    let stop = apply_commands(rx, &shared).await;
    accept.abort();
    stop
}

// ---------------------------------------------------------------------------
// Main-thread commands
// ---------------------------------------------------------------------------

/// Block on the channel and hand commands to the async side.
fn pump_commands(endpoint: &NetworkEndpoint, tx: &mpsc::UnboundedSender<MainCommand>) {
    loop {
        let command = match endpoint.recv() {
            Ok(command) => command,
            Err(CommandError::Disconnected) => {
                tracing::debug!("Main thread hung up");
                return;
            }
            Err(e) => {
                tracing::error!("Malformed command from main thread: {e}");
                continue;
            }
        };
        let last = matches!(
            command,
            MainCommand::Shutdown | MainCommand::EmergencyShutdown
        );
        if tx.send(command).is_err() || last {
            return;
        }
    }
}

async fn apply_commands(mut rx: mpsc::UnboundedReceiver<MainCommand>, shared: &Shared) -> Stop {
    while let Some(command) = rx.recv().await {
        match command {
            MainCommand::SendPacket { target, packet } => {
                if shared
                    .connections
                    .with(target, |c| c.send(packet))
                    .await
                    .is_none()
                {
                    tracing::debug!("Dropping packet for unknown session {target}");
                }
            }
            MainCommand::SetCompression { target, threshold } => {
                upgrade(shared, target, Upgrade::Compression(threshold)).await;
            }
            MainCommand::EnableEncryption { target, secret } => {
                upgrade(shared, target, Upgrade::Encryption(secret)).await;
            }
            MainCommand::CloseSession { id } => {
                if let Some(connection) = shared.connections.remove(id).await {
                    tokio::spawn(connection.close());
                    tracing::info!("Closed session {id}");
                }
            }
            MainCommand::SetOption { key, value } => {
                shared.status.apply_option(&key, &value);
            }
            MainCommand::Shutdown => {
                close_all(shared).await;
                return Stop::Graceful;
            }
            MainCommand::EmergencyShutdown => {
                for (_, connection) in shared.connections.drain().await {
                    connection.abort();
                }
                return Stop::Emergency;
            }
        }
    }
    close_all(shared).await;
    Stop::Graceful
}

async fn upgrade(shared: &Shared, target: SessionId, upgrade: Upgrade) {
    if shared
        .connections
        .with(target, |c| c.upgrade(upgrade))
        .await
        .is_none()
    {
        tracing::debug!("Ignoring upgrade for unknown session {target}");
    }
}

async fn close_all(shared: &Shared) {
    let connections = shared.connections.drain().await;
    tracing::info!("Closing {} connection(s)", connections.len());
    let flush = async {
        for (_, connection) in connections {
            connection.close().await;
        }
    };
    if tokio::time::timeout(FLUSH_TIMEOUT, flush).await.is_err() {
        tracing::warn!("Timed out flushing connections");
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("set_nodelay failed for {peer}: {e}");
                }
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, peer, &shared).await {
                        tracing::debug!("Connection from {peer} dropped: {e}");
                    }
                });
            }
            Err(e) => {
                tracing::warn!("Accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

fn body(packet: &[u8]) -> PacketReader<'_> {
    PacketReader::with_offset(packet, 1)
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    shared: &Shared,
) -> Result<(), ClientError> {
    let (mut reader, writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();

    let packet = read_packet(&mut reader, &mut decoder).await?;
    match packet.first() {
        Some(&id) if id == Handshake::ID => {}
        Some(&id) => return Err(ClientError::Unexpected(id)),
        None => return Err(ClientError::Empty),
    }
    let handshake = Handshake::decode(&mut body(&packet))?;
    tracing::debug!(
        "Handshake from {peer}: protocol {}, next state {:?}",
        handshake.protocol_version,
        handshake.next_state
    );

    match handshake.next_state {
        NextState::Status => serve_status(reader, writer, decoder, &shared.status).await,
        NextState::Login => {
            serve_login(reader, writer, decoder, peer, shared).await;
            Ok(())
        }
    }
}

async fn serve_status(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut decoder: FrameDecoder,
    status: &StatusResponder,
) -> Result<(), ClientError> {
    let mut encoder = FrameEncoder::new();
    loop {
        let packet = match read_packet(&mut reader, &mut decoder).await {
            Ok(packet) => packet,
            Err(FrameError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match packet.first() {
            Some(&id) if id == StatusRequest::ID => {
                let response = StatusResponse {
                    json: status.document(),
                };
                write_packet(&mut writer, &mut encoder, &response.to_bytes()).await?;
            }
            Some(&id) if id == StatusPing::ID => {
                let ping = StatusPing::decode(&mut body(&packet))?;
                let pong = StatusPong {
                    payload: ping.payload,
                };
                write_packet(&mut writer, &mut encoder, &pong.to_bytes()).await?;
                return Ok(());
            }
            Some(&id) => return Err(ClientError::Unexpected(id)),
            None => return Err(ClientError::Empty),
        }
    }
}

/// Why a login reader stopped.
enum Ended {
    /// Socket EOF, I/O or framing error.
    Peer(String),
    /// The main thread closed the session or the server is shutting down.
    Main,
}

async fn serve_login(
    mut reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    mut decoder: FrameDecoder,
    peer: SocketAddr,
    shared: &Shared,
) {
    let id = shared.ids.next_id();
    let (upgrade_tx, mut upgrades) = mpsc::unbounded_channel();
    shared
        .connections
        .insert(id, Connection::spawn(id, writer, upgrade_tx))
        .await;
    shared.emit(&NetworkCommand::OpenSession {
        id,
        address: peer.ip().to_string(),
        port: peer.port(),
    });
    tracing::info!("Session {id} opened from {peer}");

    match read_login(id, &mut reader, &mut decoder, &mut upgrades, shared).await {
        Ended::Main => tracing::debug!("Session {id} reader stopped"),
        Ended::Peer(reason) => {
            if let Some(connection) = shared.connections.remove(id).await {
                connection.close().await;
                shared.emit(&NetworkCommand::CloseSession { id });
                tracing::info!("Session {id} closed by peer: {reason}");
            }
        }
    }
}

async fn read_login(
    id: SessionId,
    reader: &mut OwnedReadHalf,
    decoder: &mut FrameDecoder,
    upgrades: &mut mpsc::UnboundedReceiver<Upgrade>,
    shared: &Shared,
) -> Ended {
    let mut buf = [0u8; 4096];
    // After an encryption response everything the client sends is
    // ciphertext, so parsing waits for the key.
    let mut awaiting_key = false;

    loop {
        while !awaiting_key {
            match decoder.next_packet() {
                Ok(Some(packet)) => {
                    awaiting_key = shared.online_mode
                        && !decoder.is_encrypted()
                        && packet.first() == Some(&EncryptionResponse::ID);
                    shared.emit(&NetworkCommand::SendPacket { source: id, packet });
                }
                Ok(None) => break,
                Err(e) => return Ended::Peer(e.to_string()),
            }
        }

        tokio::select! {
            biased;
            upgrade = upgrades.recv() => match upgrade {
                Some(Upgrade::Compression(threshold)) => decoder.set_compression(threshold),
                Some(Upgrade::Encryption(secret)) => {
                    if let Err(e) = decoder.enable_encryption(&secret) {
                        return Ended::Peer(e.to_string());
                    }
                    awaiting_key = false;
                }
                None => return Ended::Main,
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Ended::Peer("end of stream".to_string()),
                Ok(n) => decoder.feed(&buf[..n]),
                Err(e) => return Ended::Peer(e.to_string()),
            },
        }
    }
}
