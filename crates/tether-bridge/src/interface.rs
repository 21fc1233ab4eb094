//! The main-thread side of the bridge.
//!
//! [`ProtocolInterface`] owns the session registry and the main endpoint of
//! the command channel. The host calls [`ProtocolInterface::pump`] once per
//! tick; nothing here blocks.

use std::collections::BTreeMap;

use tether_command::{
    CommandError, MainCommand, MainEndpoint, NetworkCommand, NetworkThread, SessionId,
};
use tether_wire::{ClientboundPacket, ServerboundPacket, play};
use tracing::{debug, error, info, warn};

use crate::context::{SessionContext, emit};
use crate::dispatch::{self, Route};
use crate::host::{HostServer, NativeId, NativeSession, QueryInfo, SessionInfo, Translator};
use crate::registry::{Session, SessionRegistry};

/// Reason handed to native sessions whose socket went away.
pub const CONNECTION_CLOSED: &str = "Connection closed";

/// Interface settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceOptions {
    /// Whether the encryption handshake is part of the login.
    pub online_mode: bool,
    /// Compression threshold, `None` to never compress.
    pub compression_threshold: Option<u32>,
    /// Log dropped and undecodable packets.
    pub verbose: bool,
}

impl Default for InterfaceOptions {
    fn default() -> Self {
        Self {
            online_mode: false,
            compression_threshold: Some(256),
            verbose: false,
        }
    }
}

/// Composes the command channel, the session registry, the dispatcher and
/// the translator.
pub struct ProtocolInterface<S: NativeSession, T> {
    options: InterfaceOptions,
    endpoint: MainEndpoint,
    network: Option<Box<dyn NetworkThread>>,
    registry: SessionRegistry<S>,
    pending_acks: BTreeMap<u32, NativeId>,
    translator: T,
}

impl<S, T> ProtocolInterface<S, T>
where
    S: NativeSession,
    T: Translator<S>,
{
    /// Create an interface around a network thread that has not started yet.
    pub fn new(
        options: InterfaceOptions,
        endpoint: MainEndpoint,
        network: Box<dyn NetworkThread>,
        translator: T,
    ) -> Self {
        Self {
            options,
            endpoint,
            network: Some(network),
            registry: SessionRegistry::new(),
            pending_acks: BTreeMap::new(),
            translator,
        }
    }

    /// Interface settings.
    pub fn options(&self) -> InterfaceOptions {
        self.options
    }

    /// Registered sessions.
    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    /// Start the network thread's accept loop. Only the first call starts it.
    pub fn start(&mut self) -> std::io::Result<()> {
        match self.network.take() {
            Some(mut network) => {
                network.start()?;
                info!("Protocol interface started");
                Ok(())
            }
            None => {
                warn!("Protocol interface already started");
                Ok(())
            }
        }
    }

    /// Ask the network thread to close every connection and stop.
    pub fn shutdown(&self) -> Result<(), CommandError> {
        info!(sessions = self.registry.len(), "Shutting down network thread");
        self.endpoint.send(&MainCommand::Shutdown)
    }

    /// Tell the network thread to stop now. Never fails.
    pub fn emergency_shutdown(&self) {
        let _ = self.endpoint.send(&MainCommand::EmergencyShutdown);
    }

    /// Publish player counts for the server list.
    pub fn set_name(&self, info: &QueryInfo) {
        let value = serde_json::json!({
            "MaxPlayers": info.max_players,
            "OnlinePlayers": info.online_players,
        });
        emit(
            &self.endpoint,
            &MainCommand::SetOption {
                key: "name".to_string(),
                value: value.to_string(),
            },
        );
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    fn open_session<H>(&mut self, host: &mut H, info: SessionInfo)
    where
        H: HostServer<Session = S>,
    {
        if self.registry.contains(info.id) {
            warn!(session = %info.id, "Session already open, ignoring");
            return;
        }
        let id = info.id;
        let native = host.accept(&info);
        info!(session = %id, address = %info.address, port = info.port, "Session opened");

        if let Err((e, mut rejected)) = self.registry.insert(Session::new(info, native)) {
            error!(session = %id, "Rejected session: {e}");
            rejected.native.close(CONNECTION_CLOSED);
            emit(&self.endpoint, &MainCommand::CloseSession { id });
        }
    }

    /// The network side closed `id`. Unknown ids are ignored.
    pub fn close_session(&mut self, id: SessionId) {
        if let Some(mut session) = self.registry.remove(id) {
            info!(session = %id, "Session closed by network");
            session.native.close(CONNECTION_CLOSED);
        }
    }

    /// The host closed a native session: detach it and close the socket.
    ///
    /// Returns the detached session, or `None` if the handle is unknown. The
    /// native close callback is not invoked; the host is already closing.
    pub fn close(&mut self, native_id: NativeId, reason: &str) -> Option<Session<S>> {
        let session = self.registry.remove_by_native(native_id)?;
        let id = session.id();
        info!(session = %id, reason, "Session closed by host");
        emit(&self.endpoint, &MainCommand::CloseSession { id });
        Some(session)
    }

    /// End a session from the bridge side: detach, notify the native
    /// session, close the socket.
    fn terminate(&mut self, id: SessionId, reason: &str) {
        if let Some(mut session) = self.registry.remove(id) {
            info!(session = %id, reason, "Terminating session");
            session.native.close(reason);
            emit(&self.endpoint, &MainCommand::CloseSession { id });
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Translate a native packet and send the results in order.
    pub fn enqueue_outbound(&mut self, native_id: NativeId, packet: &S::Packet) {
        let Some(session) = self.registry.get_by_native(native_id) else {
            return;
        };
        let target = session.id();
        for wire in self.translator.to_wire(&session.native, packet) {
            self.send_wire(target, wire.as_ref());
        }
    }

    /// Send a wire packet without translation.
    pub fn put_raw_packet(&self, native_id: NativeId, packet: &dyn ClientboundPacket) {
        if let Some(target) = self.registry.id_of(native_id) {
            self.send_wire(target, packet);
        }
    }

    fn send_wire(&self, target: SessionId, packet: &dyn ClientboundPacket) {
        if self.options.verbose && packet.id() != 0x1F {
            debug!(session = %target, "[Send] 0x{:02X}", packet.id());
        }
        emit(
            &self.endpoint,
            &MainCommand::SendPacket {
                target,
                packet: packet.to_bytes(),
            },
        );
    }

    /// Enable compression for a session. No-op if the handle is unknown,
    /// compression is disabled, or it is already on.
    pub fn set_compression(&mut self, native_id: NativeId) {
        let threshold = self.options.compression_threshold;
        if let Some(session) = self.registry.get_mut_by_native(native_id) {
            let id = session.id();
            SessionContext::new(&self.endpoint, id, &mut session.state, threshold).set_compression();
        }
    }

    /// Enable encryption for a session. No-op if the handle is unknown or
    /// encryption is already on.
    pub fn enable_encryption(&mut self, native_id: NativeId, secret: &[u8]) {
        let threshold = self.options.compression_threshold;
        if let Some(session) = self.registry.get_mut_by_native(native_id) {
            let id = session.id();
            SessionContext::new(&self.endpoint, id, &mut session.state, threshold)
                .enable_encryption(secret);
        }
    }

    /// Queue an acknowledgement for delivery on the next pump.
    pub fn queue_ack(&mut self, native_id: NativeId, ack_id: u32) {
        self.pending_acks.insert(ack_id, native_id);
    }

    /// Run `f` on every session with a context, then carry out requested
    /// disconnects.
    pub fn for_each_session(&mut self, mut f: impl FnMut(&mut S, &mut SessionContext<'_>)) {
        let threshold = self.options.compression_threshold;
        let mut closing = Vec::new();
        for session in self.registry.iter_mut() {
            let id = session.id();
            let mut ctx = SessionContext::new(&self.endpoint, id, &mut session.state, threshold);
            f(&mut session.native, &mut ctx);
            if let Some(reason) = ctx.take_disconnect() {
                closing.push((id, reason));
            }
        }
        for (id, reason) in closing {
            self.terminate(id, &reason);
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Deliver pending acks, then drain and handle every queued network command.
    ///
    /// Malformed command frames are logged and skipped. The queue is still
    /// drained to the end, and the first decode error is returned.
    pub fn pump<H>(&mut self, host: &mut H) -> Result<(), CommandError>
    where
        H: HostServer<Session = S>,
    {
        for (ack_id, native_id) in std::mem::take(&mut self.pending_acks) {
            if let Some(session) = self.registry.get_mut_by_native(native_id) {
                session.native.handle_ack(ack_id);
            }
        }

        let mut first_error = None;
        loop {
            let command = match self.endpoint.try_recv() {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(e) => {
                    error!("Malformed command from network thread: {e}");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            match command {
                NetworkCommand::SendPacket { source, packet } => self.handle_packet(source, &packet),
                NetworkCommand::OpenSession { id, address, port } => {
                    self.open_session(host, SessionInfo { id, address, port })
                }
                NetworkCommand::CloseSession { id } => self.close_session(id),
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn handle_packet(&mut self, id: SessionId, packet: &[u8]) {
        let verbose = self.options.verbose;
        let Some(session) = self.registry.get_mut(id) else {
            if verbose {
                debug!(session = %id, "Packet for unknown session dropped");
            }
            return;
        };
        if verbose && packet.first().is_some_and(|&pid| pid != play::KeepAlive::ID) {
            debug!(session = %id, "[Receive] 0x{:02X}", packet[0]);
        }

        let route = match dispatch::route(session.state.status, self.options.online_mode, packet) {
            Ok(route) => route,
            Err(e) => {
                if verbose {
                    debug!(session = %id, "Dropped packet: {e}");
                }
                return;
            }
        };

        if let Route::LoginStart(ref start) = route
            && session.state.login_name.is_none()
        {
            session.state.login_name = Some(start.name.clone());
        }

        let threshold = self.options.compression_threshold;
        let mut ctx = SessionContext::new(&self.endpoint, id, &mut session.state, threshold);
        match route {
            Route::Play(wire) => {
                for native in self.translator.to_host(&session.native, wire) {
                    session.native.handle_packet(native, &mut ctx);
                }
            }
            Route::LoginStart(start) => {
                session
                    .native
                    .begin_authentication(&start.name, self.options.online_mode, &mut ctx);
            }
            Route::EncryptionResponse(response) => {
                session.native.process_authentication(response, &mut ctx);
            }
            Route::Ignored(pid) => {
                if verbose {
                    debug!(session = %id, "[Receive] 0x{pid:02X} not implemented");
                }
            }
            Route::Violation(pid) => ctx.disconnect(dispatch::violation_reason(pid)),
        }

        if let Some(reason) = ctx.take_disconnect() {
            self.terminate(id, &reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tether_command::{NetworkEndpoint, command_channel};
    use tether_wire::clientbound::{ChatMessage, KeepAlive, LoginSuccess};
    use tether_wire::play::Chat;
    use tether_wire::{
        EncryptionResponse, LoginStart, PacketWriter, ServerboundPacket, ServerboundPlay, chat_text,
    };

    use crate::context::AuthStatus;

    // --- Recording doubles ---

    #[derive(Debug, Default)]
    struct Journal {
        closes: Vec<(NativeId, String)>,
        delivered: Vec<(NativeId, String)>,
        logins: Vec<(NativeId, String)>,
        acks: Vec<(NativeId, u32)>,
        to_host_calls: usize,
    }

    type Shared = Rc<RefCell<Journal>>;

    struct TestSession {
        id: NativeId,
        journal: Shared,
        auto_authenticate: bool,
    }

    impl NativeSession for TestSession {
        type Packet = String;

        fn native_id(&self) -> NativeId {
            self.id
        }

        fn handle_packet(&mut self, packet: String, _: &mut SessionContext<'_>) {
            self.journal.borrow_mut().delivered.push((self.id, packet));
        }

        fn begin_authentication(&mut self, name: &str, _: bool, ctx: &mut SessionContext<'_>) {
            self.journal
                .borrow_mut()
                .logins
                .push((self.id, name.to_string()));
            if self.auto_authenticate {
                ctx.authenticate();
            }
        }

        fn process_authentication(&mut self, _: EncryptionResponse, ctx: &mut SessionContext<'_>) {
            ctx.disconnect("Failed to verify username!");
        }

        fn handle_ack(&mut self, ack_id: u32) {
            self.journal.borrow_mut().acks.push((self.id, ack_id));
        }

        fn close(&mut self, reason: &str) {
            self.journal
                .borrow_mut()
                .closes
                .push((self.id, reason.to_string()));
        }
    }

    struct TestHost {
        journal: Shared,
        next_native: u64,
        auto_authenticate: bool,
        reuse_native: Option<u64>,
    }

    impl HostServer for TestHost {
        type Session = TestSession;

        fn accept(&mut self, _: &SessionInfo) -> TestSession {
            self.next_native += 1;
            TestSession {
                id: NativeId(self.reuse_native.unwrap_or(self.next_native)),
                journal: Rc::clone(&self.journal),
                auto_authenticate: self.auto_authenticate,
            }
        }

        fn query_info(&self) -> QueryInfo {
            QueryInfo {
                online_players: 0,
                max_players: 20,
            }
        }
    }

    /// Chat → "chat:<msg>"; any other play packet → "play:0xNN".
    /// Outbound "a|b|c" becomes one chat message per segment.
    struct TestTranslator {
        journal: Shared,
    }

    impl Translator<TestSession> for TestTranslator {
        fn to_host(&mut self, _: &TestSession, packet: ServerboundPlay) -> Vec<String> {
            self.journal.borrow_mut().to_host_calls += 1;
            match packet {
                ServerboundPlay::Chat(chat) => vec![format!("chat:{}", chat.message)],
                other => vec![format!("play:0x{:02X}", other.id())],
            }
        }

        fn to_wire(&mut self, _: &TestSession, packet: &String) -> Vec<Box<dyn ClientboundPacket>> {
            packet
                .split('|')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    Box::new(ChatMessage {
                        json: chat_text(part),
                        position: 0,
                    }) as Box<dyn ClientboundPacket>
                })
                .collect()
        }
    }

    struct NoopNetwork {
        started: Arc<AtomicU32>,
    }

    impl NetworkThread for NoopNetwork {
        fn start(&mut self) -> std::io::Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        interface: ProtocolInterface<TestSession, TestTranslator>,
        host: TestHost,
        net: NetworkEndpoint,
        journal: Shared,
        started: Arc<AtomicU32>,
    }

    fn fixture_with(options: InterfaceOptions, auto_authenticate: bool) -> Fixture {
        let (main, net) = command_channel();
        let journal = Shared::default();
        let started = Arc::new(AtomicU32::new(0));
        let interface = ProtocolInterface::new(
            options,
            main,
            Box::new(NoopNetwork {
                started: Arc::clone(&started),
            }),
            TestTranslator {
                journal: Rc::clone(&journal),
            },
        );
        let host = TestHost {
            journal: Rc::clone(&journal),
            next_native: 0,
            auto_authenticate,
            reuse_native: None,
        };
        Fixture {
            interface,
            host,
            net,
            journal,
            started,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(InterfaceOptions::default(), true)
    }

    impl Fixture {
        fn push(&self, command: NetworkCommand) {
            self.net.send(&command).unwrap();
        }

        fn open(&mut self, id: u32) {
            self.push(NetworkCommand::OpenSession {
                id: SessionId(id),
                address: "10.0.0.5".to_string(),
                port: 25565,
            });
            self.pump();
        }

        fn packet(&mut self, id: u32, packet: Vec<u8>) {
            self.push(NetworkCommand::SendPacket {
                source: SessionId(id),
                packet,
            });
            self.pump();
        }

        fn pump(&mut self) {
            self.interface.pump(&mut self.host).unwrap();
        }

        fn sent(&self) -> Vec<MainCommand> {
            std::iter::from_fn(|| self.net.try_recv().unwrap()).collect()
        }

        fn native(&self, id: u32) -> NativeId {
            self.interface
                .registry()
                .get(SessionId(id))
                .map(|s| s.native.id)
                .unwrap()
        }
    }

    fn login_start(name: &str) -> Vec<u8> {
        let mut w = PacketWriter::with_id(LoginStart::ID);
        w.write_string(name);
        w.into_inner()
    }

    fn chat(message: &str) -> Vec<u8> {
        let mut w = PacketWriter::with_id(Chat::ID);
        w.write_string(message);
        w.into_inner()
    }

    // --- Lifecycle ---

    #[test]
    fn test_start_only_once() {
        let mut f = fixture();
        f.interface.start().unwrap();
        f.interface.start().unwrap();
        assert_eq!(f.started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_then_close_round_trip() {
        let mut f = fixture();
        for id in [1, 7, 42] {
            f.open(id);
            let native = f.native(id);
            f.push(NetworkCommand::CloseSession { id: SessionId(id) });
            f.pump();

            assert!(f.interface.registry().get(SessionId(id)).is_none());
            assert!(f.interface.registry().get_by_native(native).is_none());
        }
        assert!(f.interface.registry().is_empty());
        let closes = &f.journal.borrow().closes;
        assert_eq!(closes.len(), 3);
        assert!(closes.iter().all(|(_, reason)| reason == CONNECTION_CLOSED));
        // Closing in response to the network emits nothing back.
        assert!(f.sent().is_empty());
    }

    #[test]
    fn test_duplicate_open_is_ignored() {
        let mut f = fixture();
        f.open(3);
        let first = f.native(3);
        f.open(3);
        assert_eq!(f.native(3), first);
        assert_eq!(f.interface.registry().len(), 1);
    }

    #[test]
    fn test_duplicate_native_handle_is_closed() {
        let mut f = fixture();
        f.host.reuse_native = Some(99);
        f.open(1);
        f.open(2);

        assert!(f.interface.registry().contains(SessionId(1)));
        assert!(!f.interface.registry().contains(SessionId(2)));
        assert_eq!(
            f.sent(),
            vec![MainCommand::CloseSession { id: SessionId(2) }]
        );
    }

    #[test]
    fn test_close_unknown_session_is_noop() {
        let mut f = fixture();
        f.push(NetworkCommand::CloseSession { id: SessionId(5) });
        f.pump();
        assert!(f.journal.borrow().closes.is_empty());
    }

    #[test]
    fn test_host_close_emits_close_session() {
        let mut f = fixture();
        f.open(4);
        let native = f.native(4);

        let detached = f.interface.close(native, "kicked").unwrap();
        assert_eq!(detached.id(), SessionId(4));
        assert!(f.interface.close(native, "kicked").is_none());

        assert_eq!(
            f.sent(),
            vec![MainCommand::CloseSession { id: SessionId(4) }]
        );
        assert!(f.interface.registry().is_empty());
        // The host initiated the close, so no close callback.
        assert!(f.journal.borrow().closes.is_empty());
    }

    // --- Authentication ---

    #[test]
    fn test_alice_scenario() {
        let mut f = fixture_with(InterfaceOptions::default(), false);
        f.open(7);
        {
            let session = f.interface.registry().get(SessionId(7)).unwrap();
            assert_eq!(session.info.address, "10.0.0.5");
            assert_eq!(session.info.port, 25565);
            assert_eq!(session.state.status, AuthStatus::PreAuth);
        }

        f.packet(7, login_start("Alice"));
        {
            let session = f.interface.registry().get(SessionId(7)).unwrap();
            assert_eq!(session.state.status, AuthStatus::PreAuth);
            assert!(session.state.is_pending_authentication());
            assert_eq!(session.state.login_name.as_deref(), Some("Alice"));
        }
        assert!(f.journal.borrow().closes.is_empty());

        f.packet(7, vec![0xFF]);
        assert!(!f.interface.registry().contains(SessionId(7)));
        {
            let journal = f.journal.borrow();
            assert_eq!(journal.closes.len(), 1);
            assert!(journal.closes[0].1.contains("0xFF"));
        }

        f.push(NetworkCommand::CloseSession { id: SessionId(7) });
        f.pump();
        assert_eq!(f.journal.borrow().closes.len(), 1);
        assert_eq!(
            f.sent(),
            vec![MainCommand::CloseSession { id: SessionId(7) }]
        );
    }

    #[test]
    fn test_play_packets_before_auth_close_once_without_translation() {
        for pid in play::PLAY_DECODERS
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_some())
            .map(|(pid, _)| pid as u8)
            .filter(|&pid| pid > 0x01)
        {
            let mut f = fixture_with(InterfaceOptions::default(), false);
            f.open(1);
            f.packet(1, vec![pid, 0, 0, 0, 0, 0, 0, 0, 0]);

            let journal = f.journal.borrow();
            assert_eq!(journal.closes.len(), 1, "pid 0x{pid:02X}");
            assert_eq!(journal.to_host_calls, 0, "pid 0x{pid:02X}");
        }
    }

    #[test]
    fn test_encryption_response_offline_is_violation() {
        let mut f = fixture_with(InterfaceOptions::default(), false);
        f.open(1);
        let mut w = PacketWriter::with_id(EncryptionResponse::ID);
        w.write_byte_array(&[0; 4]).write_byte_array(&[0; 4]);
        f.packet(1, w.into_inner());

        let journal = f.journal.borrow();
        assert_eq!(journal.closes, vec![(NativeId(1), "Unexpected packet 0x01".to_string())]);
    }

    #[test]
    fn test_deferred_disconnect_from_callback() {
        let options = InterfaceOptions {
            online_mode: true,
            ..InterfaceOptions::default()
        };
        let mut f = fixture_with(options, false);
        f.open(1);
        let mut w = PacketWriter::with_id(EncryptionResponse::ID);
        w.write_byte_array(&[0; 4]).write_byte_array(&[0; 4]);
        f.packet(1, w.into_inner());

        assert!(!f.interface.registry().contains(SessionId(1)));
        assert_eq!(
            f.journal.borrow().closes,
            vec![(NativeId(1), "Failed to verify username!".to_string())]
        );
        assert_eq!(
            f.sent(),
            vec![MainCommand::CloseSession { id: SessionId(1) }]
        );
    }

    #[test]
    fn test_login_authenticates() {
        let mut f = fixture();
        f.open(1);
        f.packet(1, login_start("Bob"));

        let session = f.interface.registry().get(SessionId(1)).unwrap();
        assert_eq!(session.state.status, AuthStatus::Authenticated);
        assert_eq!(
            f.journal.borrow().logins,
            vec![(NativeId(1), "Bob".to_string())]
        );
    }

    // --- Play ---

    #[test]
    fn test_play_packet_decoded_and_delivered() {
        let mut f = fixture();
        f.open(1);
        f.packet(1, login_start("Bob"));
        f.packet(1, chat("hello there"));

        let journal = f.journal.borrow();
        assert_eq!(journal.to_host_calls, 1);
        assert_eq!(
            journal.delivered,
            vec![(NativeId(1), "chat:hello there".to_string())]
        );
    }

    #[test]
    fn test_unknown_play_id_ignored() {
        let mut f = fixture();
        f.open(1);
        f.packet(1, login_start("Bob"));
        for pid in [0x10, 0x11, 0x16, 0x18, 0x1E, 0x21, 0x7F, 0xFF] {
            f.packet(1, vec![pid, 1, 2, 3]);
        }

        assert!(f.interface.registry().contains(SessionId(1)));
        let journal = f.journal.borrow();
        assert_eq!(journal.to_host_calls, 0);
        assert!(journal.closes.is_empty());
    }

    #[test]
    fn test_decode_failure_keeps_session() {
        let mut f = fixture();
        f.open(1);
        f.packet(1, login_start("Bob"));
        // KeepAlive needs eight body bytes.
        f.packet(1, vec![0x0B, 1, 2]);

        assert!(f.interface.registry().contains(SessionId(1)));
        assert_eq!(f.journal.borrow().to_host_calls, 0);
    }

    #[test]
    fn test_packet_for_unknown_session_dropped() {
        let mut f = fixture();
        f.packet(9, chat("nobody home"));
        assert_eq!(f.journal.borrow().to_host_calls, 0);
        assert!(f.sent().is_empty());
    }

    // --- Outbound ---

    #[test]
    fn test_outbound_order_preserved() {
        let mut f = fixture();
        f.open(1);
        let native = f.native(1);

        f.interface.enqueue_outbound(native, &"a|b".to_string());
        f.interface.enqueue_outbound(native, &"c".to_string());

        let texts: Vec<Vec<u8>> = f
            .sent()
            .into_iter()
            .map(|command| match command {
                MainCommand::SendPacket { target, packet } => {
                    assert_eq!(target, SessionId(1));
                    packet
                }
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let expected: Vec<Vec<u8>> = ["a", "b", "c"]
            .iter()
            .map(|t| {
                ChatMessage {
                    json: chat_text(t),
                    position: 0,
                }
                .to_bytes()
            })
            .collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_outbound_empty_translation_sends_nothing() {
        let mut f = fixture();
        f.open(1);
        let native = f.native(1);
        f.interface.enqueue_outbound(native, &String::new());
        assert!(f.sent().is_empty());
    }

    #[test]
    fn test_outbound_to_unknown_handle_dropped() {
        let mut f = fixture();
        f.interface.enqueue_outbound(NativeId(404), &"x".to_string());
        f.interface.put_raw_packet(NativeId(404), &KeepAlive { id: 1 });
        assert!(f.sent().is_empty());
    }

    #[test]
    fn test_put_raw_packet_bypasses_translator() {
        let mut f = fixture();
        f.open(2);
        let native = f.native(2);
        let success = LoginSuccess {
            uuid: "00000000-0000-0000-0000-000000000000".to_string(),
            username: "Bob".to_string(),
        };
        f.interface.put_raw_packet(native, &success);
        assert_eq!(
            f.sent(),
            vec![MainCommand::SendPacket {
                target: SessionId(2),
                packet: success.to_bytes(),
            }]
        );
    }

    #[test]
    fn test_upgrades_on_unknown_handle_emit_nothing() {
        let mut f = fixture();
        f.interface.set_compression(NativeId(1));
        f.interface.enable_encryption(NativeId(1), &[1; 16]);
        assert_eq!(f.net.pending(), 0);
    }

    #[test]
    fn test_upgrades_are_monotonic() {
        let mut f = fixture();
        f.open(1);
        let native = f.native(1);
        f.interface.set_compression(native);
        f.interface.set_compression(native);
        f.interface.enable_encryption(native, &[7; 16]);
        f.interface.enable_encryption(native, &[8; 16]);

        assert_eq!(
            f.sent(),
            vec![
                MainCommand::SetCompression {
                    target: SessionId(1),
                    threshold: 256
                },
                MainCommand::EnableEncryption {
                    target: SessionId(1),
                    secret: vec![7; 16]
                },
            ]
        );
    }

    #[test]
    fn test_compression_disabled_by_options() {
        let options = InterfaceOptions {
            compression_threshold: None,
            ..InterfaceOptions::default()
        };
        let mut f = fixture_with(options, true);
        f.open(1);
        let native = f.native(1);
        f.interface.set_compression(native);
        assert!(f.sent().is_empty());
    }

    // --- Control ---

    #[test]
    fn test_set_name_publishes_counts() {
        let f = fixture();
        f.interface.set_name(&QueryInfo {
            online_players: 3,
            max_players: 20,
        });
        match f.sent().as_slice() {
            [MainCommand::SetOption { key, value }] => {
                assert_eq!(key, "name");
                let json: serde_json::Value = serde_json::from_str(value).unwrap();
                assert_eq!(json["MaxPlayers"], 20);
                assert_eq!(json["OnlinePlayers"], 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_shutdown_commands() {
        let f = fixture();
        f.interface.shutdown().unwrap();
        f.interface.emergency_shutdown();
        assert_eq!(
            f.sent(),
            vec![MainCommand::Shutdown, MainCommand::EmergencyShutdown]
        );
    }

    #[test]
    fn test_emergency_shutdown_tolerates_dead_channel() {
        let f = fixture();
        drop(f.net);
        f.interface.emergency_shutdown();
        assert_eq!(f.interface.shutdown(), Err(CommandError::Disconnected));
    }

    #[test]
    fn test_acks_delivered_once() {
        let mut f = fixture();
        f.open(1);
        let native = f.native(1);
        f.interface.queue_ack(native, 10);
        f.interface.queue_ack(native, 11);
        f.interface.queue_ack(NativeId(404), 12);
        f.pump();
        f.pump();

        assert_eq!(
            f.journal.borrow().acks,
            vec![(native, 10), (native, 11)]
        );
    }

    #[test]
    fn test_for_each_session_disconnects_after_visit() {
        let mut f = fixture();
        f.open(1);
        f.open(2);
        f.interface.for_each_session(|_, ctx| {
            ctx.send(&KeepAlive { id: 5 });
            if ctx.id() == SessionId(2) {
                ctx.disconnect("Timed out");
            }
        });

        assert!(f.interface.registry().contains(SessionId(1)));
        assert!(!f.interface.registry().contains(SessionId(2)));
        let sent = f.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent.last(),
            Some(&MainCommand::CloseSession { id: SessionId(2) })
        );
    }

    #[test]
    fn test_malformed_command_surfaces_error() {
        let mut f = fixture();
        f.net.send_raw(vec![0x42]).unwrap();
        for id in 1..=3 {
            f.push(NetworkCommand::OpenSession {
                id: SessionId(id),
                address: "10.0.0.5".to_string(),
                port: 25565,
            });
        }

        assert_eq!(
            f.interface.pump(&mut f.host),
            Err(CommandError::UnknownOpcode(0x42))
        );
        // Everything queued behind the bad frame is handled in the same pump.
        assert_eq!(f.interface.registry().len(), 3);
        f.pump();
        assert_eq!(f.interface.registry().len(), 3);
    }

    #[test]
    fn test_first_malformed_command_is_reported() {
        let mut f = fixture();
        f.net.send_raw(vec![0x42]).unwrap();
        f.net.send_raw(vec![]).unwrap();
        f.push(NetworkCommand::OpenSession {
            id: SessionId(5),
            address: "10.0.0.5".to_string(),
            port: 25565,
        });

        assert_eq!(
            f.interface.pump(&mut f.host),
            Err(CommandError::UnknownOpcode(0x42))
        );
        assert!(f.interface.registry().contains(SessionId(5)));
        f.pump();
    }
}
