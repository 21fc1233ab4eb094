//! Tether limbo server.
//!
//! Loads the config, starts the network thread and runs the main loop:
//! pump the bridge, flush the lobby, send keep-alives, publish player
//! counts. Ctrl-C shuts the network thread down cleanly.
//!
//! Run with: `cargo run -p tether-server -- --port 25565`

mod limbo;
mod tick;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tether_bridge::{HostServer, InterfaceOptions, ProtocolInterface, QueryInfo};
use tether_command::{CommandError, command_channel};
use tether_config::{CliArgs, Config, ConfigError};
use tether_net::{NetConfig, ServerThread};
use tracing::{error, info, warn};

use crate::limbo::{LimboHost, LimboSession, LimboTranslator};
use crate::tick::TickClock;

/// Consecutive pumps with malformed command frames before the server gives up.
const MAX_BAD_PUMPS: u32 = 3;

/// Counts consecutive pumps that hit malformed command frames.
#[derive(Debug, Default)]
struct PumpHealth {
    failures: u32,
}

impl PumpHealth {
    /// Record one pump result. Returns the error once [`MAX_BAD_PUMPS`]
    /// pumps in a row have failed; a clean pump resets the count.
    fn record(&mut self, result: Result<(), CommandError>) -> Result<(), CommandError> {
        match result {
            Ok(()) => {
                self.failures = 0;
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                if self.failures >= MAX_BAD_PUMPS {
                    Err(e)
                } else {
                    warn!("Pump {} of {MAX_BAD_PUMPS} with malformed commands", self.failures);
                    Ok(())
                }
            }
        }
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid listen address {0:?}")]
    Address(String),

    #[error("network: {0}")]
    Network(#[from] std::io::Error),
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = match resolve_config_dir(&args) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    tether_log::init_logging(Some(&log_dir), config.debug.file_logging, Some(&config));

    if let Err(e) = run(&config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn resolve_config_dir(args: &CliArgs) -> Result<PathBuf, ServerError> {
    match &args.config {
        Some(dir) => Ok(dir.clone()),
        None => Ok(Config::default_dir()?),
    }
}

/// Set a flag when Ctrl-C is pressed.
fn install_ctrl_c(stop: Arc<AtomicBool>) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    std::thread::Builder::new()
        .name("tether-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl-C received"),
                    Err(e) => warn!("Ctrl-C handler failed: {e}"),
                }
            });
            stop.store(true, Ordering::Relaxed);
        })?;
    Ok(())
}

fn run(config: &Config) -> Result<(), ServerError> {
    let network = &config.network;
    let bind_addr: SocketAddr = network
        .listen_addr()
        .parse()
        .map_err(|_| ServerError::Address(network.listen_addr()))?;

    let mut online_mode = network.online_mode;
    if online_mode {
        warn!("The limbo host does not verify accounts; running in offline mode");
        online_mode = false;
    }

    let (main, net) = command_channel();
    let server = ServerThread::bind(
        NetConfig {
            bind_addr,
            motd: network.motd.clone(),
            max_players: network.max_players,
            online_mode,
        },
        net,
    )?;
    let network_thread = server.handle();

    let options = InterfaceOptions {
        online_mode,
        compression_threshold: network.compression(),
        verbose: config.debug.verbose_packets,
    };
    let mut interface: ProtocolInterface<LimboSession, LimboTranslator> =
        ProtocolInterface::new(options, main, Box::new(server), LimboTranslator);
    let mut host = LimboHost::new(network.max_players);

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrl_c(Arc::clone(&stop))?;
    interface.start()?;
    info!(
        "Limbo server running at {} ticks/s, compression {:?}",
        network.tick_rate, options.compression_threshold
    );

    let mut clock = TickClock::new(network.tick_rate);
    let mut advertised = QueryInfo::default();
    let mut pump_health = PumpHealth::default();
    while !stop.load(Ordering::Relaxed) {
        if network_thread.is_finished() {
            error!("Network thread exited unexpectedly");
            break;
        }

        if let Err(e) = pump_health.record(interface.pump(&mut host)) {
            error!("Command channel keeps failing ({e}); stopping");
            break;
        }

        if clock.every(network.keep_alive_seconds) {
            let probe = clock.ticks() as i64;
            interface.for_each_session(|session, ctx| session.keep_alive(probe, ctx));
        }

        let outbox = host.lobby().borrow_mut().take_outbox();
        for (target, packet) in outbox {
            interface.enqueue_outbound(target, &packet);
        }

        let info = host.query_info();
        if info != advertised {
            interface.set_name(&info);
            advertised = info;
        }

        clock.wait();
    }

    info!("Stopping");
    if interface.shutdown().is_err() {
        warn!("Network thread already gone");
    }
    network_thread.join();
    Ok(())
}
