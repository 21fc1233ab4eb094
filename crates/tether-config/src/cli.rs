//! Command-line argument parsing for the Tether server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Tether server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tether", about = "Tether protocol bridge")]
pub struct CliArgs {
    /// Address to bind the listener to.
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Require the encryption handshake during login.
    #[arg(long)]
    pub online_mode: Option<bool>,

    /// Compression threshold in bytes (negative disables compression).
    #[arg(long, allow_negative_numbers = true)]
    pub compression_threshold: Option<i32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log dropped and undecodable packets.
    #[arg(long)]
    pub verbose_packets: bool,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.network.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(online) = args.online_mode {
            self.network.online_mode = online;
        }
        if let Some(threshold) = args.compression_threshold {
            self.network.compression_threshold = threshold;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if args.verbose_packets {
            self.debug.verbose_packets = true;
        }
    }
}
