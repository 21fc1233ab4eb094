//! Server list ping answers.
//!
//! The player counts come from the main thread through the `name` option;
//! everything else is fixed at startup.

use std::sync::RwLock;

use serde::Deserialize;
use serde_json::json;
use tether_wire::{PROTOCOL_VERSION, VERSION_NAME};

/// Option key carrying the query info.
pub const NAME_OPTION: &str = "name";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryOption {
    max_players: u32,
    online_players: u32,
}

#[derive(Debug, Clone, Copy)]
struct Counts {
    max: u32,
    online: u32,
}

/// Builds status documents. Shared between connection tasks.
#[derive(Debug)]
pub struct StatusResponder {
    motd: String,
    counts: RwLock<Counts>,
}

impl StatusResponder {
    /// Create a responder with no players online.
    pub fn new(motd: impl Into<String>, max_players: u32) -> Self {
        Self {
            motd: motd.into(),
            counts: RwLock::new(Counts {
                max: max_players,
                online: 0,
            }),
        }
    }

    /// Apply a `SET_OPTION` from the main thread.
    ///
    /// Returns `false` for unknown keys or values that do not parse; both
    /// are logged and otherwise ignored.
    pub fn apply_option(&self, key: &str, value: &str) -> bool {
        if key != NAME_OPTION {
            tracing::debug!("Ignoring unknown option {key:?}");
            return false;
        }
        let parsed: QueryOption = match serde_json::from_str(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Bad value for option {key:?}: {e}");
                return false;
            }
        };
        if let Ok(mut counts) = self.counts.write() {
            *counts = Counts {
                max: parsed.max_players,
                online: parsed.online_players,
            };
        }
        true
    }

    /// `(online, max)` player counts.
    pub fn players(&self) -> (u32, u32) {
        self.counts
            .read()
            .map(|c| (c.online, c.max))
            .unwrap_or((0, 0))
    }

    /// Status JSON for the response packet.
    pub fn document(&self) -> String {
        let (online, max) = self.players();
        json!({
            "version": { "name": VERSION_NAME, "protocol": PROTOCOL_VERSION },
            "players": { "max": max, "online": online, "sample": [] },
            "description": { "text": self.motd },
        })
        .to_string()
    }
}
