//! Startup defaults for the bracket controller and the ladder registry.
//!
//! This module provides the configuration consumed by
//! [`BracketController::load_or_initialize`](crate::bracket_controller::BracketController::load_or_initialize)
//! when no persisted tournament exists, and the data directory under which
//! both subsystems keep their files.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Flags are case-insensitive; set the value to `"true"` to enable one.
//!
//! - `ARENA_DATA_DIR` — Directory holding the bracket file and the per-format ladders (default: `"."`)
//! - `ARENA_FORMAT` — Battle format of the auto-created tournament (default: `"gen1ou"`)
//! - `ARENA_BEST_OF` — Series length of the auto-created tournament (default: `5`)
//! - `ARENA_PLAYERS` — Comma-separated display names for the auto-created tournament
//! - `ARENA_RANDOMIZE` — Shuffle the player list before seeding (default: `false`)
//! - `ARENA_AUTO_INIT` — Auto-create a tournament on startup when none is persisted (default: `false`)

use std::path::{Path, PathBuf};

/// Startup defaults and file locations.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) data_dir: PathBuf,
    pub(crate) format: String,
    pub(crate) best_of: u32,
    pub(crate) player_list: Vec<String>,
    pub(crate) randomize_seeding: bool,
    pub(crate) auto_init: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Files live in the current directory.
    /// - The default tournament format is `gen1ou`, best of 5.
    /// - The player list is empty, so nothing can be auto-created.
    /// - Seeding is not randomized.
    /// - No tournament is auto-created on startup.
    pub fn new() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            format: "gen1ou".to_owned(),
            best_of: 5,
            player_list: vec![],
            randomize_seeding: false,
            auto_init: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the recognized variables. Any other
    /// value (including unset) results in the default value for each field.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        let defaults = Self::new();

        let data_dir = std::env::var("ARENA_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let player_list = std::env::var("ARENA_PLAYERS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            data_dir,
            format: std::env::var("ARENA_FORMAT").unwrap_or(defaults.format),
            best_of: std::env::var("ARENA_BEST_OF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.best_of),
            player_list,
            randomize_seeding: get_env_flag("ARENA_RANDOMIZE", false),
            auto_init: get_env_flag("ARENA_AUTO_INIT", false),
        }
    }

    /// Set the directory holding the bracket file and the ladder files.
    pub fn with_data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the format of the auto-created tournament.
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = format.to_owned();
        self
    }

    /// Set the series length of the auto-created tournament.
    pub fn with_best_of(mut self, best_of: u32) -> Self {
        self.best_of = best_of;
        self
    }

    /// Set the display names used when auto-creating a tournament.
    pub fn with_player_list<S: Into<String>>(mut self, players: Vec<S>) -> Self {
        self.player_list = players.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable shuffling the player list before seeding.
    pub fn with_randomize_seeding(mut self, value: bool) -> Self {
        self.randomize_seeding = value;
        self
    }

    /// Enable or disable auto-creating a tournament when none is persisted.
    pub fn with_auto_init(mut self, value: bool) -> Self {
        self.auto_init = value;
        self
    }

    /// Path of the persisted bracket file.
    pub fn bracket_path(&self) -> PathBuf {
        self.data_dir.join("tournament.csv")
    }

    /// Path of the persisted ladder file for one format.
    pub fn ladder_path(&self, format: &str) -> PathBuf {
        self.data_dir.join(format!("{format}.tsv"))
    }

    /// Directory receiving the daily audit log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
