//! # Arena Ladder
//!
//! A modular Rust crate extending a competitive-battle server with two
//! independent subsystems: a single-elimination bracket tournament
//! controller and a per-format rating engine.
//!
//! It provides:
//! - Bracket construction with standard seeding and best-of-N series
//!   scoring ([`BracketController`](crate::bracket_controller::BracketController))
//! - Crash-safe CSV persistence with freeze/resume of winner advancement
//! - A dual ELO + Glicko-1 rating model with the GXE win expectancy and
//!   per-opponent head-to-head records ([`rating`])
//! - Tab-separated rating ladders kept sorted by ELO, one per format,
//!   memoized process-wide ([`LadderRegistry`](crate::ladder_store::LadderRegistry))
//!
//! The two subsystems share no state. The battle layer asks the bracket
//! controller whether two players may fight and reports the winner when a
//! battle ends; independently it submits finished rated battles to the
//! ladder store of the battle's format.
//!
//! # Documentation Overview
//!
//! - For bracket rules (seeding, advancement, freezing), see the
//!   [`bracket`] module.
//! - For persistence and the admin surface, see [`bracket_controller`].
//! - For the rating formulas and their constants, see [`rating`].
//! - For ladder files and the per-format registry, see [`ladder_store`].
//! - Startup defaults and file locations live in
//!   [`Configuration`](crate::configuration::Configuration); the daily
//!   audit log both subsystems write through `tracing` is installed by
//!   [`init_logger`].
//!
//! # Usage Example
//!
//! ```no_run
//! use arena_ladder::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new().with_data_dir("/var/lib/arena");
//!     // daily audit log under /var/lib/arena/logs; skip this if the
//!     // embedding server already installs a tracing subscriber
//!     arena_ladder::init_logger(&config)?;
//!
//!     // Bracket side: create a tournament, then feed it battle results.
//!     let mut controller = BracketController::new(config.clone());
//!     controller.load_or_initialize();
//!     if !controller.is_initialized() {
//!         let players: Vec<String> = ["Alice", "Bob", "Carol", "Dave"]
//!             .iter()
//!             .map(|s| s.to_string())
//!             .collect();
//!         controller.initialize("gen1ou", &players, 20, false)?;
//!     }
//!     if controller.can_match("Alice", "Dave") {
//!         // ... run the battle ...
//!         controller.record_win("Alice", "Dave");
//!     }
//!     println!("{}", controller.status());
//!
//!     // Rating side: submit the finished battle to the format's ladder.
//!     let registry = LadderRegistry::new(config);
//!     let ladder = registry.ladder("gen1ou");
//!     let mut lines = Vec::new();
//!     let (_, winner_elo, loser_elo) =
//!         ladder.lock().unwrap().update_rating("Alice", "Dave", 1.0, &mut lines);
//!     for line in lines {
//!         println!("{line}"); // e.g. "Alice's rating: 1000 -> 1016 (+16)"
//!     }
//!     assert!(winner_elo >= loser_elo);
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;
pub mod bracket;
pub mod bracket_controller;
pub mod configuration;
pub mod file_store;
pub mod identity;
pub mod ladder_store;
mod logger;
pub mod rating;

pub use logger::init_logger;

/// Commonly used types and functions for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use arena_ladder::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration)
/// - [`BracketController`](crate::bracket_controller::BracketController)
/// - [`TournamentError`](crate::bracket::TournamentError)
/// - [`LadderRegistry`](crate::ladder_store::LadderRegistry) and
///   [`LadderStore`](crate::ladder_store::LadderStore)
/// - the [`identity canonicalizer`](crate::identity::to_id)
pub mod prelude {
    pub use crate::bracket::{MatchStatus, TournamentError};
    pub use crate::bracket_controller::BracketController;
    pub use crate::configuration::Configuration;
    pub use crate::identity::to_id;
    pub use crate::ladder_store::{LadderRegistry, LadderStore};
    pub use crate::rating::{Gxe, H2hRecord, LadderRow, Outcome};
}
