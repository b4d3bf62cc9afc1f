//! Persistence-wrapping controller for the bracket subsystem.
//!
//! The [`BracketController`] owns at most one active [`Bracket`], answers the
//! match-legality queries the battle layer asks, and serializes the state to
//! a single CSV file after every mutating call. Writes go through a mutex so
//! the on-disk file is always a consistent snapshot; in-memory mutations are
//! synchronous, so reads always reflect the latest mutation.
//!
//! # File format
//!
//! ```text
//! # format=gen1ou,bestOf=20,participants=4,frozen=false
//! round,matchId,player1,player2,player1Display,player2Display,p1wins,p2wins,status,winner,winnerDisplay
//! 1,1,alice,dave,Alice,Dave,11,7,complete,alice,Alice
//! ```
//!
//! Two legacy shapes are still read: a file without the `#` metadata line
//! (format, best-of, and frozen come from the configured defaults) and
//! 8-column records without display names (identity doubles as display).

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use once_cell::sync::Lazy;
use tracing::{error, info, warn};

use crate::bracket::{Bracket, BracketMatch, MatchStatus, TournamentError};
use crate::configuration::Configuration;
use crate::file_store::FileStore;

const COLUMN_HEADER: &str =
    "round,matchId,player1,player2,player1Display,player2Display,p1wins,p2wins,status,winner,winnerDisplay";

static GLOBAL: Lazy<Mutex<BracketController>> =
    Lazy::new(|| Mutex::new(BracketController::new(Configuration::from_env())));

/// Controller for the process's single active tournament.
pub struct BracketController {
    config: Configuration,
    store: FileStore,
    path: PathBuf,
    bracket: Option<Bracket>,
    write_lock: Mutex<()>,
}

impl BracketController {
    /// Creates an idle controller; call
    /// [`load_or_initialize`](Self::load_or_initialize) to pick up persisted
    /// state.
    pub fn new(config: Configuration) -> Self {
        let path = config.bracket_path();
        Self {
            config,
            store: FileStore,
            path,
            bracket: None,
            write_lock: Mutex::new(()),
        }
    }

    /// The process-wide controller, configured from the environment.
    ///
    /// Tests should prefer [`new`](Self::new) with a configuration pointing
    /// at a temporary directory.
    pub fn global() -> &'static Mutex<BracketController> {
        &GLOBAL
    }

    /// True when a tournament exists.
    pub fn is_initialized(&self) -> bool {
        self.bracket.is_some()
    }

    /// True when the tournament exists and is frozen.
    pub fn is_frozen(&self) -> bool {
        self.bracket.as_ref().is_some_and(Bracket::frozen)
    }

    /// Creates and persists a new tournament.
    ///
    /// # Errors
    /// Fails when a tournament already exists, when the player count is not a
    /// power of two (or is below 2), when `best_of` is outside `1..=999`,
    /// when two names share an identity, or when the state cannot be written.
    pub fn initialize(
        &mut self,
        format: &str,
        players: &[String],
        best_of: u32,
        randomize: bool,
    ) -> Result<(), TournamentError> {
        if self.bracket.is_some() {
            return Err(TournamentError::AlreadyInitialized);
        }
        self.bracket = Some(Bracket::new(format, players, best_of, randomize)?);
        self.persist().map_err(TournamentError::Persistence)
    }

    /// Resumes a persisted tournament if one exists, otherwise auto-creates
    /// one from the configured defaults when `auto_init` is set, otherwise
    /// stays idle. Load problems are warnings, never errors.
    pub fn load_or_initialize(&mut self) {
        match self.store.read_if_exists(&self.path) {
            Ok(Some(contents)) => match decode(&contents, &self.config) {
                Ok(bracket) => {
                    info!(
                        "resumed {} tournament with {} players",
                        bracket.format(),
                        bracket.participants()
                    );
                    self.bracket = Some(bracket);
                    return;
                }
                Err(e) => warn!("ignoring unreadable tournament file: {e:#}"),
            },
            Ok(None) => {}
            Err(e) => warn!("could not read tournament file: {e:#}"),
        }

        if self.config.auto_init && !self.config.player_list.is_empty() {
            let cfg = self.config.clone();
            match self.initialize(
                &cfg.format,
                &cfg.player_list,
                cfg.best_of,
                cfg.randomize_seeding,
            ) {
                Ok(()) => info!("auto-created {} tournament", cfg.format),
                Err(e) => warn!("could not auto-create tournament: {e}"),
            }
        }
    }

    /// See [`Bracket::can_match`]. False when no tournament exists.
    pub fn can_match(&self, a: &str, b: &str) -> bool {
        self.bracket.as_ref().is_some_and(|t| t.can_match(a, b))
    }

    /// See [`Bracket::can_search`]. False when no tournament exists.
    pub fn can_search(&self, id: &str) -> bool {
        self.bracket.as_ref().is_some_and(|t| t.can_search(id))
    }

    /// See [`Bracket::opponent_of`]. `None` when no tournament exists.
    pub fn opponent_of(&self, id: &str) -> Option<String> {
        self.bracket
            .as_ref()
            .and_then(|t| t.opponent_of(id))
            .map(str::to_owned)
    }

    /// Records one battle win and persists. Battle-end hooks are
    /// fire-and-forget: problems are logged, never raised.
    pub fn record_win(&mut self, winner: &str, loser: &str) {
        let Some(bracket) = self.bracket.as_mut() else {
            warn!("win by {winner} over {loser} ignored: no tournament in progress");
            return;
        };
        bracket.record_win(winner, loser);
        if let Err(e) = self.persist() {
            error!("could not persist tournament state: {e:#}");
        }
    }

    /// Admin override: completes the winner's active series outright and
    /// persists.
    pub fn force_win(&mut self, winner: &str) -> Result<(), TournamentError> {
        let bracket = self.bracket.as_mut().ok_or(TournamentError::NotInitialized)?;
        bracket.force_win(winner)?;
        self.persist().map_err(TournamentError::Persistence)
    }

    /// Multi-line human-readable bracket summary.
    pub fn status(&self) -> String {
        match &self.bracket {
            Some(bracket) => bracket.status(),
            None => "no tournament in progress\n".to_owned(),
        }
    }

    /// Freezes advancement and persists.
    pub fn freeze(&mut self) -> Result<(), TournamentError> {
        let bracket = self.bracket.as_mut().ok_or(TournamentError::NotInitialized)?;
        bracket.freeze()?;
        self.persist().map_err(TournamentError::Persistence)
    }

    /// Unfreezes, places winners blocked during the freeze, and persists.
    pub fn resume(&mut self) -> Result<(), TournamentError> {
        let bracket = self.bracket.as_mut().ok_or(TournamentError::NotInitialized)?;
        bracket.resume()?;
        self.persist().map_err(TournamentError::Persistence)
    }

    /// Clears the in-memory state and removes the persisted file.
    pub fn reset(&mut self) -> Result<(), TournamentError> {
        self.bracket = None;
        let _guard = self.write_lock.lock().expect("poisoned");
        self.store
            .remove_if_exists(&self.path)
            .map_err(TournamentError::Persistence)?;
        info!("tournament reset");
        Ok(())
    }

    /// Serializes the current state and replaces the file atomically. The
    /// snapshot is rendered under the write lock so concurrent callers can
    /// never interleave partial files.
    fn persist(&self) -> anyhow::Result<()> {
        let Some(bracket) = &self.bracket else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().expect("poisoned");
        let contents = encode(bracket);
        self.store.write_atomic(&self.path, &contents)
    }
}

fn encode(bracket: &Bracket) -> String {
    let mut out = format!(
        "# format={},bestOf={},participants={},frozen={}\n{COLUMN_HEADER}\n",
        bracket.format(),
        bracket.best_of(),
        bracket.participants(),
        bracket.frozen(),
    );
    for m in bracket.matches() {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{}\n",
            m.round,
            m.match_id,
            m.p1.as_deref().unwrap_or(""),
            m.p2.as_deref().unwrap_or(""),
            m.p1_display,
            m.p2_display,
            m.p1_wins,
            m.p2_wins,
            m.status.as_str(),
            m.winner.as_deref().unwrap_or(""),
            m.winner_display,
        ));
    }
    out
}

fn decode(contents: &str, config: &Configuration) -> anyhow::Result<Bracket> {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let first = lines.next().context("empty tournament file")?;

    let (format, best_of, frozen) = if let Some(meta) = first.strip_prefix('#') {
        let mut format = config.format.clone();
        let mut best_of = config.best_of;
        let mut frozen = false;
        for pair in meta.trim().split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                anyhow::bail!("bad metadata entry: {pair:?}");
            };
            match key.trim() {
                "format" => format = value.to_owned(),
                "bestOf" => best_of = value.parse().context("bad bestOf")?,
                "frozen" => frozen = value.parse().context("bad frozen")?,
                // participant count is re-derived from the match records
                "participants" => {}
                other => warn!("unknown tournament metadata key: {other}"),
            }
        }
        // column header follows the metadata line
        lines.next();
        (format, best_of, frozen)
    } else {
        // legacy file: the first line is the column header, defaults fill in
        (config.format.clone(), config.best_of, false)
    };

    let mut matches = Vec::new();
    for line in lines {
        matches.push(parse_record(line).with_context(|| format!("bad match record: {line:?}"))?);
    }
    Bracket::from_parts(format, best_of, frozen, matches)
}

fn parse_record(line: &str) -> anyhow::Result<BracketMatch> {
    fn opt(field: &str) -> Option<String> {
        (!field.is_empty()).then(|| field.to_owned())
    }

    let fields: Vec<&str> = line.split(',').collect();
    let m = match fields[..] {
        [round, match_id, p1, p2, p1_display, p2_display, p1_wins, p2_wins, status, winner, winner_display] => {
            BracketMatch {
                round: round.parse().context("bad round")?,
                match_id: match_id.parse().context("bad matchId")?,
                p1: opt(p1),
                p2: opt(p2),
                p1_display: p1_display.to_owned(),
                p2_display: p2_display.to_owned(),
                p1_wins: p1_wins.parse().context("bad p1wins")?,
                p2_wins: p2_wins.parse().context("bad p2wins")?,
                status: MatchStatus::parse(status)
                    .with_context(|| format!("bad status: {status:?}"))?,
                winner: opt(winner),
                winner_display: winner_display.to_owned(),
            }
        }
        // legacy 8-column record: no display names, identity doubles as both
        [round, match_id, p1, p2, p1_wins, p2_wins, status, winner] => BracketMatch {
            round: round.parse().context("bad round")?,
            match_id: match_id.parse().context("bad matchId")?,
            p1: opt(p1),
            p2: opt(p2),
            p1_display: p1.to_owned(),
            p2_display: p2.to_owned(),
            p1_wins: p1_wins.parse().context("bad p1wins")?,
            p2_wins: p2_wins.parse().context("bad p2wins")?,
            status: MatchStatus::parse(status)
                .with_context(|| format!("bad status: {status:?}"))?,
            winner: opt(winner),
            winner_display: winner.to_owned(),
        },
        _ => anyhow::bail!("expected 11 or 8 columns, got {}", fields.len()),
    };
    Ok(m)
}
