//! Single-elimination bracket state machine.
//!
//! This module owns the in-memory tournament state: match entities, seeded
//! bracket construction, best-of series scoring, winner advancement, and the
//! freeze/resume semantics. It performs no I/O; persistence lives in
//! [`bracket_controller`](crate::bracket_controller).
//!
//! A bracket for `n` participants (a power of two) holds `n / 2` matches in
//! round 1 and half as many in each following round, all pre-allocated with
//! round-major ascending match ids starting at 1. Round-1 matches start
//! `Active`; later rounds start `Pending` and fill as winners advance.

use std::collections::HashMap;
use std::fmt::Write as _;

use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::identity::to_id;

/// Errors reported to admin callers by mutating bracket operations.
#[derive(Debug, Error)]
pub enum TournamentError {
    /// A tournament already exists; `reset` it first.
    #[error("a tournament is already in progress")]
    AlreadyInitialized,
    /// The operation needs a tournament and none exists.
    #[error("no tournament is in progress")]
    NotInitialized,
    /// Participant count must be a power of two and at least 2.
    #[error("participant count must be a power of two and at least 2, got {0}")]
    BadParticipantCount(usize),
    /// Series length must be between 1 and 999.
    #[error("best-of must be between 1 and 999, got {0}")]
    BadBestOf(u32),
    /// Two display names canonicalize to the same identity.
    #[error("duplicate participant: {0}")]
    DuplicateParticipant(String),
    /// No `Active` series involves this player.
    #[error("no active series for {0}")]
    NoActiveSeries(String),
    /// The bracket is already frozen.
    #[error("the bracket is already frozen")]
    AlreadyFrozen,
    /// The bracket is not frozen.
    #[error("the bracket is not frozen")]
    NotFrozen,
    /// Writing the persisted state failed.
    #[error("could not persist tournament state: {0}")]
    Persistence(anyhow::Error),
}

/// Lifecycle of a single bracket match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Round > 1, no players assigned yet.
    Pending,
    /// Exactly one player assigned.
    Waiting,
    /// Both players assigned, series in progress.
    Active,
    /// A winner has been decided.
    Complete,
}

impl MatchStatus {
    /// Stable textual form used by the persisted CSV.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Waiting => "waiting",
            MatchStatus::Active => "active",
            MatchStatus::Complete => "complete",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MatchStatus::Pending),
            "waiting" => Some(MatchStatus::Waiting),
            "active" => Some(MatchStatus::Active),
            "complete" => Some(MatchStatus::Complete),
            _ => None,
        }
    }
}

/// One match of the bracket.
///
/// Identity slots are `None` until a player is assigned; display strings are
/// empty until then. The pair `(round, match_id)` addresses the match inside
/// the bracket; ids are unique and ascending, round-major.
#[derive(Debug, Clone)]
pub struct BracketMatch {
    /// 1-based round number.
    pub round: u32,
    /// Unique ascending id, assigned round-major starting at 1.
    pub match_id: u32,
    /// First slot identity.
    pub p1: Option<String>,
    /// Second slot identity.
    pub p2: Option<String>,
    /// Original-case display of `p1`, empty when unassigned.
    pub p1_display: String,
    /// Original-case display of `p2`, empty when unassigned.
    pub p2_display: String,
    /// Series wins of `p1`.
    pub p1_wins: u32,
    /// Series wins of `p2`.
    pub p2_wins: u32,
    /// Current lifecycle state.
    pub status: MatchStatus,
    /// Winner identity once complete.
    pub winner: Option<String>,
    /// Original-case display of the winner, empty until complete.
    pub winner_display: String,
}

impl BracketMatch {
    fn empty(round: u32, match_id: u32) -> Self {
        Self {
            round,
            match_id,
            p1: None,
            p2: None,
            p1_display: String::new(),
            p2_display: String::new(),
            p1_wins: 0,
            p2_wins: 0,
            status: MatchStatus::Pending,
            winner: None,
            winner_display: String::new(),
        }
    }
}

/// Computes the standard seed order for a bracket of `n` players.
///
/// `seeds(2) = [1, 2]`; doubling interleaves each seed `s` with `2k + 1 - s`,
/// which guarantees that seeds 1 and 2 can only meet in the final. For 8
/// players this yields `[1, 8, 4, 5, 2, 7, 3, 6]`, i.e. the pairings
/// `(1,8) (4,5) (2,7) (3,6)`.
pub fn standard_seed_order(n: usize) -> Vec<usize> {
    debug_assert!(n >= 2 && n.is_power_of_two());
    let mut seeds = vec![1, 2];
    while seeds.len() < n {
        let doubled = seeds.len() * 2;
        let mut next = Vec::with_capacity(doubled);
        for &s in &seeds {
            next.push(s);
            next.push(doubled + 1 - s);
        }
        seeds = next;
    }
    seeds
}

/// In-memory state of one single-elimination tournament.
#[derive(Debug)]
pub struct Bracket {
    format: String,
    participants: usize,
    best_of: u32,
    current_round: u32,
    frozen: bool,
    matches: Vec<BracketMatch>,
    /// Weak back-references: identity of every player currently in a
    /// `Waiting` or `Active` match, mapped to the match index. Kept in sync
    /// with status transitions.
    player_to_match: HashMap<String, usize>,
    display_names: HashMap<String, String>,
}

impl Bracket {
    /// Builds a seeded bracket from display names.
    ///
    /// The player list order defines seeds 1..n; set `randomize` to shuffle
    /// the list first (Fisher-Yates). Round-1 matches start `Active`, later
    /// rounds are pre-allocated `Pending`.
    ///
    /// # Errors
    /// Rejects a `best_of` outside `1..=999`, a participant count that is not
    /// a power of two or is below 2, and display names whose identities
    /// collide.
    pub fn new(
        format: &str,
        players: &[String],
        best_of: u32,
        randomize: bool,
    ) -> Result<Self, TournamentError> {
        if !(1..=999).contains(&best_of) {
            return Err(TournamentError::BadBestOf(best_of));
        }
        let n = players.len();
        if n < 2 || !n.is_power_of_two() {
            return Err(TournamentError::BadParticipantCount(n));
        }

        let mut display_names = HashMap::with_capacity(n);
        for name in players {
            let id = to_id(name);
            if display_names.insert(id.clone(), name.clone()).is_some() {
                return Err(TournamentError::DuplicateParticipant(id));
            }
        }

        let mut players = players.to_vec();
        if randomize {
            players.shuffle(&mut rand::thread_rng());
        }

        let seeds = standard_seed_order(n);
        let mut matches = Vec::with_capacity(n - 1);
        let mut player_to_match = HashMap::with_capacity(n);
        for i in 0..n / 2 {
            let p1 = &players[seeds[2 * i] - 1];
            let p2 = &players[seeds[2 * i + 1] - 1];
            let (id1, id2) = (to_id(p1), to_id(p2));
            player_to_match.insert(id1.clone(), i);
            player_to_match.insert(id2.clone(), i);
            matches.push(BracketMatch {
                round: 1,
                match_id: i as u32 + 1,
                p1: Some(id1),
                p2: Some(id2),
                p1_display: p1.clone(),
                p2_display: p2.clone(),
                p1_wins: 0,
                p2_wins: 0,
                status: MatchStatus::Active,
                winner: None,
                winner_display: String::new(),
            });
        }

        let total_rounds = n.ilog2();
        let mut match_id = n as u32 / 2;
        for round in 2..=total_rounds {
            for _ in 0..n / 2usize.pow(round) {
                match_id += 1;
                matches.push(BracketMatch::empty(round, match_id));
            }
        }

        info!(
            "created {format} bracket: {n} players, best of {best_of}, {} matches",
            matches.len()
        );
        Ok(Self {
            format: format.to_owned(),
            participants: n,
            best_of,
            current_round: 1,
            frozen: false,
            matches,
            player_to_match,
            display_names,
        })
    }

    /// Rebuilds a bracket from persisted matches.
    ///
    /// Derives the participant count from the round-1 match count and
    /// reconstructs the player lookup and display table from the match
    /// records.
    pub(crate) fn from_parts(
        format: String,
        best_of: u32,
        frozen: bool,
        matches: Vec<BracketMatch>,
    ) -> anyhow::Result<Self> {
        if !(1..=999).contains(&best_of) {
            anyhow::bail!("best-of out of range: {best_of}");
        }
        let round_one = matches.iter().filter(|m| m.round == 1).count();
        let participants = round_one * 2;
        if participants < 2 || !participants.is_power_of_two() {
            anyhow::bail!("bad bracket shape: {round_one} matches in round 1");
        }

        let mut player_to_match = HashMap::new();
        let mut display_names = HashMap::new();
        let mut current_round = 1;
        for (idx, m) in matches.iter().enumerate() {
            for (id, display) in [(&m.p1, &m.p1_display), (&m.p2, &m.p2_display)] {
                if let Some(id) = id {
                    let display = if display.is_empty() { id } else { display };
                    display_names.insert(id.clone(), display.clone());
                    if matches!(m.status, MatchStatus::Active | MatchStatus::Waiting) {
                        player_to_match.insert(id.clone(), idx);
                    }
                }
            }
            if matches!(m.status, MatchStatus::Active | MatchStatus::Complete) {
                current_round = current_round.max(m.round);
            }
        }

        Ok(Self {
            format,
            participants,
            best_of,
            current_round,
            frozen,
            matches,
            player_to_match,
            display_names,
        })
    }

    /// Battle format this tournament is played in.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Number of participants (a power of two).
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Series length of every match.
    pub fn best_of(&self) -> u32 {
        self.best_of
    }

    /// Whether advancement is currently frozen.
    pub fn frozen(&self) -> bool {
        self.frozen
    }

    /// All matches, round-major in ascending match-id order.
    pub fn matches(&self) -> &[BracketMatch] {
        &self.matches
    }

    /// Wins needed to take a series: draws do not count, so the first side
    /// to reach `best_of / 2 + 1` wins the match.
    pub fn win_threshold(&self) -> u32 {
        self.best_of / 2 + 1
    }

    fn total_rounds(&self) -> u32 {
        self.participants.ilog2()
    }

    /// The minimum round among `Active` and `Waiting` matches, or the
    /// current round when none exist.
    fn earliest_incomplete_round(&self) -> u32 {
        self.matches
            .iter()
            .filter(|m| matches!(m.status, MatchStatus::Active | MatchStatus::Waiting))
            .map(|m| m.round)
            .min()
            .unwrap_or(self.current_round)
    }

    /// While frozen, only matches in the earliest incomplete round may play.
    fn round_playable(&self, round: u32) -> bool {
        !self.frozen || round == self.earliest_incomplete_round()
    }

    /// True when `a` and `b` are each other's opponents in an `Active` match
    /// (restricted to the earliest incomplete round while frozen).
    pub fn can_match(&self, a: &str, b: &str) -> bool {
        let (a, b) = (to_id(a), to_id(b));
        let (Some(&ia), Some(&ib)) = (self.player_to_match.get(&a), self.player_to_match.get(&b))
        else {
            return false;
        };
        if ia != ib {
            return false;
        }
        let m = &self.matches[ia];
        m.status == MatchStatus::Active && self.round_playable(m.round)
    }

    /// True when `id` has an `Active` or `Waiting` match (restricted to the
    /// earliest incomplete round while frozen).
    pub fn can_search(&self, id: &str) -> bool {
        let Some(&idx) = self.player_to_match.get(&to_id(id)) else {
            return false;
        };
        let m = &self.matches[idx];
        matches!(m.status, MatchStatus::Active | MatchStatus::Waiting) && self.round_playable(m.round)
    }

    /// The opponent's identity when `id` is in an `Active` match.
    pub fn opponent_of(&self, id: &str) -> Option<&str> {
        let id = to_id(id);
        let m = &self.matches[*self.player_to_match.get(&id)?];
        if m.status != MatchStatus::Active {
            return None;
        }
        match (m.p1.as_deref(), m.p2.as_deref()) {
            (Some(p1), Some(p2)) if p1 == id => Some(p2),
            (Some(p1), Some(p2)) if p2 == id => Some(p1),
            _ => None,
        }
    }

    /// Records one battle win for `winner` against `loser`.
    ///
    /// Looks up the series the two share; when no `Active` series matches,
    /// the call logs and returns silently (battle-end hooks are
    /// fire-and-forget). Reaching the win threshold completes the match and
    /// advances the winner.
    pub fn record_win(&mut self, winner: &str, loser: &str) {
        let (winner, loser) = (to_id(winner), to_id(loser));
        let Some(&idx) = self.player_to_match.get(&winner) else {
            warn!("win by {winner} over {loser} ignored: {winner} has no open match");
            return;
        };
        let threshold = self.win_threshold();
        let m = &mut self.matches[idx];
        if m.status != MatchStatus::Active {
            warn!("win by {winner} over {loser} ignored: match {} not active", m.match_id);
            return;
        }
        let done = match (m.p1.as_deref(), m.p2.as_deref()) {
            (Some(p1), Some(p2)) if p1 == winner && p2 == loser => {
                m.p1_wins += 1;
                m.p1_wins >= threshold
            }
            (Some(p1), Some(p2)) if p2 == winner && p1 == loser => {
                m.p2_wins += 1;
                m.p2_wins >= threshold
            }
            _ => {
                warn!(
                    "win by {winner} over {loser} ignored: match {} is {} vs {}",
                    m.match_id,
                    m.p1.as_deref().unwrap_or(""),
                    m.p2.as_deref().unwrap_or(""),
                );
                return;
            }
        };
        info!(
            "match {}: {} beats {} ({}-{})",
            m.match_id, winner, loser, m.p1_wins, m.p2_wins
        );
        if done {
            self.complete_match(idx, &winner);
        }
    }

    /// Admin override: completes the winner's active series outright,
    /// regardless of the current score.
    pub fn force_win(&mut self, winner: &str) -> Result<(), TournamentError> {
        let winner = to_id(winner);
        let threshold = self.win_threshold();
        let Some(&idx) = self.player_to_match.get(&winner) else {
            return Err(TournamentError::NoActiveSeries(winner));
        };
        let m = &mut self.matches[idx];
        if m.status != MatchStatus::Active {
            return Err(TournamentError::NoActiveSeries(winner));
        }
        if m.p1.as_deref() == Some(winner.as_str()) {
            m.p1_wins = m.p1_wins.max(threshold);
        } else {
            m.p2_wins = m.p2_wins.max(threshold);
        }
        info!("match {}: forced win for {winner}", m.match_id);
        self.complete_match(idx, &winner);
        Ok(())
    }

    fn complete_match(&mut self, idx: usize, winner: &str) {
        let winner_display = self
            .display_names
            .get(winner)
            .cloned()
            .unwrap_or_else(|| winner.to_owned());
        let m = &mut self.matches[idx];
        m.status = MatchStatus::Complete;
        m.winner = Some(winner.to_owned());
        m.winner_display = winner_display;
        info!(
            "match {} complete: {} wins the series {}-{}",
            m.match_id, m.winner_display, m.p1_wins, m.p2_wins
        );
        let (p1, p2) = (m.p1.clone(), m.p2.clone());
        for id in [p1, p2].into_iter().flatten() {
            self.player_to_match.remove(&id);
        }
        self.advance_winner(idx);
    }

    /// Moves the winner of the complete match at `idx` into its slot in the
    /// next round. A final-round winner ends the tournament; while frozen the
    /// placement is skipped (and replayed by [`resume`](Self::resume)).
    fn advance_winner(&mut self, idx: usize) {
        let m = &self.matches[idx];
        let winner_display = m.winner_display.clone();
        if m.round == self.total_rounds() {
            info!("tournament complete: {winner_display} wins {}", self.format);
            return;
        }
        if self.frozen {
            info!("bracket frozen: {winner_display} not advanced yet");
            return;
        }
        self.place_winner(idx);
    }

    /// Placement rule: the winner of match `M` in round `r` goes to the match
    /// at relative index `(M.match_id - firstIdOfRound(r)) / 2` in round
    /// `r + 1`, filling `p1` first.
    fn place_winner(&mut self, idx: usize) {
        let m = &self.matches[idx];
        let (round, match_id) = (m.round, m.match_id);
        let (Some(winner), winner_display) = (m.winner.clone(), m.winner_display.clone()) else {
            error!("cannot advance match {match_id}: no winner recorded");
            return;
        };

        let Some(first_id) = self
            .matches
            .iter()
            .filter(|m| m.round == round)
            .map(|m| m.match_id)
            .min()
        else {
            error!("cannot advance match {match_id}: round {round} has no matches");
            return;
        };
        let next_index = ((match_id - first_id) / 2) as usize;
        let Some(next_idx) = self
            .matches
            .iter()
            .position(|m| m.round == round + 1)
            .map(|base| base + next_index)
            .filter(|&i| i < self.matches.len() && self.matches[i].round == round + 1)
        else {
            error!("cannot advance match {match_id}: no slot {next_index} in round {}", round + 1);
            return;
        };

        let next = &mut self.matches[next_idx];
        if next.p1.is_none() {
            next.p1 = Some(winner.clone());
            next.p1_display = winner_display.clone();
        } else if next.p2.is_none() {
            next.p2 = Some(winner.clone());
            next.p2_display = winner_display.clone();
        } else {
            error!(
                "cannot advance {winner} into match {}: both slots taken",
                next.match_id
            );
            return;
        }

        if next.p1.is_some() && next.p2.is_some() {
            next.status = MatchStatus::Active;
            let (p1, p2) = (next.p1.clone().unwrap(), next.p2.clone().unwrap());
            info!(
                "match {} is now active: {} vs {}",
                next.match_id, next.p1_display, next.p2_display
            );
            self.player_to_match.insert(p1, next_idx);
            self.player_to_match.insert(p2, next_idx);
            self.current_round = self.current_round.max(round + 1);
        } else {
            next.status = MatchStatus::Waiting;
            info!("{winner_display} advances to match {}", next.match_id);
            self.player_to_match.insert(winner, next_idx);
        }
    }

    /// Stops winner advancement. Series may still be played to completion.
    pub fn freeze(&mut self) -> Result<(), TournamentError> {
        if self.frozen {
            return Err(TournamentError::AlreadyFrozen);
        }
        self.frozen = true;
        info!("bracket frozen");
        Ok(())
    }

    /// Unfreezes the bracket and places every winner whose advancement was
    /// skipped while frozen, in ascending match-id order.
    pub fn resume(&mut self) -> Result<(), TournamentError> {
        if !self.frozen {
            return Err(TournamentError::NotFrozen);
        }
        self.frozen = false;
        info!("bracket resumed");
        let total = self.total_rounds();
        let pending: Vec<usize> = self
            .matches
            .iter()
            .enumerate()
            .filter(|(_, m)| m.status == MatchStatus::Complete && m.round < total)
            .filter(|(idx, _)| !self.winner_already_placed(*idx))
            .map(|(idx, _)| idx)
            .collect();
        // matches vec is in ascending match-id order already
        for idx in pending {
            self.place_winner(idx);
        }
        Ok(())
    }

    fn winner_already_placed(&self, idx: usize) -> bool {
        let m = &self.matches[idx];
        let Some(winner) = m.winner.as_deref() else {
            return true;
        };
        self.matches
            .iter()
            .filter(|n| n.round == m.round + 1)
            .any(|n| n.p1.as_deref() == Some(winner) || n.p2.as_deref() == Some(winner))
    }

    /// Multi-line human-readable bracket summary, rounds in order.
    pub fn status(&self) -> String {
        let mut out = format!(
            "{} tournament (best of {}, {} players){}\n",
            self.format,
            self.best_of,
            self.participants,
            if self.frozen { " [frozen]" } else { "" }
        );
        for round in 1..=self.total_rounds() {
            let _ = writeln!(out, "Round {round}:");
            for m in self.matches.iter().filter(|m| m.round == round) {
                let line = match m.status {
                    MatchStatus::Pending => format!("  Match {}: (awaiting players)", m.match_id),
                    MatchStatus::Waiting => format!(
                        "  Match {}: {} vs (awaiting opponent)",
                        m.match_id,
                        if m.p1_display.is_empty() { &m.p2_display } else { &m.p1_display }
                    ),
                    MatchStatus::Active => format!(
                        "  Match {}: {} vs {} ({}-{})",
                        m.match_id, m.p1_display, m.p2_display, m.p1_wins, m.p2_wins
                    ),
                    MatchStatus::Complete => format!(
                        "  Match {}: {} vs {} ({}-{}), winner: {}",
                        m.match_id,
                        m.p1_display,
                        m.p2_display,
                        m.p1_wins,
                        m.p2_wins,
                        m.winner_display
                    ),
                };
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}
