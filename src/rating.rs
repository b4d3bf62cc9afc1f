//! Rating math for one player row: dual ELO + Glicko-1, the GXE win
//! expectancy, and head-to-head records.
//!
//! Both systems update from the same `(score, foe)` observation. ELO drives
//! the ladder order and carries a hard floor of 1000; Glicko-1 additionally
//! tracks a rating deviation (RD) expressing confidence, and GXE turns the
//! Glicko pair into the percent chance of beating a reference 1500-rated
//! opponent. A row with `rd > 100` is provisional and its GXE is the
//! `Unknown` sentinel.

use std::collections::HashMap;
use std::f64::consts::{LN_10, PI};
use std::fmt;

use serde::{Deserialize, Serialize};

/// ELO never drops below this.
pub const ELO_FLOOR: f64 = 1000.0;
/// Seed ELO for a new row.
pub const STARTING_ELO: f64 = 1000.0;
/// Seed Glicko-1 rating for a new row.
pub const STARTING_GLICKO: f64 = 1500.0;
/// Seed rating deviation for a new row.
pub const STARTING_RD: f64 = 130.0;
/// Rating deviation bounds after an update.
pub const RD_RANGE: (f64, f64) = (10.0, 350.0);
/// Above this deviation a rating is provisional and GXE is unknown.
pub const PROVISIONAL_RD: f64 = 100.0;

// Counter thresholds for real-valued scores. Only 0, 0.5 and 1 are ever
// produced by the battle engine; the thresholds are kept as-is.
const WIN_SCORE: f64 = 0.6;
const LOSS_SCORE: f64 = 0.4;

/// Outcome of one battle from one player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Score above 0.6.
    Win,
    /// Score below 0.4.
    Loss,
    /// Anything in between.
    Tie,
}

impl Outcome {
    /// Classifies a score in `[0, 1]`.
    pub fn from_score(score: f64) -> Self {
        if score > WIN_SCORE {
            Outcome::Win
        } else if score < LOSS_SCORE {
            Outcome::Loss
        } else {
            Outcome::Tie
        }
    }
}

/// GXE: percent chance of beating a 1500-rated reference opponent, or the
/// `Unknown` sentinel while the rating is provisional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gxe {
    /// Percentage in `[0, 100]`, two decimals.
    Percent(f64),
    /// Rating deviation above 100; no estimate yet.
    Unknown,
}

impl fmt::Display for Gxe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gxe::Percent(p) => write!(f, "{p:.2}"),
            Gxe::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Gxe {
    /// Parses the persisted form; unparseable numbers fall back to `Unknown`.
    pub fn parse(s: &str) -> Self {
        if s == "Unknown" {
            Gxe::Unknown
        } else {
            s.parse().map(Gxe::Percent).unwrap_or(Gxe::Unknown)
        }
    }
}

/// Head-to-head record against one opponent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct H2hRecord {
    /// Wins against this opponent.
    pub w: u32,
    /// Losses against this opponent.
    pub l: u32,
    /// Ties against this opponent.
    pub t: u32,
}

/// One player's ratings in one format.
#[derive(Debug, Clone)]
pub struct LadderRow {
    /// Canonical identity, unique within a ladder.
    pub id: String,
    /// Current ELO, always at least 1000.
    pub elo: f64,
    /// Original-case display name.
    pub display_name: String,
    /// Battles won.
    pub wins: u32,
    /// Battles lost.
    pub losses: u32,
    /// Battles tied.
    pub ties: u32,
    /// Glicko-1 rating, one decimal.
    pub glicko: f64,
    /// Glicko-1 rating deviation, one decimal, in `[10, 350]`.
    pub rd: f64,
    /// Win expectancy against a 1500-rated reference.
    pub gxe: Gxe,
    /// Total battles; always `wins + losses + ties`.
    pub games_played: u32,
    /// Timestamp of the last update, empty when unknown.
    pub last_update: String,
    /// Head-to-head records keyed by opponent identity.
    pub h2h: HashMap<String, H2hRecord>,
}

impl LadderRow {
    /// Seeds a fresh row: ELO 1000, Glicko 1500 ± 130, no games.
    pub fn seed(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_owned(),
            elo: STARTING_ELO,
            display_name: display_name.to_owned(),
            wins: 0,
            losses: 0,
            ties: 0,
            glicko: STARTING_GLICKO,
            rd: STARTING_RD,
            gxe: Gxe::Unknown,
            games_played: 0,
            last_update: String::new(),
            h2h: HashMap::new(),
        }
    }

    /// Bumps the win/loss/tie counters and the game count for one battle.
    pub fn record_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Tie => self.ties += 1,
        }
        self.games_played += 1;
    }

    /// The head-to-head record against `opponent`, zeroed when they have
    /// never played.
    pub fn h2h_against(&self, opponent: &str) -> H2hRecord {
        self.h2h.get(opponent).copied().unwrap_or_default()
    }

    /// Adds one battle against `opponent` to the head-to-head record. Both
    /// rows of a battle are patched, each from its own outcome, which keeps
    /// the records symmetric.
    pub fn bump_h2h(&mut self, opponent: &str, outcome: Outcome) {
        let record = self.h2h.entry(opponent.to_owned()).or_default();
        match outcome {
            Outcome::Win => record.w += 1,
            Outcome::Loss => record.l += 1,
            Outcome::Tie => record.t += 1,
        }
    }
}

/// Effective K-factor for one player in one battle.
///
/// Chosen by experience (32 under 20 games, 24 under 50, 16 after), nudged
/// by rating band (+8 below 1100 capped at 32, -4 above 1600 floored at 12),
/// and scaled on upsets: when the gap exceeds 200 points, an underdog win
/// multiplies K by 1.1 and a favorite loss by 1.05.
pub fn k_factor(games: u32, elo: f64, foe_elo: f64, score: f64) -> f64 {
    let mut k: f64 = if games < 20 {
        32.0
    } else if games < 50 {
        24.0
    } else {
        16.0
    };
    if elo < 1100.0 {
        k = (k + 8.0).min(32.0);
    }
    if elo > 1600.0 {
        k = (k - 4.0).max(12.0);
    }
    if (elo - foe_elo).abs() > 200.0 {
        let underdog = elo < foe_elo;
        match Outcome::from_score(score) {
            Outcome::Win if underdog => k *= 1.1,
            Outcome::Loss if !underdog => k *= 1.05,
            _ => {}
        }
    }
    k
}

/// Standard ELO update with the 1000 floor.
pub fn elo_update(elo: f64, foe_elo: f64, games: u32, score: f64) -> f64 {
    let k = k_factor(games, elo, foe_elo, score);
    let expected = 1.0 / (1.0 + 10f64.powf((foe_elo - elo) / 400.0));
    (elo + k * (score - expected)).max(ELO_FLOOR)
}

/// Result of a Glicko-1 update, both values rounded to one decimal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlickoUpdate {
    /// New rating.
    pub rating: f64,
    /// New deviation, clamped to `[10, 350]`.
    pub rd: f64,
}

/// One-battle Glicko-1 update with `q = ln(10) / 400`.
pub fn glicko_update(r: f64, rd: f64, foe_r: f64, foe_rd: f64, score: f64) -> GlickoUpdate {
    let q = LN_10 / 400.0;
    let g_foe = 1.0 / (1.0 + 3.0 * (q * foe_rd).powi(2) / PI.powi(2)).sqrt();
    let e = 1.0 / (1.0 + 10f64.powf(-g_foe * (r - foe_r) / 400.0));
    let d_squared = 1.0 / (q.powi(2) * g_foe.powi(2) * e * (1.0 - e));
    let denom = 1.0 / rd.powi(2) + 1.0 / d_squared;
    let rating = r + (q / denom) * g_foe * (score - e);
    let rd_new = (1.0 / denom).sqrt().clamp(RD_RANGE.0, RD_RANGE.1);
    GlickoUpdate {
        rating: round_decimal(rating),
        rd: round_decimal(rd_new),
    }
}

/// Raw Glixare percentage for a Glicko pair, rounded to two decimals.
pub fn glixare(glicko: f64, rd: f64) -> f64 {
    let spread =
        (3.0 * LN_10.powi(2) * rd * rd + 2500.0 * (64.0 * PI.powi(2) + 147.0 * LN_10.powi(2)))
            .sqrt();
    let raw = 10000.0 / (1.0 + 10f64.powf((1500.0 - glicko) * PI / spread));
    raw.round() / 100.0
}

/// Storable GXE for a Glicko pair: the `Unknown` sentinel while the rating
/// is provisional, the Glixare percentage otherwise.
pub fn gxe(glicko: f64, rd: f64) -> Gxe {
    if rd > PROVISIONAL_RD {
        Gxe::Unknown
    } else {
        Gxe::Percent(glixare(glicko, rd))
    }
}

fn round_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
