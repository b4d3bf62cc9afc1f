//! Per-format rating ladders with tab-separated persistence.
//!
//! A [`LadderStore`] owns the ordered row sequence for one format, loaded
//! lazily from disk on first access and rewritten in full after every
//! update. The [`LadderRegistry`] memoizes one store per format id so every
//! caller observes the same sequence.
//!
//! The file format is one row per player, tab-separated, CRLF-terminated,
//! sorted by ELO descending:
//!
//! ```text
//! Elo\tUsername\tW\tL\tT\tGlicko\tRating_Deviation\tGXE\tGames_Played\tLast_update\tH2H_Data
//! ```
//!
//! A legacy 5-column form (`Elo`, `Username`, `W`, `L`, `T`) is still read;
//! the missing fields are synthesized (`rd = max(30, 130 - 2*games)`, seed
//! Glicko, GXE from the formula, `games = w + l + t`).

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use time::{format_description, OffsetDateTime};
use tracing::{error, info, trace, warn};

use crate::configuration::Configuration;
use crate::file_store::FileStore;
use crate::identity::to_id;
use crate::rating::{
    elo_update, glicko_update, gxe, Gxe, H2hRecord, LadderRow, Outcome, STARTING_ELO,
    STARTING_GLICKO,
};

const LADDER_HEADER: &str =
    "Elo\tUsername\tW\tL\tT\tGlicko\tRating_Deviation\tGXE\tGames_Played\tLast_update\tH2H_Data";

static GLOBAL: Lazy<LadderRegistry> = Lazy::new(|| LadderRegistry::new(Configuration::from_env()));

/// The rating ladder of one format.
pub struct LadderStore {
    format: String,
    path: PathBuf,
    store: FileStore,
    rows: Vec<LadderRow>,
    loaded: bool,
    saving: AtomicBool,
}

impl LadderStore {
    /// Creates an empty store; rows load from `path` on first access.
    pub fn new(format: &str, path: PathBuf) -> Self {
        Self {
            format: format.to_owned(),
            path,
            store: FileStore,
            rows: Vec::new(),
            loaded: false,
            saving: AtomicBool::new(false),
        }
    }

    /// The format this ladder belongs to.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The ordered row sequence, ELO descending.
    pub fn rows(&mut self) -> &[LadderRow] {
        self.ensure_loaded();
        &self.rows
    }

    /// The player's current ELO, or 1000 when they have no row.
    pub fn rating_of(&mut self, name: &str) -> f64 {
        self.ensure_loaded();
        let id = to_id(name);
        self.rows
            .iter()
            .find(|r| r.id == id)
            .map_or(STARTING_ELO, |r| r.elo)
    }

    /// Like [`rating_of`](Self::rating_of), memoized through a per-user
    /// cache keyed by format. Live user objects can hang on to such a cache
    /// to skip repeated ladder scans.
    pub fn rating_of_cached(&mut self, name: &str, cache: &mut HashMap<String, f64>) -> f64 {
        if let Some(&elo) = cache.get(&self.format) {
            return elo;
        }
        let elo = self.rating_of(name);
        cache.insert(self.format.clone(), elo);
        elo
    }

    /// Records a finished battle and persists the ladder.
    ///
    /// `p1_score` is 1 for a win, 0 for a loss, 0.5 for a tie; a negative
    /// score marks an invalidated battle and both sides are scored 0 (no
    /// rating credit). Human-readable change lines are appended to
    /// `room_sink`. Returns `(p1_score, p1_new_elo, p2_new_elo)`.
    pub fn update_rating(
        &mut self,
        p1_name: &str,
        p2_name: &str,
        p1_score: f64,
        room_sink: &mut Vec<String>,
    ) -> (f64, f64, f64) {
        self.ensure_loaded();

        let mut p1_score = p1_score;
        let p2_score;
        if p1_score < 0.0 {
            warn!("invalidated battle between {p1_name} and {p2_name}: no rating credit");
            p1_score = 0.0;
            p2_score = 0.0;
        } else {
            p2_score = 1.0 - p1_score;
        }

        let p1_id = to_id(p1_name);
        let p2_id = to_id(p2_name);
        let i1 = self.index_or_seed(&p1_id, p1_name);
        let i2 = self.index_or_seed(&p2_id, p2_name);

        let (old_elo1, old_glicko1, old_rd1, games1) = snapshot(&self.rows[i1]);
        let (old_elo2, old_glicko2, old_rd2, games2) = snapshot(&self.rows[i2]);

        // both updates read the opponent's pre-battle values
        let new_elo1 = elo_update(old_elo1, old_elo2, games1, p1_score);
        let new_elo2 = elo_update(old_elo2, old_elo1, games2, p2_score);
        let glicko1 = glicko_update(old_glicko1, old_rd1, old_glicko2, old_rd2, p1_score);
        let glicko2 = glicko_update(old_glicko2, old_rd2, old_glicko1, old_rd1, p2_score);
        let stamp = timestamp();

        for (idx, name, opp_id, score, new_elo, update) in [
            (i1, p1_name, &p2_id, p1_score, new_elo1, glicko1),
            (i2, p2_name, &p1_id, p2_score, new_elo2, glicko2),
        ] {
            let row = &mut self.rows[idx];
            row.display_name = name.to_owned();
            row.elo = new_elo;
            row.glicko = update.rating;
            row.rd = update.rd;
            row.gxe = gxe(update.rating, update.rd);
            row.record_outcome(Outcome::from_score(score));
            row.bump_h2h(opp_id, Outcome::from_score(score));
            row.last_update = stamp.clone();
        }

        for (name, old, new) in [(p1_name, old_elo1, new_elo1), (p2_name, old_elo2, new_elo2)] {
            let (old, new) = (old.round() as i64, new.round() as i64);
            room_sink.push(format!("{name}'s rating: {old} -> {new} ({:+})", new - old));
        }
        trace!(
            "{}: {p1_name} vs {p2_name} scored {p1_score}: {old_elo1} -> {new_elo1}, {old_elo2} -> {new_elo2}",
            self.format
        );

        resort(&mut self.rows, i1);
        // the first splice may have shifted p2; re-resolve by identity
        if let Some(i2) = self.rows.iter().position(|r| r.id == p2_id) {
            resort(&mut self.rows, i2);
        }

        self.save();
        (p1_score, new_elo1, new_elo2)
    }

    /// The ladder as HTML table rows, optionally filtered to identities
    /// starting with `prefix`.
    pub fn top_html(&mut self, prefix: Option<&str>) -> String {
        self.ensure_loaded();
        let prefix = prefix.map(to_id);
        let mut out = String::from(
            "<tr><th></th><th>Username</th><th>Elo</th><th>GXE</th><th>Glicko-1</th>\
             <th>W</th><th>L</th><th>T</th></tr>",
        );
        let rows = self
            .rows
            .iter()
            .filter(|r| prefix.as_deref().map_or(true, |p| r.id.starts_with(p)));
        for (rank, row) in rows.enumerate() {
            let _ = write!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.1} &plusmn; {:.1}</td>\
                 <td>{}</td><td>{}</td><td>{}</td></tr>",
                rank + 1,
                row.display_name,
                row.elo.round() as i64,
                row.gxe,
                row.glicko,
                row.rd,
                row.wins,
                row.losses,
                row.ties,
            );
        }
        out
    }

    /// One HTML row summarizing this format's ratings for one player, empty
    /// when they have no row.
    pub fn visualize_html(&mut self, user_name: &str) -> String {
        self.ensure_loaded();
        let id = to_id(user_name);
        match self.rows.iter().find(|r| r.id == id) {
            Some(row) => format!(
                "<tr><td>{}</td><td><strong>{}</strong></td><td>{}</td>\
                 <td>{:.1} &plusmn; {:.1}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                self.format,
                row.elo.round() as i64,
                row.gxe,
                row.glicko,
                row.rd,
                row.wins,
                row.losses,
                row.ties,
            ),
            None => String::new(),
        }
    }

    fn index_or_seed(&mut self, id: &str, display: &str) -> usize {
        match self.rows.iter().position(|r| r.id == id) {
            Some(i) => i,
            None => {
                // a seed row carries the minimum ELO, so appending keeps order
                self.rows.push(LadderRow::seed(id, display));
                self.rows.len() - 1
            }
        }
    }

    fn ensure_loaded(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        match self.store.read_if_exists(&self.path) {
            Ok(Some(contents)) => {
                self.rows = decode_rows(&contents, &self.format);
                info!("loaded {} ladder: {} players", self.format, self.rows.len());
            }
            Ok(None) => {}
            Err(e) => warn!("could not read {} ladder: {e:#}", self.format),
        }
    }

    /// Rewrites the whole file. A save started while another is in flight is
    /// dropped; the next update saves again, so nothing is lost.
    fn save(&self) {
        if self.saving.swap(true, Ordering::AcqRel) {
            trace!("{} ladder save already in flight", self.format);
            return;
        }
        let contents = self.encode();
        if let Err(e) = self.store.write_atomic(&self.path, &contents) {
            error!("could not save {} ladder: {e:#}", self.format);
        }
        self.saving.store(false, Ordering::Release);
    }

    fn encode(&self) -> String {
        let mut out = format!("{LADDER_HEADER}\r\n");
        for row in &self.rows {
            let h2h = serde_json::to_string(&row.h2h).expect("string-keyed map serializes");
            let _ = write!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{:.1}\t{:.1}\t{}\t{}\t{}\t{}\r\n",
                row.elo,
                row.display_name,
                row.wins,
                row.losses,
                row.ties,
                row.glicko,
                row.rd,
                row.gxe,
                row.games_played,
                row.last_update,
                h2h,
            );
        }
        out
    }
}

/// Memoizes one [`LadderStore`] per format id.
pub struct LadderRegistry {
    config: Configuration,
    stores: Mutex<HashMap<String, Arc<Mutex<LadderStore>>>>,
}

impl LadderRegistry {
    /// Creates a registry storing ladder files under the configured data
    /// directory.
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry, configured from the environment.
    pub fn global() -> &'static LadderRegistry {
        &GLOBAL
    }

    /// The shared store for `format`, created on first access.
    pub fn ladder(&self, format: &str) -> Arc<Mutex<LadderStore>> {
        let mut stores = self.stores.lock().expect("poisoned");
        stores
            .entry(format.to_owned())
            .or_insert_with(|| {
                Arc::new(Mutex::new(LadderStore::new(
                    format,
                    self.config.ladder_path(format),
                )))
            })
            .clone()
    }
}

fn snapshot(row: &LadderRow) -> (f64, f64, f64, u32) {
    (row.elo, row.glicko, row.rd, row.games_played)
}

/// Splices the row at `index` back to its sorted position (ELO descending)
/// and returns the new index.
fn resort(rows: &mut Vec<LadderRow>, index: usize) -> usize {
    let row = rows.remove(index);
    let mut new_index = index;
    while new_index > 0 && rows[new_index - 1].elo <= row.elo {
        new_index -= 1;
    }
    if new_index == index {
        while new_index < rows.len() && rows[new_index].elo > row.elo {
            new_index += 1;
        }
    }
    rows.insert(new_index, row);
    new_index
}

fn timestamp() -> String {
    let format = format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .expect("static format description");
    OffsetDateTime::now_utc().format(&format).unwrap_or_default()
}

fn decode_rows(contents: &str, format: &str) -> Vec<LadderRow> {
    let mut rows: Vec<LadderRow> = Vec::new();
    let mut seen = HashSet::new();
    for (i, line) in contents.split('\n').enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if i == 0 && line.starts_with("Elo\t") {
            continue;
        }
        match parse_row(line) {
            Some(row) if seen.insert(row.id.clone()) => rows.push(row),
            Some(row) => warn!("dropping duplicate {format} ladder row for {}", row.id),
            None => warn!("skipping bad {format} ladder row: {line:?}"),
        }
    }
    rows.sort_by(|a, b| b.elo.partial_cmp(&a.elo).unwrap_or(std::cmp::Ordering::Equal));
    rows
}

fn parse_row(line: &str) -> Option<LadderRow> {
    let fields: Vec<&str> = line.split('\t').collect();
    match fields.len() {
        n if n >= 9 => {
            let display = fields[1];
            Some(LadderRow {
                id: to_id(display),
                elo: fields[0].parse().ok()?,
                display_name: display.to_owned(),
                wins: fields[2].parse().ok()?,
                losses: fields[3].parse().ok()?,
                ties: fields[4].parse().ok()?,
                glicko: fields[5].parse().ok()?,
                rd: fields[6].parse().ok()?,
                gxe: Gxe::parse(fields[7]),
                games_played: fields[8].parse().ok()?,
                last_update: fields.get(9).copied().unwrap_or_default().to_owned(),
                h2h: fields.get(10).map(|s| parse_h2h(s)).unwrap_or_default(),
            })
        }
        5 => {
            let display = fields[1];
            let wins: u32 = fields[2].parse().ok()?;
            let losses: u32 = fields[3].parse().ok()?;
            let ties: u32 = fields[4].parse().ok()?;
            let games = wins + losses + ties;
            let rd = (130.0 - 2.0 * f64::from(games)).max(30.0);
            Some(LadderRow {
                id: to_id(display),
                elo: fields[0].parse().ok()?,
                display_name: display.to_owned(),
                wins,
                losses,
                ties,
                glicko: STARTING_GLICKO,
                rd,
                gxe: gxe(STARTING_GLICKO, rd),
                games_played: games,
                last_update: String::new(),
                h2h: HashMap::new(),
            })
        }
        _ => None,
    }
}

fn parse_h2h(s: &str) -> HashMap<String, H2hRecord> {
    if s.is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(s).unwrap_or_else(|e| {
        warn!("resetting unreadable head-to-head data: {e}");
        HashMap::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &std::path::Path) -> LadderStore {
        LadderStore::new("gen1ou", dir.join("gen1ou.tsv"))
    }

    #[test]
    fn resort_moves_rows_both_ways() {
        let mut rows: Vec<LadderRow> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| LadderRow::seed(id, id))
            .collect();
        for (row, elo) in rows.iter_mut().zip([1400.0, 1300.0, 1200.0, 1100.0]) {
            row.elo = elo;
        }

        rows[3].elo = 1350.0;
        assert_eq!(resort(&mut rows, 3), 1);
        let order: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, ["a", "d", "b", "c"]);

        rows[0].elo = 1250.0;
        assert_eq!(resort(&mut rows, 0), 2);
        let order: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, ["d", "b", "a", "c"]);
    }

    #[test]
    fn legacy_five_column_rows_are_synthesized() {
        let rows = decode_rows(
            "Elo\tUsername\tW\tL\tT\r\n1213.5\tAlice\t10\t5\t1\r\n",
            "gen1ou",
        );
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, "alice");
        assert_eq!(row.games_played, 16);
        assert_eq!(row.rd, 130.0 - 32.0);
        assert_eq!(row.glicko, STARTING_GLICKO);
        assert_eq!(row.gxe, gxe(STARTING_GLICKO, row.rd));
    }

    #[test]
    fn unreadable_h2h_resets_to_empty() {
        let rows = decode_rows(
            "Elo\tUsername\tW\tL\tT\tGlicko\tRating_Deviation\tGXE\tGames_Played\tLast_update\tH2H_Data\r\n\
             1100\tBob\t3\t2\t0\t1520.1\t99.2\t52.31\t5\t\tnot json\r\n",
            "gen1ou",
        );
        assert_eq!(rows.len(), 1);
        assert!(rows[0].h2h.is_empty());
        assert_eq!(rows[0].gxe, Gxe::Percent(52.31));
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = Vec::new();
        {
            let mut store = store_in(dir.path());
            store.update_rating("Alice", "Bob", 1.0, &mut sink);
            store.update_rating("Alice", "Carol", 1.0, &mut sink);
        }

        let mut store = store_in(dir.path());
        let rows = store.rows().to_vec();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].id, "alice");
        assert_eq!(rows[0].wins, 2);
        assert_eq!(rows[0].h2h_against("bob"), H2hRecord { w: 1, l: 0, t: 0 });
        assert_eq!(rows[0].h2h_against("carol"), H2hRecord { w: 1, l: 0, t: 0 });
        // elo is non-increasing
        assert!(rows.windows(2).all(|w| w[0].elo >= w[1].elo));
    }

    #[test]
    fn registry_shares_one_store_per_format() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            LadderRegistry::new(Configuration::new().with_data_dir(dir.path()));
        let a = registry.ladder("gen1ou");
        let b = registry.ladder("gen1ou");
        assert!(Arc::ptr_eq(&a, &b));
        let other = registry.ladder("gen2ou");
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
