use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

pub mod models;
use models::*;

use crate::betting::odds::{AmericanOdds, EdgeResult, EdgeTier};
use crate::model::calibration::{CalibrationTable, LEDGER_BINS};
use crate::model::predictor::Call;

/// Bets shown in the "recent" section of the stats report.
const RECENT_BETS: usize = 10;

/// Bet ledger backed by a single SQLite connection behind a mutex
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the ledger at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("ledger connection mutex poisoned"))
    }

    // ── Bets ─────────────────────────────────────────────────────────────────

    /// Price and insert a new bet. Returns the stored row.
    pub fn log_bet(&self, bet: &NewBet) -> Result<Bet> {
        let priced = EdgeResult::evaluate(bet.model_probability, bet.odds, bet.stake);
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO bets (
                    date, game, home_team, away_team, bet_type, selection,
                    odds, stake, model_probability, implied_probability, edge,
                    edge_tier, ev_dollars, ev_percent, result, profit_loss,
                    actual_occurred, notes, logged_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
                params![
                    bet.date,
                    bet.game(),
                    bet.home_team,
                    bet.away_team,
                    bet.bet_type,
                    bet.selection.to_string(),
                    bet.odds.value(),
                    bet.stake,
                    bet.model_probability,
                    priced.implied_probability,
                    priced.edge,
                    priced.tier.label(),
                    priced.expected_value,
                    priced.ev_pct,
                    bet.result,
                    bet.result.profit(bet.odds, bet.stake),
                    run_scored(bet.selection == Call::Yes, bet.result),
                    bet.notes,
                    Utc::now(),
                ],
            )?;
            conn.last_insert_rowid()
        };
        info!(
            "Logged {}: {} {} @ {} for ${:.2} (edge {:+.1}%, {})",
            format_bet_id(id),
            bet.game(),
            bet.selection,
            bet.odds,
            bet.stake,
            priced.edge_pct,
            priced.tier
        );
        self.get_bet(id)?
            .ok_or_else(|| anyhow!("bet {} vanished after insert", format_bet_id(id)))
    }

    pub fn get_bet(&self, id: i64) -> Result<Option<Bet>> {
        let conn = self.conn()?;
        let bet = conn
            .query_row(
                &format!("SELECT {} FROM bets WHERE id = ?1", BET_COLUMNS),
                params![id],
                map_bet,
            )
            .optional()?;
        Ok(bet)
    }

    /// Settle a bet. Profit follows the result (WIN pays the win amount, LOSS
    /// costs the stake, PUSH is zero). Whether a run actually scored is
    /// inferred from the selection unless given; a closing price records
    /// whether the bet beat the closing line.
    pub fn update_result(
        &self,
        id: i64,
        result: BetResult,
        actual_occurred: Option<bool>,
        closing_odds: Option<AmericanOdds>,
    ) -> Result<Bet> {
        let Some(bet) = self.get_bet(id)? else {
            bail!("bet {} not found", format_bet_id(id));
        };
        let odds = AmericanOdds::new(bet.odds)?;
        let profit = result.profit(odds, bet.stake);
        let backed_yes = bet.selection.eq_ignore_ascii_case("YES");
        let actual = actual_occurred.or(run_scored(backed_yes, result));
        let beat_closing = closing_odds.map(|c| odds.implied_probability() < c.implied_probability());

        self.conn()?.execute(
            "UPDATE bets SET result=?1, profit_loss=?2, actual_occurred=?3,
                    closing_odds=COALESCE(?4, closing_odds),
                    beat_closing_line=COALESCE(?5, beat_closing_line)
             WHERE id=?6",
            params![
                result,
                profit,
                actual,
                closing_odds.map(|c| c.value()),
                beat_closing,
                id
            ],
        )?;
        info!("Updated {}: {} ({:+.2})", format_bet_id(id), result, profit);
        self.get_bet(id)?
            .ok_or_else(|| anyhow!("bet {} vanished after update", format_bet_id(id)))
    }

    /// All bets in the order they were logged
    pub fn list_bets(&self) -> Result<Vec<Bet>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM bets ORDER BY id", BET_COLUMNS))?;
        let bets = stmt
            .query_map([], map_bet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bets)
    }

    /// The last `n` bets, oldest first
    pub fn history(&self, n: usize) -> Result<Vec<Bet>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bets ORDER BY id DESC LIMIT ?1",
            BET_COLUMNS
        ))?;
        let mut bets = stmt
            .query_map(params![n as i64], map_bet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        bets.reverse();
        Ok(bets)
    }

    /// Write every bet to `path` as CSV. Returns the number of rows.
    pub fn export(&self, path: &Path) -> Result<usize> {
        let bets = self.list_bets()?;
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for bet in &bets {
            wtr.serialize(bet)?;
        }
        wtr.flush()?;
        info!("Exported {} bets to {}", bets.len(), path.display());
        Ok(bets.len())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    /// Performance over settled bets. A value bet has `edge >= min_edge`.
    pub fn stats(&self, min_edge: f64) -> Result<LedgerStats> {
        let (pending, total_logged): (i64, i64) = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT COALESCE(SUM(result = 'PENDING'), 0), COUNT(*) FROM bets",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?
        };
        let settled: Vec<Bet> = self
            .list_bets()?
            .into_iter()
            .filter(|b| b.result.is_settled())
            .collect();
        Ok(LedgerStats::from_settled(
            settled,
            min_edge,
            pending as usize,
            total_logged as usize,
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub total_logged: usize,
    pub pending: usize,
    pub overall: Record,
    pub value_bets: Option<ValueBetStats>,
    /// Best tier first; tiers without settled bets are omitted
    pub tiers: Vec<TierStats>,
    pub calibration: CalibrationTable,
    pub recent: Vec<Bet>,
}

impl LedgerStats {
    pub fn from_settled(settled: Vec<Bet>, min_edge: f64, pending: usize, total_logged: usize) -> Self {
        let mut overall = Record::default();
        settled.iter().for_each(|b| overall.add(b));

        let value: Vec<&Bet> = settled.iter().filter(|b| b.edge >= min_edge).collect();
        let value_bets = (!value.is_empty()).then(|| {
            let mut record = Record::default();
            value.iter().for_each(|b| record.add(b));
            ValueBetStats {
                min_edge,
                avg_edge_pct: value.iter().map(|b| b.edge).sum::<f64>() / value.len() as f64 * 100.0,
                expected_wins: value.iter().map(|b| b.model_probability).sum(),
                record,
            }
        });

        let tiers = EdgeTier::ALL
            .iter()
            .filter_map(|tier| {
                let in_tier: Vec<&Bet> = settled
                    .iter()
                    .filter(|b| b.edge_tier == tier.label())
                    .collect();
                if in_tier.is_empty() {
                    return None;
                }
                let mut record = Record::default();
                in_tier.iter().for_each(|b| record.add(b));
                Some(TierStats {
                    tier: tier.label().to_string(),
                    avg_edge_pct: in_tier.iter().map(|b| b.edge).sum::<f64>() / in_tier.len() as f64
                        * 100.0,
                    record,
                })
            })
            .collect();

        let samples: Vec<(f64, f64)> = settled
            .iter()
            .filter_map(|b| {
                b.actual_occurred
                    .map(|a| (b.model_probability, if a { 1.0 } else { 0.0 }))
            })
            .collect();
        let calibration = CalibrationTable::from_samples(&samples, &LEDGER_BINS);

        let skip = settled.len().saturating_sub(RECENT_BETS);
        let recent = settled.into_iter().skip(skip).collect();

        LedgerStats {
            total_logged,
            pending,
            overall,
            value_bets,
            tiers,
            calibration,
            recent,
        }
    }
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(70);
        writeln!(f, "{}", "=".repeat(70))?;
        writeln!(f, "BET TRACKING STATISTICS")?;
        writeln!(f, "{}", "=".repeat(70))?;
        if self.overall.bets == 0 {
            writeln!(
                f,
                "No completed bets yet ({} logged, {} pending)",
                self.total_logged, self.pending
            )?;
            return Ok(());
        }

        let o = &self.overall;
        writeln!(f, "\nOVERALL PERFORMANCE:")?;
        writeln!(f, "   Total Bets: {} ({} pending)", o.bets, self.pending)?;
        writeln!(f, "   Record: {}W - {}L - {}P", o.wins, o.losses, o.pushes)?;
        writeln!(f, "   Win Rate: {:.1}%", o.win_rate())?;
        writeln!(f, "   Total Staked: ${:.2}", o.staked)?;
        writeln!(f, "   Total Profit: ${:+.2}", o.profit)?;
        writeln!(f, "   ROI: {:+.1}%", o.roi())?;

        match &self.value_bets {
            Some(v) => {
                writeln!(f, "\nVALUE BETS PERFORMANCE (Edge >= {:.0}%):", v.min_edge * 100.0)?;
                writeln!(f, "{}", rule)?;
                let r = &v.record;
                writeln!(f, "   Value Bets Placed: {}", r.bets)?;
                writeln!(f, "   Record: {}W - {}L", r.wins, r.losses)?;
                writeln!(f, "   Win Rate: {:.1}%", r.win_rate())?;
                writeln!(f, "   Average Edge: {:+.1}%", v.avg_edge_pct)?;
                writeln!(f, "   Total Profit: ${:+.2}", r.profit)?;
                writeln!(f, "   ROI: {:+.1}%", r.roi())?;
                writeln!(f, "   Expected Wins (per model): {:.1}", v.expected_wins)?;
                writeln!(f, "   Actual Wins: {}", r.wins)?;
                writeln!(f, "   Difference: {:+.1}", r.wins as f64 - v.expected_wins)?;
            }
            None => writeln!(f, "\nNo settled value bets yet")?,
        }

        writeln!(f, "\nPERFORMANCE BY EDGE TIER:")?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "{:<18} {:>5} {:>5} {:>9} {:>10} {:>9} {:>6} {:>7}",
            "Tier", "Bets", "Wins", "Staked", "Profit", "Avg Edge", "Win%", "ROI%"
        )?;
        for t in &self.tiers {
            writeln!(
                f,
                "{:<18} {:>5} {:>5} {:>9.2} {:>+10.2} {:>+8.1}% {:>6.1} {:>+7.1}",
                t.tier,
                t.record.bets,
                t.record.wins,
                t.record.staked,
                t.record.profit,
                t.avg_edge_pct,
                t.record.win_rate(),
                t.record.roi()
            )?;
        }

        writeln!(f, "\nMODEL CALIBRATION:")?;
        writeln!(f, "{}", rule)?;
        if self.calibration.bins.is_empty() {
            writeln!(f, "Not enough data yet (record actual outcomes)")?;
        } else {
            write!(f, "{}", self.calibration)?;
        }

        writeln!(f, "\nRECENT PERFORMANCE (Last {} Bets):", RECENT_BETS)?;
        writeln!(f, "{}", rule)?;
        for b in &self.recent {
            writeln!(
                f,
                "{} {:<34} {:<3} {:>5} {:>+6.1}% {:<5} {:>+8.2}",
                b.date, b.game, b.selection, b.odds, b.edge * 100.0, b.result, b.profit_loss
            )?;
        }
        Ok(())
    }
}

/// Console rendering of `history`.
pub struct History<'a>(pub &'a [Bet]);

impl fmt::Display for History<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(70))?;
        writeln!(f, "BET HISTORY (Last {} bets)", self.0.len())?;
        writeln!(f, "{}", "=".repeat(70))?;
        for b in self.0 {
            writeln!(
                f,
                "{} {} {:<34} {:<3} {:>5} ${:>7.2} {:>+6.1}% {:<16} {:<7} {:>+8.2}",
                b.display_id(),
                b.date,
                b.game,
                b.selection,
                b.odds,
                b.stake,
                b.edge * 100.0,
                b.edge_tier,
                b.result,
                b.profit_loss
            )?;
        }
        Ok(())
    }
}

/// Whether a first-inning run scored, as implied by a settled result.
fn run_scored(backed_yes: bool, result: BetResult) -> Option<bool> {
    match result {
        BetResult::Win => Some(backed_yes),
        BetResult::Loss => Some(!backed_yes),
        BetResult::Push | BetResult::Pending => None,
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const BET_COLUMNS: &str = "id, date, game, home_team, away_team, bet_type, selection, odds, stake,
    model_probability, implied_probability, edge, edge_tier, ev_dollars, ev_percent,
    result, profit_loss, actual_occurred, closing_odds, beat_closing_line, notes, logged_at";

fn map_bet(row: &rusqlite::Row) -> rusqlite::Result<Bet> {
    Ok(Bet {
        id: row.get(0)?,
        date: row.get(1)?,
        game: row.get(2)?,
        home_team: row.get(3)?,
        away_team: row.get(4)?,
        bet_type: row.get(5)?,
        selection: row.get(6)?,
        odds: row.get(7)?,
        stake: row.get(8)?,
        model_probability: row.get(9)?,
        implied_probability: row.get(10)?,
        edge: row.get(11)?,
        edge_tier: row.get(12)?,
        ev_dollars: row.get(13)?,
        ev_percent: row.get(14)?,
        result: row.get(15)?,
        profit_loss: row.get(16)?,
        actual_occurred: row.get(17)?,
        closing_odds: row.get(18)?,
        beat_closing_line: row.get(19)?,
        notes: row.get(20)?,
        logged_at: row.get(21)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS bets (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    date                TEXT    NOT NULL,
    game                TEXT    NOT NULL,
    home_team           TEXT    NOT NULL,
    away_team           TEXT    NOT NULL,
    bet_type            TEXT    NOT NULL DEFAULT 'First Inning Run',
    selection           TEXT    NOT NULL CHECK (selection IN ('YES', 'NO')),
    odds                INTEGER NOT NULL,
    stake               REAL    NOT NULL,
    model_probability   REAL    NOT NULL,
    implied_probability REAL    NOT NULL,
    edge                REAL    NOT NULL,
    edge_tier           TEXT    NOT NULL,
    ev_dollars          REAL    NOT NULL,
    ev_percent          REAL    NOT NULL,
    result              TEXT    NOT NULL DEFAULT 'PENDING',
    profit_loss         REAL    NOT NULL DEFAULT 0,
    actual_occurred     INTEGER,
    closing_odds        INTEGER,
    beat_closing_line   INTEGER,
    notes               TEXT,
    logged_at           TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bets_result ON bets(result);
CREATE INDEX IF NOT EXISTS idx_bets_date ON bets(date);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn new_bet(selection: Call, odds: i32, p: f64) -> NewBet {
        NewBet {
            date: NaiveDate::from_ymd_opt(2024, 8, 12).unwrap(),
            away_team: "Philadelphia Phillies".into(),
            home_team: "Atlanta Braves".into(),
            bet_type: DEFAULT_BET_TYPE.into(),
            selection,
            odds: AmericanOdds::new(odds).unwrap(),
            stake: 100.0,
            model_probability: p,
            result: BetResult::Pending,
            notes: None,
        }
    }

    #[test]
    fn ids_are_monotonic_and_displayed_padded() {
        let db = Database::open_in_memory().unwrap();
        let a = db.log_bet(&new_bet(Call::Yes, -110, 0.6)).unwrap();
        let b = db.log_bet(&new_bet(Call::No, 120, 0.5)).unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.display_id(), "BET0001");
        assert_eq!(b.display_id(), "BET0002");
        assert_eq!(parse_bet_id("BET0002").unwrap(), 2);
        assert_eq!(parse_bet_id("bet2").unwrap(), 2);
        assert!(parse_bet_id("BETX").is_err());
    }

    #[test]
    fn logged_bet_is_priced() {
        let db = Database::open_in_memory().unwrap();
        let bet = db.log_bet(&new_bet(Call::Yes, -110, 0.6)).unwrap();
        assert_eq!(bet.game, "Philadelphia Phillies @ Atlanta Braves");
        assert_relative_eq!(bet.implied_probability, 0.5238, epsilon = 1e-4);
        assert_relative_eq!(bet.edge, 0.0762, epsilon = 1e-4);
        assert_eq!(bet.edge_tier, "Great (7-10%)");
        assert_relative_eq!(bet.ev_dollars, 14.545, epsilon = 1e-3);
        assert_eq!(bet.result, BetResult::Pending);
        assert_relative_eq!(bet.profit_loss, 0.0);
        assert_eq!(bet.actual_occurred, None);

        let mut known = new_bet(Call::No, -110, 0.55);
        known.result = BetResult::Loss;
        let settled = db.log_bet(&known).unwrap();
        assert_relative_eq!(settled.profit_loss, -100.0);
        assert_eq!(settled.actual_occurred, Some(true));
    }

    #[test]
    fn settling_computes_profit() {
        let db = Database::open_in_memory().unwrap();
        let a = db.log_bet(&new_bet(Call::Yes, -110, 0.6)).unwrap();
        let b = db.log_bet(&new_bet(Call::No, 150, 0.45)).unwrap();
        let c = db.log_bet(&new_bet(Call::Yes, -120, 0.55)).unwrap();

        let won = db.update_result(a.id, BetResult::Win, None, None).unwrap();
        assert_relative_eq!(won.profit_loss, 100.0 * 100.0 / 110.0, epsilon = 1e-9);
        assert_eq!(won.actual_occurred, Some(true));

        let lost = db.update_result(b.id, BetResult::Loss, None, None).unwrap();
        assert_relative_eq!(lost.profit_loss, -100.0);
        // Lost an NRFI bet: a run scored
        assert_eq!(lost.actual_occurred, Some(true));

        let push = db.update_result(c.id, BetResult::Push, None, None).unwrap();
        assert_relative_eq!(push.profit_loss, 0.0);
        assert_eq!(push.actual_occurred, None);

        assert!(db.update_result(99, BetResult::Win, None, None).is_err());
    }

    #[test]
    fn closing_line_value_is_recorded() {
        let db = Database::open_in_memory().unwrap();
        let a = db.log_bet(&new_bet(Call::Yes, -110, 0.6)).unwrap();
        let closing = AmericanOdds::new(-125).unwrap();
        let settled = db.update_result(a.id, BetResult::Win, None, Some(closing)).unwrap();
        assert_eq!(settled.closing_odds, Some(-125));
        assert_eq!(settled.beat_closing_line, Some(true));
    }

    #[test]
    fn stats_split_value_bets_and_tiers() {
        let db = Database::open_in_memory().unwrap();
        // Great edge, won
        let a = db.log_bet(&new_bet(Call::Yes, -110, 0.60)).unwrap();
        // Marginal edge, lost
        let b = db.log_bet(&new_bet(Call::Yes, -110, 0.54)).unwrap();
        // Excellent edge, won
        let c = db.log_bet(&new_bet(Call::No, 100, 0.62)).unwrap();
        // Still pending
        db.log_bet(&new_bet(Call::Yes, -110, 0.70)).unwrap();

        db.update_result(a.id, BetResult::Win, None, None).unwrap();
        db.update_result(b.id, BetResult::Loss, None, None).unwrap();
        db.update_result(c.id, BetResult::Win, None, None).unwrap();

        let stats = db.stats(0.03).unwrap();
        assert_eq!(stats.total_logged, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.overall.bets, 3);
        assert_eq!(stats.overall.wins, 2);
        assert_relative_eq!(stats.overall.win_rate(), 200.0 / 3.0, epsilon = 1e-9);

        let v = stats.value_bets.as_ref().unwrap();
        assert_eq!(v.record.bets, 2);
        assert_relative_eq!(v.expected_wins, 1.22, epsilon = 1e-9);

        let tiers: Vec<&str> = stats.tiers.iter().map(|t| t.tier.as_str()).collect();
        assert_eq!(tiers, vec!["Excellent (10%+)", "Great (7-10%)", "Marginal (0-3%)"]);

        let binned: usize = stats.calibration.bins.iter().map(|b| b.count).sum();
        assert_eq!(binned, 3);
        assert_eq!(stats.recent.len(), 3);
    }

    #[test]
    fn history_returns_latest_in_order() {
        let db = Database::open_in_memory().unwrap();
        for p in [0.5, 0.55, 0.6, 0.65] {
            db.log_bet(&new_bet(Call::Yes, -110, p)).unwrap();
        }
        let h = db.history(2).unwrap();
        assert_eq!(h.iter().map(|b| b.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn result_parsing() {
        assert_eq!("win".parse::<BetResult>().unwrap(), BetResult::Win);
        assert_eq!("PUSH".parse::<BetResult>().unwrap(), BetResult::Push);
        assert!("maybe".parse::<BetResult>().is_err());
    }
}
