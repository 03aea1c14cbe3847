//! CSV ingestion for historical and prospective games.
//!
//! Every optional column is resolved here, once, into the typed records in
//! [`models`]. Downstream code never checks for column presence.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub mod models;
use models::*;

use crate::error::ModelError;

/// Raw historical row. All fields are optional strings so that a malformed
/// optional value degrades to its default instead of failing the whole row.
#[derive(Debug, Deserialize)]
struct HistoricalRecord {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    home_team: Option<String>,
    #[serde(default)]
    away_team: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    temperature: Option<String>,
    #[serde(default)]
    wind: Option<String>,
    #[serde(default)]
    home_pitcher: Option<String>,
    #[serde(default)]
    away_pitcher: Option<String>,
    /// Older exports name the starters this way; used only when
    /// `home_pitcher` is absent or blank.
    #[serde(default)]
    home_starter: Option<String>,
    #[serde(default)]
    away_starter: Option<String>,
    #[serde(default)]
    first_inning_runs_home: Option<String>,
    #[serde(default)]
    first_inning_runs_away: Option<String>,
    #[serde(default)]
    first_inning_run_scored: Option<String>,
    #[serde(default)]
    final_score_home: Option<String>,
    #[serde(default)]
    final_score_away: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProspectiveRecord {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    home_team: Option<String>,
    #[serde(default)]
    away_team: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    temperature: Option<String>,
    #[serde(default)]
    wind: Option<String>,
    #[serde(default)]
    home_pitcher: Option<String>,
    #[serde(default)]
    away_pitcher: Option<String>,
    #[serde(default)]
    home_starter: Option<String>,
    #[serde(default)]
    away_starter: Option<String>,
    #[serde(default)]
    game_time: Option<String>,
}

/// Load completed games from a CSV file.
pub fn load_historical<P: AsRef<Path>>(path: P) -> Result<Vec<HistoricalEvent>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let events =
        read_historical(file).with_context(|| format!("reading {}", path.display()))?;
    info!("Loaded {} games from {}", events.len(), path.display());
    Ok(events)
}

/// Load upcoming games from a CSV file.
pub fn load_prospective<P: AsRef<Path>>(path: P) -> Result<Vec<ProspectiveEvent>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let games =
        read_prospective(file).with_context(|| format!("reading {}", path.display()))?;
    info!("Loaded {} upcoming games from {}", games.len(), path.display());
    Ok(games)
}

pub fn read_historical<R: Read>(reader: R) -> Result<Vec<HistoricalEvent>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut events = Vec::new();
    let mut repaired = 0usize;
    for (idx, record) in rdr.deserialize::<HistoricalRecord>().enumerate() {
        let row = idx + 1;
        let record = record.with_context(|| format!("row {}: unreadable record", row))?;
        let (event, was_repaired) = historical_from_record(idx, record)?;
        if was_repaired {
            repaired += 1;
        }
        events.push(event);
    }
    if repaired > 0 {
        warn!(
            "Recomputed first_inning_run_scored for {} row(s) (flag absent or inconsistent with runs)",
            repaired
        );
    }
    Ok(events)
}

pub fn read_prospective<R: Read>(reader: R) -> Result<Vec<ProspectiveEvent>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut games = Vec::new();
    for (idx, record) in rdr.deserialize::<ProspectiveRecord>().enumerate() {
        let row = idx + 1;
        let r = record.with_context(|| format!("row {}: unreadable record", row))?;
        let game = GameInfo {
            date: parse_date(row, r.date)?,
            home_team: required(row, "home_team", r.home_team)?,
            away_team: required(row, "away_team", r.away_team)?,
            home_pitcher: pitcher_or_unknown(r.home_pitcher, r.home_starter),
            away_pitcher: pitcher_or_unknown(r.away_pitcher, r.away_starter),
            venue: non_empty(r.venue),
            temperature: parse_lenient_f64(r.temperature.as_deref()),
            wind: non_empty(r.wind),
        };
        games.push(ProspectiveEvent {
            game_id: non_empty(r.game_id).unwrap_or_else(|| idx.to_string()),
            game,
            game_time: non_empty(r.game_time),
        });
    }
    Ok(games)
}

/// Returns the typed event and whether the stored flag had to be repaired.
fn historical_from_record(
    idx: usize,
    r: HistoricalRecord,
) -> Result<(HistoricalEvent, bool), ModelError> {
    let row = idx + 1;
    let game = GameInfo {
        date: parse_date(row, r.date)?,
        home_team: required(row, "home_team", r.home_team)?,
        away_team: required(row, "away_team", r.away_team)?,
        home_pitcher: pitcher_or_unknown(r.home_pitcher, r.home_starter),
        away_pitcher: pitcher_or_unknown(r.away_pitcher, r.away_starter),
        venue: non_empty(r.venue),
        temperature: parse_lenient_f64(r.temperature.as_deref()),
        wind: non_empty(r.wind),
    };
    let runs_home = parse_runs(row, "first_inning_runs_home", r.first_inning_runs_home)?;
    let runs_away = parse_runs(row, "first_inning_runs_away", r.first_inning_runs_away)?;

    let mut event = HistoricalEvent::new(
        non_empty(r.game_id).unwrap_or_else(|| idx.to_string()),
        game,
        runs_home,
        runs_away,
    );
    event.final_score_home = parse_optional_count(r.final_score_home.as_deref());
    event.final_score_away = parse_optional_count(r.final_score_away.as_deref());

    let repaired = match r.first_inning_run_scored.as_deref().and_then(parse_flag) {
        Some(flag) => flag != event.run_scored(),
        None => true,
    };
    Ok((event, repaired))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn required(row: usize, field: &'static str, value: Option<String>) -> Result<String, ModelError> {
    non_empty(value).ok_or(ModelError::MissingField { row, field })
}

fn pitcher_or_unknown(pitcher: Option<String>, starter: Option<String>) -> String {
    non_empty(pitcher)
        .or_else(|| non_empty(starter))
        .unwrap_or_else(|| UNKNOWN_PITCHER.to_string())
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
fn parse_date(row: usize, value: Option<String>) -> Result<NaiveDate, ModelError> {
    let raw = required(row, "date", value)?;
    let head = raw.get(..10).unwrap_or(raw.as_str());
    NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|_| ModelError::Malformed {
        row,
        field: "date",
        value: raw.clone(),
    })
}

fn parse_runs(row: usize, field: &'static str, value: Option<String>) -> Result<u32, ModelError> {
    let raw = non_empty(value).ok_or(ModelError::MissingField { row, field })?;
    parse_optional_count(Some(raw.as_str())).ok_or(ModelError::Malformed {
        row,
        field,
        value: raw,
    })
}

/// Non-negative integer counts; tolerates pandas-style "2.0".
fn parse_optional_count(value: Option<&str>) -> Option<u32> {
    let v = parse_lenient_f64(value)?;
    if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
        return None;
    }
    Some(v as u32)
}

fn parse_lenient_f64(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "1.0" | "yes" | "y" => Some(true),
        "false" | "0" | "0.0" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "game_id,date,home_team,away_team,venue,temperature,wind,home_pitcher,away_pitcher,first_inning_runs_home,first_inning_runs_away,first_inning_run_scored,final_score_home,final_score_away\n";

    #[test]
    fn reads_full_rows() {
        let csv = format!(
            "{}745001,2024-04-15,Atlanta Braves,Philadelphia Phillies,Truist Park,78,8 mph SW,Spencer Strider,Zack Wheeler,1,0,True,5,3\n",
            HEADER
        );
        let events = read_historical(csv.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.game_id, "745001");
        assert_eq!(ev.game.venue.as_deref(), Some("Truist Park"));
        assert_eq!(ev.game.temperature, Some(78.0));
        assert!(ev.run_scored());
        assert_eq!(ev.final_score_home, Some(5));
    }

    #[test]
    fn flag_is_recomputed_when_absent() {
        let csv = "date,home_team,away_team,first_inning_runs_home,first_inning_runs_away\n\
                   2024-05-01,A,B,0,0\n\
                   2024-05-02,A,B,0,2\n";
        let events = read_historical(csv.as_bytes()).unwrap();
        assert!(!events[0].run_scored());
        assert!(events[1].run_scored());
        assert_eq!(events[0].game_id, "0");
        assert_eq!(events[1].game.home_pitcher, UNKNOWN_PITCHER);
    }

    #[test]
    fn derived_flag_always_matches_runs() {
        // Stored flag contradicts the runs; the event follows the runs.
        let csv = format!(
            "{}1,2024-06-01,A,B,,,,P1,P2,0,0,True,,\n2,2024-06-02,A,B,,,,P1,P2,3,0,False,,\n",
            HEADER
        );
        for ev in read_historical(csv.as_bytes()).unwrap() {
            assert_eq!(
                ev.run_scored(),
                ev.first_inning_runs_home > 0 || ev.first_inning_runs_away > 0
            );
        }
    }

    #[test]
    fn malformed_optional_fields_fall_back_to_none() {
        let csv = format!(
            "{}1,2024-06-01,A,B,Park,N/A,calm,P1,P2,0,1,1,,\n",
            HEADER
        );
        let events = read_historical(csv.as_bytes()).unwrap();
        assert_eq!(events[0].game.temperature, None);
        assert_eq!(events[0].game.wind.as_deref(), Some("calm"));
    }

    #[test]
    fn missing_runs_is_fatal() {
        let csv = "date,home_team,away_team,first_inning_runs_home\n2024-05-01,A,B,1\n";
        let err = read_historical(csv.as_bytes()).unwrap_err();
        let model_err = err.downcast_ref::<ModelError>().expect("domain error");
        assert!(matches!(
            model_err,
            ModelError::MissingField {
                row: 1,
                field: "first_inning_runs_away"
            }
        ));
    }

    #[test]
    fn starter_alias_columns_are_accepted() {
        let csv = "date,home_team,away_team,home_starter,away_starter,first_inning_runs_home,first_inning_runs_away\n\
                   2024-05-01 19:05:00,A,B,Ace,Bum,0,0\n";
        let events = read_historical(csv.as_bytes()).unwrap();
        assert_eq!(events[0].game.home_pitcher, "Ace");
        assert_eq!(events[0].game.away_pitcher, "Bum");
        assert_eq!(events[0].game.month(), 5);
    }

    #[test]
    fn pitcher_column_wins_over_starter_column() {
        let csv = "date,home_team,away_team,home_pitcher,home_starter,away_pitcher,away_starter,first_inning_runs_home,first_inning_runs_away\n\
                   2024-05-01,A,B,Ace,Old Ace,,Bum,0,1\n";
        let events = read_historical(csv.as_bytes()).unwrap();
        assert_eq!(events[0].game.home_pitcher, "Ace");
        assert_eq!(events[0].game.away_pitcher, "Bum");

        let csv = "date,home_team,away_team,home_pitcher,home_starter\n2024-05-01,A,B,,\n";
        let games = read_prospective(csv.as_bytes()).unwrap();
        assert_eq!(games[0].game.home_pitcher, UNKNOWN_PITCHER);
    }

    #[test]
    fn prospective_rows_have_no_outcome() {
        let csv = "game_id,date,home_team,away_team,home_pitcher,away_pitcher,venue,temperature,wind,game_time\n\
                   NYY_BOS,2024-04-15,New York Yankees,Boston Red Sox,Gerrit Cole,Chris Sale,Yankee Stadium,65,12 mph NE,19:05\n";
        let games = read_prospective(csv.as_bytes()).unwrap();
        assert_eq!(games[0].game.label(), "Boston Red Sox @ New York Yankees");
        assert_eq!(games[0].game_time.as_deref(), Some("19:05"));
    }

    #[test]
    fn flag_parsing_accepts_common_spellings() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("0.0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
