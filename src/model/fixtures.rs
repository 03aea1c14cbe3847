//! Synthetic seasons for tests.
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::models::{GameInfo, HistoricalEvent};

const TEAMS: [&str; 6] = [
    "Atlanta Braves",
    "Philadelphia Phillies",
    "New York Mets",
    "Miami Marlins",
    "Washington Nationals",
    "Chicago Cubs",
];
const VENUES: [&str; 6] = [
    "Truist Park",
    "Citizens Bank Park",
    "Citi Field",
    "loanDepot park",
    "Nationals Park",
    "Wrigley Field",
];

/// Two starters per team, second one noticeably worse.
fn pitcher(team: usize, slot: usize) -> (String, f64) {
    let name = format!("{} Starter {}", TEAMS[team].split(' ').last().unwrap_or("X"), slot + 1);
    let quality = (team as f64 - 2.5) * 0.3 + slot as f64 * 0.8;
    (name, quality)
}

pub(crate) fn game(i: usize, rng: &mut StdRng) -> (GameInfo, f64) {
    let home = i % TEAMS.len();
    let away = (home + 1 + (i / TEAMS.len()) % (TEAMS.len() - 1)) % TEAMS.len();
    let slot = (i / TEAMS.len()) % 2;
    let (home_pitcher, hq) = pitcher(home, slot);
    let (away_pitcher, aq) = pitcher(away, 1 - slot);
    let temperature = if i % 13 == 0 {
        None
    } else {
        Some(55.0 + rng.gen_range(0.0..35.0f64).round())
    };
    let wind = format!("{} mph", rng.gen_range(0..20));
    let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap_or_default();
    let info = GameInfo {
        date: start + Duration::days((i / 3) as i64),
        home_team: TEAMS[home].to_string(),
        away_team: TEAMS[away].to_string(),
        home_pitcher,
        away_pitcher,
        venue: Some(VENUES[home].to_string()),
        temperature,
        wind: Some(wind),
    };
    let heat = (temperature.unwrap_or(72.0) - 70.0) / 30.0;
    (info, hq + aq + heat)
}

/// `n` games in date order, exactly `yes_count` of which saw a first-inning
/// run. Outcomes follow starter quality and temperature plus noise, so a model
/// has something to learn.
pub(crate) fn season(n: usize, yes_count: usize, seed: u64) -> Vec<HistoricalEvent> {
    let mut rng = StdRng::seed_from_u64(seed);
    let games: Vec<(GameInfo, f64)> = (0..n)
        .map(|i| {
            let (g, signal) = game(i, &mut rng);
            (g, signal + rng.gen_range(-1.0..1.0))
        })
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| games[b].1.total_cmp(&games[a].1));
    let mut yes = vec![false; n];
    for &i in order.iter().take(yes_count) {
        yes[i] = true;
    }

    games
        .into_iter()
        .enumerate()
        .map(|(i, (g, _))| {
            let (rh, ra) = if yes[i] {
                if rng.gen_bool(0.5) {
                    (rng.gen_range(1..3), 0)
                } else {
                    (0, 1)
                }
            } else {
                (0, 0)
            };
            HistoricalEvent::new(format!("G{:04}", i + 1), g, rh, ra)
        })
        .collect()
}
