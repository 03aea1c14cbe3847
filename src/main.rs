use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{info, warn};

mod betting;
mod config;
mod data;
mod db;
mod error;
mod model;

use betting::backtest::{results_path, write_results};
use betting::recommend::save_recommendations;
use betting::{recommend, run_backtest, BetSettings, LiveSettings, OddsTable, Slate};
use config::{BetsCommand, Command, Config};
use db::models::{parse_bet_id, NewBet};
use db::{Database, History};
use model::{train, ModelStore, TrainOptions};

fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = ModelStore::new(&config.model_dir);

    match config.command {
        Command::Train { data: paths } => {
            let mut events = Vec::new();
            for path in &paths {
                let season = data::load_historical(path)?;
                info!("Loaded {} games from {}", season.len(), path.display());
                events.extend(season);
            }
            let (model, report) = train(&events, &TrainOptions::default())?;
            println!("{}", report);
            let archive = store.save(&model)?;
            info!("✅ Model ready ({})", archive.display());
        }

        Command::Predict {
            games,
            odds,
            date,
            live_min_edge,
            stake,
        } => {
            let model = store
                .load_latest()
                .context("Train a model first with `yrfi-edge train --data <season.csv>`")?;
            let mut slate = data::load_prospective(&games)?;
            if let Some(day) = date {
                slate.retain(|g| g.game.date == day);
                info!("{} games scheduled on {}", slate.len(), day);
            }
            if slate.is_empty() {
                warn!("No games to score");
                return Ok(());
            }
            let odds = match odds {
                Some(path) => OddsTable::load(&path)?,
                None => {
                    warn!("No odds file given; predictions only");
                    OddsTable::default()
                }
            };
            let settings = LiveSettings {
                min_edge: live_min_edge,
                stake,
            };
            let recs = recommend(&model, &slate, &odds, &settings);
            println!("{}", Slate(&recs));
            let day = date.unwrap_or_else(|| Local::now().date_naive());
            save_recommendations(&config.predictions_dir, day, &recs)?;
        }

        Command::Backtest {
            data: season,
            reference_window,
            odds,
            stake,
            min_edge,
        } => {
            let model = store
                .load_latest()
                .context("Train a model before backtesting")?;
            let events = data::load_historical(&season)?;
            let settings = BetSettings {
                odds,
                stake,
                min_edge,
            };
            let report = run_backtest(&model, &events, reference_window, &settings);
            println!("{}", report);
            write_results(&results_path(&season), &report.rows)?;
        }

        Command::Bets { action } => {
            let db = Database::open(&config.database_path)?;
            run_bets(&db, action)?;
        }
    }

    Ok(())
}

fn run_bets(db: &Database, action: BetsCommand) -> Result<()> {
    match action {
        BetsCommand::Log {
            date,
            away,
            home,
            selection,
            odds,
            stake,
            probability,
            bet_type,
            result,
            notes,
        } => {
            let bet = db.log_bet(&NewBet {
                date,
                away_team: away,
                home_team: home,
                bet_type,
                selection,
                odds,
                stake,
                model_probability: probability,
                result,
                notes,
            })?;
            println!(
                "{} logged: {} {} @ {:+} (edge {:+.1}%, {}, EV ${:+.2})",
                bet.display_id(),
                bet.game,
                bet.selection,
                bet.odds,
                bet.edge * 100.0,
                bet.edge_tier,
                bet.ev_dollars
            );
        }
        BetsCommand::Update {
            id,
            result,
            actual,
            closing_odds,
        } => {
            let bet = db.update_result(parse_bet_id(&id)?, result, actual, closing_odds)?;
            println!(
                "{} settled {} ({:+.2})",
                bet.display_id(),
                bet.result,
                bet.profit_loss
            );
        }
        BetsCommand::Stats { min_edge } => println!("{}", db.stats(min_edge)?),
        BetsCommand::History { count } => println!("{}", History(&db.history(count)?)),
        BetsCommand::Export { path } => {
            let n = db.export(&path)?;
            println!("Exported {} bets to {}", n, path.display());
        }
    }
    Ok(())
}
