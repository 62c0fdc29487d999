//! heliowatch CLI - space-weather checker and prediction scorecard.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use heliowatch_checker::baserate;
use heliowatch_checker::config::CheckerConfig;
use heliowatch_checker::fetch::FetchSet;
use heliowatch_checker::pipeline::Checker;
use heliowatch_checker::predict::{FilePredictionStorage, PredictionStorage, SubmitOutcome};
use heliowatch_checker::state::StateStore;
use heliowatch_checker::view::{alerts_view, predictions_view};
use heliowatch_notify::Dispatcher;

/// heliowatch - monitor space weather and score your storm predictions.
#[derive(Parser)]
#[command(name = "heliowatch")]
#[command(about = "Space-weather monitor and alerting daemon")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for state, predictions, lockfile, and log
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single checker tick (invoke from cron every ~15 minutes)
    Check,

    /// Submit a prediction that something significant is coming
    Predict {
        /// Optional note describing what you expect
        #[arg(long)]
        note: Option<String>,
    },

    /// List predictions and the scorecard
    Predictions {
        /// Limit listed predictions
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Compute the event base rate from multi-year history (one-shot)
    BaseRate {
        /// Years of history to sample across
        #[arg(long, default_value = "5")]
        years: u32,

        /// Number of random windows to sample
        #[arg(long, default_value = "2000")]
        samples: u64,
    },

    /// Show checker status: health, current values, recent alerts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CheckerConfig::from_env(&cli.data_dir);

    init_tracing(cli.verbose, &config)?;

    match cli.command {
        Commands::Check => run_check(config).await,
        Commands::Predict { note } => run_predict(config, note).await,
        Commands::Predictions { limit } => run_predictions(config, limit).await,
        Commands::BaseRate { years, samples } => run_base_rate(config, years, samples).await,
        Commands::Status => run_status(&config),
    }
}

fn init_tracing(verbose: bool, config: &CheckerConfig) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("heliowatch_checker=debug,heliowatch_notify=debug,info")
    } else {
        EnvFilter::new("heliowatch_checker=info,heliowatch_notify=info,warn")
    };

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
        .with_context(|| format!("opening log file {}", config.log_path().display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
        .init();

    Ok(())
}

fn build_checker(config: CheckerConfig) -> Checker {
    let dispatcher = Dispatcher::from_env(config.routing.clone());
    let storage = Box::new(FilePredictionStorage::new(config.prediction_path()));
    Checker::new(config, dispatcher, storage)
}

async fn run_check(config: CheckerConfig) -> Result<()> {
    let checker = build_checker(config);
    let summary = checker.run_tick().await?;

    if summary.lock_busy {
        println!("Another checker holds the lock; nothing to do.");
        return Ok(());
    }

    println!("\n🛰  Checker Tick Summary");
    println!("   Sources healthy: {}/5", summary.sources_ok);
    println!("   Candidate alerts: {}", summary.candidates);
    println!("   Dispatched: {}", summary.dispatched);
    println!("   Channel sends delivered: {}", summary.delivered);
    if summary.verified > 0 {
        println!("   Predictions verified: {}", summary.verified);
    }

    Ok(())
}

async fn run_predict(config: CheckerConfig, note: Option<String>) -> Result<()> {
    let checker = build_checker(config);
    match checker.submit_prediction(note).await? {
        SubmitOutcome::Accepted(prediction) => {
            println!("✅ Prediction {} recorded.", prediction.id);
            println!(
                "   Window closes {} ({}h).",
                prediction.window_end.format("%Y-%m-%d %H:%M UTC"),
                prediction.window_hours
            );
        }
        SubmitOutcome::OnCooldown { cooldown_ends } => {
            println!(
                "⏳ Prediction cooldown active until {}.",
                cooldown_ends.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }
    Ok(())
}

async fn run_predictions(config: CheckerConfig, limit: usize) -> Result<()> {
    let storage = FilePredictionStorage::new(config.prediction_path());
    let state = storage.load().await?;
    let view = predictions_view(&state, chrono::Utc::now());

    println!("🔮 Predictions ({} total)\n", view.predictions.len());
    for prediction in view.predictions.iter().take(limit) {
        let status = match prediction.status {
            heliowatch_checker::predict::PredictionStatus::Pending => "pending",
            heliowatch_checker::predict::PredictionStatus::Hit => "HIT",
            heliowatch_checker::predict::PredictionStatus::Miss => "miss",
        };
        println!(
            "   {} [{}] {}",
            prediction.timestamp.format("%Y-%m-%d %H:%M"),
            status,
            prediction.note.as_deref().unwrap_or("-")
        );
        for event in &prediction.matched_events {
            println!(
                "      · {} ({})",
                event.description,
                event.timestamp.format("%m-%d %H:%M")
            );
        }
    }

    let card = &view.scorecard;
    println!(
        "\n   Scorecard: {} hits / {} misses / {} pending",
        card.hits, card.misses, card.pending
    );
    if let Some(rate) = card.hit_rate {
        println!("   Hit rate: {:.0}%", rate * 100.0);
    }
    println!("   Days tracked: {}", card.total_days_tracked);
    match (view.config.base_rate, card.p_value) {
        (Some(base), Some(p)) => {
            println!("   Base rate: {:.1}% | p-value: {p:.4}", base * 100.0);
        }
        (Some(base), None) => println!("   Base rate: {:.1}%", base * 100.0),
        _ => println!("   Base rate: not computed (run `heliowatch base-rate`)"),
    }

    Ok(())
}

async fn run_base_rate(config: CheckerConfig, years: u32, samples: u64) -> Result<()> {
    println!("📈 Sampling {samples} windows across {years} years of history...");

    let fetch_set = FetchSet::new(&config)?;
    let storage = FilePredictionStorage::new(config.prediction_path());
    let mut state = storage.load().await?;

    let outcome = baserate::compute_base_rate(
        &fetch_set,
        years,
        samples,
        state.config.verification_window_hours,
    )
    .await?;

    state.config.base_rate = Some(outcome.base_rate);
    state.config.base_rate_computed_at = Some(chrono::Utc::now());
    state.config.base_rate_sample_windows = Some(outcome.sample_windows);
    storage.save(&state).await?;

    println!("✅ Base rate: {:.1}%", outcome.base_rate * 100.0);
    println!(
        "   {} significant events over {} days, {} sampled windows",
        outcome.events_considered, outcome.span_days, outcome.sample_windows
    );

    Ok(())
}

fn run_status(config: &CheckerConfig) -> Result<()> {
    let store = StateStore::new(config);
    let state = store.exists().then(|| store.load());
    let view = alerts_view(state.as_ref());

    if !view.checker_active {
        println!("🔴 Checker has never run (no state file at {}).", config.state_path().display());
        return Ok(());
    }

    match view.last_run {
        Some(last) => println!("🟢 Last run: {}", last.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("🟡 State present but no completed run recorded."),
    }

    println!("\n   Current values:");
    if let Some(kp) = view.current_values.kp {
        println!("     Kp: {kp:.1}");
    }
    if let Some(bz) = view.current_values.bz {
        println!("     Bz: {bz:.1} nT");
    }
    if let Some(speed) = view.current_values.wind_speed {
        println!("     Wind: {speed:.0} km/s");
    }
    if let Some(density) = view.current_values.wind_density {
        println!("     Density: {density:.0} p/cm³");
    }

    println!("\n   Sources:");
    for (source, health) in &view.health {
        let light = if health.ok { "🟢" } else { "🔴" };
        let detail = match (&health.last_error, health.last_success) {
            (Some(err), _) => format!(" ({err})"),
            (None, Some(at)) => format!(" (ok at {})", at.format("%H:%M")),
            _ => String::new(),
        };
        println!("     {light} {source}{detail}");
    }

    if !view.alerts.is_empty() {
        println!("\n   Recent alerts:");
        for alert in view.alerts.iter().take(10) {
            println!(
                "     {} [{}] {}",
                alert.timestamp.format("%m-%d %H:%M"),
                alert.urgency,
                alert.title
            );
        }
    }

    Ok(())
}
