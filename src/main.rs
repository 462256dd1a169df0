use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod analytics;
mod config;
mod db;
mod ensemble;
mod error;
mod features;
mod forecast;
mod models;
mod recommend;
mod registry;
mod report;
mod risk;
mod trees;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{ForecasterStatus, WellbeingRecord};
use crate::registry::ModelRegistry;

#[derive(Parser)]
#[command(name = "workwell")]
#[command(about = "Burnout risk and wellbeing trend pipeline for workplace check-ins", long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to ~/.workwell/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load deterministic synthetic users, check-ins and labels
    Seed,
    /// Record a single daily check-in
    Checkin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "General")]
        department: String,
        #[arg(long)]
        mood: i32,
        #[arg(long)]
        energy: i32,
        #[arg(long)]
        stress: i32,
        #[arg(long)]
        sleep: i32,
        #[arg(long)]
        hours: f64,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Import check-ins from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import burnout labels (email, as_of, burnout) from a CSV file
    ImportLabels {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Train the burnout classifier and trend forecaster
    Train {
        /// Train the forecaster on one user's daily series instead of the organisation's
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        window: Option<usize>,
    },
    /// Estimate a user's burnout risk
    Predict {
        #[arg(long)]
        email: String,
        #[arg(long)]
        json: bool,
    },
    /// Forecast a user's metrics for the coming days
    Forecast {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 7)]
        days: usize,
        #[arg(long)]
        json: bool,
    },
    /// List a user's recent check-ins, newest first
    History {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long)]
        json: bool,
    },
    /// Generate an organisational markdown report
    Report {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Personal wellbeing summary with current risk
    Summary {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_env("WORKWELL_LOG").unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn records_of(checkins: &[models::StoredCheckin]) -> Vec<WellbeingRecord> {
    checkins.iter().map(|c| c.record.clone()).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Checkin {
            email,
            name,
            department,
            mood,
            energy,
            stress,
            sleep,
            hours,
            notes,
        } => {
            let record = WellbeingRecord::new(mood, energy, stress, sleep, hours, Utc::now())?;
            let checkin = db::NewCheckin {
                email,
                full_name: name,
                department,
                record,
                notes,
                source_key: None,
            };
            match db::insert_checkin(&pool, &checkin).await? {
                Some(id) => println!(
                    "Check-in {id} recorded for {} (overall score {:.2}).",
                    checkin.email,
                    checkin.record.overall_score()
                ),
                None => println!("Check-in already recorded."),
            }
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&pool, &csv).await?;
            println!(
                "Inserted {} check-ins from {} ({} duplicates, {} rejected).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.rejected
            );
        }
        Commands::ImportLabels { csv } => {
            let summary = db::import_labels(&pool, &csv).await?;
            println!(
                "Stored {} labels from {} ({} rejected).",
                summary.inserted,
                csv.display(),
                summary.rejected
            );
        }
        Commands::Train { email, window } => {
            let registry = ModelRegistry::load(&config.model_dir);

            let examples = db::fetch_labeled_examples(&pool, config.predict_lookback_days).await?;
            info!(examples = examples.len(), "training burnout classifier");
            match registry.train_classifier(&examples) {
                Ok(metrics) => println!("{}", report::render_metrics(&metrics)),
                Err(err) => {
                    warn!(error = %err, "burnout classifier not trained");
                    println!("Classifier not trained: {err}.");
                }
            }

            let window = window.unwrap_or(config.forecast_window);
            let history =
                db::fetch_daily_metrics(&pool, DateTime::<Utc>::UNIX_EPOCH, email.as_deref())
                    .await?;
            match registry.train_forecaster(&history, window) {
                ForecasterStatus::Trained { rows, window } => {
                    println!("Forecaster trained on {rows} days with a {window}-day window.")
                }
                ForecasterStatus::Untrained { rows, required } => println!(
                    "Forecaster not trained: {rows} days of history, {required} required."
                ),
            }

            registry.save(&config.model_dir)?;
            println!("Models saved to {}.", config.model_dir.display());
        }
        Commands::Predict { email, json } => {
            let registry = ModelRegistry::load(&config.model_dir);
            let since = risk::cutoff(config.predict_lookback_days)?;
            let checkins = db::fetch_user_checkins(&pool, &email, since).await?;
            let assessment = risk::predict_burnout(&registry, &records_of(&checkins))?;

            if let (true, Some(latest)) = (assessment.model_ready, checkins.last()) {
                db::store_risk_score(&pool, latest.id, assessment.probability).await?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&assessment)?);
            } else {
                print!("{}", report::render_assessment(&assessment));
            }
        }
        Commands::Forecast { email, days, json } => {
            let registry = ModelRegistry::load(&config.model_dir);
            let since = risk::cutoff(config.forecast_lookback_days)?;
            let checkins = db::fetch_user_checkins(&pool, &email, since).await?;
            let result = forecast::forecast(&registry, &records_of(&checkins), days)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", report::render_forecast(&result));
            }
        }
        Commands::History {
            email,
            since_days,
            json,
        } => {
            let since = risk::cutoff(since_days)?;
            let checkins = db::fetch_user_checkins(&pool, &email, since).await?;
            let entries = models::history(&checkins);

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No check-ins for {email} in the last {since_days} days.");
            } else {
                print!("{}", report::render_history(&entries));
            }
        }
        Commands::Report { since_days, out } => {
            let since = risk::cutoff(since_days)?;
            let checkins = db::fetch_checkins(&pool, since).await?;
            let analytics = analytics::organization_analytics(&checkins)?;
            let report =
                report::build_organization_report(&analytics, since_days, since.date_naive());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Summary {
            email,
            since_days,
            out,
        } => {
            let since = risk::cutoff(since_days)?;
            let checkins = db::fetch_user_checkins(&pool, &email, since).await?;
            let records = records_of(&checkins);
            let Some(summary) = analytics::personal_summary(&records) else {
                println!("No check-ins for {email} in the last {since_days} days.");
                return Ok(());
            };

            let registry = ModelRegistry::load(&config.model_dir);
            let assessment = match risk::predict_burnout(&registry, &records) {
                Ok(assessment) => Some(assessment),
                Err(PipelineError::InsufficientData { .. }) => None,
                Err(err) => return Err(err.into()),
            };

            let report =
                report::build_personal_report(&email, since_days, &summary, assessment.as_ref());
            match out {
                Some(path) => {
                    std::fs::write(&path, report)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Summary written to {}.", path.display());
                }
                None => print!("{report}"),
            }
        }
    }

    Ok(())
}
