use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod compiler;
mod constraints;
mod db;
mod error;
mod jobs;
mod materialize;
mod models;
mod report;
mod solver;
mod trigger;

use solver::{GreedySolver, HttpSolver};
use trigger::AssignOptions;

#[derive(Parser)]
#[command(name = "topic-assignment")]
#[command(about = "Topic assignment orchestration for Group Scholar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import ranked preferences from a CSV file
    ImportPreferences {
        #[arg(long)]
        period: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import questionnaire answers from a CSV file
    ImportAnswers {
        #[arg(long)]
        period: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compile the solver request for a period and print it (preview,
    /// no job is created)
    Compile {
        #[arg(long)]
        period: String,
        /// Target group size per topic, e.g. --size "Robotics Lab=3"
        #[arg(long = "size", value_name = "TITLE=N")]
        sizes: Vec<String>,
        #[arg(long)]
        ranking_percentage: Option<f64>,
        #[arg(long)]
        max_time_seconds: Option<u32>,
    },
    /// Create an assignment job and hand it to the external solver
    Assign {
        #[arg(long)]
        period: String,
        #[arg(long = "size", value_name = "TITLE=N")]
        sizes: Vec<String>,
        #[arg(long)]
        ranking_percentage: Option<f64>,
        #[arg(long)]
        max_time_seconds: Option<u32>,
        /// Override the closed-period precondition
        #[arg(long)]
        force: bool,
    },
    /// Fire the period-close trigger for any periods past their close
    /// date with no job yet
    Tick,
    /// Poll a job's status
    JobStatus {
        #[arg(long)]
        job: Uuid,
    },
    /// Apply a solver completion callback (idempotent)
    Complete {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        evaluation_id: String,
        /// JSON file holding the solver result payload
        #[arg(long)]
        data: PathBuf,
        /// Content hash of the payload; computed locally when omitted
        #[arg(long)]
        hash: Option<String>,
    },
    /// Apply a solver failure callback (idempotent)
    Fail {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        error: String,
    },
    /// Run the whole pipeline against the built-in greedy solver
    RunLocal {
        #[arg(long)]
        period: String,
        #[arg(long = "size", value_name = "TITLE=N")]
        sizes: Vec<String>,
        #[arg(long)]
        force: bool,
    },
    /// Delete a constraint, unlinking any questions that reference it
    DeleteConstraint {
        #[arg(long)]
        name: String,
    },
    /// Write a markdown report for a period's current batch
    Report {
        #[arg(long)]
        period: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
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
        Commands::ImportPreferences { period, csv } => {
            let period = db::fetch_period(&pool, &period).await?;
            let imported = db::import_preferences_csv(&pool, period.id, &csv).await?;
            println!("Imported {imported} preferences from {}.", csv.display());
        }
        Commands::ImportAnswers { period, csv } => {
            let period = db::fetch_period(&pool, &period).await?;
            let imported = db::import_answers_csv(&pool, period.id, &csv).await?;
            println!("Imported {imported} answers from {}.", csv.display());
        }
        Commands::Compile {
            period,
            sizes,
            ranking_percentage,
            max_time_seconds,
        } => {
            let options = AssignOptions {
                group_sizes: resolve_sizes(&pool, &period, &sizes).await?,
                ranking_percentage,
                max_time_seconds,
                force: false,
            };
            let compiled = trigger::compile_preview(&pool, &period, &options).await?;
            println!("{}", serde_json::to_string_pretty(&compiled.request)?);
        }
        Commands::Assign {
            period,
            sizes,
            ranking_percentage,
            max_time_seconds,
            force,
        } => {
            let endpoint = std::env::var("SOLVER_URL")
                .context("SOLVER_URL must point at the optimizer service")?;
            let solver = HttpSolver::new(endpoint);
            let options = AssignOptions {
                group_sizes: resolve_sizes(&pool, &period, &sizes).await?,
                ranking_percentage,
                max_time_seconds,
                force,
            };
            let job = trigger::assign_now(&pool, &solver, &period, &options).await?;
            println!("Job {} is {} for period {period}.", job.id, job.status);
            if let Some(error) = job.error {
                println!("Error: {error}");
            }
        }
        Commands::Tick => {
            let endpoint = std::env::var("SOLVER_URL")
                .context("SOLVER_URL must point at the optimizer service")?;
            let solver = HttpSolver::new(endpoint);
            let fired = trigger::tick(&pool, &solver).await?;
            println!("Fired {fired} period-close trigger(s).");
        }
        Commands::JobStatus { job } => {
            let job = db::fetch_job(&pool, job).await?;
            let view = jobs::status_view(&job, Utc::now());
            println!(
                "Job {} is {} (updated {}, age {}s).",
                job.id, view.status, view.updated_at, view.age_seconds
            );
            if let Some(error) = view.error {
                println!("Error: {error}");
            }
            if let Some(batch_id) = &job.batch_id {
                println!("Materialized batch: {batch_id}");
            }
            if view.awaiting_batch {
                println!(
                    "Warning: job completed but its result was never materialized; \
                     the batch needs operator attention."
                );
            }
        }
        Commands::Complete {
            job,
            evaluation_id,
            data,
            hash,
        } => {
            let raw = std::fs::read_to_string(&data)
                .with_context(|| format!("failed to read {}", data.display()))?;
            let result: models::SolverResult =
                serde_json::from_str(&raw).context("result payload is not valid JSON")?;
            let hash = hash.unwrap_or_else(|| solver::hash_result(&result));
            let value = serde_json::to_value(&result)?;

            match trigger::on_solver_result(&pool, job, &evaluation_id, &value, &hash).await? {
                Some(batch_id) => println!("Job completed; materialized batch {batch_id}."),
                None => println!("Job already terminal; callback ignored."),
            }
        }
        Commands::Fail { job, error } => {
            if trigger::on_solver_failure(&pool, job, &error).await? {
                println!("Job {job} marked failed.");
            } else {
                println!("Job already terminal; callback ignored.");
            }
        }
        Commands::RunLocal {
            period,
            sizes,
            force,
        } => {
            let options = AssignOptions {
                group_sizes: resolve_sizes(&pool, &period, &sizes).await?,
                ranking_percentage: None,
                max_time_seconds: None,
                force,
            };
            let job = trigger::assign_now(&pool, &GreedySolver, &period, &options).await?;

            let compiled: models::CompiledRequest = serde_json::from_value(job.request.clone())?;
            let result = GreedySolver::solve(&compiled.request)?;
            let hash = solver::hash_result(&result);
            let value = serde_json::to_value(&result)?;
            let evaluation_id = format!("local-{}", job.id);

            match trigger::on_solver_result(&pool, job.id, &evaluation_id, &value, &hash).await? {
                Some(batch_id) => println!("Materialized batch {batch_id}."),
                None => println!("Job was superseded before completion."),
            }
        }
        Commands::DeleteConstraint { name } => {
            if db::delete_constraint(&pool, &name).await? {
                println!("Constraint '{name}' deleted.");
            } else {
                println!("No constraint named '{name}'.");
            }
        }
        Commands::Report { period, out } => {
            let period = db::fetch_period(&pool, &period).await?;
            let Some(batch_id) = db::current_batch_id(&pool, period.id).await? else {
                println!("Period {} has no materialized batch.", period.name);
                return Ok(());
            };
            let topics = db::fetch_topics(&pool, period.id).await?;
            let students = db::fetch_students(&pool).await?;
            let assignments = db::fetch_batch(&pool, period.id, &batch_id).await?;
            let report =
                report::build_report(&period.name, &batch_id, &topics, &students, &assignments);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Map "Topic Title=N" arguments onto topic ids. An empty list means
/// the trigger falls back to an even split.
async fn resolve_sizes(
    pool: &PgPool,
    period_name: &str,
    sizes: &[String],
) -> anyhow::Result<Option<HashMap<Uuid, usize>>> {
    if sizes.is_empty() {
        return Ok(None);
    }

    let period = db::fetch_period(pool, period_name).await?;
    let topics = db::fetch_topics(pool, period.id).await?;
    let by_title: HashMap<&str, Uuid> = topics
        .iter()
        .map(|t| (t.title.as_str(), t.id))
        .collect();

    let mut resolved = HashMap::new();
    for entry in sizes {
        let (title, count) = entry
            .split_once('=')
            .with_context(|| format!("expected TITLE=N, got '{entry}'"))?;
        let topic_id = by_title
            .get(title.trim())
            .with_context(|| format!("unknown topic '{}'", title.trim()))?;
        let count: usize = count
            .trim()
            .parse()
            .with_context(|| format!("bad group size in '{entry}'"))?;
        resolved.insert(*topic_id, count);
    }
    Ok(Some(resolved))
}
