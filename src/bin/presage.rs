//! presage CLI: run worker passes and inspect the queue and cache.

use clap::{Parser, Subcommand};
use presage::clock::SystemClock;
use presage::config::Config;
use presage::db::Db;
use presage::llm::anthropic_client;
use presage::llm::detect::AnthropicDetector;
use presage::llm::generate::AnthropicGenerator;
use presage::llm::sentinel::AnthropicSentinel;
use presage::model::job::JobStatus;
use presage::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use presage::worker::ambient::AmbientDetector;
use presage::worker::generator::Generator;
use presage::worker::predictor::Predictor;
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "presage", about = "Speculative pre-generation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one predictor pass: detect patterns, queue prediction jobs
    Predict,
    /// Run one generator pass: claim due jobs, fill the page cache
    Generate,
    /// Run one ambient pass: detect events for recently active users
    Ambient,
    /// Prediction queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Page cache operations
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// List prediction jobs
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Filter by user
        #[arg(long)]
        user: Option<String>,
        /// Maximum jobs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a prediction job
    Show {
        /// Job ID (full UUID or prefix)
        id: String,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Look up the live cache entry for a user and query
    Lookup {
        user: String,
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Predict => cmd_predict().await,
        Command::Generate => cmd_generate().await,
        Command::Ambient => cmd_ambient().await,
        Command::Queue { action } => {
            let db = connect().await?;
            match action {
                QueueAction::List {
                    status,
                    user,
                    limit,
                } => cmd_queue_list(&db, status, user, limit).await,
                QueueAction::Show { id } => cmd_queue_show(&db, id).await,
            }
        }
        Command::Cache { action } => {
            let db = connect().await?;
            match action {
                CacheAction::Lookup { user, query } => cmd_cache_lookup(&db, user, query).await,
            }
        }
    }
}

/// Plain connection for inspection commands, no telemetry pipelines.
async fn connect() -> anyhow::Result<Db> {
    let config = Config::from_env()?;
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    Ok(db)
}

/// Full runtime for worker passes: telemetry, database, Anthropic client.
async fn worker_runtime()
-> anyhow::Result<(Config, Arc<Db>, rig::providers::anthropic::Client, TelemetryGuard)> {
    let config = Config::from_env()?;
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "presage".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    let client = anthropic_client(&config.anthropic_api_key)?;
    Ok((config, Arc::new(db), client, guard))
}

async fn cmd_predict() -> anyhow::Result<()> {
    let (config, db, client, _guard) = worker_runtime().await?;
    let detector = AnthropicDetector::new(&client, &config.detection_model);
    let predictor = Predictor::new(db, Arc::new(detector), Arc::new(SystemClock));

    let report = predictor.run_once().await?;
    println!(
        "predict: {} active users, {} patterns, {} jobs queued, {} errors",
        report.active_users, report.patterns_detected, report.jobs_queued, report.errors
    );
    Ok(())
}

async fn cmd_generate() -> anyhow::Result<()> {
    let (config, db, client, _guard) = worker_runtime().await?;
    let generator = AnthropicGenerator::new(&client, &config.generation_model);
    let worker = Generator::new(db, Arc::new(generator), Arc::new(SystemClock));

    let report = worker.run_once().await?;
    println!(
        "generate: {} processed, {} generated, {} errors",
        report.processed, report.generated, report.errors
    );
    Ok(())
}

async fn cmd_ambient() -> anyhow::Result<()> {
    let (config, db, client, _guard) = worker_runtime().await?;
    let sentinel = AnthropicSentinel::new(&client, &config.generation_model);
    let worker = AmbientDetector::new(db, Arc::new(sentinel), Arc::new(SystemClock));

    let report = worker.run_once().await?;
    println!(
        "ambient: {} users processed, {} events generated, {} errors",
        report.users_processed, report.events_generated, report.errors
    );
    Ok(())
}

async fn cmd_queue_list(
    db: &Db,
    status: Option<String>,
    user: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let status_filter: Option<JobStatus> = match status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid status: {s}"))?,
        ),
        None => None,
    };

    let jobs = db.list_jobs(status_filter, user.as_deref(), limit).await?;

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    // Header
    println!(
        "{:<8}  {:<10}  {:<4}  {:<3}  {:<36}  SCHEDULED",
        "ID", "STATUS", "PRI", "ATT", "PREDICTED NEED"
    );
    println!("{}", "-".repeat(90));

    for job in &jobs {
        let short_id = &job.id.to_string()[..8];
        let need: String = job.predicted_need.chars().take(36).collect();
        println!(
            "{:<8}  {:<10}  {:<4}  {:<3}  {:<36}  {}",
            short_id,
            job.status,
            job.priority,
            job.attempts,
            need,
            job.scheduled_for.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} job(s)", jobs.len());
    Ok(())
}

async fn cmd_queue_show(db: &Db, id_str: String) -> anyhow::Result<()> {
    // Support prefix matching, like git does for object IDs
    let id = if id_str.len() < 36 {
        let jobs = db.list_jobs(None, None, 100).await?;
        let matches: Vec<_> = jobs
            .iter()
            .filter(|job| job.id.to_string().starts_with(&id_str))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no job matching prefix '{id_str}'"),
            1 => matches[0].id,
            n => anyhow::bail!("{n} jobs match prefix '{id_str}', be more specific"),
        }
    } else {
        uuid::Uuid::parse_str(&id_str)?
    };

    let job = db.get_job(id).await?;

    println!("ID:           {}", job.id);
    println!("User:         {}", job.user_id);
    println!("Type:         {}", job.job_type);
    println!("Status:       {}", job.status);
    println!("Priority:     {}", job.priority);
    println!("Need:         {}", job.predicted_need);
    println!("Scheduled:    {}", job.scheduled_for);
    println!("Valid Until:  {}", job.valid_until);
    println!("Attempts:     {}", job.attempts);
    println!(
        "Context:      {}",
        serde_json::to_string_pretty(&job.context_data)?
    );
    println!("Created:      {}", job.created_at);
    if let Some(started) = job.started_at {
        println!("Started:      {started}");
    }
    if let Some(completed) = job.completed_at {
        println!("Completed:    {completed}");
    }
    if let Some(ref key) = job.result_cache_key {
        println!("Cache Key:    {key}");
    }
    if let Some(ref err) = job.error_message {
        println!("Error:        {err}");
    }

    Ok(())
}

async fn cmd_cache_lookup(db: &Db, user: String, query: String) -> anyhow::Result<()> {
    let key = presage::fingerprint::cache_key(&user, &query);

    match db.live_entry(&user, &key, chrono::Utc::now()).await? {
        Some(entry) => {
            println!("Key:         {}", entry.cache_key);
            println!("Query:       {}", entry.query);
            println!("Relevance:   {}", entry.relevance_score);
            println!("Valid Until: {}", entry.valid_until);
            println!("Created:     {}", entry.created_at);
            println!(
                "Components:  {}",
                serde_json::to_string_pretty(&entry.components)?
            );
        }
        None => println!("No live cache entry for key {key}."),
    }

    Ok(())
}
