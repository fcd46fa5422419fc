use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use finlens_report::{
    AnalysisJob, AnalysisQueue, AppConfig, EmbedderKind, ReportStore, SqliteReportStore,
    TaskStatus, build_pipeline, stage_upload,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Analyze financial documents and browse saved investment reports.
#[derive(Parser, Debug)]
#[command(name = "finlens", author, version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults to $FINLENS_CONFIG or finlens.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the report pipeline on a document and save the result
    Analyze {
        /// Financial PDF to analyze
        #[arg(short, long)]
        file: PathBuf,
        /// Question the report should answer
        #[arg(short, long, default_value = finlens_report::DEFAULT_QUERY)]
        query: String,
        /// Override the configured embedding backend (openai or hash)
        #[arg(short, long)]
        embedder: Option<EmbedderKind>,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 900)]
        timeout: u64,
    },
    /// Print a saved report as JSON
    Report {
        /// Report id printed by `analyze`
        id: String,
    },
    /// List recent reports
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Analyze {
            file,
            query,
            embedder,
            timeout,
        } => {
            if let Some(embedder) = embedder {
                config.embedder = embedder;
            }

            let contents = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let pipeline = Arc::new(build_pipeline(&config)?);
            let store: Arc<dyn ReportStore> =
                Arc::new(SqliteReportStore::open(&config.database_path).await?);
            let queue = AnalysisQueue::start(pipeline, store, config.queue.clone());

            let staged = stage_upload(&config.upload_dir, &contents).await?;
            let task_id = queue
                .submit(AnalysisJob::new(&query, staged, file_name))
                .await?;
            info!("Queued analysis task {}", task_id);

            let status = queue
                .wait_for(task_id, Duration::from_millis(250), Duration::from_secs(timeout))
                .await?;
            queue.forget(task_id).await;
            queue.shutdown().await;

            println!("{}", serde_json::to_string_pretty(&status)?);
            if let TaskStatus::Failed { error } = status {
                return Err(anyhow!("analysis failed: {error}"));
            }
            Ok(())
        }
        Commands::Report { id } => {
            let store = SqliteReportStore::open(&config.database_path).await?;
            let report = store
                .get_report(&id)
                .await?
                .ok_or_else(|| anyhow!("no report with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::List { limit } => {
            let store = SqliteReportStore::open(&config.database_path).await?;
            let reports = store.list_reports(limit).await?;
            println!("{} of {} reports:", reports.len(), store.count().await?);
            for report in reports {
                println!(
                    "  {} | {} | {} | {}",
                    report.id,
                    report.created_at.format("%Y-%m-%d %H:%M:%S"),
                    report.file_name,
                    report.query
                );
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
