pub mod config;

pub use config::HirePipeConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::api::AppState;
use crate::pipeline::{CandidateSummary, PipelineStatus};
use crate::storage::json_store::{JsonFileStore, parse_records};
use crate::storage::{CandidateStore, MemoryStore, Records};

use self::config::{DEFAULT_MAX_BODY, DEFAULT_PORT, DEFAULT_STORE_PATH, MEMORY_STORE};

#[derive(Parser)]
#[command(name = "hirepipe", version, about = "Stage-gated candidate hiring pipeline")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (default: 0.0.0.0)
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on (default: 5000)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Candidate state file, or `:memory:` for a throwaway store
        /// (default: candidate_states.json)
        #[arg(long, env = "STORE_PATH")]
        store: Option<PathBuf>,

        /// Base URL used in emailed links (default: http://localhost:<port>)
        #[arg(long, env = "PUBLIC_URL")]
        public_url: Option<String>,

        /// Config file (default: auto-detect hirepipe.yaml in cwd)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List candidates in the state file
    List {
        /// Filter by status (shortlisted, coding_passed, tech_passed, offered, rejected)
        #[arg(short, long)]
        status: Option<String>,

        /// Candidate state file
        #[arg(long, default_value = DEFAULT_STORE_PATH, env = "STORE_PATH")]
        store: PathBuf,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Print one candidate record
    Inspect {
        /// Candidate token
        token: String,

        /// Candidate state file
        #[arg(long, default_value = DEFAULT_STORE_PATH, env = "STORE_PATH")]
        store: PathBuf,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv(cli.dotenv.as_deref());

    match cli.command {
        Commands::Serve {
            host,
            port,
            store,
            public_url,
            config,
        } => cmd_serve(host, port, store, public_url, config).await,
        Commands::List { status, store, format } => cmd_list(status, store, format).await,
        Commands::Inspect { token, store } => cmd_inspect(token, store).await,
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (warn if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!("Warning: Failed to load dotenv file '{}': {}", path.display(), e);
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    store: Option<PathBuf>,
    public_url: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = HirePipeConfig::load(config_path.as_deref())?;

    let host = host.or_else(|| config.host.clone()).unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.or(config.port).unwrap_or(DEFAULT_PORT);
    let store_path = store
        .or_else(|| config.store_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    let public_url = public_url
        .or_else(|| config.public_url.clone())
        .unwrap_or_else(|| format!("http://localhost:{}", port));

    let store = open_store(&store_path).await?;
    info!(path = %store_path.display(), candidates = store.len().await?, "Candidate store opened");

    let pipeline = config.build_pipeline(store, &public_url)?;
    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        debug_endpoints: config.debug_endpoints.unwrap_or(false),
    });

    crate::api::serve(&host, port, state, config.max_body.unwrap_or(DEFAULT_MAX_BODY)).await
}

/// Open the store at `path`; `:memory:` keeps records in process only.
pub async fn open_store(path: &Path) -> Result<Arc<dyn CandidateStore>> {
    if path.as_os_str() == MEMORY_STORE {
        warn!("Using an in-memory candidate store; records are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(JsonFileStore::open(path).await?))
}

/// Read the state file without modifying it.
async fn read_store(path: &Path) -> Result<Records> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    if contents.trim().is_empty() {
        return Ok(Records::new());
    }
    let parsed = parse_records(&contents).with_context(|| format!("Failed to parse {}", path.display()))?;
    if !parsed.rejected.is_empty() {
        let tokens: Vec<&str> = parsed.rejected.keys().map(String::as_str).collect();
        warn!("Skipped {} undecodable record(s): {}", tokens.len(), tokens.join(", "));
    }
    Ok(parsed.records)
}

async fn cmd_list(status_filter: Option<String>, store: PathBuf, format: String) -> Result<()> {
    let status = status_filter
        .as_deref()
        .map(|s| s.parse::<PipelineStatus>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()?;

    let records = read_store(&store).await?;
    let candidates: Vec<CandidateSummary> = records
        .iter()
        .map(|(token, record)| CandidateSummary::new(token, record))
        .filter(|c| status.is_none_or(|s| c.status == s))
        .collect();

    if candidates.is_empty() {
        println!("No candidates found.");
        return Ok(());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<28} {:<14} {:<20}",
        "TOKEN", "NAME", "EMAIL", "STATUS", "APPLIED"
    );
    println!("{}", "-".repeat(124));

    for c in &candidates {
        let applied = c
            .applied_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<38} {:<20} {:<28} {:<14} {:<20}",
            c.token, c.name, c.email, c.status, applied
        );
    }

    println!("\nTotal: {} candidate(s)", candidates.len());
    Ok(())
}

async fn cmd_inspect(token: String, store: PathBuf) -> Result<()> {
    let records = read_store(&store).await?;

    let record = records
        .get(&token)
        .with_context(|| format!("Candidate '{}' not found", token))?;

    println!("{}", serde_json::to_string_pretty(record)?);

    Ok(())
}
