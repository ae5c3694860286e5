//! Strata CLI - chat with tiered memory and model routing

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use strata::backend::{ModelBackend, RemoteBackend};
use strata::config::Config;
use strata::embedding::FastEmbedder;
use strata::error::{Result, StrataError};
use strata::hooks::RegistryBuilder;
use strata::hooks::plugins::{AutoSummarizer, CostTracker, SentimentTagger};
use strata::memory::TieredStore;
use strata::storage::LanceIndex;
use strata::Orchestrator;

/// Strata - conversational memory with complexity-based model routing
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Chat with tiered memory and complexity-based model routing")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// JSON file cached as world data at startup
    #[arg(long, short = 'w', global = true)]
    pub world: Option<PathBuf>,

    /// Session id for the conversation
    #[arg(long, short = 's', global = true, default_value = "default")]
    pub session: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Interactive chat loop over stdin (default command)
    Repl,
    /// Send a single message and print the response
    Ask {
        /// Message to send
        message: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config)?;
    tracing::debug!("Config loaded: {:?}", config);

    let world = cli.world.as_deref().map(load_world).transpose()?;
    let engine = build(&config).await?;
    engine.orchestrator.initialize(world.as_ref()).await;

    let outcome = match cli.command {
        None | Some(Command::Repl) => repl(&engine, &cli.session).await,
        Some(Command::Ask { message }) => ask(&engine, &cli.session, &message).await,
    };

    let pending = engine.orchestrator.flush().await;
    tracing::debug!(
        writes = pending.len(),
        stats = ?engine.orchestrator.archive_stats(),
        "Archive writes flushed"
    );
    outcome
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_world(path: &Path) -> Result<Value> {
    tracing::info!("Loading world data from: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        StrataError::Config(format!(
            "Failed to read world file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| StrataError::Serialization(format!("Failed to parse world file: {e}")))
}

struct Engine {
    orchestrator: Orchestrator,
    cost_tracker: Option<Arc<CostTracker>>,
}

async fn build(config: &Config) -> Result<Engine> {
    let data_dir = &config.storage.data_dir;
    tracing::info!("Initializing storage at: {}", data_dir.display());
    std::fs::create_dir_all(data_dir).map_err(|e| {
        StrataError::Storage(format!(
            "Failed to create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    let dimension = config.embedding.dimension;
    let warm = LanceIndex::open(data_dir, &config.storage.warm_table, dimension).await?;
    let cold = LanceIndex::open(data_dir, &config.storage.cold_table, dimension).await?;

    tracing::info!("Initializing embedding model (this may take a moment on first run)...");
    let embedder = FastEmbedder::new(&config.embedding)?;
    tracing::info!("Embedding model initialized");

    let store = Arc::new(TieredStore::new(
        Arc::new(warm),
        Arc::new(cold),
        Arc::new(embedder),
        config.memory.hot_token_ceiling,
    ));

    let backend: Arc<dyn ModelBackend> = Arc::new(RemoteBackend::new(&config.backend)?);

    let mut plugins = RegistryBuilder::new();
    let cost_tracker = if config.plugins.cost_tracker {
        let tracker = Arc::new(CostTracker::new());
        plugins.register(tracker.clone())?;
        Some(tracker)
    } else {
        None
    };
    if config.plugins.sentiment {
        plugins.register(Arc::new(SentimentTagger))?;
    }
    let summarizer = &config.plugins.auto_summarizer;
    if summarizer.enabled {
        plugins.register(Arc::new(AutoSummarizer::new(
            Arc::clone(&backend),
            config.router.summarizer.clone(),
            summarizer.interval,
        )))?;
    }

    Ok(Engine {
        orchestrator: Orchestrator::new(config, store, backend, plugins.build()),
        cost_tracker,
    })
}

async fn ask(engine: &Engine, session: &str, message: &str) -> Result<()> {
    let result = engine.orchestrator.chat(message, session).await?;
    println!("{}", result.response);
    tracing::info!(
        model = %result.model_name,
        complexity = %result.metadata.complexity,
        memory_tokens = result.metadata.memory_tokens,
        "Answered"
    );
    Ok(())
}

const REPL_HELP: &str = "Commands: /history, /clear, /stats, /caches, /help, /exit";

async fn repl(engine: &Engine, session: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("strata session '{session}'. {REPL_HELP}");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/help" => println!("{REPL_HELP}"),
            "/clear" => {
                engine.orchestrator.clear_session(session).await?;
                println!("Hot memory cleared for '{session}'");
            }
            "/history" => {
                for entry in engine.orchestrator.session_history(session).await {
                    println!("---\n{entry}");
                }
            }
            "/stats" => {
                if let Some(tracker) = &engine.cost_tracker {
                    let stats = serde_json::to_string_pretty(&tracker.stats().await)
                        .map_err(|e| StrataError::Serialization(e.to_string()))?;
                    println!("{stats}");
                }
                println!("archive: {:?}", engine.orchestrator.archive_stats());
            }
            "/caches" => {
                for status in engine.orchestrator.cache().list().await {
                    println!(
                        "{} ({}) expired={}",
                        status.key, status.name, status.expired
                    );
                }
            }
            message => match engine.orchestrator.chat(message, session).await {
                Ok(result) => println!("[{}] {}", result.model_name, result.response),
                // A failed turn leaves the session usable
                Err(e) => eprintln!("Error: {e}"),
            },
        }
    }

    Ok(())
}
