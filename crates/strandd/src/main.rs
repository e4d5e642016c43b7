//! `strandd`: command-line node for Strand replicated logs.
//!
//! # Usage
//!
//! ```text
//! strandd post "hi"                     # append as $USER
//! strandd post "hi" --as alice          # append as another identity
//! strandd feed                          # print the whole feed
//! strandd feed -n 10                    # print the last 10 entries
//! strandd heads                         # print the per-identity heads
//! strandd demo --peers 3 --messages 2   # replicate between in-process peers
//! strandd -c strand.toml -d ./node2 feed
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use strand_log::{Entry, Log};
use strand_store::{ContentStore, FileStore, MemoryStore};
use strand_sync::{LocalNetwork, ReplicationSession, SessionHandle};
use strand_types::PeerId;
use strand_types::events::{EventBus, EventKind};
use tracing::{debug, info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "strandd", version, about = "Strand replicated log node")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory (nothing survives the process).
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a message to the feed.
    Post {
        message: String,

        /// Identity to write as (name or hex peer id).
        #[arg(long = "as", env = "STRAND_IDENTITY")]
        identity: Option<String>,
    },
    /// Print the feed in causal order.
    Feed {
        /// Only the last N entries. Negative prints everything.
        #[arg(short = 'n', long, default_value_t = -1, allow_negative_numbers = true)]
        limit: i64,
    },
    /// Print the latest entry of every identity.
    Heads,
    /// Run several in-process peers over a shared store and replicate.
    Demo {
        /// Number of peers.
        #[arg(short, long, default_value_t = 3)]
        peers: usize,

        /// Messages posted by each peer.
        #[arg(short, long, default_value_t = 2)]
        messages: usize,

        /// Give up if the peers have not converged by then.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
}

// -----------------------------------------------------------------------
// Main
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    // CLI args override config file values.
    if let Some(dir) = cli.data_dir {
        config.node.data_dir = dir;
    }
    if cli.memory {
        config.storage.backend = "memory".to_string();
    }

    match cli.command {
        Commands::Post { message, identity } => {
            if let Some(identity) = identity {
                config.node.identity = Some(identity);
            }
            cmd_post(&config, &message).await.map(|_| ())
        }
        Commands::Feed { limit } => cmd_feed(&config, limit).await,
        Commands::Heads => cmd_heads(&config).await,
        Commands::Demo {
            peers,
            messages,
            timeout_ms,
        } => cmd_demo(&config, peers, messages, Duration::from_millis(timeout_ms))
            .await
            .map(|_| ()),
    }
}

fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Open the configured store and restore the log from its root manifest.
async fn open_log(config: &CliConfig) -> Result<Log> {
    let store: Arc<dyn ContentStore> = if config.is_memory() {
        Arc::new(MemoryStore::new())
    } else {
        let dir = &config.node.data_dir;
        Arc::new(
            FileStore::new(dir)
                .with_context(|| format!("failed to open store at {}", dir.display()))?,
        )
    };

    let log = Log::open(
        config.node.log_name.as_str(),
        store,
        config.log_config()?,
        EventBus::new(),
    );
    let restored = log.load().await.context("failed to load log")?;
    debug!(log = %log.address(), restored, "opened log");

    Ok(log)
}

fn format_entry(entry: &Entry) -> String {
    format!(
        "{:>4}  {}  {}",
        entry.clock().value(),
        entry.identity().short(),
        entry.payload_str()
    )
}

// -----------------------------------------------------------------------
// strandd post / feed / heads
// -----------------------------------------------------------------------

async fn cmd_post(config: &CliConfig, message: &str) -> Result<Entry> {
    if config.is_memory() {
        warn!("memory backend: the entry is lost when the process exits");
    }

    let log = open_log(config).await?;
    let identity = config.identity();
    let entry = log
        .append(identity, message.as_bytes())
        .await
        .context("append failed")?;

    println!("{}", entry.id());
    Ok(entry)
}

async fn cmd_feed(config: &CliConfig, limit: i64) -> Result<()> {
    let log = open_log(config).await?;
    let entries = log.materialize(limit);

    if entries.is_empty() {
        println!("{} is empty.", log.address());
        return Ok(());
    }

    for entry in &entries {
        println!("{}", format_entry(entry));
    }

    Ok(())
}

async fn cmd_heads(config: &CliConfig) -> Result<()> {
    let log = open_log(config).await?;
    let heads = log.heads();

    println!("Heads of {}: {}", log.address(), heads.len());
    for (identity, head) in &heads {
        let clock = log
            .get(head)
            .map(|e| e.clock().to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  {}  clock={clock}  {}", identity.short(), head.short());
    }
    if log.pending_count() > 0 {
        println!("Pending entries: {}", log.pending_count());
    }

    Ok(())
}

// -----------------------------------------------------------------------
// strandd demo
// -----------------------------------------------------------------------

struct DemoPeer {
    identity: PeerId,
    log: Arc<Log>,
    session: SessionHandle,
}

async fn cmd_demo(
    config: &CliConfig,
    peers: usize,
    messages: usize,
    timeout: Duration,
) -> Result<Vec<Entry>> {
    if peers == 0 {
        bail!("--peers must be at least 1");
    }

    println!("Strand Demo");
    println!("  peers:    {peers}");
    println!("  messages: {messages} per peer");
    println!("  log:      /strand/{}", config.node.log_name);
    println!();

    // Peers share one content store and exchange only heads.
    let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
    let network = LocalNetwork::new();
    let sync_config = config.sync_config();
    let mut nodes = Vec::with_capacity(peers);

    for i in 0..peers {
        let identity = PeerId::from_name(&format!("peer-{i}"));
        let log = Arc::new(Log::open(
            config.node.log_name.as_str(),
            store.clone(),
            config.log_config()?,
            EventBus::new(),
        ));
        let (transport, inbox) = network.join(identity);
        let session = Arc::new(ReplicationSession::new(
            identity,
            log.clone(),
            Arc::new(transport),
            sync_config.clone(),
        ));

        nodes.push(DemoPeer {
            identity,
            log,
            session: session.spawn(inbox),
        });
    }

    nodes[0].log.events().on(EventKind::Replicated, |event| {
        println!("  peer-0 <- replicated from {}", event.identity.short());
    });

    let start = Instant::now();
    for round in 0..messages {
        for (i, node) in nodes.iter().enumerate() {
            node.log
                .append(node.identity, format!("message {round} from peer-{i}"))
                .await
                .with_context(|| format!("peer-{i} append failed"))?;
        }
    }

    let expected = peers * messages;
    let deadline = start + timeout;
    while !nodes.iter().all(|n| n.log.len() == expected) {
        if Instant::now() >= deadline {
            let counts: Vec<usize> = nodes.iter().map(|n| n.log.len()).collect();
            bail!("peers did not converge within {timeout:?}: entry counts {counts:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let feed = nodes[0].log.materialize(-1);
    for (i, node) in nodes.iter().enumerate().skip(1) {
        if node.log.materialize(-1) != feed {
            bail!("peer-{i} materialized a different feed than peer-0");
        }
    }

    info!(
        peers,
        entries = expected,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "demo converged"
    );

    println!();
    println!("Converged in {:.2}s. Feed:", start.elapsed().as_secs_f64());
    for entry in &feed {
        println!("{}", format_entry(entry));
    }

    for node in nodes {
        if let Err(e) = node.session.shutdown().await {
            warn!(peer = %node.identity.short(), error = %e, "session did not stop cleanly");
        }
    }

    Ok(feed)
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
