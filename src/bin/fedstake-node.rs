#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("Build with --features cli to enable the fedstake-node binary.");
}

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "fedstake-node")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Federated stake-weighted chain simulator", long_about = None)]
struct Cli {
    /// Emit logs as JSON (stderr)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Run N in-process nodes for R rounds, printing one JSON line per round
    Chain {
        /// TOML configuration; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override [chain].num_nodes
        #[arg(long)]
        nodes: Option<usize>,

        /// Override [chain].rounds
        #[arg(long)]
        rounds: Option<u64>,

        /// Override [chain].data_dir
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Load a ledger and check every hash and link
    Verify {
        #[arg(short, long, default_value = "data/chain")]
        data_dir: PathBuf,
    },
}

#[cfg(feature = "cli")]
fn init_logging(json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Chain {
            config,
            nodes,
            rounds,
            data_dir,
        } => run_chain(config, nodes, rounds, data_dir),
        Commands::Verify { data_dir } => verify(data_dir),
    }
}

#[cfg(feature = "cli")]
fn run_chain(
    config: Option<PathBuf>,
    nodes: Option<usize>,
    rounds: Option<u64>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    use anyhow::Context;
    use fedstake_core::bus::Bus;
    use fedstake_core::config::ChainConfig;
    use fedstake_core::coordinator::ROUNDS_TOPIC;
    use fedstake_core::FederatedChain;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    let mut cfg = match &config {
        Some(path) => ChainConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ChainConfig::default(),
    };
    if let Some(n) = nodes {
        cfg.chain.num_nodes = n;
    }
    if let Some(r) = rounds {
        cfg.chain.rounds = r;
    }
    if let Some(dir) = data_dir {
        cfg.chain.data_dir = dir;
    }
    let bus = Arc::new(Bus::new());
    let rx = bus.subscribe(ROUNDS_TOPIC);
    let printer = thread::spawn(move || {
        let stdout = std::io::stdout();
        for outcome in rx {
            match serde_json::to_string(&outcome) {
                Ok(line) => {
                    let mut out = stdout.lock();
                    let _ = writeln!(out, "{}", line);
                    let _ = out.flush();
                }
                Err(e) => tracing::warn!(error = %e, "could not encode round outcome"),
            }
        }
    });

    let total = cfg.chain.rounds;
    let mut chain = FederatedChain::from_config(cfg, Arc::clone(&bus))
        .context("initialising chain")?;
    let stop = AtomicBool::new(false);
    let outcomes = chain.run(total, &stop)?;

    drop(chain);
    drop(bus);
    let _ = printer.join();

    tracing::info!(rounds = outcomes.len(), "done");
    Ok(())
}

#[cfg(feature = "cli")]
fn verify(data_dir: PathBuf) -> anyhow::Result<()> {
    use fedstake_core::ledger::Ledger;

    let ledger = Ledger::open(&data_dir)?;
    ledger.validate_chain()?;
    tracing::info!(
        height = ledger.height(),
        skipped_lines = ledger.skipped_lines(),
        tip = %ledger.last_hash(),
        "ledger verified"
    );
    println!("ok height={} tip={}", ledger.height(), ledger.last_hash());
    Ok(())
}
