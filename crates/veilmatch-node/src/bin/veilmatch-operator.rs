//! VeilMatch operator CLI
//!
//! Usage:
//!   veilmatch-operator init               - Write a default configuration
//!   veilmatch-operator keygen             - Generate an operator signing key
//!   veilmatch-operator simulate           - Run a local cluster over the in-memory ledger

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rand::Rng;
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use veilmatch_ingress::{AesGcmCipher, PayloadCipher};
use veilmatch_node::{
    MemoryLedger, MemoryStore, NodeDeps, OperatorNode, RecordingTransport, StaticRegistry, TaskOutcome,
};
use veilmatch_proof::{AttestationBackend, AttestationVerifier};
use veilmatch_quorum::VoteSigner;
use veilmatch_types::{
    EpochId, NodeConfig, Operator, OrderCommitment, OrderSide, PoolId, Result, RevealedPayload, SubmitterId,
    VeilmatchError, constants,
};

#[derive(Parser)]
#[command(name = "veilmatch-operator")]
#[command(about = "VeilMatch sealed-commitment matching operator")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "veilmatch.toml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate an ed25519 operator key
    Keygen {
        /// Key file (defaults to `key_file` from the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    /// Run a local cluster of operators over the in-memory ledger
    Simulate {
        /// Number of operators
        #[arg(short, long, default_value = "5")]
        operators: usize,
        /// Number of epochs to run
        #[arg(short, long, default_value = "5")]
        epochs: u64,
        /// Orders posted per pool per epoch
        #[arg(long, default_value = "8")]
        orders: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("veilmatch=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { force } => init_config(&cli.config, force).await,
        Commands::Keygen { output, force } => {
            let path = match output {
                Some(path) => path,
                None => PathBuf::from(load_or_default(&cli.config)?.key_file),
            };
            generate_key(&path, force).await
        }
        Commands::Simulate {
            operators,
            epochs,
            orders,
        } => simulate(load_or_default(&cli.config)?, operators, epochs, orders).await,
    }
}

/// The configuration at `path`, or defaults if there is no file.
fn load_or_default(path: &Path) -> Result<NodeConfig> {
    if path.exists() {
        NodeConfig::load(path)
    } else {
        let mut config = NodeConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(VeilmatchError::Configuration(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    let mut config = NodeConfig::default();
    config.payload_key = hex::encode(AesGcmCipher::generate_key());
    create_parent(path).await?;
    tokio::fs::write(path, config.to_toml_string()?).await?;

    println!("Configuration written to {}", path.display());
    println!("Share payload_key with submitters of your pools and keep key_file private.");
    Ok(())
}

async fn generate_key(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(VeilmatchError::Configuration(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    let signer = VoteSigner::generate();
    create_parent(path).await?;
    tokio::fs::write(path, signer.secret_hex()).await?;

    println!("Operator key written to {}", path.display());
    println!("Operator id: {}", hex::encode(signer.public_key()));
    Ok(())
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

async fn simulate(config: NodeConfig, operators: usize, epochs: u64, orders: usize) -> Result<()> {
    if operators == 0 {
        return Err(VeilmatchError::Configuration("need at least one operator".into()));
    }
    let payload_key = config
        .payload_key_bytes()
        .ok_or_else(|| VeilmatchError::Configuration("payload_key must be 64 hex characters".into()))?;
    let cipher: Arc<AesGcmCipher> = Arc::new(AesGcmCipher::new(&payload_key));

    let signers: Vec<VoteSigner> = (0..operators).map(|_| VoteSigner::generate()).collect();
    let provers: Vec<Arc<AttestationBackend>> =
        (0..operators).map(|_| Arc::new(AttestationBackend::generate())).collect();

    let ledger = Arc::new(MemoryLedger::new(AttestationVerifier::new(
        provers.iter().map(|p| p.public_key()),
    )));
    let registry = Arc::new(StaticRegistry::new(
        signers
            .iter()
            .zip(10u64..)
            .map(|(s, stake)| Operator::new(s.public_key(), stake))
            .collect(),
    ));
    let transport = Arc::new(RecordingTransport::new());

    let mut nodes = Vec::with_capacity(operators);
    for (signer, prover) in signers.into_iter().zip(provers) {
        let deps = NodeDeps {
            feed: ledger.clone(),
            ledger: ledger.clone(),
            registry: registry.clone(),
            transport: transport.clone(),
            prover,
            cipher: cipher.clone(),
            store: Arc::new(MemoryStore::new()),
        };
        let node = OperatorNode::new(config.clone(), signer, deps);
        transport.connect(node.operator_id(), node.router()).await;
        nodes.push(node);
    }

    println!(
        "{} v{}: {} operators, {} pool(s), {} epochs",
        constants::ENGINE_NAME,
        constants::VERSION,
        operators,
        config.pools.len(),
        epochs
    );

    for epoch in (1..=epochs).map(EpochId) {
        for pool in &config.pools {
            post_random_orders(&ledger, cipher.as_ref(), &pool.pool_id, epoch, orders).await?;
        }

        let mut cluster = JoinSet::new();
        for node in &nodes {
            let node = Arc::clone(node);
            cluster.spawn(async move { node.run_epoch(epoch).await });
        }

        let mut settled = 0usize;
        let mut failed = 0usize;
        let mut staged = 0usize;
        while let Some(joined) = cluster.join_next().await {
            let report = joined.map_err(|e| VeilmatchError::Internal(format!("operator panicked: {e}")))??;
            staged = staged.max(report.staged);
            for outcome in &report.tasks {
                match outcome {
                    TaskOutcome::Settled(_) => settled += 1,
                    TaskOutcome::Failed { .. } => failed += 1,
                    TaskOutcome::AwaitingSettlement(_) | TaskOutcome::Observed(_) => {}
                }
            }
        }

        println!("epoch {:>3}: staged {staged:>3}, settled {settled}, failed {failed}", epoch.0);
    }

    println!(
        "done: {} settlement(s) accepted, {} submission(s), {} vote(s) broadcast",
        ledger.settled_count().await,
        ledger.submissions().await.len(),
        transport.sent().await.len()
    );
    Ok(())
}

async fn post_random_orders(
    ledger: &MemoryLedger,
    cipher: &dyn PayloadCipher,
    pool: &PoolId,
    epoch: EpochId,
    count: usize,
) -> Result<()> {
    // draw everything first: ThreadRng must not live across an await
    let payloads: Vec<(SubmitterId, RevealedPayload)> = {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let side = if rng.gen_bool(0.5) { OrderSide::Buy } else { OrderSide::Sell };
                let payload = RevealedPayload {
                    side,
                    amount: Decimal::from(rng.gen_range(1u32..=100)),
                    limit_price: Decimal::from(rng.gen_range(90u32..=110)),
                    nonce: rng.r#gen(),
                };
                (SubmitterId::new(format!("trader-{}", rng.gen_range(0u32..20))), payload)
            })
            .collect()
    };

    for (submitter, payload) in payloads {
        let sealed = cipher.seal_payload(&payload)?;
        let commitment = OrderCommitment::new(pool.clone(), submitter, epoch, &payload, sealed);
        ledger.post(commitment).await;
    }
    Ok(())
}
