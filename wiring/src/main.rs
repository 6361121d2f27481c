use std::path::PathBuf;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use wiring::chain::{self, ChainRpc};
use wiring::reconcile::{Reconciler, ReconcilerConfig};
use wiring::retry::RetryPolicy;
use wiring::topology::Topology;

/// Converge cross-chain OApp pathways to a declared topology.
#[derive(Debug, Parser)]
#[command(name = "wiring", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: Opts,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the operations a pass would submit, without submitting.
    Plan,
    /// Run one reconciliation pass.
    Apply,
    /// Exit non-zero unless every pathway already matches.
    Verify,
}

#[derive(Debug, Args)]
struct Opts {
    /// Topology document (JSON).
    #[arg(long, short, global = true, default_value = "wiring.json")]
    topology: PathBuf,

    /// Chain RPC as EID=URL; repeat per chain.
    #[arg(long = "rpc", global = true, value_name = "EID=URL")]
    rpcs: Vec<ChainRpc>,

    /// Key of the OApp owner / delegate. Required for `apply`.
    #[arg(long, env = "WIRING_PRIVATE_KEY", hide_env_values = true, global = true)]
    private_key: Option<String>,

    #[arg(long, default_value_t = 3, global = true)]
    max_retries: u32,

    #[arg(long, default_value_t = 500, global = true)]
    retry_base_ms: u64,

    /// Deadline for each chain call.
    #[arg(long, default_value_t = 30_000, global = true)]
    timeout_ms: u64,

    /// Chains worked on at the same time.
    #[arg(long, default_value_t = 8, global = true)]
    concurrency: usize,

    #[arg(long, global = true)]
    allow_self_pathways: bool,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

impl Opts {
    fn config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_concurrent_chains: self.concurrency,
            call_timeout: Duration::from_millis(self.timeout_ms),
            retry: RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms)),
            allow_self_pathways: self.allow_self_pathways,
        }
    }

    fn signer(&self) -> eyre::Result<Option<PrivateKeySigner>> {
        self.private_key
            .as_deref()
            .map(|key| key.parse().wrap_err("invalid private key"))
            .transpose()
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let opts = &cli.opts;

    let (nodes, edges) = Topology::load(&opts.topology)
        .wrap_err_with(|| format!("loading {}", opts.topology.display()))?
        .into_declarations()?;

    let signer = opts.signer()?;
    if matches!(cli.command, Command::Apply) && signer.is_none() {
        eyre::bail!("apply needs --private-key or WIRING_PRIVATE_KEY");
    }

    let reconciler = Reconciler::new(chain::connect(&opts.rpcs, signer), opts.config());
    let graph = reconciler.build_graph(nodes, edges)?;

    match cli.command {
        Command::Plan => {
            let planned = reconciler.plan_only(&graph).await?;
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&planned.plan)?);
            } else {
                println!("{} operation(s) planned", planned.plan.len());
                for op in planned.plan.operations() {
                    println!("  chain {}: {} {} -> {}", op.chain(), op.action, op.local, op.peer);
                }
                for edge in &planned.diff.unobserved {
                    println!("  {edge}: not observed, skipped");
                }
            }
        }
        Command::Verify => {
            let planned = reconciler.plan_only(&graph).await?;
            let converged = planned.is_converged();
            println!(
                "{}: {} pending, {} unobserved",
                if converged { "converged" } else { "drifted" },
                planned.plan.len(),
                planned.diff.unobserved.len()
            );
            if !converged {
                std::process::exit(1);
            }
        }
        Command::Apply => {
            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, letting in-flight transactions finish");
                    let _ = cancel_tx.send(true);
                }
            });

            let report = reconciler.reconcile(&graph, cancel_rx).await?;
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
            if !report.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
