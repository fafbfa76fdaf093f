use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueHint};
use ethers::providers::{Http, Provider};
use tracing_subscriber::EnvFilter;
use vescrow_bridge::{
    Bridge, BridgeConfig, EthReportWriter, HttpAttestationSource, SettlementOutcome,
};
use vescrow_core::interface::load_json;

const DEFAULT_CONFIG_PATH: &str = "./bridge_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config: BridgeConfig = load_json(&cli.config)?;

    let source = HttpAttestationSource::new(&config.store_url, config.request_timeout())?;
    let writer = EthReportWriter::new(&config).await?;
    let bridge = Bridge::new(config.chain_id, Arc::new(source), Arc::new(writer));

    match cli.command {
        Commands::Watch => {
            let provider = Provider::<Http>::try_from(config.rpc_url.as_str())?;
            bridge
                .watch(
                    Arc::new(provider),
                    config.ledger_address,
                    config.from_block,
                    config.poll_interval(),
                )
                .await?;
        }
        Commands::Process { id } => match bridge.process(id).await? {
            SettlementOutcome::Submitted { tx_hash, .. } => {
                tracing::info!(agreement_id = id, ?tx_hash, "Settlement report submitted");
            }
            SettlementOutcome::Skipped { reason, .. } => {
                tracing::info!(agreement_id = id, %reason, "Settlement skipped");
            }
        },
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "vescrow-bridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long,
        value_parser,
        default_value = DEFAULT_CONFIG_PATH,
        value_hint = ValueHint::FilePath)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow `EscrowSignal` logs and settle each signalled agreement.
    Watch,
    /// Settle a single agreement, e.g. to re-deliver a missed signal.
    Process {
        #[arg(long)]
        id: u64,
    },
}
