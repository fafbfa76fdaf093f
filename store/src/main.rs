use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueHint};
use tracing_subscriber::EnvFilter;
use vescrow_core::interface::load_json;
use vescrow_store::api::{self, AppState};
use vescrow_store::reader::EthStateReader;
use vescrow_store::{AttestationStore, StoreConfig, TaskRepository};

const DEFAULT_CONFIG_PATH: &str = "./store_config.json";

#[derive(Parser)]
#[command(name = "vescrow-store")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long,
        value_parser,
        default_value = DEFAULT_CONFIG_PATH,
        value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Overrides `listen` from the config file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Overrides `database` from the config file.
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config: StoreConfig = load_json(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(database) = cli.database {
        config.database = database;
    }

    let repo = TaskRepository::open(&config.database)?;
    let reader = Arc::new(EthStateReader::new(&config.rpc_url)?);
    let store = AttestationStore::new(repo, reader, config.read_timeout());
    let state = AppState {
        store: Arc::new(store),
    };

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!(addr = %listener.local_addr()?, "Attestation store listening");

    api::serve(listener, state, config.max_body_bytes, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
