//! Process entry point: loads configuration and persisted state, starts the
//! gossip service, and runs an interactive command loop over the single
//! shared [`Node`] — the whole system only ever serves one logged-in user at
//! a time, same as the original desktop application.

mod commands;
mod config_file;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ferrochain_core::clock::SystemClock;
use ferrochain_core::config::Config;
use ferrochain_core::node::Node;
use ferrochain_network::GossipHandle;
use ferrochain_persistence::Store;
use log::info;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "ferrochain", about = "Ferrochain node CLI", version)]
struct Cli {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(long, default_value = "ferrochain.toml")]
    config: PathBuf,

    /// Overrides `data_dir` from the config file.
    #[arg(long)]
    data_dir: Option<String>,

    /// Overrides `listen_port` from the config file.
    #[arg(long)]
    listen_port: Option<u16>,

    /// Appends a peer address (`host:port`), repeatable.
    #[arg(long = "peer")]
    peers: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = config_file::load(&cli.config).unwrap_or_else(|e| {
        log::warn!("{}: {e}, using defaults", cli.config.display());
        Config::default()
    });
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(port) = cli.listen_port {
        config.listen_port = port;
    }
    config.peers.extend(cli.peers);

    let store = Store::new(config.data_dir.clone());
    let (accounts, chain, pool) = store.load();
    let node = Arc::new(Mutex::new(Node::new(accounts, chain, pool, Box::new(SystemClock))));

    let gossip = match GossipHandle::start(node.clone(), config.clone()).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("failed to start gossip service: {e}, running offline");
            None
        }
    };

    info!("ferrochain node ready, data dir '{}'", config.data_dir);
    repl::run(node, store, gossip).await;
}
