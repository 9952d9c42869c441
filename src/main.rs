//! Command-line client for a sharded node.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

use shard_messenger::config::loader::load_config;
use shard_messenger::observability::logging::init_logging;
use shard_messenger::rpc::{to_quantity, RpcMethod};
use shard_messenger::{BlockTracker, LifecycleEvent, Messenger, SdkConfig};

#[derive(Parser)]
#[command(name = "shard-cli")]
#[command(about = "Query and watch a sharded blockchain node", long_about = None)]
struct Cli {
    /// TOML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request/response endpoint
    #[arg(long)]
    url: Option<String>,

    /// Persistent endpoint (enables push)
    #[arg(long)]
    ws: Option<String>,

    /// Shard to query
    #[arg(short, long)]
    shard: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the latest block number
    BlockNumber,
    /// Print the shard routing table
    Sharding,
    /// Print a transaction receipt
    Receipt {
        hash: String,
        /// Fetch the cross-shard receipt instead
        #[arg(long)]
        cx: bool,
    },
    /// Print every new block height as it is observed
    WatchHeads,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SdkConfig::default(),
    };
    if let Some(url) = cli.url {
        config.network.http_url = url;
    }
    if cli.ws.is_some() {
        config.network.ws_url = cli.ws;
    }

    init_logging(&config.observability)?;
    let messenger = Messenger::default_config(config).await?;

    // Shard routing needs the table before any shard-addressed request.
    if let Some(shard_id) = cli.shard {
        if !messenger.ensure_shard_route(shard_id).await? {
            tracing::warn!(shard_id, "Shard not in routing table, using default endpoint");
            eprintln!("warning: shard {} is not in the routing table, using the default endpoint", shard_id);
        }
    }

    match cli.command {
        Commands::BlockNumber => {
            let result = messenger.request(RpcMethod::BlockNumber, (), cli.shard).await?;
            print_json(&result)?;
        }
        Commands::Sharding => {
            let table = messenger.refresh_sharding().await?;
            for (shard_id, entry) in table.iter() {
                let marker = if shard_id == messenger.current_shard() { "*" } else { " " };
                println!("{} {:>3}  {}  {}", marker, shard_id, entry.http, entry.ws);
            }
        }
        Commands::Receipt { hash, cx } => {
            let method = if cx {
                RpcMethod::GetCxReceiptByHash
            } else {
                RpcMethod::GetTransactionReceipt
            };
            let result = messenger.request(method, json!([hash]), cli.shard).await?;
            if result.is_null() {
                eprintln!("No receipt yet for {}", hash);
            } else {
                print_json(&result)?;
            }
        }
        Commands::WatchHeads => {
            let tracker = BlockTracker::for_messenger(messenger.clone(), cli.shard);
            let mut listener = tracker.listen();
            loop {
                tokio::select! {
                    event = listener.recv() => match event {
                        Ok(LifecycleEvent::Latest(height)) => println!("{} ({})", height, to_quantity(height)),
                        Ok(LifecycleEvent::Error(message)) => eprintln!("error: {}", message),
                        Ok(_) => {}
                        Err(e) => {
                            eprintln!("tracker stream ended: {}", e);
                            break;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
