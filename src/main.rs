mod config;
mod ledger;
mod mempool;
mod node;
mod storage;
mod sync;
#[cfg(test)]
mod testing;
mod transactions;
mod utils;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LedgerConfig, LoggingConfig};
use crate::ledger::{LedgerError, RecordParser};
use crate::node::{NodeClient, NodeError};
use crate::storage::{LedgerStore, StorageError};
use crate::sync::{CancellationSignal, SyncDriver};
use crate::transactions::TransactionService;
use crate::utils::format_amount;

#[derive(Parser)]
#[command(name = "ledger-sync", version, about = "Blockchain ledger ingestion and query tool")]
struct Cli {
	/// Configuration file
	#[arg(short, long, default_value = "settings.toml")]
	config: PathBuf,

	/// Node JSON-RPC endpoint, overrides the configuration file
	#[arg(long)]
	endpoint: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Sync the ledger with the node
	Sync {
		/// Run a single cycle and exit
		#[arg(long)]
		once: bool,
	},
	/// Show one transaction
	Tx { txid: String },
	/// List confirmed transactions moving a currency
	Txs {
		currency: String,
		#[arg(long, default_value_t = 1)]
		page: u64,
		#[arg(long, default_value_t = 25)]
		size: u64,
	},
	/// List mempool transactions
	Mempool {
		/// Fetch a fresh snapshot from the node first
		#[arg(long)]
		refresh: bool,
	},
	/// Show the balances of an address
	Balance {
		address: String,
		#[arg(long)]
		currency: Option<String>,
	},
	/// Broadcast a raw transaction
	Broadcast { raw: String },
}

#[derive(Debug, thiserror::Error)]
enum AppError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Node(#[from] NodeError),

	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error(transparent)]
	Ledger(#[from] LedgerError),

	#[error("failed to render output: {0}")]
	Output(#[from] serde_json::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let cli = Cli::parse();

	let mut config = match LedgerConfig::load(&cli.config) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Failed to load configuration: {}", e);
			std::process::exit(1);
		}
	};
	if let Some(endpoint) = cli.endpoint {
		config.blockchain.endpoint = endpoint;
	}

	init_logging(&config.logging);

	if let Err(e) = run(cli.command, config).await {
		error!("{}", e);
		std::process::exit(1);
	}
}

fn init_logging(config: &LoggingConfig) {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();
}

async fn run(command: Command, config: LedgerConfig) -> Result<(), AppError> {
	let store = LedgerStore::open(Path::new(&config.database.path))?;
	let chain = Arc::new(NodeClient::new(&config.blockchain)?);

	match command {
		Command::Sync { once } => {
			info!(
				"Syncing {} into {}",
				config.blockchain.endpoint, config.database.path
			);

			let cancel = CancellationSignal::new();
			let signal = cancel.clone();
			tokio::spawn(async move {
				if tokio::signal::ctrl_c().await.is_ok() {
					info!("Interrupt received, stopping at the next block boundary");
					signal.cancel();
				}
			});

			let mut driver = SyncDriver::new(chain, store, &config);
			if once {
				let outcome = driver.run_cycle(&cancel).await?;
				print_json(outcome.stats())?;
			} else {
				driver.run(&cancel).await?;
			}
		}
		Command::Tx { txid } => {
			let service = TransactionService::new(store, chain, &config.chain);
			let transaction = service
				.transaction(&txid)?
				.ok_or_else(|| StorageError::NotFound(format!("transaction {}", txid)))?;
			print_json(&transaction)?;
		}
		Command::Txs {
			currency,
			page,
			size,
		} => {
			let service = TransactionService::new(store, chain, &config.chain);
			print_json(&service.transactions(&currency, page, size)?)?;
		}
		Command::Mempool { refresh } => {
			if refresh {
				let parser = RecordParser::new(config.chain.currency.clone());
				mempool::refresh_mempool(chain.as_ref(), &store, &parser).await?;
			}
			let service = TransactionService::new(store, chain, &config.chain);
			print_json(&service.mempool_transactions()?)?;
		}
		Command::Balance { address, currency } => {
			let service = TransactionService::new(store, chain, &config.chain);
			let balances: Vec<_> = service
				.balances(&address, currency.as_deref())?
				.into_iter()
				.map(|balance| {
					serde_json::json!({
						"address": balance.address,
						"currency": balance.currency,
						"balance": format_amount(balance.balance, config.chain.units),
					})
				})
				.collect();
			print_json(&balances)?;
		}
		Command::Broadcast { raw } => {
			let service = TransactionService::new(store, chain, &config.chain);
			let txid = service.broadcast(&raw).await?;
			print_json(&serde_json::json!({ "txid": txid }))?;
		}
	}

	Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
