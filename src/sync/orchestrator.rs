//! Ledger sync driver.
//!
//! This module defines the `SyncDriver`, which keeps the local ledger in step with the node.
//! One cycle walks through the sync states:
//!
//! - `Bootstrapping`: an empty ledger stores the genesis block
//! - `ResolvingReorg`: the local tip is checked against the node and rolled back while it differs
//! - `CatchingUp`: every height above the local tip up to the node tip is ingested in order
//! - `Idle`: the node tip was reached
//!
//! Every block applied or rolled back is its own SQLite transaction. A cancellation request is
//! honored between blocks during catch-up, so an interrupted cycle always leaves the ledger at a
//! block boundary and the next cycle resumes from there.

use crate::config::{LedgerConfig, SyncConfig};
use crate::ledger::{LedgerError, RecordParser, apply_block, resolve_reorg};
use crate::mempool::refresh_mempool;
use crate::node::ChainSource;
use crate::storage::LedgerStore;
use crate::sync::{
	cancellation::CancellationSignal,
	events::{EventDispatcher, LoggingEventHandler, SyncEvent},
	progress_tracker::{SyncProgressTracker, SyncStats},
};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Phase of the sync driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
	Uninitialized,
	Bootstrapping,
	ResolvingReorg,
	CatchingUp,
	Idle,
}

/// How a sync cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
	/// The ledger reached the node tip.
	Completed(SyncStats),
	/// Cancellation stopped the cycle at a block boundary.
	Interrupted(SyncStats),
}

impl SyncOutcome {
	pub fn stats(&self) -> &SyncStats {
		match self {
			SyncOutcome::Completed(stats) | SyncOutcome::Interrupted(stats) => stats,
		}
	}
}

/// Drives the ledger from its stored tip to the node tip.
///
/// The driver is the only writer of the confirmed ledger. Blocks are ingested strictly in
/// height order since each block's movements build on the balances left by the previous one.
pub struct SyncDriver<C: ChainSource> {
	chain: Arc<C>,
	store: LedgerStore,
	parser: RecordParser,
	config: SyncConfig,
	event_dispatcher: EventDispatcher,
	state: SyncState,
}

impl<C: ChainSource> SyncDriver<C> {
	/// Create a driver writing to `store`, with the logging handler registered.
	pub fn new(chain: Arc<C>, store: LedgerStore, config: &LedgerConfig) -> Self {
		let mut event_dispatcher = EventDispatcher::new();
		event_dispatcher.register_handler(Box::new(LoggingEventHandler));

		Self {
			chain,
			store,
			parser: RecordParser::new(config.chain.currency.clone()),
			config: config.sync.clone(),
			event_dispatcher,
			state: SyncState::Uninitialized,
		}
	}

	/// Register an additional event handler.
	#[cfg(test)]
	pub fn register_handler(&mut self, handler: Box<dyn crate::sync::events::SyncEventHandler>) {
		self.event_dispatcher.register_handler(handler);
	}

	#[cfg(test)]
	pub fn state(&self) -> SyncState {
		self.state
	}

	#[cfg(test)]
	pub fn store(&self) -> &LedgerStore {
		&self.store
	}

	/// Run one sync cycle.
	///
	/// # Errors
	/// Any error aborts the block being processed; blocks committed before it stay committed.
	/// Use `LedgerError::is_fatal` to tell a corrupted ledger from a cycle worth retrying.
	pub async fn run_cycle(
		&mut self,
		cancel: &CancellationSignal,
	) -> Result<SyncOutcome, LedgerError> {
		let tip = match self.store.latest_block()? {
			Some(tip) => tip,
			None => {
				self.state = SyncState::Bootstrapping;
				info!("Ledger is empty, bootstrapping from genesis");

				let genesis = self.parser.parse_block(self.chain.as_ref(), 0).await?;
				apply_block(&mut self.store, &genesis)?;

				self.event_dispatcher
					.dispatch(&SyncEvent::Bootstrapped {
						blockhash: genesis.block.blockhash.clone(),
					})
					.await;
				genesis.block
			}
		};

		let node_height = self.chain.chain_info().await?.blocks;

		self.state = SyncState::ResolvingReorg;
		let reorg = resolve_reorg(&mut self.store, self.chain.as_ref(), tip, node_height).await?;
		for block in &reorg.rolled_back {
			self.event_dispatcher
				.dispatch(&SyncEvent::BlockRolledBack {
					height: block.height,
					blockhash: block.blockhash.clone(),
				})
				.await;
		}

		self.state = SyncState::CatchingUp;
		let mut progress_tracker =
			SyncProgressTracker::new(reorg.tip.height, node_height, self.config.log_interval);
		for _ in &reorg.rolled_back {
			progress_tracker.record_rollback();
		}

		debug!(
			"Catching up from #{} to node tip #{}",
			reorg.tip.height, node_height
		);

		for height in reorg.tip.height + 1..=node_height {
			if cancel.is_cancelled() {
				let stats = progress_tracker.get_stats();
				self.state = SyncState::Idle;
				self.event_dispatcher
					.dispatch(&SyncEvent::Interrupted {
						stats: stats.clone(),
					})
					.await;
				return Ok(SyncOutcome::Interrupted(stats));
			}

			let parsed = self.parser.parse_block(self.chain.as_ref(), height).await?;
			apply_block(&mut self.store, &parsed)?;

			progress_tracker.record_block(&parsed);
			progress_tracker.log_progress(height);

			self.event_dispatcher
				.dispatch(&SyncEvent::BlockIngested {
					height,
					blockhash: parsed.block.blockhash.clone(),
					transactions: parsed.transactions.len(),
				})
				.await;
		}

		self.state = SyncState::Idle;
		let stats = progress_tracker.get_stats();
		self.event_dispatcher
			.dispatch(&SyncEvent::SyncCompleted {
				stats: stats.clone(),
			})
			.await;

		Ok(SyncOutcome::Completed(stats))
	}

	/// Run sync cycles until cancelled or a fatal error occurs.
	///
	/// Completed cycles are followed by a mempool refresh (when enabled) and a poll interval
	/// wait; failed cycles are retried after the retry delay.
	pub async fn run(&mut self, cancel: &CancellationSignal) -> Result<(), LedgerError> {
		info!("Starting ledger sync");

		loop {
			let delay = match self.run_cycle(cancel).await {
				Ok(SyncOutcome::Interrupted(_)) => break,
				Ok(SyncOutcome::Completed(_)) => {
					if self.config.refresh_mempool {
						if let Err(e) =
							refresh_mempool(self.chain.as_ref(), &self.store, &self.parser).await
						{
							warn!("Failed to refresh mempool: {}", e);
						}
					}
					Duration::from_secs(self.config.poll_interval_secs)
				}
				Err(e) if e.is_fatal() => {
					error!("Sync halted: {}", e);
					return Err(e);
				}
				Err(e) => {
					warn!(
						"Sync cycle failed, retrying in {}s: {}",
						self.config.retry_delay_secs, e
					);
					Duration::from_secs(self.config.retry_delay_secs)
				}
			};

			if cancel.sleep(delay).await {
				break;
			}
		}

		info!("Ledger sync stopped");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sync::events::SyncEventHandler;
	use crate::testing::{MockChain, coinbase_tx, spend_tx};
	use rust_decimal_macros::dec;
	use std::sync::Mutex;

	fn config() -> LedgerConfig {
		let mut config = LedgerConfig::default();
		config.sync.poll_interval_secs = 0;
		config.sync.retry_delay_secs = 0;
		config
	}

	fn driver(chain: &Arc<MockChain>) -> SyncDriver<MockChain> {
		let store = LedgerStore::open_memory().expect("open");
		SyncDriver::new(chain.clone(), store, &config())
	}

	fn total_changes(store: &LedgerStore) -> i64 {
		store
			.connection()
			.query_row("SELECT total_changes()", [], |row| row.get(0))
			.expect("total_changes")
	}

	/// Genesis plus five blocks: A is paid at #1 and spends to B at #3.
	fn five_block_chain() -> Arc<MockChain> {
		let chain = Arc::new(MockChain::new());
		chain.push_block(Vec::new());
		chain.push_block(vec![coinbase_tx("c1", &[("A", "50")])]);
		chain.push_block(vec![coinbase_tx("c2", &[("M", "50")])]);
		chain.push_block(vec![
			coinbase_tx("c3", &[("M", "50")]),
			spend_tx("s3", &[("c1", 0)], &[("B", "20"), ("A", "29.9999")]),
		]);
		chain.push_block(vec![coinbase_tx("c4", &[("M", "50")])]);
		chain.push_block(vec![coinbase_tx("c5", &[("D", "50")])]);
		chain
	}

	struct Recorder(Arc<Mutex<Vec<String>>>);

	#[async_trait::async_trait]
	impl SyncEventHandler for Recorder {
		async fn handle(&mut self, event: &SyncEvent) -> Result<(), LedgerError> {
			let entry = match event {
				SyncEvent::Bootstrapped { .. } => "bootstrapped".to_string(),
				SyncEvent::BlockIngested { height, .. } => format!("ingested {}", height),
				SyncEvent::BlockRolledBack { height, .. } => format!("rolled back {}", height),
				SyncEvent::SyncCompleted { .. } => "completed".to_string(),
				SyncEvent::Interrupted { .. } => "interrupted".to_string(),
			};
			self.0.lock().unwrap().push(entry);
			Ok(())
		}

		fn name(&self) -> &'static str {
			"Recorder"
		}
	}

	#[tokio::test]
	async fn test_bootstrap_and_catch_up() {
		let chain = five_block_chain();
		let mut driver = driver(&chain);
		assert_eq!(driver.state(), SyncState::Uninitialized);

		let seen = Arc::new(Mutex::new(Vec::new()));
		driver.register_handler(Box::new(Recorder(seen.clone())));

		let outcome = driver
			.run_cycle(&CancellationSignal::new())
			.await
			.expect("cycle");

		assert_eq!(driver.state(), SyncState::Idle);
		let stats = outcome.stats();
		assert_eq!(stats.tip_height, 5);
		assert_eq!(stats.blocks_processed, 5);

		let store = driver.store();
		assert_eq!(store.address_balance("A", "MBC").expect("balance"), Some(dec!(29.9999)));
		assert_eq!(store.address_balance("B", "MBC").expect("balance"), Some(dec!(20)));
		assert_eq!(store.address_balance("M", "MBC").expect("balance"), Some(dec!(150)));

		let seen = seen.lock().unwrap();
		assert_eq!(seen.first().map(String::as_str), Some("bootstrapped"));
		assert_eq!(seen[1], "ingested 1");
		assert_eq!(seen.last().map(String::as_str), Some("completed"));
	}

	#[tokio::test]
	async fn test_synced_ledger_cycle_writes_nothing() {
		let chain = five_block_chain();
		let mut driver = driver(&chain);
		let cancel = CancellationSignal::new();
		driver.run_cycle(&cancel).await.expect("first cycle");

		let before = total_changes(driver.store());
		let outcome = driver.run_cycle(&cancel).await.expect("second cycle");

		assert_eq!(outcome.stats().blocks_processed, 0);
		assert_eq!(outcome.stats().blocks_rolled_back, 0);
		assert_eq!(total_changes(driver.store()), before);
	}

	#[tokio::test]
	async fn test_reorged_tip_is_replaced() {
		let chain = five_block_chain();
		let mut driver = driver(&chain);
		let cancel = CancellationSignal::new();
		driver.run_cycle(&cancel).await.expect("first cycle");

		let h4 = driver.store().block_at_height(4).expect("query").expect("h4");
		chain.replace_tip("h5b", vec![coinbase_tx("c5b", &[("E", "50")])]);

		let outcome = driver.run_cycle(&cancel).await.expect("reorg cycle");
		assert_eq!(outcome.stats().blocks_rolled_back, 1);
		assert_eq!(outcome.stats().blocks_processed, 1);

		let store = driver.store();
		let tip = store.latest_block().expect("latest").expect("tip");
		assert_eq!(tip.height, 5);
		assert_eq!(tip.blockhash, "h5b");
		assert_eq!(store.block_at_height(4).expect("query"), Some(h4));

		assert!(store.transaction("c5").expect("query").is_none());
		assert!(store.output("c5:0").expect("query").is_none());
		assert_eq!(store.address_balance("D", "MBC").expect("balance"), Some(dec!(0)));
		assert_eq!(store.address_balance("E", "MBC").expect("balance"), Some(dec!(50)));
	}

	#[tokio::test]
	async fn test_resolution_error_does_not_advance_tip() {
		let chain = Arc::new(MockChain::new());
		chain.push_block(Vec::new());
		chain.push_block(vec![coinbase_tx("c1", &[("A", "50")])]);
		chain.push_block(vec![spend_tx("s2", &[("missing", 0)], &[("B", "1")])]);

		let mut driver = driver(&chain);
		let result = driver.run_cycle(&CancellationSignal::new()).await;

		let error = result.expect_err("unresolvable input");
		assert!(matches!(error, LedgerError::Resolution { ref shortcut } if shortcut == "missing:0"));
		assert!(!error.is_fatal());
		assert_eq!(driver.store().latest_block().expect("latest").expect("tip").height, 1);
		assert!(driver.store().transaction("s2").expect("query").is_none());
	}

	#[tokio::test]
	async fn test_cancellation_stops_between_blocks() {
		let chain = five_block_chain();
		let mut driver = driver(&chain);

		let cancel = CancellationSignal::new();
		cancel.cancel();
		let outcome = driver.run_cycle(&cancel).await.expect("cycle");

		assert!(matches!(outcome, SyncOutcome::Interrupted(_)));
		assert_eq!(outcome.stats().tip_height, 0);
		assert_eq!(driver.store().latest_block().expect("latest").expect("tip").height, 0);

		let outcome = driver
			.run_cycle(&CancellationSignal::new())
			.await
			.expect("resumed cycle");
		assert_eq!(outcome.stats().blocks_processed, 5);
	}

	#[tokio::test]
	async fn test_node_error_is_retryable() {
		let chain = five_block_chain();
		let mut driver = driver(&chain);
		chain.set_offline(true);

		let error = driver
			.run_cycle(&CancellationSignal::new())
			.await
			.expect_err("node offline");
		assert!(matches!(error, LedgerError::Node(_)));
		assert!(!error.is_fatal());
		assert!(driver.store().latest_block().expect("latest").is_none());
	}

	#[tokio::test]
	async fn test_run_halts_on_rollback_exhaustion() {
		let chain = Arc::new(MockChain::new());
		chain.push_block(Vec::new());
		chain.push_block(vec![coinbase_tx("c1", &[("A", "50")])]);

		let mut store = LedgerStore::open_memory().expect("open");
		let parser = RecordParser::new("MBC");
		for height in 0..=1 {
			let parsed = parser.parse_block(chain.as_ref(), height).await.expect("parse");
			apply_block(&mut store, &parsed).expect("apply");
		}

		let other = Arc::new(MockChain::with_prefix("x"));
		other.push_block(Vec::new());
		other.push_block(Vec::new());

		let mut driver = SyncDriver::new(other, store, &config());
		let result = driver.run(&CancellationSignal::new()).await;
		assert!(matches!(result, Err(LedgerError::RollbackExhausted)));
	}

	#[tokio::test]
	async fn test_run_refreshes_mempool_and_stops_on_cancel() {
		let chain = five_block_chain();
		chain.add_mempool_transaction(spend_tx("m1", &[("c2", 0)], &[("F", "49")]));

		let mut config = config();
		config.sync.poll_interval_secs = 60;
		let store = LedgerStore::open_memory().expect("open");
		let mut driver = SyncDriver::new(chain.clone(), store, &config);

		let cancel = CancellationSignal::new();
		let canceller = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;
			canceller.cancel();
		});

		driver.run(&cancel).await.expect("run");

		let snapshot = driver.store().load_mempool().expect("load").expect("stored");
		assert!(snapshot.transaction("m1").is_some());
		assert_eq!(driver.store().latest_block().expect("latest").expect("tip").height, 5);
	}
}
