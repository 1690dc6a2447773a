//! Event system for ledger synchronization.
//!
//! The sync driver reports what it did (blocks ingested or rolled back, cycle completion,
//! interruption) as `SyncEvent`s. Handlers registered on the `EventDispatcher` receive every
//! event in registration order; a failing handler never stops the driver or the other handlers.

use crate::ledger::LedgerError;
use crate::sync::progress_tracker::SyncStats;

use tracing::{debug, info, warn};

/// Events that occur during ledger synchronization
#[derive(Debug, Clone)]
pub enum SyncEvent {
	/// The genesis block was stored into an empty ledger
	Bootstrapped { blockhash: String },
	/// A block was applied
	BlockIngested {
		height: u64,
		blockhash: String,
		transactions: usize,
	},
	/// A block was undone during reorg resolution
	BlockRolledBack { height: u64, blockhash: String },
	/// The ledger reached the node tip
	SyncCompleted { stats: SyncStats },
	/// Catch-up stopped at a block boundary on request
	Interrupted { stats: SyncStats },
}

/// Trait for handling sync events.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
	/// Handle a sync event.
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), LedgerError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
#[derive(Default)]
pub struct EventDispatcher {
	handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a new event handler.
	///
	/// Handlers are called in the order they are registered.
	pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
		self.handlers.push(handler);
	}

	/// Dispatch an event to all registered handlers.
	///
	/// Errors from handlers are logged, but do not stop other handlers from running.
	pub async fn dispatch(&mut self, event: &SyncEvent) {
		for handler in &mut self.handlers {
			if let Err(e) = handler.handle(event).await {
				tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
			}
		}
	}
}

/// Writes every event to the log.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), LedgerError> {
		match event {
			SyncEvent::Bootstrapped { blockhash } => {
				info!("Bootstrapped ledger with genesis block {}", blockhash)
			}
			SyncEvent::BlockIngested {
				height,
				blockhash,
				transactions,
			} => debug!(
				"Ingested block #{} {} with {} transactions",
				height, blockhash, transactions
			),
			SyncEvent::BlockRolledBack { height, blockhash } => {
				warn!("Rolled back block #{} {}", height, blockhash)
			}
			SyncEvent::SyncCompleted { stats } => info!("{}", stats.summary()),
			SyncEvent::Interrupted { stats } => info!("Interrupted. {}", stats.summary()),
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"LoggingEventHandler"
	}
}
