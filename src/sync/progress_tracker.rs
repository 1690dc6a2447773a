//! Progress tracking for ledger synchronization.
//!
//! The tracker counts what one sync cycle ingested and rolled back, and decides which heights
//! are worth a progress log line. A cycle that starts within `log_interval` blocks of the node
//! tip logs every block; any other cycle logs every `log_interval`-th height throughout.

use crate::ledger::ParsedBlock;

use serde::Serialize;
use tracing::info;

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	/// Local tip when the cycle started
	start_height: u64,
	/// Node tip the cycle is catching up to
	target_height: u64,
	/// Highest height ingested during this cycle
	highest_processed_height: Option<u64>,
	log_interval: u64,
	/// Decided once when the cycle starts
	log_every_block: bool,
	blocks_processed: usize,
	transactions_processed: usize,
	outputs_processed: usize,
	inputs_processed: usize,
	blocks_rolled_back: usize,
}

impl SyncProgressTracker {
	pub fn new(start_height: u64, target_height: u64, log_interval: u64) -> Self {
		Self {
			start_height,
			target_height,
			highest_processed_height: None,
			log_interval: log_interval.max(1),
			log_every_block: target_height.saturating_sub(start_height) < log_interval.max(1),
			blocks_processed: 0,
			transactions_processed: 0,
			outputs_processed: 0,
			inputs_processed: 0,
			blocks_rolled_back: 0,
		}
	}

	/// Record an applied block
	pub fn record_block(&mut self, parsed: &ParsedBlock) {
		let height = parsed.block.height;
		let highest = self.highest_processed_height.map_or(height, |h| h.max(height));
		self.highest_processed_height = Some(highest);
		self.blocks_processed += 1;
		self.transactions_processed += parsed.transactions.len();
		self.outputs_processed += parsed.outputs.len();
		self.inputs_processed += parsed.inputs.len();
	}

	/// Record a rolled back block
	pub fn record_rollback(&mut self) {
		self.blocks_rolled_back += 1;
	}

	/// Whether `height` gets a progress line.
	pub fn should_log(&self, height: u64) -> bool {
		self.log_every_block || height % self.log_interval == 0
	}

	/// Log progress for `height` if it is due
	pub fn log_progress(&self, height: u64) {
		if self.should_log(height) {
			info!(
				"Processed block #{} of #{} ({} transactions this cycle)",
				height, self.target_height, self.transactions_processed
			);
		}
	}

	/// Get sync statistics as a SyncStats struct
	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			start_height: self.start_height,
			target_height: self.target_height,
			tip_height: self.highest_processed_height.unwrap_or(self.start_height),
			blocks_processed: self.blocks_processed,
			transactions_processed: self.transactions_processed,
			outputs_processed: self.outputs_processed,
			inputs_processed: self.inputs_processed,
			blocks_rolled_back: self.blocks_rolled_back,
		}
	}
}

/// Statistics about one sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStats {
	pub start_height: u64,
	pub target_height: u64,
	/// Local tip at the end of the cycle
	pub tip_height: u64,
	pub blocks_processed: usize,
	pub transactions_processed: usize,
	pub outputs_processed: usize,
	pub inputs_processed: usize,
	pub blocks_rolled_back: usize,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		format!(
			"Sync from #{} to #{}: {} blocks, {} transactions, {} outputs, {} inputs{}",
			self.start_height,
			self.tip_height,
			self.blocks_processed,
			self.transactions_processed,
			self.outputs_processed,
			self.inputs_processed,
			if self.blocks_rolled_back == 0 {
				String::new()
			} else {
				format!(" ({} rolled back)", self.blocks_rolled_back)
			}
		)
	}
}
