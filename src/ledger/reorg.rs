//! Reorg resolver.
//!
//! Walks back from the local tip until the stored block hash at some height matches the node's
//! hash at that height. Every block rolled back on the way is undone in its own SQLite
//! transaction: its rows are deleted and its balance movements subtracted.

use crate::ledger::types::{BlockRecord, LedgerError};
use crate::node::ChainSource;
use crate::storage::{LedgerStore, StorageError, queries};

use tracing::{info, warn};

/// Result of reconciling the local tip with the node.
#[derive(Debug, Clone)]
pub struct ReorgOutcome {
	/// Deepest local block that agrees with the node.
	pub tip: BlockRecord,
	/// Blocks that were rolled back, newest first.
	pub rolled_back: Vec<BlockRecord>,
}

/// Undo one block.
///
/// Spent flags set by the block's inputs are left untouched.
pub fn rollback_block(store: &mut LedgerStore, block: &BlockRecord) -> Result<(), LedgerError> {
	let tx = store.begin_write()?;

	queries::delete_block_rows(&tx, &block.blockhash)?;

	for (currency, address, delta) in block.movements.iter() {
		if !queries::subtract_from_balance(&tx, address, currency, delta)? {
			warn!(
				"No {} balance for {} while rolling back block #{}",
				currency, address, block.height
			);
		}
	}

	tx.commit().map_err(StorageError::from)?;
	Ok(())
}

/// Roll back local blocks until the tip matches the node's chain.
///
/// `node_height` is the node's current tip height. A local block above it is treated as
/// diverged without asking the node for its hash.
///
/// # Errors
/// Returns `LedgerError::RollbackExhausted` if the genesis block itself diverges.
pub async fn resolve_reorg<C: ChainSource + ?Sized>(
	store: &mut LedgerStore,
	chain: &C,
	tip: BlockRecord,
	node_height: u64,
) -> Result<ReorgOutcome, LedgerError> {
	let mut tip = tip;
	let mut rolled_back = Vec::new();

	loop {
		if tip.height <= node_height {
			let node_hash = chain.block_hash(tip.height).await?;
			if node_hash == tip.blockhash {
				break;
			}
			warn!(
				"Found reorg at height #{}: ledger has {}, node has {}",
				tip.height, tip.blockhash, node_hash
			);
		} else {
			warn!(
				"Ledger tip #{} is above node height #{}",
				tip.height, node_height
			);
		}

		rollback_block(store, &tip)?;
		info!("Rolled back block #{} {}", tip.height, tip.blockhash);

		let parent = match tip.height.checked_sub(1) {
			Some(height) => store.block_at_height(height)?,
			None => None,
		};
		rolled_back.push(tip);

		tip = parent.ok_or(LedgerError::RollbackExhausted)?;
	}

	Ok(ReorgOutcome { tip, rolled_back })
}
