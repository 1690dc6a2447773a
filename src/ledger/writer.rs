//! Ledger writer.
//!
//! Applies one parsed block as a single SQLite transaction: block row, outputs, transactions
//! with their per-currency totals, inputs, spent flags and balance movements. Readers never see
//! a partially applied block.

use crate::ledger::types::{LedgerError, ParsedBlock, TransactionRecord, currency_totals};
use crate::storage::{LedgerStore, StorageError, queries};

use itertools::Itertools;
use rusqlite::Connection;
use tracing::debug;

/// Apply `parsed` to the ledger atomically.
///
/// # Errors
/// Returns `LedgerError::ChainMismatch` if the block does not extend the stored block below it.
/// Any error leaves the ledger exactly as it was.
pub fn apply_block(store: &mut LedgerStore, parsed: &ParsedBlock) -> Result<(), LedgerError> {
	let block = &parsed.block;
	let tx = store.begin_write()?;

	check_parent(&tx, parsed)?;
	queries::insert_block(&tx, block)?;

	for output in &parsed.outputs {
		queries::insert_output(&tx, &block.blockhash, output)?;
	}

	let mut outputs_by_txid = parsed
		.outputs
		.iter()
		.into_group_map_by(|output| output.txid.as_str());

	for draft in &parsed.transactions {
		let (currencies, amount) =
			currency_totals(outputs_by_txid.remove(draft.txid.as_str()).unwrap_or_default());

		let record = TransactionRecord {
			txid: draft.txid.clone(),
			blockhash: block.blockhash.clone(),
			height: block.height,
			block_index: draft.block_index,
			addresses: draft.addresses.clone(),
			currencies,
			amount,
			locktime: draft.locktime,
			version: draft.version,
			size: draft.size,
			timestamp: draft.timestamp,
			created: draft.created,
			coinbase: draft.coinbase,
		};
		queries::insert_transaction(&tx, &record)?;
	}

	let mut spent = Vec::with_capacity(parsed.inputs.len());
	for input in &parsed.inputs {
		queries::insert_input(&tx, &block.blockhash, input)?;
		spent.push(input.shortcut.clone());
	}
	queries::mark_spent(&tx, &spent)?;

	for (currency, address, delta) in block.movements.iter() {
		queries::add_to_balance(&tx, address, currency, delta)?;
	}

	tx.commit().map_err(StorageError::from)?;

	debug!(
		"Applied block #{} {} ({} transactions, {} outputs, {} inputs)",
		block.height,
		block.blockhash,
		parsed.transactions.len(),
		parsed.outputs.len(),
		parsed.inputs.len()
	);
	Ok(())
}

/// Height H > 0 must point at the stored block at H - 1.
fn check_parent(conn: &Connection, parsed: &ParsedBlock) -> Result<(), LedgerError> {
	let block = &parsed.block;
	let Some(parent_height) = block.height.checked_sub(1) else {
		return Ok(());
	};

	let found = queries::blockhash_at_height(conn, parent_height)?.unwrap_or_default();
	let expected = block.prev_blockhash.clone().unwrap_or_default();

	if found != expected {
		return Err(LedgerError::ChainMismatch {
			height: block.height,
			expected,
			found,
		});
	}
	Ok(())
}
