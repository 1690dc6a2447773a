//! Mempool snapshot.
//!
//! The node's unconfirmed pool is parsed with the same record parser as confirmed blocks and
//! stored as one JSON document. Readers take whatever snapshot was stored last; it may lag the
//! node.

use crate::ledger::{InputRecord, LedgerError, OutputRecord, RecordParser, TransactionDraft};
use crate::node::ChainSource;
use crate::storage::LedgerStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Parsed view of the node's mempool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MempoolSnapshot {
	pub transactions: Vec<MempoolTransaction>,
	/// Every output created by a mempool transaction, keyed by shortcut.
	pub outputs: BTreeMap<String, OutputRecord>,
}

/// Unconfirmed transaction with its own outputs and inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolTransaction {
	pub transaction: TransactionDraft,
	pub outputs: Vec<OutputRecord>,
	pub inputs: Vec<InputRecord>,
}

impl MempoolSnapshot {
	pub fn transaction(&self, txid: &str) -> Option<&MempoolTransaction> {
		self.transactions
			.iter()
			.find(|pending| pending.transaction.txid == txid)
	}
}

/// Rebuild the mempool snapshot from the node and store it.
///
/// Transactions that left the pool between listing and fetching are skipped.
pub async fn refresh_mempool<C: ChainSource + ?Sized>(
	chain: &C,
	store: &LedgerStore,
	parser: &RecordParser,
) -> Result<MempoolSnapshot, LedgerError> {
	let txids = chain.mempool_txids().await?;

	let mut snapshot = MempoolSnapshot::default();
	if !txids.is_empty() {
		for tx in chain.raw_transactions(&txids).await?.iter().flatten() {
			let outputs = parser.parse_outputs(tx)?;
			let inputs = parser.parse_inputs(tx)?;

			for output in &outputs {
				snapshot
					.outputs
					.insert(output.shortcut.clone(), output.clone());
			}

			snapshot.transactions.push(MempoolTransaction {
				transaction: parser.parse_transaction(tx, None),
				outputs,
				inputs,
			});
		}
	}

	store.save_mempool(&snapshot)?;

	debug!(
		"Stored mempool snapshot: {} of {} transactions, {} outputs",
		snapshot.transactions.len(),
		txids.len(),
		snapshot.outputs.len()
	);
	Ok(snapshot)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockChain, coinbase_tx, spend_tx};
	use rust_decimal_macros::dec;

	#[tokio::test]
	async fn test_refresh_stores_parsed_snapshot() {
		let chain = MockChain::new();
		chain.push_block(vec![coinbase_tx("t1", &[("A", "10")])]);
		chain.add_mempool_transaction(spend_tx("m1", &[("t1", 0)], &[("B", "9.5")]));
		chain.add_mempool_transaction(spend_tx("m2", &[("m1", 0)], &[("C", "9")]));

		let store = LedgerStore::open_memory().expect("open");
		assert!(store.load_mempool().expect("load").is_none());

		let snapshot = refresh_mempool(&chain, &store, &RecordParser::new("MBC"))
			.await
			.expect("refresh");
		assert_eq!(snapshot.transactions.len(), 2);
		assert_eq!(snapshot.outputs["m1:0"].amount, dec!(9.5));
		assert!(snapshot.outputs["m1:0"].blockhash.is_none());

		let stored = store.load_mempool().expect("load").expect("stored");
		assert_eq!(stored, snapshot);
		let pending = stored.transaction("m2").expect("m2 pending");
		assert_eq!(pending.inputs[0].shortcut, "m1:0");
		assert!(pending.transaction.block_index.is_none());
	}

	#[tokio::test]
	async fn test_refresh_replaces_previous_snapshot() {
		let chain = MockChain::new();
		chain.push_block(vec![coinbase_tx("t1", &[("A", "10")])]);
		chain.add_mempool_transaction(spend_tx("m1", &[("t1", 0)], &[("B", "9.5")]));

		let store = LedgerStore::open_memory().expect("open");
		let parser = RecordParser::new("MBC");
		refresh_mempool(&chain, &store, &parser).await.expect("refresh");

		chain.clear_mempool();
		refresh_mempool(&chain, &store, &parser).await.expect("refresh");

		let stored = store.load_mempool().expect("load").expect("stored");
		assert!(stored.transactions.is_empty());
		assert!(stored.outputs.is_empty());
		assert_eq!(chain.transaction_requests().len(), 1);
	}
}
