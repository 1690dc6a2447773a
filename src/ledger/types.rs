use crate::ledger::movements::Movements;
use crate::node::NodeError;
use crate::storage::StorageError;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spendable output, identified by its `txid:index` shortcut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
	pub shortcut: String,
	pub txid: String,
	/// Containing block, `None` while the transaction is unconfirmed.
	pub blockhash: Option<String>,
	pub index: u32,
	pub currency: String,
	pub address: String,
	pub amount: Decimal,
	#[serde(rename = "type")]
	pub kind: String,
	pub script: String,
	pub asm: String,
	pub timelock: i64,
	pub spent: bool,
	#[serde(default)]
	pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Input spending the output named by `shortcut`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
	pub shortcut: String,
	/// Spending transaction.
	pub txid: String,
	pub source_txid: String,
	/// Output index inside `source_txid`.
	pub index: u32,
	pub blockhash: Option<String>,
}

/// Transaction fields taken straight from the node payload.
///
/// Currency totals are left to the ledger writer, which derives them from the stored outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
	pub txid: String,
	pub blockhash: Option<String>,
	/// Position of the transaction inside its block.
	pub block_index: Option<u32>,
	pub addresses: Vec<String>,
	pub locktime: i64,
	pub version: i64,
	pub size: i64,
	pub timestamp: Option<i64>,
	pub created: Option<DateTime<Utc>>,
	pub coinbase: bool,
}

/// Stored transaction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
	pub txid: String,
	pub blockhash: String,
	pub height: u64,
	pub block_index: Option<u32>,
	pub addresses: Vec<String>,
	pub currencies: Vec<String>,
	/// Total output volume per currency.
	pub amount: BTreeMap<String, Decimal>,
	pub locktime: i64,
	pub version: i64,
	pub size: i64,
	pub timestamp: Option<i64>,
	pub created: Option<DateTime<Utc>>,
	pub coinbase: bool,
}

/// Currencies in first-seen order and total output volume per currency.
pub fn currency_totals<'a>(
	outputs: impl IntoIterator<Item = &'a OutputRecord>,
) -> (Vec<String>, BTreeMap<String, Decimal>) {
	let mut currencies = Vec::new();
	let mut amounts: BTreeMap<String, Decimal> = BTreeMap::new();

	for output in outputs {
		if !currencies.contains(&output.currency) {
			currencies.push(output.currency.clone());
		}
		*amounts.entry(output.currency.clone()).or_insert(Decimal::ZERO) += output.amount;
	}

	(currencies, amounts)
}

/// Stored block row, carrying the balance movements it applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
	pub blockhash: String,
	pub height: u64,
	pub prev_blockhash: Option<String>,
	pub timestamp: i64,
	pub created: DateTime<Utc>,
	pub movements: Movements,
}

/// Everything needed to apply one block to the ledger.
#[derive(Debug, Clone)]
pub struct ParsedBlock {
	pub block: BlockRecord,
	pub transactions: Vec<TransactionDraft>,
	pub outputs: Vec<OutputRecord>,
	pub inputs: Vec<InputRecord>,
}

/// Error types for ledger ingestion, rollback and enrichment
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("Node error: {0}")]
	Node(#[from] NodeError),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("Cannot resolve output {shortcut} spent by an input")]
	Resolution { shortcut: String },

	#[error("Parse error: {0}")]
	Parse(String),

	#[error("Block at height {height} expects parent {expected}, ledger has {found}")]
	ChainMismatch {
		height: u64,
		expected: String,
		found: String,
	},

	#[error("Rolled back past genesis without finding a common ancestor")]
	RollbackExhausted,
}

impl LedgerError {
	/// Fatal errors must stop the sync driver; everything else is retried next cycle.
	pub fn is_fatal(&self) -> bool {
		matches!(self, LedgerError::RollbackExhausted | LedgerError::Storage(_))
	}
}
