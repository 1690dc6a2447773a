use crate::ledger::OutputRecord;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Transaction as presented to API and CLI callers.
///
/// Built on read from stored rows; nothing here is written back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTransaction {
	pub txid: String,
	/// `None` while unconfirmed.
	pub blockhash: Option<String>,
	pub height: Option<u64>,
	pub block_index: Option<u32>,
	pub confirmations: u64,
	/// Native currency fee, `None` when an input could not be resolved.
	pub fee: Option<Decimal>,
	pub coinbase: bool,
	pub addresses: Vec<String>,
	pub currencies: Vec<String>,
	pub amount: BTreeMap<String, Decimal>,
	pub locktime: i64,
	pub version: i64,
	pub size: i64,
	pub timestamp: Option<i64>,
	pub created: Option<DateTime<Utc>>,
	pub outputs: Vec<EnrichedOutput>,
	pub inputs: Vec<EnrichedInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedOutput {
	pub shortcut: String,
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
	pub units: u32,
}

impl EnrichedOutput {
	pub fn new(output: &OutputRecord, units: u32) -> Self {
		Self {
			shortcut: output.shortcut.clone(),
			index: output.index,
			currency: output.currency.clone(),
			address: output.address.clone(),
			amount: output.amount,
			kind: output.kind.clone(),
			script: output.script.clone(),
			asm: output.asm.clone(),
			timelock: output.timelock,
			spent: output.spent,
			units,
		}
	}
}

/// Input with the amount, currency and address of the output it spends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedInput {
	pub shortcut: String,
	pub source_txid: String,
	pub index: u32,
	pub amount: Option<Decimal>,
	pub currency: Option<String>,
	pub address: Option<String>,
	pub units: u32,
}
