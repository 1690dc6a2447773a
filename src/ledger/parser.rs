//! Raw record parser.
//!
//! Turns node payloads into draft ledger records: outputs, inputs and transaction rows. Inputs
//! only carry a reference to the output they spend, so a block's inputs are resolved by fetching
//! their source transactions from the node and re-parsing those outputs.

use crate::ledger::movements::compute_movements;
use crate::ledger::types::{
	BlockRecord, InputRecord, LedgerError, OutputRecord, ParsedBlock, TransactionDraft,
};
use crate::node::{ChainSource, RawTransaction};

use chrono::DateTime;
use itertools::Itertools;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Script types that carry no address and no spendable value.
const NON_VALUE_SCRIPT_TYPES: &[&str] = &["nonstandard", "nulldata"];

/// Script type whose first asm token is a lock time.
const TIMELOCK_SCRIPT_TYPE: &str = "cltv";

/// Draft records of a list of transactions.
#[derive(Debug, Clone, Default)]
pub struct ParsedTransactions {
	pub transactions: Vec<TransactionDraft>,
	pub outputs: Vec<OutputRecord>,
	pub inputs: Vec<InputRecord>,
}

#[derive(Clone)]
pub struct RecordParser {
	/// Currency assigned to every parsed output.
	currency: String,
}

impl RecordParser {
	pub fn new(currency: impl Into<String>) -> Self {
		Self {
			currency: currency.into(),
		}
	}

	/// Parse the value-bearing outputs of a transaction.
	pub fn parse_outputs(&self, tx: &RawTransaction) -> Result<Vec<OutputRecord>, LedgerError> {
		let mut outputs = Vec::with_capacity(tx.vout.len());

		for vout in &tx.vout {
			let script = &vout.script_pub_key;

			if NON_VALUE_SCRIPT_TYPES.contains(&script.kind.as_str()) {
				continue;
			}

			let Some(address) = script.first_address() else {
				warn!(
					"Skipping {} output {}:{} without address",
					script.kind, tx.txid, vout.n
				);
				continue;
			};

			let timelock = if script.kind == TIMELOCK_SCRIPT_TYPE {
				parse_timelock(&script.asm)?
			} else {
				0
			};

			outputs.push(OutputRecord {
				shortcut: format!("{}:{}", tx.txid, vout.n),
				txid: tx.txid.clone(),
				blockhash: tx.blockhash.clone(),
				index: vout.n,
				currency: self.currency.clone(),
				address: address.to_string(),
				amount: parse_amount(&vout.value)?,
				kind: script.kind.clone(),
				script: script.hex.clone(),
				asm: script.asm.clone(),
				timelock,
				spent: false,
				meta: serde_json::Map::new(),
			});
		}

		Ok(outputs)
	}

	/// Parse the inputs of a transaction, skipping generation inputs.
	pub fn parse_inputs(&self, tx: &RawTransaction) -> Result<Vec<InputRecord>, LedgerError> {
		let mut inputs = Vec::with_capacity(tx.vin.len());

		for vin in &tx.vin {
			if vin.is_coinbase() {
				continue;
			}

			let (Some(source_txid), Some(index)) = (&vin.txid, vin.vout) else {
				return Err(LedgerError::Parse(format!(
					"input of {} has no source reference",
					tx.txid
				)));
			};

			inputs.push(InputRecord {
				shortcut: format!("{}:{}", source_txid, index),
				txid: tx.txid.clone(),
				source_txid: source_txid.clone(),
				index,
				blockhash: tx.blockhash.clone(),
			});
		}

		Ok(inputs)
	}

	/// Build the transaction row fields of a raw transaction.
	pub fn parse_transaction(
		&self,
		tx: &RawTransaction,
		block_index: Option<u32>,
	) -> TransactionDraft {
		let addresses = tx
			.vout
			.iter()
			.flat_map(|vout| vout.script_pub_key.all_addresses())
			.unique()
			.map(str::to_string)
			.collect();

		TransactionDraft {
			txid: tx.txid.clone(),
			blockhash: tx.blockhash.clone(),
			block_index,
			addresses,
			locktime: tx.locktime,
			version: tx.version,
			size: tx.size,
			timestamp: tx.time,
			created: tx.time.and_then(|time| DateTime::from_timestamp(time, 0)),
			coinbase: tx.is_coinbase(),
		}
	}

	/// Fetch and parse a list of transactions.
	///
	/// Transactions the node does not return are skipped.
	pub async fn parse_transactions<C: ChainSource + ?Sized>(
		&self,
		chain: &C,
		txids: &[String],
	) -> Result<ParsedTransactions, LedgerError> {
		let mut parsed = ParsedTransactions::default();
		if txids.is_empty() {
			return Ok(parsed);
		}

		let raw_transactions = chain.raw_transactions(txids).await?;

		for (position, raw) in raw_transactions.iter().enumerate() {
			let Some(tx) = raw else {
				debug!("Transaction {} unavailable, skipping", txids[position]);
				continue;
			};

			parsed
				.transactions
				.push(self.parse_transaction(tx, Some(position as u32)));
			parsed.outputs.extend(self.parse_outputs(tx)?);
			parsed.inputs.extend(self.parse_inputs(tx)?);
		}

		Ok(parsed)
	}

	/// Resolve the outputs spent by `inputs`.
	///
	/// Source transactions are fetched once per distinct txid in a single batch.
	///
	/// # Returns
	/// The spent outputs keyed by shortcut.
	///
	/// # Errors
	/// Returns `LedgerError::Resolution` if any input's source output cannot be found.
	pub async fn resolve_inputs<C: ChainSource + ?Sized>(
		&self,
		chain: &C,
		inputs: &[InputRecord],
	) -> Result<HashMap<String, OutputRecord>, LedgerError> {
		if inputs.is_empty() {
			return Ok(HashMap::new());
		}

		let source_txids: Vec<String> = inputs
			.iter()
			.map(|input| input.source_txid.clone())
			.unique()
			.collect();

		debug!("Resolving {} source transactions", source_txids.len());

		let mut source_outputs = HashMap::new();
		for tx in chain.raw_transactions(&source_txids).await?.iter().flatten() {
			for output in self.parse_outputs(tx)? {
				source_outputs.insert(output.shortcut.clone(), output);
			}
		}

		if let Some(missing) = inputs
			.iter()
			.find(|input| !source_outputs.contains_key(&input.shortcut))
		{
			return Err(LedgerError::Resolution {
				shortcut: missing.shortcut.clone(),
			});
		}

		Ok(source_outputs)
	}

	/// Fetch and parse the block at `height`, including its movements.
	///
	/// The genesis block's transactions are not fetched.
	pub async fn parse_block<C: ChainSource + ?Sized>(
		&self,
		chain: &C,
		height: u64,
	) -> Result<ParsedBlock, LedgerError> {
		let hash = chain.block_hash(height).await?;
		let raw_block = chain.block(&hash).await?;

		if raw_block.height != height {
			return Err(LedgerError::Parse(format!(
				"node returned block {} at height {} for height {}",
				raw_block.hash, raw_block.height, height
			)));
		}

		let txids: &[String] = if height == 0 { &[] } else { &raw_block.tx };
		let parsed = self.parse_transactions(chain, txids).await?;

		let resolved = self.resolve_inputs(chain, &parsed.inputs).await?;
		let movements = compute_movements(&parsed.outputs, &parsed.inputs, &resolved)?;

		let created = DateTime::from_timestamp(raw_block.time, 0).ok_or_else(|| {
			LedgerError::Parse(format!("invalid block time {}", raw_block.time))
		})?;

		Ok(ParsedBlock {
			block: BlockRecord {
				blockhash: raw_block.hash,
				height: raw_block.height,
				prev_blockhash: raw_block.previous_block_hash,
				timestamp: raw_block.time,
				created,
				movements,
			},
			transactions: parsed.transactions,
			outputs: parsed.outputs,
			inputs: parsed.inputs,
		})
	}
}

/// Parse an output value without going through a binary float.
fn parse_amount(value: &serde_json::Number) -> Result<Decimal, LedgerError> {
	let text = value.to_string();
	Decimal::from_str(&text)
		.or_else(|_| Decimal::from_scientific(&text))
		.map_err(|e| LedgerError::Parse(format!("invalid output value {}: {}", text, e)))
}

/// Lock time encoded as the first asm token of a time-locked script.
fn parse_timelock(asm: &str) -> Result<i64, LedgerError> {
	asm.split(' ')
		.next()
		.and_then(|token| token.parse().ok())
		.ok_or_else(|| LedgerError::Parse(format!("invalid timelock script: {}", asm)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockChain, coinbase_tx, nulldata_output, spend_tx, value_output};
	use rust_decimal_macros::dec;

	fn parser() -> RecordParser {
		RecordParser::new("MBC")
	}

	#[test]
	fn test_nulldata_and_nonstandard_outputs_skipped() {
		let mut tx = coinbase_tx("t1", &[("A", "10")]);
		tx.vout.push(nulldata_output(1));
		let mut nonstandard = value_output(2, "B", "1");
		nonstandard.script_pub_key.kind = "nonstandard".to_string();
		tx.vout.push(nonstandard);

		let outputs = parser().parse_outputs(&tx).expect("parse outputs");
		assert_eq!(outputs.len(), 1);
		assert_eq!(outputs[0].shortcut, "t1:0");
		assert_eq!(outputs[0].amount, dec!(10));
		assert_eq!(outputs[0].currency, "MBC");
		assert!(!outputs[0].spent);
	}

	#[test]
	fn test_amount_parsed_exactly() {
		let tx = coinbase_tx("t1", &[("A", "0.30000001"), ("B", "20999999.99999999")]);
		let outputs = parser().parse_outputs(&tx).expect("parse outputs");
		assert_eq!(outputs[0].amount, dec!(0.30000001));
		assert_eq!(outputs[1].amount, dec!(20999999.99999999));
	}

	#[test]
	fn test_cltv_output_timelock() {
		let mut tx = coinbase_tx("t1", &[("A", "1"), ("B", "2")]);
		tx.vout[0].script_pub_key.kind = "cltv".to_string();
		tx.vout[0].script_pub_key.asm =
			"1700000000 OP_CHECKLOCKTIMEVERIFY OP_DROP OP_DUP".to_string();

		let outputs = parser().parse_outputs(&tx).expect("parse outputs");
		assert_eq!(outputs[0].timelock, 1_700_000_000);
		assert_eq!(outputs[1].timelock, 0);
	}

	#[test]
	fn test_coinbase_inputs_skipped() {
		let tx = coinbase_tx("t1", &[("A", "1")]);
		assert!(parser().parse_inputs(&tx).expect("parse inputs").is_empty());

		let tx = spend_tx("t2", &[("t1", 0), ("t0", 3)], &[("B", "1")]);
		let inputs = parser().parse_inputs(&tx).expect("parse inputs");
		assert_eq!(inputs.len(), 2);
		assert_eq!(inputs[1].shortcut, "t0:3");
		assert_eq!(inputs[1].source_txid, "t0");
		assert_eq!(inputs[1].txid, "t2");
	}

	#[test]
	fn test_transaction_draft_fields() {
		let mut tx = coinbase_tx("t1", &[("A", "1"), ("B", "2"), ("A", "3")]);
		tx.vout.push(nulldata_output(3));
		tx.time = Some(1_700_000_000);

		let draft = parser().parse_transaction(&tx, Some(0));
		assert_eq!(draft.addresses, vec!["A".to_string(), "B".to_string()]);
		assert!(draft.coinbase);
		assert_eq!(draft.block_index, Some(0));
		assert_eq!(
			draft.created.map(|created| created.timestamp()),
			Some(1_700_000_000)
		);
	}

	#[tokio::test]
	async fn test_resolve_inputs_batches_distinct_sources() {
		let chain = MockChain::new();
		chain.push_block(vec![coinbase_tx("t1", &[("A", "5"), ("B", "6")])]);

		let spend = spend_tx("t2", &[("t1", 0), ("t1", 1)], &[("C", "10")]);
		let inputs = parser().parse_inputs(&spend).expect("parse inputs");
		let resolved = parser()
			.resolve_inputs(&chain, &inputs)
			.await
			.expect("resolve");

		assert_eq!(resolved["t1:0"].address, "A");
		assert_eq!(resolved["t1:1"].amount, dec!(6));
		assert_eq!(chain.transaction_requests(), vec![vec!["t1".to_string()]]);
	}

	#[tokio::test]
	async fn test_unresolvable_input_is_resolution_error() {
		let chain = MockChain::new();
		chain.push_block(vec![coinbase_tx("t1", &[("A", "5")])]);

		let spend = spend_tx("t2", &[("t1", 7)], &[("C", "1")]);
		let inputs = parser().parse_inputs(&spend).expect("parse inputs");
		let result = parser().resolve_inputs(&chain, &inputs).await;

		assert!(matches!(result, Err(LedgerError::Resolution { shortcut }) if shortcut == "t1:7"));
	}

	#[tokio::test]
	async fn test_parse_block_skips_unavailable_transactions() {
		let chain = MockChain::new();
		chain.push_block(Vec::new());
		chain.push_block(vec![coinbase_tx("t1", &[("A", "5")])]);
		chain.append_unknown_txid(1, "pruned");

		let parsed = parser().parse_block(&chain, 1).await.expect("parse block");
		assert_eq!(parsed.transactions.len(), 1);
		assert_eq!(parsed.block.height, 1);
		assert_eq!(parsed.block.movements.get("MBC", "A"), dec!(5));
	}

	#[tokio::test]
	async fn test_genesis_transactions_not_fetched() {
		let chain = MockChain::new();
		chain.push_block(vec![coinbase_tx("g0", &[("A", "50")])]);

		let parsed = parser().parse_block(&chain, 0).await.expect("parse genesis");
		assert!(parsed.transactions.is_empty());
		assert!(parsed.block.movements.is_empty());
		assert!(parsed.block.prev_blockhash.is_none());
		assert!(chain.transaction_requests().is_empty());
	}
}
