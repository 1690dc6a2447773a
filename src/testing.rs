//! Scripted in-memory chain and payload builders for tests.

use crate::node::{
	ChainInfo, ChainSource, NodeError, RawBlock, RawInput, RawOutput, RawTransaction, ScriptPubKey,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

const GENESIS_TIME: i64 = 1_700_000_000;
const BLOCK_SPACING: i64 = 60;

#[derive(Default)]
struct MockState {
	blocks: Vec<RawBlock>,
	transactions: HashMap<String, RawTransaction>,
	mempool: Vec<String>,
	broadcasts: Vec<String>,
	transaction_requests: Vec<Vec<String>>,
	offline: bool,
}

/// Chain served from memory, standing in for the node.
///
/// Block hashes are `{prefix}{height}` unless given explicitly.
pub struct MockChain {
	prefix: String,
	state: Mutex<MockState>,
}

impl MockChain {
	pub fn new() -> Self {
		Self::with_prefix("h")
	}

	pub fn with_prefix(prefix: &str) -> Self {
		Self {
			prefix: prefix.to_string(),
			state: Mutex::new(MockState::default()),
		}
	}

	/// Append a block holding `transactions` and return its hash.
	pub fn push_block(&self, transactions: Vec<RawTransaction>) -> String {
		let height = self.state.lock().unwrap().blocks.len();
		let hash = format!("{}{}", self.prefix, height);
		self.push_block_with_hash(&hash, transactions);
		hash
	}

	/// Swap the tip block for a different one at the same height.
	pub fn replace_tip(&self, hash: &str, transactions: Vec<RawTransaction>) {
		self.state.lock().unwrap().blocks.pop().expect("chain has a tip");
		self.push_block_with_hash(hash, transactions);
	}

	/// Drop every block above `height`.
	pub fn truncate(&self, height: u64) {
		self.state.lock().unwrap().blocks.truncate(height as usize + 1);
	}

	/// List a txid in a block without serving its transaction.
	pub fn append_unknown_txid(&self, height: u64, txid: &str) {
		self.state.lock().unwrap().blocks[height as usize]
			.tx
			.push(txid.to_string());
	}

	pub fn add_mempool_transaction(&self, mut transaction: RawTransaction) {
		transaction.blockhash = None;
		let mut state = self.state.lock().unwrap();
		state.mempool.push(transaction.txid.clone());
		state
			.transactions
			.insert(transaction.txid.clone(), transaction);
	}

	pub fn clear_mempool(&self) {
		self.state.lock().unwrap().mempool.clear();
	}

	/// Make every call fail until switched back.
	pub fn set_offline(&self, offline: bool) {
		self.state.lock().unwrap().offline = offline;
	}

	pub fn tip_height(&self) -> u64 {
		(self.state.lock().unwrap().blocks.len() as u64).saturating_sub(1)
	}

	/// Txids of every `raw_transactions` call, in call order.
	pub fn transaction_requests(&self) -> Vec<Vec<String>> {
		self.state.lock().unwrap().transaction_requests.clone()
	}

	pub fn broadcasts(&self) -> Vec<String> {
		self.state.lock().unwrap().broadcasts.clone()
	}

	fn push_block_with_hash(&self, hash: &str, transactions: Vec<RawTransaction>) {
		let mut state = self.state.lock().unwrap();
		let height = state.blocks.len() as u64;
		let previous_block_hash = state.blocks.last().map(|block| block.hash.clone());

		let mut tx = Vec::with_capacity(transactions.len());
		for mut transaction in transactions {
			transaction.blockhash = Some(hash.to_string());
			tx.push(transaction.txid.clone());
			state
				.transactions
				.insert(transaction.txid.clone(), transaction);
		}

		state.blocks.push(RawBlock {
			hash: hash.to_string(),
			height,
			previous_block_hash,
			time: GENESIS_TIME + height as i64 * BLOCK_SPACING,
			tx,
		});
	}

	fn check_online(&self) -> Result<(), NodeError> {
		if self.state.lock().unwrap().offline {
			return Err(NodeError::NoData("node offline".to_string()));
		}
		Ok(())
	}
}

#[async_trait]
impl ChainSource for MockChain {
	async fn block_hash(&self, height: u64) -> Result<String, NodeError> {
		self.check_online()?;
		self.state
			.lock()
			.unwrap()
			.blocks
			.get(height as usize)
			.map(|block| block.hash.clone())
			.ok_or_else(|| NodeError::Rpc {
				code: -8,
				message: "Block height out of range".to_string(),
			})
	}

	async fn block(&self, hash: &str) -> Result<RawBlock, NodeError> {
		self.check_online()?;
		self.state
			.lock()
			.unwrap()
			.blocks
			.iter()
			.find(|block| block.hash == hash)
			.cloned()
			.ok_or_else(|| NodeError::Rpc {
				code: -5,
				message: "Block not found".to_string(),
			})
	}

	async fn raw_transactions(
		&self,
		txids: &[String],
	) -> Result<Vec<Option<RawTransaction>>, NodeError> {
		self.check_online()?;
		let mut state = self.state.lock().unwrap();
		state.transaction_requests.push(txids.to_vec());
		Ok(txids
			.iter()
			.map(|txid| state.transactions.get(txid).cloned())
			.collect())
	}

	async fn chain_info(&self) -> Result<ChainInfo, NodeError> {
		self.check_online()?;
		let state = self.state.lock().unwrap();
		Ok(ChainInfo {
			chain: Some("regtest".to_string()),
			blocks: (state.blocks.len() as u64).saturating_sub(1),
			best_block_hash: state.blocks.last().map(|block| block.hash.clone()),
		})
	}

	async fn mempool_txids(&self) -> Result<Vec<String>, NodeError> {
		self.check_online()?;
		Ok(self.state.lock().unwrap().mempool.clone())
	}

	async fn send_raw_transaction(&self, raw: &str) -> Result<String, NodeError> {
		self.check_online()?;
		let mut state = self.state.lock().unwrap();
		state.broadcasts.push(raw.to_string());
		Ok(format!("sent-{}", state.broadcasts.len()))
	}
}

/// Pay-to-address output.
pub fn value_output(n: u32, address: &str, value: &str) -> RawOutput {
	RawOutput {
		value: serde_json::Number::from_str(value).expect("numeric value"),
		n,
		script_pub_key: ScriptPubKey {
			kind: "pubkeyhash".to_string(),
			asm: format!("OP_DUP OP_HASH160 {} OP_EQUALVERIFY OP_CHECKSIG", address),
			hex: "76a914".to_string(),
			addresses: Some(vec![address.to_string()]),
			address: None,
		},
	}
}

/// Zero-value data carrier output.
pub fn nulldata_output(n: u32) -> RawOutput {
	RawOutput {
		value: serde_json::Number::from(0),
		n,
		script_pub_key: ScriptPubKey {
			kind: "nulldata".to_string(),
			asm: "OP_RETURN 6869".to_string(),
			hex: "6a026869".to_string(),
			addresses: None,
			address: None,
		},
	}
}

/// Generation transaction paying `(address, value)` pairs.
pub fn coinbase_tx(txid: &str, outputs: &[(&str, &str)]) -> RawTransaction {
	let vin = vec![RawInput {
		coinbase: Some("03a0860100".to_string()),
		txid: None,
		vout: None,
	}];
	transaction(txid, vin, outputs)
}

/// Transaction spending `(source txid, index)` pairs.
pub fn spend_tx(txid: &str, inputs: &[(&str, u32)], outputs: &[(&str, &str)]) -> RawTransaction {
	let vin = inputs
		.iter()
		.map(|(source, index)| RawInput {
			coinbase: None,
			txid: Some(source.to_string()),
			vout: Some(*index),
		})
		.collect();
	transaction(txid, vin, outputs)
}

fn transaction(txid: &str, vin: Vec<RawInput>, outputs: &[(&str, &str)]) -> RawTransaction {
	RawTransaction {
		txid: txid.to_string(),
		blockhash: None,
		locktime: 0,
		version: 1,
		size: 200,
		time: None,
		vin,
		vout: outputs
			.iter()
			.enumerate()
			.map(|(n, (address, value))| value_output(n as u32, address, value))
			.collect(),
	}
}
