//! Types for the node's JSON-RPC interface.

use serde::{Deserialize, Serialize};

/// One JSON-RPC request inside a batch.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
	pub jsonrpc: &'static str,
	/// Caller-chosen id, used to pick the matching response out of the batch.
	pub id: String,
	pub method: &'static str,
	pub params: serde_json::Value,
}

impl RpcRequest {
	pub fn new(id: impl Into<String>, method: &'static str, params: serde_json::Value) -> Self {
		Self {
			jsonrpc: "1.0",
			id: id.into(),
			method,
			params,
		}
	}
}

/// Error object attached to a failed JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
	pub code: i64,
	pub message: String,
}

/// One JSON-RPC response inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
	pub id: Option<String>,
	#[serde(default)]
	pub result: Option<serde_json::Value>,
	#[serde(default)]
	pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
	/// Take the result out of the response, turning RPC errors and null results into errors.
	pub fn into_result(self) -> Result<serde_json::Value, NodeError> {
		if let Some(error) = self.error {
			return Err(NodeError::Rpc {
				code: error.code,
				message: error.message,
			});
		}

		match self.result {
			Some(serde_json::Value::Null) | None => Err(NodeError::NoData(
				self.id.unwrap_or_else(|| "<no id>".to_string()),
			)),
			Some(value) => Ok(value),
		}
	}
}

/// Block as returned by `getblock(hash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
	pub hash: String,
	pub height: u64,
	#[serde(rename = "previousblockhash", default)]
	pub previous_block_hash: Option<String>,
	pub time: i64,
	/// Transaction ids in block order.
	#[serde(default)]
	pub tx: Vec<String>,
}

/// Chain summary as returned by `getblockchaininfo()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
	pub chain: Option<String>,
	/// Height of the node's best block.
	pub blocks: u64,
	#[serde(rename = "bestblockhash", default)]
	pub best_block_hash: Option<String>,
}

/// Verbose transaction as returned by `getrawtransaction(txid, true)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
	pub txid: String,
	/// Containing block, absent for mempool transactions.
	#[serde(default)]
	pub blockhash: Option<String>,
	pub locktime: i64,
	pub version: i64,
	pub size: i64,
	#[serde(default)]
	pub time: Option<i64>,
	#[serde(default)]
	pub vin: Vec<RawInput>,
	#[serde(default)]
	pub vout: Vec<RawOutput>,
}

impl RawTransaction {
	/// True when one of the inputs mints new currency.
	pub fn is_coinbase(&self) -> bool {
		self.vin.iter().any(RawInput::is_coinbase)
	}
}

/// Transaction input (`vin` entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInput {
	/// Present only on generation inputs.
	#[serde(default)]
	pub coinbase: Option<String>,
	#[serde(default)]
	pub txid: Option<String>,
	#[serde(default)]
	pub vout: Option<u32>,
}

impl RawInput {
	pub fn is_coinbase(&self) -> bool {
		self.coinbase.is_some()
	}
}

/// Transaction output (`vout` entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOutput {
	/// Value as written by the node. Kept as a JSON number so the decimal text survives.
	pub value: serde_json::Number,
	pub n: u32,
	#[serde(rename = "scriptPubKey")]
	pub script_pub_key: ScriptPubKey,
}

/// Locking script of an output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPubKey {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub asm: String,
	#[serde(default)]
	pub hex: String,
	/// Legacy node format: list of addresses.
	#[serde(default)]
	pub addresses: Option<Vec<String>>,
	/// Newer node format: single address.
	#[serde(default)]
	pub address: Option<String>,
}

impl ScriptPubKey {
	/// First address the script pays to, in either node format.
	pub fn first_address(&self) -> Option<&str> {
		self.addresses
			.as_ref()
			.and_then(|addresses| addresses.first())
			.or(self.address.as_ref())
			.map(String::as_str)
	}

	/// All addresses the script pays to, in either node format.
	pub fn all_addresses(&self) -> Vec<&str> {
		match (&self.addresses, &self.address) {
			(Some(addresses), _) => addresses.iter().map(String::as_str).collect(),
			(None, Some(address)) => vec![address.as_str()],
			(None, None) => Vec::new(),
		}
	}
}

/// Error types for node operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },

	#[error("No data returned for request {0}")]
	NoData(String),
}
