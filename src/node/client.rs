//!
//! JSON-RPC client for the blockchain node.
//!
//! Every call goes out as a JSON array batch, so single requests and bulk transaction fetches
//! share one code path. Results come back keyed by request id. Transport failures are retried
//! with exponential backoff; RPC-level errors are returned to the caller untouched.

use super::types::*;
use crate::config::BlockchainConfig;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use reqwest::Client;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Read and broadcast access to a blockchain node.
///
/// The ledger only depends on this trait; [`NodeClient`] is the production implementation.
#[async_trait]
pub trait ChainSource: Send + Sync {
	/// Hash of the canonical block at `height`.
	async fn block_hash(&self, height: u64) -> Result<String, NodeError>;

	/// Block header and transaction id list for `hash`.
	async fn block(&self, hash: &str) -> Result<RawBlock, NodeError>;

	/// Verbose transactions for `txids`, in the same order.
	///
	/// Transactions the node cannot return (pruned, unknown) come back as `None`.
	async fn raw_transactions(
		&self,
		txids: &[String],
	) -> Result<Vec<Option<RawTransaction>>, NodeError>;

	/// Current chain summary, including the node's tip height.
	async fn chain_info(&self) -> Result<ChainInfo, NodeError>;

	/// Transaction ids currently in the node's mempool.
	async fn mempool_txids(&self) -> Result<Vec<String>, NodeError>;

	/// Broadcast a raw transaction, returning its txid.
	async fn send_raw_transaction(&self, raw: &str) -> Result<String, NodeError>;
}

/// Node JSON-RPC client
#[derive(Clone)]
pub struct NodeClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// JSON-RPC endpoint of the node.
	endpoint: String,
	/// Optional HTTP basic auth credentials.
	credentials: Option<(String, String)>,
	/// Upper bound on time spent retrying one batch.
	max_retry: Duration,
}

impl NodeClient {
	/// Create a new node client from the blockchain section of the configuration.
	pub fn new(config: &BlockchainConfig) -> Result<Self, NodeError> {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(config.timeout_secs))
			.build()?;

		let credentials = match (&config.username, &config.password) {
			(Some(username), password) => Some((
				username.clone(),
				password.clone().unwrap_or_default(),
			)),
			(None, _) => None,
		};

		Ok(Self {
			http_client,
			endpoint: config.endpoint.clone(),
			credentials,
			max_retry: Duration::from_secs(config.max_retry_secs),
		})
	}

	/// Execute a batch of requests.
	///
	/// # Returns
	/// Responses keyed by request id. Responses without an id are dropped.
	pub async fn call_batch(
		&self,
		requests: &[RpcRequest],
	) -> Result<HashMap<String, RpcResponse>, NodeError> {
		if requests.is_empty() {
			return Ok(HashMap::new());
		}

		debug!(
			"Sending batch of {} requests to {}",
			requests.len(),
			self.endpoint
		);

		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.max_retry),
			..ExponentialBackoff::default()
		};

		let responses = retry(policy, || async {
			let mut request = self
				.http_client
				.post(&self.endpoint)
				.header("Content-Type", "application/json")
				.json(requests);

			if let Some((username, password)) = &self.credentials {
				request = request.basic_auth(username, Some(password));
			}

			let response = request.send().await.map_err(|e| {
				warn!("Node request failed, retrying: {}", e);
				backoff::Error::transient(e)
			})?;

			let response = response.error_for_status().map_err(|e| {
				if e.status().is_some_and(|status| status.is_server_error()) {
					warn!("Node returned server error, retrying: {}", e);
					backoff::Error::transient(e)
				} else {
					backoff::Error::permanent(e)
				}
			})?;

			response
				.json::<Vec<RpcResponse>>()
				.await
				.map_err(backoff::Error::permanent)
		})
		.await?;

		Ok(responses
			.into_iter()
			.filter_map(|response| response.id.clone().map(|id| (id, response)))
			.collect())
	}

	/// Execute a single request and return its result.
	async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, NodeError> {
		let id = request.id.clone();
		let mut responses = self.call_batch(std::slice::from_ref(&request)).await?;

		responses
			.remove(&id)
			.ok_or(NodeError::NoData(id))?
			.into_result()
	}
}

#[async_trait]
impl ChainSource for NodeClient {
	async fn block_hash(&self, height: u64) -> Result<String, NodeError> {
		let result = self
			.call(RpcRequest::new(
				format!("blockhash-#{}", height),
				"getblockhash",
				json!([height]),
			))
			.await?;

		Ok(serde_json::from_value(result)?)
	}

	async fn block(&self, hash: &str) -> Result<RawBlock, NodeError> {
		let result = self
			.call(RpcRequest::new(
				format!("block-#{}", hash),
				"getblock",
				json!([hash]),
			))
			.await?;

		Ok(serde_json::from_value(result)?)
	}

	async fn raw_transactions(
		&self,
		txids: &[String],
	) -> Result<Vec<Option<RawTransaction>>, NodeError> {
		let requests: Vec<RpcRequest> = txids
			.iter()
			.map(|txid| {
				RpcRequest::new(
					format!("tx-{}", txid),
					"getrawtransaction",
					json!([txid, true]),
				)
			})
			.collect();

		let mut responses = self.call_batch(&requests).await?;

		let mut transactions = Vec::with_capacity(txids.len());
		for request in &requests {
			let transaction = match responses.remove(&request.id).map(RpcResponse::into_result) {
				Some(Ok(value)) => Some(serde_json::from_value::<RawTransaction>(value)?),
				Some(Err(e)) => {
					debug!("Skipping unavailable transaction {}: {}", request.id, e);
					None
				}
				None => {
					debug!("No response for {}", request.id);
					None
				}
			};
			transactions.push(transaction);
		}

		Ok(transactions)
	}

	async fn chain_info(&self) -> Result<ChainInfo, NodeError> {
		let result = self
			.call(RpcRequest::new("info", "getblockchaininfo", json!([])))
			.await?;

		Ok(serde_json::from_value(result)?)
	}

	async fn mempool_txids(&self) -> Result<Vec<String>, NodeError> {
		let result = self
			.call(RpcRequest::new("mempool", "getrawmempool", json!([])))
			.await?;

		Ok(serde_json::from_value(result)?)
	}

	async fn send_raw_transaction(&self, raw: &str) -> Result<String, NodeError> {
		let result = self
			.call(RpcRequest::new(
				"broadcast",
				"sendrawtransaction",
				json!([raw]),
			))
			.await?;

		Ok(serde_json::from_value(result)?)
	}
}
