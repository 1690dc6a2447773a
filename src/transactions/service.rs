//! Transaction enrichment service.
//!
//! Confirmations, fees and input sources are derived on every read from the stored ledger and
//! the current mempool snapshot. Listings degrade an unresolvable input to a missing fee; the
//! single transaction lookup reports it as a resolution error instead.

use super::types::{EnrichedInput, EnrichedOutput, EnrichedTransaction};
use crate::config::ChainConfig;
use crate::ledger::{InputRecord, LedgerError, OutputRecord, TransactionRecord, currency_totals};
use crate::mempool::{MempoolSnapshot, MempoolTransaction};
use crate::node::ChainSource;
use crate::storage::{AddressBalance, LedgerStore};
use crate::utils::{PaginatedResponse, Pagination, pagination};

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Read side of the ledger plus broadcast.
pub struct TransactionService<C: ChainSource> {
	store: LedgerStore,
	chain: Arc<C>,
	/// Native currency, the only one fees are computed in.
	currency: String,
	units: u32,
}

impl<C: ChainSource> TransactionService<C> {
	pub fn new(store: LedgerStore, chain: Arc<C>, config: &ChainConfig) -> Self {
		Self {
			store,
			chain,
			currency: config.currency.clone(),
			units: config.units,
		}
	}

	/// Look up one transaction, confirmed or pending.
	///
	/// # Errors
	/// Returns `LedgerError::Resolution` if one of its inputs cannot be resolved.
	pub fn transaction(&self, txid: &str) -> Result<Option<EnrichedTransaction>, LedgerError> {
		if let Some(record) = self.store.transaction(txid)? {
			let tip_height = self.tip_height()?;
			return self.enrich_confirmed(record, tip_height, true).map(Some);
		}

		let Some(snapshot) = self.store.load_mempool()? else {
			return Ok(None);
		};
		snapshot
			.transaction(txid)
			.map(|pending| self.enrich_pending(pending, &snapshot, true))
			.transpose()
	}

	/// Confirmed transactions moving `currency`, newest first.
	///
	/// `page` is 1-based; `currency` is matched case-insensitively.
	pub fn transactions(
		&self,
		currency: &str,
		page: u64,
		size: u64,
	) -> Result<PaginatedResponse<EnrichedTransaction>, LedgerError> {
		let currency = currency.to_uppercase();
		let (limit, offset) = pagination(page, size.max(1));

		let total = self.store.count_transactions(&currency)?;
		let tip_height = self.tip_height()?;

		let list = self
			.store
			.transactions(&currency, limit, offset)?
			.into_iter()
			.map(|record| self.enrich_confirmed(record, tip_height, false))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(PaginatedResponse {
			pagination: Pagination::new(total, page, limit),
			list,
		})
	}

	/// Transactions of the stored mempool snapshot.
	pub fn mempool_transactions(&self) -> Result<Vec<EnrichedTransaction>, LedgerError> {
		let snapshot = self.store.load_mempool()?.unwrap_or_default();
		snapshot
			.transactions
			.iter()
			.map(|pending| self.enrich_pending(pending, &snapshot, false))
			.collect()
	}

	/// Balances of `address`, optionally limited to one currency.
	pub fn balances(
		&self,
		address: &str,
		currency: Option<&str>,
	) -> Result<Vec<AddressBalance>, LedgerError> {
		let Some(currency) = currency.map(str::to_uppercase) else {
			return Ok(self.store.address_balances(address)?);
		};

		Ok(self
			.store
			.address_balance(address, &currency)?
			.map(|balance| AddressBalance {
				address: address.to_string(),
				currency,
				balance,
			})
			.into_iter()
			.collect())
	}

	/// Forward a raw transaction to the node, returning its txid.
	pub async fn broadcast(&self, raw: &str) -> Result<String, LedgerError> {
		let txid = self.chain.send_raw_transaction(raw).await?;
		info!("Broadcast transaction {}", txid);
		Ok(txid)
	}

	fn tip_height(&self) -> Result<u64, LedgerError> {
		Ok(self
			.store
			.latest_block()?
			.map(|block| block.height)
			.unwrap_or_default())
	}

	fn enrich_confirmed(
		&self,
		record: TransactionRecord,
		tip_height: u64,
		strict: bool,
	) -> Result<EnrichedTransaction, LedgerError> {
		let outputs = self.store.outputs_for_transaction(&record.txid)?;
		let inputs = self.store.inputs_for_transaction(&record.txid)?;
		let (inputs, resolved) = self.resolve_inputs(&inputs, None, strict)?;
		let fee = self.fee(&outputs, &inputs, resolved);

		Ok(EnrichedTransaction {
			txid: record.txid,
			blockhash: Some(record.blockhash),
			height: Some(record.height),
			block_index: record.block_index,
			confirmations: tip_height.saturating_sub(record.height),
			fee,
			coinbase: record.coinbase,
			addresses: record.addresses,
			currencies: record.currencies,
			amount: record.amount,
			locktime: record.locktime,
			version: record.version,
			size: record.size,
			timestamp: record.timestamp,
			created: record.created,
			outputs: self.enrich_outputs(&outputs),
			inputs,
		})
	}

	fn enrich_pending(
		&self,
		pending: &MempoolTransaction,
		snapshot: &MempoolSnapshot,
		strict: bool,
	) -> Result<EnrichedTransaction, LedgerError> {
		let draft = &pending.transaction;
		let (inputs, resolved) = self.resolve_inputs(&pending.inputs, Some(snapshot), strict)?;
		let fee = self.fee(&pending.outputs, &inputs, resolved);
		let (currencies, amount) = currency_totals(&pending.outputs);

		Ok(EnrichedTransaction {
			txid: draft.txid.clone(),
			blockhash: None,
			height: None,
			block_index: None,
			confirmations: 0,
			fee,
			coinbase: draft.coinbase,
			addresses: draft.addresses.clone(),
			currencies,
			amount,
			locktime: draft.locktime,
			version: draft.version,
			size: draft.size,
			timestamp: draft.timestamp,
			created: draft.created,
			outputs: self.enrich_outputs(&pending.outputs),
			inputs,
		})
	}

	fn enrich_outputs(&self, outputs: &[OutputRecord]) -> Vec<EnrichedOutput> {
		outputs
			.iter()
			.map(|output| EnrichedOutput::new(output, self.units))
			.collect()
	}

	/// Attach the spent output's amount, currency and address to each input.
	///
	/// Mempool outputs are searched before confirmed ones.
	///
	/// # Returns
	/// The enriched inputs and whether every one of them was resolved.
	fn resolve_inputs(
		&self,
		inputs: &[InputRecord],
		mempool: Option<&MempoolSnapshot>,
		strict: bool,
	) -> Result<(Vec<EnrichedInput>, bool), LedgerError> {
		let mut enriched = Vec::with_capacity(inputs.len());
		let mut resolved = true;

		for input in inputs {
			let source = match mempool.and_then(|snapshot| snapshot.outputs.get(&input.shortcut)) {
				Some(output) => Some(output.clone()),
				None => self.store.output(&input.shortcut)?,
			};

			if source.is_none() {
				if strict {
					return Err(LedgerError::Resolution {
						shortcut: input.shortcut.clone(),
					});
				}
				debug!("Input {} of {} is unresolved", input.shortcut, input.txid);
				resolved = false;
			}

			enriched.push(EnrichedInput {
				shortcut: input.shortcut.clone(),
				source_txid: input.source_txid.clone(),
				index: input.index,
				amount: source.as_ref().map(|output| output.amount),
				currency: source.as_ref().map(|output| output.currency.clone()),
				address: source.map(|output| output.address),
				units: self.units,
			});
		}

		Ok((enriched, resolved))
	}

	/// Native inputs minus native outputs.
	///
	/// A coinbase has no inputs, so its fee is the negated native output total.
	fn fee(
		&self,
		outputs: &[OutputRecord],
		inputs: &[EnrichedInput],
		resolved: bool,
	) -> Option<Decimal> {
		if !resolved {
			return None;
		}

		let spent: Decimal = inputs
			.iter()
			.filter(|input| input.currency.as_deref() == Some(self.currency.as_str()))
			.filter_map(|input| input.amount)
			.sum();
		let created: Decimal = outputs
			.iter()
			.filter(|output| output.currency == self.currency)
			.map(|output| output.amount)
			.sum();

		Some(spent - created)
	}
}
