//! Per-block balance movements.
//!
//! A block's movements map currency → address → signed delta. Outputs credit their address,
//! inputs debit the address of the output they consume. The map is stored verbatim on the block
//! so a rollback can subtract exactly what was added.

use crate::ledger::types::{InputRecord, LedgerError, OutputRecord};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Signed balance deltas keyed by currency, then address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Movements(BTreeMap<String, BTreeMap<String, Decimal>>);

impl Movements {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add `amount` to the address' delta, starting from zero on first touch.
	pub fn credit(&mut self, currency: &str, address: &str, amount: Decimal) {
		let entry = self
			.0
			.entry(currency.to_string())
			.or_insert_with(BTreeMap::new)
			.entry(address.to_string())
			.or_insert(Decimal::ZERO);
		*entry += amount;
	}

	/// Subtract `amount` from the address' delta, starting from zero on first touch.
	pub fn debit(&mut self, currency: &str, address: &str, amount: Decimal) {
		self.credit(currency, address, -amount);
	}

	/// Delta for one address, zero if untouched.
	#[cfg(test)]
	pub fn get(&self, currency: &str, address: &str) -> Decimal {
		self.0
			.get(currency)
			.and_then(|addresses| addresses.get(address))
			.copied()
			.unwrap_or(Decimal::ZERO)
	}

	/// Iterate `(currency, address, delta)` in currency then address order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str, Decimal)> {
		self.0.iter().flat_map(|(currency, addresses)| {
			addresses
				.iter()
				.map(move |(address, delta)| (currency.as_str(), address.as_str(), *delta))
		})
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Compute the movements of a block.
///
/// `resolved` maps each input's shortcut to the output it spends.
///
/// # Errors
/// Returns `LedgerError::Resolution` when an input's source output is missing from `resolved`.
pub fn compute_movements(
	outputs: &[OutputRecord],
	inputs: &[InputRecord],
	resolved: &HashMap<String, OutputRecord>,
) -> Result<Movements, LedgerError> {
	let mut movements = Movements::new();

	for output in outputs {
		movements.credit(&output.currency, &output.address, output.amount);
	}

	for input in inputs {
		let source = resolved
			.get(&input.shortcut)
			.ok_or_else(|| LedgerError::Resolution {
				shortcut: input.shortcut.clone(),
			})?;
		movements.debit(&source.currency, &source.address, source.amount);
	}

	Ok(movements)
}
