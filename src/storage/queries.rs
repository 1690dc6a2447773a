//! Ledger query and row-write functions.
//!
//! Read queries hang off [`LedgerStore`]. Write helpers take a plain `&Connection` so the ledger
//! writer and the reorg resolver can run them inside their own per-block transaction.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{LedgerStore, Result, StorageError, datetime_column, decimal_column, json_column};
use crate::ledger::{BlockRecord, InputRecord, OutputRecord, TransactionRecord};
use crate::mempool::MempoolSnapshot;

const BLOCK_COLUMNS: &str = "blockhash, height, prev_blockhash, timestamp, created, movements";

const TRANSACTION_COLUMNS: &str = "txid, blockhash, height, block_index, addresses, currencies, \
	amount, locktime, version, size, timestamp, created, coinbase";

const OUTPUT_COLUMNS: &str =
	"shortcut, txid, blockhash, idx, currency, address, amount, type, script, asm, timelock, spent, meta";

const INPUT_COLUMNS: &str = "shortcut, txid, source_txid, idx, blockhash";

/// SQLite caps bound parameters per statement; bulk updates are chunked below it.
const MAX_BULK_PARAMS: usize = 500;

/// Running balance of one address in one currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressBalance {
	pub address: String,
	pub currency: String,
	pub balance: Decimal,
}

/// SQLite integers are signed; larger values clamp to `i64::MAX`.
fn sql_integer(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}

fn block_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockRecord> {
	Ok(BlockRecord {
		blockhash: row.get(0)?,
		height: row.get::<_, i64>(1)? as u64,
		prev_blockhash: row.get(2)?,
		timestamp: row.get(3)?,
		created: datetime_column(row, 4)?
			.ok_or_else(|| rusqlite::Error::InvalidColumnType(4, "created".into(), Type::Null))?,
		movements: json_column(row, 5)?,
	})
}

fn transaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransactionRecord> {
	Ok(TransactionRecord {
		txid: row.get(0)?,
		blockhash: row.get(1)?,
		height: row.get::<_, i64>(2)? as u64,
		block_index: row.get(3)?,
		addresses: json_column(row, 4)?,
		currencies: json_column(row, 5)?,
		amount: json_column(row, 6)?,
		locktime: row.get(7)?,
		version: row.get(8)?,
		size: row.get(9)?,
		timestamp: row.get(10)?,
		created: datetime_column(row, 11)?,
		coinbase: row.get(12)?,
	})
}

fn output_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutputRecord> {
	Ok(OutputRecord {
		shortcut: row.get(0)?,
		txid: row.get(1)?,
		blockhash: row.get(2)?,
		index: row.get(3)?,
		currency: row.get(4)?,
		address: row.get(5)?,
		amount: decimal_column(row, 6)?,
		kind: row.get(7)?,
		script: row.get(8)?,
		asm: row.get(9)?,
		timelock: row.get(10)?,
		spent: row.get(11)?,
		meta: json_column(row, 12)?,
	})
}

fn input_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InputRecord> {
	Ok(InputRecord {
		shortcut: row.get(0)?,
		txid: row.get(1)?,
		source_txid: row.get(2)?,
		index: row.get(3)?,
		blockhash: row.get(4)?,
	})
}

impl LedgerStore {
	/// Highest stored block, `None` before bootstrap.
	pub fn latest_block(&self) -> Result<Option<BlockRecord>> {
		let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY height DESC LIMIT 1");
		Ok(self.conn.query_row(&sql, [], block_from_row).optional()?)
	}

	/// Stored block at `height`.
	pub fn block_at_height(&self, height: u64) -> Result<Option<BlockRecord>> {
		let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE height = ?1");
		Ok(self
			.conn
			.query_row(&sql, [height as i64], block_from_row)
			.optional()?)
	}

	/// Confirmed transaction by txid.
	pub fn transaction(&self, txid: &str) -> Result<Option<TransactionRecord>> {
		let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE txid = ?1");
		Ok(self
			.conn
			.query_row(&sql, [txid], transaction_from_row)
			.optional()?)
	}

	/// Outputs created by `txid`, in index order.
	pub fn outputs_for_transaction(&self, txid: &str) -> Result<Vec<OutputRecord>> {
		let sql = format!("SELECT {OUTPUT_COLUMNS} FROM outputs WHERE txid = ?1 ORDER BY idx");
		let mut stmt = self.conn.prepare(&sql)?;
		let rows = stmt
			.query_map([txid], output_from_row)?
			.collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(rows)
	}

	/// Inputs of `txid`, in insertion order.
	pub fn inputs_for_transaction(&self, txid: &str) -> Result<Vec<InputRecord>> {
		let sql = format!("SELECT {INPUT_COLUMNS} FROM inputs WHERE txid = ?1 ORDER BY id");
		let mut stmt = self.conn.prepare(&sql)?;
		let rows = stmt
			.query_map([txid], input_from_row)?
			.collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(rows)
	}

	/// Confirmed output by shortcut.
	pub fn output(&self, shortcut: &str) -> Result<Option<OutputRecord>> {
		let sql = format!("SELECT {OUTPUT_COLUMNS} FROM outputs WHERE shortcut = ?1");
		Ok(self
			.conn
			.query_row(&sql, [shortcut], output_from_row)
			.optional()?)
	}

	/// Number of confirmed transactions moving `currency`.
	pub fn count_transactions(&self, currency: &str) -> Result<u64> {
		let count: i64 = self.conn.query_row(
			"SELECT COUNT(*) FROM transactions
			 WHERE EXISTS (SELECT 1 FROM json_each(transactions.currencies) WHERE json_each.value = ?1)",
			[currency],
			|row| row.get(0),
		)?;
		Ok(count as u64)
	}

	/// Confirmed transactions moving `currency`, newest first.
	pub fn transactions(
		&self,
		currency: &str,
		limit: u64,
		offset: u64,
	) -> Result<Vec<TransactionRecord>> {
		let sql = format!(
			"SELECT {TRANSACTION_COLUMNS} FROM transactions
			 WHERE EXISTS (SELECT 1 FROM json_each(transactions.currencies) WHERE json_each.value = ?1)
			 ORDER BY height DESC, id ASC LIMIT ?2 OFFSET ?3"
		);
		let mut stmt = self.conn.prepare(&sql)?;
		let rows = stmt
			.query_map(
				params![currency, sql_integer(limit), sql_integer(offset)],
				transaction_from_row,
			)?
			.collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(rows)
	}

	/// Balance of `address` in `currency`, `None` if the pair was never touched.
	pub fn address_balance(&self, address: &str, currency: &str) -> Result<Option<Decimal>> {
		Ok(self
			.conn
			.query_row(
				"SELECT b.balance FROM address_balances b
				 JOIN addresses a ON a.id = b.address_id
				 WHERE a.address = ?1 AND b.currency = ?2",
				params![address, currency],
				|row| decimal_column(row, 0),
			)
			.optional()?)
	}

	/// All balances held by `address`, ordered by currency.
	pub fn address_balances(&self, address: &str) -> Result<Vec<AddressBalance>> {
		let mut stmt = self.conn.prepare(
			"SELECT a.address, b.currency, b.balance FROM address_balances b
			 JOIN addresses a ON a.id = b.address_id
			 WHERE a.address = ?1 ORDER BY b.currency",
		)?;
		let rows = stmt
			.query_map([address], |row| {
				Ok(AddressBalance {
					address: row.get(0)?,
					currency: row.get(1)?,
					balance: decimal_column(row, 2)?,
				})
			})?
			.collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(rows)
	}

	/// Current mempool snapshot, `None` if it was never refreshed.
	pub fn load_mempool(&self) -> Result<Option<MempoolSnapshot>> {
		Ok(self
			.conn
			.query_row("SELECT raw FROM mempool WHERE id = 1", [], |row| {
				json_column(row, 0)
			})
			.optional()?)
	}

	/// Replace the mempool snapshot.
	pub fn save_mempool(&self, snapshot: &MempoolSnapshot) -> Result<()> {
		let raw = serde_json::to_string(snapshot)?;
		self.conn.execute(
			"INSERT INTO mempool (id, raw, updated) VALUES (1, ?1, ?2)
			 ON CONFLICT(id) DO UPDATE SET raw = excluded.raw, updated = excluded.updated",
			params![raw, chrono::Utc::now().timestamp()],
		)?;
		Ok(())
	}
}

/// Hash of the block stored at `height`.
pub fn blockhash_at_height(conn: &Connection, height: u64) -> Result<Option<String>> {
	Ok(conn
		.query_row(
			"SELECT blockhash FROM blocks WHERE height = ?1",
			[height as i64],
			|row| row.get(0),
		)
		.optional()?)
}

/// Insert a block row.
pub fn insert_block(conn: &Connection, block: &BlockRecord) -> Result<()> {
	conn.execute(
		"INSERT INTO blocks (blockhash, height, prev_blockhash, timestamp, created, movements)
		 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
		params![
			block.blockhash,
			block.height as i64,
			block.prev_blockhash,
			block.timestamp,
			block.created.to_rfc3339(),
			serde_json::to_string(&block.movements)?,
		],
	)?;
	Ok(())
}

/// Insert an output row belonging to `blockhash`.
pub fn insert_output(conn: &Connection, blockhash: &str, output: &OutputRecord) -> Result<()> {
	conn.execute(
		"INSERT INTO outputs (shortcut, txid, blockhash, idx, currency, address, amount, type,
		                      script, asm, timelock, spent, meta)
		 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
		params![
			output.shortcut,
			output.txid,
			blockhash,
			output.index,
			output.currency,
			output.address,
			output.amount.to_string(),
			output.kind,
			output.script,
			output.asm,
			output.timelock,
			output.spent,
			serde_json::to_string(&output.meta)?,
		],
	)?;
	Ok(())
}

/// Insert a transaction row.
pub fn insert_transaction(conn: &Connection, transaction: &TransactionRecord) -> Result<()> {
	conn.execute(
		"INSERT INTO transactions (txid, blockhash, height, block_index, addresses, currencies,
		                           amount, locktime, version, size, timestamp, created, coinbase)
		 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
		params![
			transaction.txid,
			transaction.blockhash,
			transaction.height as i64,
			transaction.block_index,
			serde_json::to_string(&transaction.addresses)?,
			serde_json::to_string(&transaction.currencies)?,
			serde_json::to_string(&transaction.amount)?,
			transaction.locktime,
			transaction.version,
			transaction.size,
			transaction.timestamp,
			transaction.created.map(|created| created.to_rfc3339()),
			transaction.coinbase,
		],
	)?;
	Ok(())
}

/// Insert an input row belonging to `blockhash`.
pub fn insert_input(conn: &Connection, blockhash: &str, input: &InputRecord) -> Result<()> {
	conn.execute(
		"INSERT INTO inputs (shortcut, txid, source_txid, idx, blockhash)
		 VALUES (?1, ?2, ?3, ?4, ?5)",
		params![
			input.shortcut,
			input.txid,
			input.source_txid,
			input.index,
			blockhash,
		],
	)?;
	Ok(())
}

/// Flag the outputs named by `shortcuts` as spent. Never clears the flag.
///
/// # Returns
/// The number of rows updated.
pub fn mark_spent(conn: &Connection, shortcuts: &[String]) -> Result<usize> {
	let mut updated = 0;
	for chunk in shortcuts.chunks(MAX_BULK_PARAMS) {
		let placeholders = vec!["?"; chunk.len()].join(", ");
		let sql = format!("UPDATE outputs SET spent = 1 WHERE shortcut IN ({placeholders})");
		updated += conn.execute(&sql, params_from_iter(chunk.iter()))?;
	}
	Ok(updated)
}

/// Add `delta` to the balance of `address` in `currency`.
///
/// The address row and the balance row are created on first use, the balance starting at zero.
pub fn add_to_balance(
	conn: &Connection,
	address: &str,
	currency: &str,
	delta: Decimal,
) -> Result<()> {
	conn.execute(
		"INSERT OR IGNORE INTO addresses (address) VALUES (?1)",
		[address],
	)?;
	let address_id: i64 = conn.query_row(
		"SELECT id FROM addresses WHERE address = ?1",
		[address],
		|row| row.get(0),
	)?;

	conn.execute(
		"INSERT OR IGNORE INTO address_balances (address_id, currency, balance)
		 VALUES (?1, ?2, ?3)",
		params![address_id, currency, Decimal::ZERO.to_string()],
	)?;

	update_balance(conn, address_id, currency, delta)
}

/// Subtract `delta` from the balance of `address` in `currency`.
///
/// # Returns
/// `false` if no balance row exists for the pair, in which case nothing is changed.
pub fn subtract_from_balance(
	conn: &Connection,
	address: &str,
	currency: &str,
	delta: Decimal,
) -> Result<bool> {
	let address_id: Option<i64> = conn
		.query_row(
			"SELECT a.id FROM addresses a
			 JOIN address_balances b ON b.address_id = a.id
			 WHERE a.address = ?1 AND b.currency = ?2",
			params![address, currency],
			|row| row.get(0),
		)
		.optional()?;

	match address_id {
		Some(address_id) => {
			update_balance(conn, address_id, currency, -delta)?;
			Ok(true)
		}
		None => Ok(false),
	}
}

fn update_balance(conn: &Connection, address_id: i64, currency: &str, delta: Decimal) -> Result<()> {
	let current = conn.query_row(
		"SELECT balance FROM address_balances WHERE address_id = ?1 AND currency = ?2",
		params![address_id, currency],
		|row| decimal_column(row, 0),
	)?;

	let balance = current
		.checked_add(delta)
		.ok_or_else(|| StorageError::Decimal(format!("{current} + {delta} overflows")))?;

	conn.execute(
		"UPDATE address_balances SET balance = ?1 WHERE address_id = ?2 AND currency = ?3",
		params![balance.to_string(), address_id, currency],
	)?;
	Ok(())
}

/// Delete every output, input, transaction and the block row owned by `blockhash`.
pub fn delete_block_rows(conn: &Connection, blockhash: &str) -> Result<()> {
	conn.execute("DELETE FROM outputs WHERE blockhash = ?1", [blockhash])?;
	conn.execute("DELETE FROM inputs WHERE blockhash = ?1", [blockhash])?;
	conn.execute("DELETE FROM transactions WHERE blockhash = ?1", [blockhash])?;
	conn.execute("DELETE FROM blocks WHERE blockhash = ?1", [blockhash])?;
	Ok(())
}
