//! # Ledger storage
//!
//! SQLite persistence for blocks, transactions, outputs, inputs and address balances.
//!
//! - WAL mode, foreign keys enforced
//! - Amounts are stored as exact decimal TEXT, never REAL
//! - JSON-shaped columns (movements, per-currency amounts, address lists) are TEXT
//! - Schema version stored in `PRAGMA user_version`

pub mod migrations;
pub mod queries;
pub mod schema;

pub use queries::AddressBalance;

use rusqlite::Connection;
use rusqlite::types::Type;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("SQLite error: {0}")]
	Sqlite(#[from] rusqlite::Error),

	#[error("migration failed: {0}")]
	Migration(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("invalid decimal {0}")]
	Decimal(String),

	#[error("not found: {0}")]
	NotFound(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Handle on the ledger database.
///
/// The store has a single writer; each block applied or rolled back is one SQLite transaction.
pub struct LedgerStore {
	conn: Connection,
}

impl LedgerStore {
	/// Open or create the ledger database at the given path.
	///
	/// Configures WAL mode, foreign keys, and runs any pending migrations.
	pub fn open(path: &Path) -> Result<Self> {
		let conn = Connection::open(path)?;
		configure(&conn)?;
		migrations::run(&conn)?;
		Ok(Self { conn })
	}

	/// Open an in-memory database (for testing).
	#[cfg(test)]
	pub fn open_memory() -> Result<Self> {
		let conn = Connection::open_in_memory()?;
		configure(&conn)?;
		migrations::run(&conn)?;
		Ok(Self { conn })
	}

	/// Read access to the underlying connection.
	#[cfg(test)]
	pub fn connection(&self) -> &Connection {
		&self.conn
	}

	/// Begin a write transaction. Dropping it without commit rolls everything back.
	pub fn begin_write(&mut self) -> Result<rusqlite::Transaction<'_>> {
		Ok(self.conn.transaction()?)
	}
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
	conn.execute_batch(
		"PRAGMA journal_mode = WAL;
		 PRAGMA foreign_keys = ON;
		 PRAGMA busy_timeout = 5000;
		 PRAGMA synchronous = NORMAL;",
	)?;
	Ok(())
}

/// Parse a decimal TEXT column.
pub(crate) fn decimal_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
	let text: String = row.get(idx)?;
	Decimal::from_str(&text)
		.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a JSON TEXT column.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
	row: &rusqlite::Row<'_>,
	idx: usize,
) -> rusqlite::Result<T> {
	let text: String = row.get(idx)?;
	serde_json::from_str(&text)
		.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse an optional RFC 3339 TEXT column.
pub(crate) fn datetime_column(
	row: &rusqlite::Row<'_>,
	idx: usize,
) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
	let text: Option<String> = row.get(idx)?;
	text.map(|text| {
		chrono::DateTime::parse_from_rfc3339(&text)
			.map(|date| date.with_timezone(&chrono::Utc))
			.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
	})
	.transpose()
}
