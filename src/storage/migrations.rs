//! Database migration system.
//!
//! Schema version stored in `PRAGMA user_version`. Migrations are forward-only;
//! rolling back requires re-syncing the ledger from the node.

use rusqlite::Connection;

use super::{Result, SCHEMA_VERSION, StorageError, schema};

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<()> {
	let current_version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

	if current_version == 0 {
		tracing::info!("Initializing ledger schema v{SCHEMA_VERSION}");
		conn.execute_batch(schema::SCHEMA_V1)?;
		conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
	} else if current_version > SCHEMA_VERSION {
		return Err(StorageError::Migration(format!(
			"Database version {current_version} is newer than supported {SCHEMA_VERSION}"
		)));
	}

	Ok(())
}
