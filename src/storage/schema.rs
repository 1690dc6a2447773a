//! SQL schema definitions.

/// Complete schema for the v1 ledger database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Chain
-- ============================================================

CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY,
    blockhash TEXT NOT NULL UNIQUE,
    height INTEGER NOT NULL UNIQUE,
    prev_blockhash TEXT,
    timestamp INTEGER NOT NULL,
    created TEXT NOT NULL,
    movements TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    txid TEXT NOT NULL UNIQUE,
    blockhash TEXT NOT NULL,
    height INTEGER NOT NULL,
    block_index INTEGER,
    addresses TEXT NOT NULL,
    currencies TEXT NOT NULL,
    amount TEXT NOT NULL,
    locktime INTEGER NOT NULL,
    version INTEGER NOT NULL,
    size INTEGER NOT NULL,
    timestamp INTEGER,
    created TEXT,
    coinbase INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_transactions_blockhash ON transactions(blockhash);
CREATE INDEX IF NOT EXISTS idx_transactions_height ON transactions(height);

CREATE TABLE IF NOT EXISTS outputs (
    id INTEGER PRIMARY KEY,
    shortcut TEXT NOT NULL UNIQUE,
    txid TEXT NOT NULL,
    blockhash TEXT NOT NULL,
    idx INTEGER NOT NULL,
    currency TEXT NOT NULL,
    address TEXT NOT NULL,
    amount TEXT NOT NULL,
    type TEXT NOT NULL,
    script TEXT NOT NULL,
    asm TEXT NOT NULL,
    timelock INTEGER NOT NULL DEFAULT 0,
    spent INTEGER NOT NULL DEFAULT 0,
    meta TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_outputs_txid ON outputs(txid);
CREATE INDEX IF NOT EXISTS idx_outputs_blockhash ON outputs(blockhash);
CREATE INDEX IF NOT EXISTS idx_outputs_address ON outputs(address);
CREATE INDEX IF NOT EXISTS idx_outputs_currency ON outputs(currency);

CREATE TABLE IF NOT EXISTS inputs (
    id INTEGER PRIMARY KEY,
    shortcut TEXT NOT NULL,
    txid TEXT NOT NULL,
    source_txid TEXT NOT NULL,
    idx INTEGER NOT NULL,
    blockhash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inputs_txid ON inputs(txid);
CREATE INDEX IF NOT EXISTS idx_inputs_blockhash ON inputs(blockhash);
CREATE INDEX IF NOT EXISTS idx_inputs_shortcut ON inputs(shortcut);

-- ============================================================
-- Balances
-- ============================================================

CREATE TABLE IF NOT EXISTS addresses (
    id INTEGER PRIMARY KEY,
    address TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS address_balances (
    id INTEGER PRIMARY KEY,
    address_id INTEGER NOT NULL REFERENCES addresses(id),
    currency TEXT NOT NULL,
    balance TEXT NOT NULL,
    UNIQUE (address_id, currency)
);

-- ============================================================
-- Mempool (single row, replaced on refresh)
-- ============================================================

CREATE TABLE IF NOT EXISTS mempool (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    raw TEXT NOT NULL,
    updated INTEGER NOT NULL
);
"#;
