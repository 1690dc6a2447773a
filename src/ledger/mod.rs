//! Ledger ingestion: parsing node payloads into records, computing balance movements, and
//! applying or rolling back whole blocks.

pub mod movements;
pub mod parser;
pub mod reorg;
pub mod types;
pub mod writer;

pub use parser::RecordParser;
pub use reorg::resolve_reorg;
pub use types::*;
pub use writer::apply_block;
