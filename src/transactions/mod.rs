//! Transaction enrichment.
//!
//! Stored transactions are turned into read-only views carrying confirmations, the native
//! currency fee and the resolved source of every input.

mod service;
pub mod types;

pub use service::TransactionService;
