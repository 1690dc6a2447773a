//! Blockchain node integration.
//!
//! This module provides the JSON-RPC client used to talk to the node and the raw payload types
//! it returns. The rest of the crate only sees the node through the [`ChainSource`] trait, so
//! ingestion, reorg handling and enrichment can be exercised against a scripted chain in tests.

/// Batched JSON-RPC client for the blockchain node
mod client;
/// Raw node payloads and error types
mod types;

pub use client::{ChainSource, NodeClient};
pub use types::*;
