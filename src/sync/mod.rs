//! Ledger Synchronization Module
//!
//! - `orchestrator`: the sync driver and its state machine
//! - `events`: sync event types, handler trait and dispatcher
//! - `progress_tracker`: per-cycle counters and progress logging
//! - `cancellation`: cooperative stop signal honored between blocks

/// Cooperative cancellation signal
pub mod cancellation;
/// Event system for observing sync progress
pub mod events;
/// Main coordinator for the ledger sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;

pub use cancellation::CancellationSignal;
pub use orchestrator::*;
