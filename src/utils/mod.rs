//!
//! Utility module for the ledger.
//!
//! Re-exports amount formatting and pagination helpers used by the transaction service and CLI.
/// Amount formatting helpers
pub mod index;
/// Listing pagination helpers
pub mod pagination;

pub use index::format_amount;
pub use pagination::{PaginatedResponse, Pagination, pagination};
