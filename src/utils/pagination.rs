use serde::Serialize;

/// Convert a 1-based page number and page size into `(limit, offset)`.
///
/// Page 0 is treated as page 1. The offset saturates instead of overflowing.
pub fn pagination(page: u64, size: u64) -> (u64, u64) {
	(size, size.saturating_mul(page.max(1) - 1))
}

/// Page metadata of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
	pub pages: u64,
	pub total: u64,
	pub page: u64,
}

impl Pagination {
	pub fn new(total: u64, page: u64, limit: u64) -> Self {
		Self {
			pages: if limit == 0 { 0 } else { total.div_ceil(limit) },
			total,
			page: page.max(1),
		}
	}
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginatedResponse<T> {
	pub pagination: Pagination,
	pub list: Vec<T>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pagination_limit_and_offset() {
		assert_eq!(pagination(2, 25), (25, 25));
		assert_eq!(pagination(1, 10), (10, 0));
		assert_eq!(pagination(0, 10), (10, 0));
	}

	#[test]
	fn test_pagination_saturates_on_huge_pages() {
		assert_eq!(pagination(u64::MAX / 2, 25), (25, u64::MAX));
		assert_eq!(pagination(u64::MAX, u64::MAX), (u64::MAX, u64::MAX));
		assert_eq!(Pagination::new(3, u64::MAX, u64::MAX).pages, 1);
	}

	#[test]
	fn test_page_count_rounds_up() {
		assert_eq!(Pagination::new(51, 1, 25).pages, 3);
		assert_eq!(Pagination::new(50, 1, 25).pages, 2);
		assert_eq!(Pagination::new(0, 1, 25).pages, 0);
	}
}
