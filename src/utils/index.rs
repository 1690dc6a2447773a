use rust_decimal::Decimal;

/// Render `amount` with exactly `units` decimal places.
pub fn format_amount(amount: Decimal, units: u32) -> String {
	let mut rounded = amount.round_dp(units);
	rounded.rescale(units);
	rounded.to_string()
}
