#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// Account metrics produced by one coordinator refresh cycle.
pub struct AccountSnapshot {
    /// Balance rounded to two decimals; `None` when the gateway omitted it.
    pub balance: Option<f64>,
    /// Total messages sent; `None` when the fetch failed this cycle.
    pub total_messages: Option<u64>,
}

impl AccountSnapshot {
    pub fn new(balance: Option<f64>, total_messages: Option<u64>) -> Self {
        Self {
            balance: balance.map(round_balance),
            total_messages,
        }
    }
}

/// Round a currency amount to two decimals.
///
/// Rounds the exact binary value, ties to even: `2.675` (stored as
/// `2.67499…`) becomes `2.67` and `0.125` becomes `0.12`.
pub fn round_balance(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_is_rounded_to_cents() {
        assert_eq!(round_balance(12.345), 12.35);
        assert_eq!(round_balance(7.0), 7.0);
        assert_eq!(round_balance(0.004), 0.0);
        assert_eq!(round_balance(7.126), 7.13);

        let snapshot = AccountSnapshot::new(Some(3.14159), Some(42));
        assert_eq!(snapshot.balance, Some(3.14));
        assert_eq!(snapshot.total_messages, Some(42));
    }

    #[test]
    fn halfway_amounts_round_like_the_stored_binary_value() {
        assert_eq!(round_balance(2.675), 2.67);
        assert_eq!(round_balance(-2.675), -2.67);
        assert_eq!(round_balance(0.125), 0.12);
        assert_eq!(round_balance(0.375), 0.38);
    }
}
