//! Wager parsing and validation
//!
//! Turns the raw text a user typed after a game command into an affordable
//! integer bet. Over-large bets are clamped to the caller's full balance
//! rather than rejected, so a bet placed against a slightly stale balance
//! still goes through; the caller is told about the adjustment.

/// A validated wager, consumed immediately by the game handler.
///
/// `amount == 0` means "do not proceed" and `message` explains why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWager {
    pub amount: u64,
    pub was_adjusted: bool,
    pub message: Option<String>,
}

impl PendingWager {
    /// Whether the caller should go ahead with the round.
    pub fn is_playable(&self) -> bool {
        self.amount > 0
    }

    fn rejected(message: String) -> Self {
        Self {
            amount: 0,
            was_adjusted: false,
            message: Some(message),
        }
    }
}

/// Resolve a raw wager expression against the caller's current balance.
///
/// Accepts a positive integer, `all`, or a shorthand like `2k` / `1.5m` /
/// `3b`. Digit separators (`1,000` or `1_000`) are tolerated.
pub fn resolve(raw: &str, balance: u64) -> PendingWager {
    let text = raw.trim().to_ascii_lowercase();

    if text == "all" {
        if balance == 0 {
            return PendingWager::rejected("you have nothing to bet".into());
        }
        return PendingWager {
            amount: balance,
            was_adjusted: false,
            message: None,
        };
    }

    let requested = match parse_amount(&text) {
        Some(amount) if amount > 0 => amount,
        _ => {
            return PendingWager::rejected(format!(
                "'{}' is not a valid bet; use a positive amount, a shorthand like 2k, or 'all'",
                raw.trim()
            ));
        }
    };

    if balance == 0 {
        return PendingWager::rejected("you have nothing to bet".into());
    }

    if requested > balance {
        return PendingWager {
            amount: balance,
            was_adjusted: true,
            message: Some(format!(
                "bet of {requested} exceeds your balance, adjusted down to {balance}"
            )),
        };
    }

    PendingWager {
        amount: requested,
        was_adjusted: false,
        message: None,
    }
}

/// Parse `text` (already trimmed and lowercased) into a token count.
fn parse_amount(text: &str) -> Option<u64> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }

    let suffix = match cleaned.chars().last() {
        Some('k') => Some(1_000u64),
        Some('m') => Some(1_000_000),
        Some('b') => Some(1_000_000_000),
        _ => None,
    };

    if let Some(multiplier) = suffix {
        let mantissa = &cleaned[..cleaned.len() - 1];
        if mantissa.is_empty() {
            return None;
        }
        let value: f64 = mantissa.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let scaled = value * multiplier as f64;
        if scaled > u64::MAX as f64 {
            return None;
        }
        return Some(scaled.round() as u64);
    }

    cleaned.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_all_bets_entire_balance() {
        let wager = resolve("all", 500);
        assert_eq!(wager.amount, 500);
        assert!(!wager.was_adjusted);
        assert!(wager.message.is_none());
    }

    #[test]
    fn test_all_on_zero_balance_is_rejected_not_adjusted() {
        let wager = resolve("all", 0);
        assert_eq!(wager.amount, 0);
        assert!(!wager.was_adjusted);
        assert!(wager.message.is_some());
        assert!(!wager.is_playable());
    }

    #[test]
    fn test_over_balance_is_adjusted_down() {
        let wager = resolve("10000", 300);
        assert_eq!(wager.amount, 300);
        assert!(wager.was_adjusted);
        let message = wager.message.unwrap();
        assert!(message.contains("adjusted"));
        assert!(message.contains("300"));
    }

    #[test]
    fn test_affordable_bet_passes_through() {
        let wager = resolve("250", 500);
        assert_eq!(wager.amount, 250);
        assert!(!wager.was_adjusted);
        assert!(wager.message.is_none());
    }

    #[test]
    fn test_shorthand_suffixes() {
        assert_eq!(resolve("2k", 1_000_000).amount, 2_000);
        assert_eq!(resolve("1.5k", 1_000_000).amount, 1_500);
        assert_eq!(resolve("3m", u64::MAX).amount, 3_000_000);
        assert_eq!(resolve("1b", u64::MAX).amount, 1_000_000_000);
        assert_eq!(resolve("2K", 1_000_000).amount, 2_000);
    }

    #[test]
    fn test_digit_separators() {
        assert_eq!(resolve("10,000", 50_000).amount, 10_000);
        assert_eq!(resolve("10_000", 50_000).amount, 10_000);
    }

    #[test]
    fn test_garbage_and_non_positive_are_rejected() {
        for raw in ["abc", "", "  ", "0", "-5", "k", "1.5", "1.5x", "all!"] {
            let wager = resolve(raw, 500);
            assert_eq!(wager.amount, 0, "{raw:?} should not resolve");
            assert!(!wager.was_adjusted);
            assert!(wager.message.is_some());
        }
    }

    #[test]
    fn test_zero_balance_numeric_message_differs_from_adjustment() {
        let broke = resolve("100", 0);
        let adjusted = resolve("10000", 300);
        assert_ne!(broke.message, adjusted.message);
        assert_eq!(broke.amount, 0);
    }

    #[test]
    fn test_whitespace_and_case_are_tolerated() {
        assert_eq!(resolve("  ALL ", 42).amount, 42);
        assert_eq!(resolve(" 10 ", 42).amount, 10);
    }

    proptest! {
        #[test]
        fn prop_amount_never_exceeds_balance(raw in "\\PC*", balance in 0u64..=u64::MAX) {
            let wager = resolve(&raw, balance);
            prop_assert!(wager.amount <= balance);
        }

        #[test]
        fn prop_unplayable_wagers_carry_a_message(raw in "\\PC*", balance in 0u64..10_000u64) {
            let wager = resolve(&raw, balance);
            if wager.amount == 0 {
                prop_assert!(wager.message.is_some());
            }
        }

        #[test]
        fn prop_affordable_literals_resolve_exactly(amount in 1u64..=1_000_000u64) {
            let wager = resolve(&amount.to_string(), 1_000_000);
            prop_assert_eq!(wager.amount, amount);
            prop_assert!(!wager.was_adjusted);
        }
    }
}
