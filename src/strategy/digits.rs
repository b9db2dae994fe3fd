use crate::models::{DigitObservation, Parity};
use rust_decimal::Decimal;

/// Penultimate fractional digit of a price.
///
/// The price is rendered without trailing zeros, so `1.1230` reads as
/// `1.123` and yields `2`.
pub fn penultimate_digit(price: &Decimal) -> u8 {
    digit_from_str(&price.normalize().to_string())
}

/// Penultimate fractional digit of a textual price.
///
/// Total over all inputs:
/// * two or more decimals → the second-to-last decimal
/// * exactly one decimal → that decimal
/// * no fractional part, or a non-digit in the chosen position → 0
pub fn digit_from_str(price: &str) -> u8 {
    if price.len() < 2 {
        return 0;
    }

    let Some((_, fraction)) = price.rsplit_once('.') else {
        return 0;
    };

    let chars: Vec<char> = fraction.chars().collect();
    let chosen = match chars.len() {
        0 => None,
        1 => chars.last(),
        n => chars.get(n - 2),
    };

    chosen
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
        .unwrap_or(0)
}

/// Digit and parity of `observations[index]` after zero correction.
///
/// A raw 0 is read as 10 when its neighbor (the previous observation, or the
/// next one at index 0) is above 5, and as 0 otherwise. Either way a
/// corrected zero counts as even.
pub fn corrected_digit(observations: &[DigitObservation], index: usize) -> (u8, Parity) {
    let digit = observations[index].digit;
    if digit != 0 {
        return (digit, Parity::of(digit));
    }

    let neighbor = if index > 0 {
        observations.get(index - 1)
    } else {
        observations.get(index + 1)
    };

    let display = match neighbor {
        Some(n) if n.digit > 5 => 10,
        _ => 0,
    };

    (display, Parity::Even)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TickColor;
    use std::str::FromStr;

    fn obs(digits: &[u8]) -> Vec<DigitObservation> {
        digits
            .iter()
            .map(|&digit| DigitObservation {
                digit,
                color: TickColor::Up,
            })
            .collect()
    }

    #[test]
    fn test_penultimate_of_four_decimals() {
        let price = Decimal::from_str("1.1234").unwrap();
        assert_eq!(penultimate_digit(&price), 3);
    }

    #[test]
    fn test_trailing_zeros_are_dropped() {
        let price = Decimal::from_str("1.1230").unwrap();
        assert_eq!(penultimate_digit(&price), 2);
    }

    #[test]
    fn test_single_decimal_uses_last_digit() {
        assert_eq!(digit_from_str("1.5"), 5);
        assert_eq!(penultimate_digit(&Decimal::from_str("12.7").unwrap()), 7);
    }

    #[test]
    fn test_no_fraction_is_zero() {
        assert_eq!(digit_from_str("15"), 0);
        assert_eq!(penultimate_digit(&Decimal::from(42)), 0);
        assert_eq!(digit_from_str("3."), 0);
    }

    #[test]
    fn test_extraction_is_total() {
        for input in ["", "7", ".", "..", "abc", "1.x9", "1.2e-05", "-0.45", "١.٢٣", "1.2.34"] {
            let digit = digit_from_str(input);
            assert!(digit <= 9, "input {:?} gave {}", input, digit);
        }
        assert_eq!(digit_from_str("1.x9"), 0);
        assert_eq!(digit_from_str("1.2.34"), 3);
    }

    #[test]
    fn test_zero_with_high_neighbor_becomes_ten() {
        let observations = obs(&[7, 0, 2, 1]);
        assert_eq!(corrected_digit(&observations, 1), (10, Parity::Even));
    }

    #[test]
    fn test_zero_at_start_uses_next_neighbor() {
        let observations = obs(&[0, 7, 2, 1]);
        assert_eq!(corrected_digit(&observations, 0), (10, Parity::Even));

        let observations = obs(&[0, 5, 2, 1]);
        assert_eq!(corrected_digit(&observations, 0), (0, Parity::Even));
    }

    #[test]
    fn test_zero_without_neighbor_stays_zero() {
        let observations = obs(&[0]);
        assert_eq!(corrected_digit(&observations, 0), (0, Parity::Even));
    }

    #[test]
    fn test_non_zero_keeps_raw_parity() {
        let observations = obs(&[3, 8]);
        assert_eq!(corrected_digit(&observations, 0), (3, Parity::Odd));
        assert_eq!(corrected_digit(&observations, 1), (8, Parity::Even));
    }
}
