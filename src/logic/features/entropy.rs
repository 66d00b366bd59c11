//! SSID entropy
//!
//! Randomized or generated SSIDs (evil-twin kits, scanners) score high;
//! human-chosen network names score low.

use std::collections::HashMap;

/// Shannon entropy in bits per character. Empty input yields 0.0.
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let n = total as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_string_is_zero() {
        assert_eq!(shannon_entropy("aaaa"), 0.0);
    }

    #[test]
    fn test_two_symbols_is_one_bit() {
        assert!((shannon_entropy("abab") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_random_beats_human_name() {
        assert!(shannon_entropy("x7Qp9zLk2VbN") > shannon_entropy("HomeHome"));
    }

    #[test]
    fn test_counts_unicode_chars_not_bytes() {
        assert_eq!(shannon_entropy("ééé"), 0.0);
    }
}
