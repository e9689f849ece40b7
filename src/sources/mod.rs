//! Download and parse each provider into monthly [`Series`](crate::series::Series).
//!
//! Every module exposes a pure `parse_*` function over raw bytes plus an
//! async `fetch_*` wrapper, so parsing is testable without the network.

pub mod french;
pub mod fred;
pub mod funds;
pub mod market;

/// Tokens that mean "no observation" across the providers.
pub(crate) const MISSING_TOKENS: &[&str] = &["", ".", "-", "na", "n/a", "nan", "null", "none", "#n/a"];

pub(crate) fn is_missing(raw: &str) -> bool {
    let s = raw.trim();
    MISSING_TOKENS.iter().any(|t| s.eq_ignore_ascii_case(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_missing() {
        for raw in ["", "  ", ".", "NA", "N/A", "nan", "NULL", "#N/A", "-"] {
            assert!(is_missing(raw), "{raw:?}");
        }
        for raw in ["0", "-0.5", "1.2%", "n"] {
            assert!(!is_missing(raw), "{raw:?}");
        }
    }
}
