//! Host range resolution.
//!
//! Expands a host pattern like `10.20.0.X` together with a range
//! expression (`1-6,8,13-233`) and an exclude list into a concrete,
//! sorted, deduplicated list of target addresses.

use log::warn;

/// The literal character in a host pattern that is replaced with each
/// number from the range expression.
pub const PLACEHOLDER: char = 'X';

/// Expand `pattern` with the given range and exclude expressions.
///
/// A pattern without the placeholder denotes exactly one host; range and
/// exclude are ignored in that case. Range tokens are single integers or
/// `lo-hi` inclusive intervals; an interval with `hi < lo` contributes
/// nothing. The result is sorted ascending by the substituted integer and
/// deduplicated while preserving that order.
pub fn resolve_hosts(pattern: &str, range: Option<&str>, exclude: Option<&str>) -> Vec<String> {
    if !pattern.contains(PLACEHOLDER) {
        return vec![pattern.to_string()];
    }

    let mut numbers: Vec<u32> = Vec::new();
    if let Some(range) = range {
        for token in range.split(',') {
            let token = token.trim();
            if let Some((lo, hi)) = token.split_once('-') {
                // hi < lo yields an empty interval, silently
                numbers.extend(parse_token(lo)..=parse_token(hi));
            } else {
                numbers.push(parse_token(token));
            }
        }
    }

    if let Some(exclude) = exclude {
        for token in exclude.split(',') {
            let excluded = parse_token(token.trim());
            numbers.retain(|n| *n != excluded);
        }
    }

    numbers.sort_unstable();

    let mut hosts: Vec<String> = Vec::new();
    for n in numbers {
        let host = pattern.replacen(PLACEHOLDER, &n.to_string(), 1);
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }

    hosts
}

/// Tolerant integer parse: malformed tokens fall back to zero, matching
/// the behavior the tool has always had. The warning is the only trace.
fn parse_token(token: &str) -> u32 {
    token.parse().unwrap_or_else(|_| {
        warn!("range token '{}' is not a number, treating as 0", token);
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_with_exclude() {
        let hosts = resolve_hosts("10.0.0.X", Some("1-3,5"), Some("2"));
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.3", "10.0.0.5"]);
    }

    #[test]
    fn test_no_placeholder_returns_pattern() {
        let hosts = resolve_hosts("10.0.0.9", Some("1-3"), Some("2"));
        assert_eq!(hosts, vec!["10.0.0.9"]);
    }

    #[test]
    fn test_inverted_interval_is_empty() {
        let hosts = resolve_hosts("10.0.0.X", Some("5-3"), None);
        assert!(hosts.is_empty());
    }

    #[test]
    fn test_sorted_and_deduplicated() {
        let hosts = resolve_hosts("10.0.0.X", Some("5,1,5,3-4"), None);
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.3", "10.0.0.4", "10.0.0.5"]);
    }

    #[test]
    fn test_only_first_placeholder_substituted() {
        let hosts = resolve_hosts("10.X.0.X", Some("7"), None);
        assert_eq!(hosts, vec!["10.7.0.X"]);
    }

    #[test]
    fn test_malformed_token_falls_back_to_zero() {
        let hosts = resolve_hosts("10.0.0.X", Some("abc,2"), None);
        assert_eq!(hosts, vec!["10.0.0.0", "10.0.0.2"]);
    }

    #[test]
    fn test_no_range_resolves_nothing() {
        let hosts = resolve_hosts("10.0.0.X", None, None);
        assert!(hosts.is_empty());
    }

    #[test]
    fn test_exclude_removes_all_occurrences() {
        let hosts = resolve_hosts("10.0.0.X", Some("2,2,3"), Some("2"));
        assert_eq!(hosts, vec!["10.0.0.3"]);
    }
}
