//! Batch input parsing and phone normalization.

use crate::domain::BatchEntry;

/// Split raw operator input into batch entries, one per non-empty line.
///
/// The first whitespace-separated token is the phone; the rest of the line is
/// the display name. Nothing is validated here; malformed phones are dropped
/// later by [`normalize_phone`] without producing a report line.
pub fn parse_batch(text: &str) -> Vec<BatchEntry> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }

            let mut parts = line.splitn(2, char::is_whitespace);
            let phone = parts.next()?.to_string();
            let name = parts
                .next()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());

            Some(BatchEntry { phone, name })
        })
        .collect()
}

/// Normalize a raw phone for probing.
///
/// Numbers already in international form pass through unchanged. A number
/// starting with a recognized country prefix gets a `+` prepended. Anything
/// else yields `None`: the entry is skipped silently, not reported.
pub fn normalize_phone(raw: &str, prefixes: &[String]) -> Option<String> {
    if raw.starts_with('+') {
        return Some(raw.to_string());
    }
    if prefixes
        .iter()
        .any(|p| !p.is_empty() && raw.starts_with(p.as_str()))
    {
        return Some(format!("+{raw}"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        vec!["38".to_string(), "7".to_string()]
    }

    #[test]
    fn plus_numbers_pass_through() {
        assert_eq!(
            normalize_phone("+380991234567", &prefixes()),
            Some("+380991234567".to_string())
        );
    }

    #[test]
    fn recognized_prefixes_get_plus_prepended() {
        assert_eq!(
            normalize_phone("380991234567", &prefixes()),
            Some("+380991234567".to_string())
        );
        assert_eq!(
            normalize_phone("79161234567", &prefixes()),
            Some("+79161234567".to_string())
        );
    }

    #[test]
    fn unrecognized_inputs_are_dropped() {
        assert_eq!(normalize_phone("bad-input", &prefixes()), None);
        assert_eq!(normalize_phone("0991234567", &prefixes()), None);
        assert_eq!(normalize_phone("", &prefixes()), None);
    }

    #[test]
    fn parse_splits_phone_and_name() {
        let entries = parse_batch("+380991234567 Ivan Petrov\n\n+447700900000\n");
        assert_eq!(
            entries,
            vec![
                BatchEntry {
                    phone: "+380991234567".to_string(),
                    name: "Ivan Petrov".to_string(),
                },
                BatchEntry {
                    phone: "+447700900000".to_string(),
                    name: "Unknown".to_string(),
                },
            ]
        );
    }

    #[test]
    fn parse_keeps_malformed_lines_for_later_normalization() {
        let entries = parse_batch("bad-input\n+380991234567 Ivan");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phone, "bad-input");
    }
}
