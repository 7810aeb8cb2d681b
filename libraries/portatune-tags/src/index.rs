//! Canonical track/disc index normalization

/// Normalize a track or disc number tag value for tolerant comparison.
///
/// A value of the shape `N` or `N/M` is reduced to a slash-joined sequence of
/// integers, so encoder padding differences (`"03"` vs `"3"`) compare equal.
/// Components that are not integers are left verbatim. `None` stays `None`.
pub fn canonical_index(value: Option<&str>) -> Option<String> {
    let value = value?;
    let canonical = value
        .split('/')
        .map(|part| {
            let part = part.trim();
            match part.parse::<u64>() {
                Ok(n) => n.to_string(),
                Err(_) => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    Some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_is_normalized() {
        assert_eq!(canonical_index(Some("03")), canonical_index(Some("3")));
        assert_eq!(canonical_index(Some("3/12")), canonical_index(Some("3/12")));
        assert_eq!(canonical_index(Some("03/012")), Some("3/12".to_string()));
    }

    #[test]
    fn test_totals_are_significant() {
        // "3" and "3/0" are different sequences, not padding variants
        assert_ne!(canonical_index(Some("3")), canonical_index(Some("3/0")));
    }

    #[test]
    fn test_none_passthrough() {
        assert_eq!(canonical_index(None), None);
    }

    #[test]
    fn test_non_numeric_left_verbatim() {
        assert_eq!(canonical_index(Some("A1")), Some("A1".to_string()));
    }
}
