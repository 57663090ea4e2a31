//! Human-readable application identifiers: two upper-cased company initials
//! followed by a per-prefix sequence number, e.g. `AC001`.

pub fn prefix_for(company_name: &str) -> String {
    company_name
        .trim()
        .chars()
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

/// Sequence number of `id` under `prefix`, if `id` belongs to that prefix.
pub fn sequence_of(id: &str, prefix: &str) -> Option<u64> {
    let rest = id.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

pub fn next_for<'a>(prefix: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let highest = existing
        .into_iter()
        .filter_map(|id| sequence_of(id, prefix))
        .max()
        .unwrap_or(0);
    format_identifier(prefix, highest + 1)
}

pub fn format_identifier(prefix: &str, sequence: u64) -> String {
    format!("{}{:03}", prefix, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_uses_first_two_characters() {
        assert_eq!(prefix_for("acme corp"), "AC");
        assert_eq!(prefix_for("  Globex"), "GL");
        assert_eq!(prefix_for("X"), "X");
    }

    #[test]
    fn sequence_ignores_ids_from_longer_prefixes() {
        assert_eq!(sequence_of("AC007", "AC"), Some(7));
        assert_eq!(sequence_of("AB001", "A"), None);
        assert_eq!(sequence_of("A012", "A"), Some(12));
        assert_eq!(sequence_of("AC", "AC"), None);
    }

    #[test]
    fn next_takes_highest_not_lexicographic_last() {
        let ids = ["AC999", "AC1000", "AC002", "GL050"];
        assert_eq!(next_for("AC", ids), "AC1001");
        assert_eq!(next_for("GL", ids), "GL051");
        assert_eq!(next_for("IN", ids), "IN001");
    }

    #[test]
    fn sequence_is_padded_but_not_clamped() {
        assert_eq!(format_identifier("AC", 1), "AC001");
        assert_eq!(format_identifier("AC", 12345), "AC12345");
    }
}
