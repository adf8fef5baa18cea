//! Sender normalization: `"Display Name <address>"` or a bare address.

use crate::NormalizedAddress;

/// Returns the address portion of a raw sender string.
///
/// A `<...>` token wins when present; otherwise the whole string is returned
/// unchanged. `None` means the sender cannot be attributed to anyone.
pub fn extract_address(raw: &str) -> Option<&str> {
    let address = match raw.find('<') {
        Some(lt) => match raw[lt + 1..].find('>') {
            Some(len) => &raw[lt + 1..lt + 1 + len],
            None => raw,
        },
        None => raw,
    };

    if address.is_empty() {
        None
    } else {
        Some(address)
    }
}

/// Grouping key for a raw sender string. Blank addresses have no key.
pub fn normalize_sender(raw: &str) -> Option<NormalizedAddress> {
    let address = extract_address(raw)?.trim();
    if address.is_empty() {
        return None;
    }
    Some(NormalizedAddress::from_address(address))
}

#[cfg(test)]
mod tests {
    use super::{extract_address, normalize_sender};

    #[test]
    fn extracts_angle_bracket_address() {
        assert_eq!(
            extract_address("Jane Doe <jane@example.com>"),
            Some("jane@example.com")
        );
        assert_eq!(extract_address("<jane@example.com>"), Some("jane@example.com"));
        assert_eq!(
            extract_address("\"Doe, Jane\" < jane@example.com >"),
            Some(" jane@example.com ")
        );
    }

    #[test]
    fn keeps_bare_address_unchanged() {
        assert_eq!(extract_address("jane@example.com"), Some("jane@example.com"));
        assert_eq!(extract_address(" jane@example.com"), Some(" jane@example.com"));
    }

    #[test]
    fn malformed_tokens_fall_back_to_whole_string() {
        assert_eq!(extract_address("Jane <jane@example.com"), Some("Jane <jane@example.com"));
        assert_eq!(extract_address("jane> <"), Some("jane> <"));
    }

    #[test]
    fn empty_senders_are_unattributable() {
        assert_eq!(extract_address(""), None);
        assert_eq!(extract_address("Nobody <>"), None);
        assert_eq!(extract_address("   "), Some("   "));
        assert!(normalize_sender("   ").is_none());
        assert!(normalize_sender("Nobody < >").is_none());
    }

    #[test]
    fn key_is_trimmed_and_lowercased() {
        let key = normalize_sender("Jane <Jane@Example.COM>").expect("address");
        assert_eq!(key.as_str(), "jane@example.com");

        let spaced = normalize_sender("Jane < jane@example.com >").expect("address");
        assert_eq!(spaced, key);
        assert_eq!(normalize_sender(" JANE@example.com"), Some(key));
    }
}
