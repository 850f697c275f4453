//! Connection address helpers.
//!
//! Addresses have the shape `<scheme><driver-address>[?<query>]`. The query
//! suffix is routing metadata: it travels with the address to the real
//! driver but never participates in connection sharing.

/// Check if an address is empty or consists only of whitespace.
#[must_use]
pub fn is_blank(address: &str) -> bool {
    address.trim().is_empty()
}

/// Check if `address` is non-blank and begins with `scheme`.
#[must_use]
pub fn accepts_scheme(address: &str, scheme: &str) -> bool {
    !is_blank(address) && address.starts_with(scheme)
}

/// Strip the query suffix, starting at the first `?`.
///
/// ```rust
/// use savepoint_proxy::address::canonical_address;
///
/// assert_eq!(canonical_address("proxy:host/db?x=1"), "proxy:host/db");
/// assert_eq!(canonical_address("proxy:host/db"), "proxy:host/db");
/// ```
#[must_use]
pub fn canonical_address(address: &str) -> &str {
    match address.split_once('?') {
        Some((base, _query)) => base,
        None => address,
    }
}

/// Replace every literal occurrence of `from` with `to`.
#[must_use]
pub fn rewrite_scheme(address: &str, from: &str, to: &str) -> String {
    address.replace(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blank_addresses() {
        assert!(is_blank(""));
        assert!(is_blank("   \t"));
        assert!(!is_blank(" proxy:"));
    }

    #[test]
    fn test_accepts_scheme() {
        assert!(accepts_scheme("proxy://host/db", "proxy:"));
        assert!(!accepts_scheme("real://host/db", "proxy:"));
        assert!(!accepts_scheme(" proxy://host/db", "proxy:"));
        assert!(!accepts_scheme("", "proxy:"));
    }

    #[test]
    fn test_canonical_strips_everything_after_first_question_mark() {
        assert_eq!(canonical_address("p:h/db?a=1?b=2"), "p:h/db");
        assert_eq!(canonical_address("p:h/db?"), "p:h/db");
        assert_eq!(canonical_address("?only"), "");
    }

    #[test]
    fn test_rewrite_keeps_query() {
        assert_eq!(
            rewrite_scheme("jdbc:proxy://h/db?ssl=true", "jdbc:proxy:", "jdbc:real:"),
            "jdbc:real://h/db?ssl=true"
        );
    }

    #[test]
    fn test_rewrite_is_literal() {
        // Regex metacharacters in the scheme are matched literally.
        assert_eq!(rewrite_scheme("a.b:h", "a.b:", "x:"), "x:h");
        assert_eq!(rewrite_scheme("axb:h", "a.b:", "x:"), "axb:h");
    }

    proptest! {
        #[test]
        fn prop_query_never_affects_canonical(
            base in "[a-z:/._-]{1,24}",
            query in "[a-z0-9=&?]{0,16}",
        ) {
            let with_query = format!("{base}?{query}");
            prop_assert_eq!(canonical_address(&with_query), base.as_str());
        }

        #[test]
        fn prop_canonical_is_idempotent(address in ".{0,32}") {
            let once = canonical_address(&address);
            prop_assert_eq!(canonical_address(once), once);
        }
    }
}
