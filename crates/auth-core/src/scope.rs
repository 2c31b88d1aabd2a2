//! Space-delimited scope helpers.

use std::collections::HashSet;

pub fn is_openid_scope(scope: Option<&str>) -> bool {
    scope.is_some_and(|s| s.split_whitespace().any(|item| item == "openid"))
}

/// Whether every scope in `requested` is also in `granted`.
pub fn is_subset(requested: &str, granted: &str) -> bool {
    let granted: HashSet<&str> = granted.split_whitespace().collect();
    requested.split_whitespace().all(|item| granted.contains(item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openid_scope_detection() {
        assert!(is_openid_scope(Some("profile openid")));
        assert!(!is_openid_scope(Some("openidx profile")));
        assert!(!is_openid_scope(None));
    }

    #[test]
    fn test_subset() {
        assert!(is_subset("read", "read write"));
        assert!(is_subset("", "read"));
        assert!(!is_subset("read admin", "read write"));
    }
}
