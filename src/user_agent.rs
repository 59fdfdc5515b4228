//! User-Agent string shared by list downloads and fallback queries.

/// Product token used in the User-Agent header.
const PRODUCT: &str = "listsync";

/// Default User-Agent for every request (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (filter-list-sync)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_contains_crate_version() {
        let ua = default_user_agent();
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("listsync/")
                .and_then(|s| s.split(' ').next()),
            "UA must contain crate version: {ua}"
        );
    }
}
