//! Filter-list content parsing.
//!
//! A downloaded body is turned into a [`ParsedList`]: the header's minimum
//! client version, the `! key: value` metadata lines and the filter lines.
//! The synchronizer inspects [`ParsedList::redirect`] and
//! [`ParsedList::homepage`] before consuming the list with
//! [`ParsedList::finalize`].
//!
//! # Example
//!
//! ```
//! use listsync_core::parser::{AdblockParser, ListParser};
//! use listsync_core::subscription::Subscription;
//!
//! let parsed = AdblockParser
//!     .parse("[Adblock Plus 2.0]\n! Title: Example\n! Expires: 4 days\n||ads.example^")
//!     .unwrap();
//! assert!(parsed.redirect().is_none());
//!
//! let mut subscription = Subscription::new("https://example.com/list.txt");
//! let interval = parsed.finalize(&mut subscription);
//! assert_eq!(interval, 4 * 24 * 60 * 60);
//! assert_eq!(subscription.title, "Example");
//! ```

mod adblock;
mod error;

use std::collections::HashMap;

pub use adblock::AdblockParser;
pub use error::ParseError;

use crate::subscription::Subscription;

/// Turns a downloaded body into a [`ParsedList`].
pub trait ListParser: Send + Sync {
    /// Parses `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the body is not a filter list.
    fn parse(&self, text: &str) -> Result<ParsedList, ParseError>;
}

/// A parsed filter list, not yet applied to a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedList {
    required_version: Option<String>,
    params: HashMap<String, String>,
    filters: Vec<String>,
    expiration_secs: u64,
}

impl ParsedList {
    /// Builds a parsed list from its parts. Parameter keys must be lower-case.
    #[must_use]
    pub fn new(
        required_version: Option<String>,
        params: HashMap<String, String>,
        filters: Vec<String>,
        expiration_secs: u64,
    ) -> Self {
        Self {
            required_version,
            params,
            filters,
            expiration_secs,
        }
    }

    /// Location the list declares it moved to.
    #[must_use]
    pub fn redirect(&self) -> Option<&str> {
        self.param("redirect")
    }

    /// Homepage the list declares, unvalidated.
    #[must_use]
    pub fn homepage(&self) -> Option<&str> {
        self.param("homepage")
    }

    /// Value of a metadata parameter, by lower-case key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Filter lines, in list order.
    #[must_use]
    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Applies the list to `subscription` and returns the suggested
    /// expiration interval in seconds (`0` when the list declares none).
    ///
    /// Sets the required version (when declared), title and `fixed_title`,
    /// content version and filters.
    pub fn finalize(self, subscription: &mut Subscription) -> u64 {
        if let Some(required_version) = self.required_version {
            subscription.required_version = Some(required_version);
        }

        let mut params = self.params;
        match params.remove("title") {
            Some(title) => {
                subscription.title = title;
                subscription.fixed_title = true;
            }
            None => subscription.fixed_title = false,
        }

        subscription.version = params
            .get("version")
            .and_then(|version| version.parse().ok())
            .unwrap_or(0);
        subscription.filters = self.filters;

        self.expiration_secs
    }
}
