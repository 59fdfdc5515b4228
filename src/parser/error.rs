//! Error types for list parsing.

use thiserror::Error;

use crate::subscription::DownloadStatus;

/// Longest excerpt of an offending line kept in an error.
const EXCERPT_LEN: usize = 80;

/// Errors that can occur while parsing a downloaded list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The first line is not an `[Adblock ...]` header.
    #[error("missing list header, first line is '{excerpt}'")]
    InvalidHeader {
        /// Start of the offending first line.
        excerpt: String,
    },
}

impl ParseError {
    /// Creates an `InvalidHeader` error from the offending first line.
    #[must_use]
    pub fn invalid_header(first_line: &str) -> Self {
        Self::InvalidHeader {
            excerpt: first_line.chars().take(EXCERPT_LEN).collect(),
        }
    }

    /// Status recorded on the subscription for this error.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        match self {
            Self::InvalidHeader { .. } => DownloadStatus::InvalidData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_truncates_excerpt() {
        let line = "x".repeat(500);
        let ParseError::InvalidHeader { excerpt } = ParseError::invalid_header(&line);
        assert_eq!(excerpt.len(), EXCERPT_LEN);
    }

    #[test]
    fn test_invalid_header_is_invalid_data() {
        assert_eq!(
            ParseError::invalid_header("<html>").status(),
            DownloadStatus::InvalidData
        );
    }
}
