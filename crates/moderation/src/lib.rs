//! Denylist moderation for operator-supplied prompts.
//!
//! The denylist is loaded once at startup into an immutable set and shared
//! read-only behind an `Arc`. Matching is per whole token: a denied word
//! inside a larger token is not a match.

use std::{collections::HashSet, path::Path};

use {thiserror::Error, tracing::info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read word list {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Immutable denylist with O(1) whole-token membership checks.
#[derive(Debug, Default)]
pub struct ModerationFilter {
    terms: HashSet<String>,
}

impl ModerationFilter {
    /// An empty filter that blocks nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a filter from raw word-list content.
    ///
    /// Both newline-separated and comma-separated lists are accepted; terms
    /// are trimmed, lowercased, and empty entries dropped.
    #[must_use]
    pub fn from_list(raw: &str) -> Self {
        let terms = raw
            .split(['\n', '\r', ','])
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Self { terms }
    }

    /// Load a word-list file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;
        let filter = Self::from_list(&raw);
        info!(path = %path.display(), terms = filter.len(), "loaded moderation word list");
        Ok(filter)
    }

    /// Check free text against the denylist.
    ///
    /// Tokenizes on non-word-character boundaries and lowercases each token;
    /// returns the first denied term found, or `None` when the text is clean.
    #[must_use]
    pub fn is_blocked(&self, text: &str) -> Option<&str> {
        if self.terms.is_empty() {
            return None;
        }
        text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|token| !token.is_empty())
            .find_map(|token| self.terms.get(&token.to_lowercase()).map(String::as_str))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn whole_token_match_blocks() {
        let filter = ModerationFilter::from_list("badword\nworse");
        assert_eq!(filter.is_blocked("a badword here"), Some("badword"));
        assert_eq!(filter.is_blocked("BADWORD"), Some("badword"));
        assert_eq!(filter.is_blocked("worse!"), Some("worse"));
    }

    #[test]
    fn substring_is_not_a_match() {
        let filter = ModerationFilter::from_list("badword");
        assert_eq!(filter.is_blocked("notabadwordreally"), None);
        assert_eq!(filter.is_blocked("badwords"), None);
    }

    #[test]
    fn punctuation_separates_tokens() {
        let filter = ModerationFilter::from_list("badword");
        assert_eq!(filter.is_blocked("so,badword."), Some("badword"));
        assert_eq!(filter.is_blocked("so-badword"), Some("badword"));
    }

    #[test]
    fn comma_separated_list_is_supported() {
        let filter = ModerationFilter::from_list("one, two ,three,,");
        assert_eq!(filter.len(), 3);
        assert_eq!(filter.is_blocked("TWO"), Some("two"));
    }

    #[test]
    fn newline_list_normalizes_case_and_whitespace() {
        let filter = ModerationFilter::from_list("  Apple \r\nBANANA\n\n");
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.is_blocked("i ate a banana"), Some("banana"));
        assert_eq!(filter.is_blocked("pineapple"), None);
    }

    #[test]
    fn empty_filter_blocks_nothing() {
        let filter = ModerationFilter::empty();
        assert!(filter.is_empty());
        assert_eq!(filter.is_blocked("anything at all"), None);
    }

    #[test]
    fn underscore_stays_inside_a_token() {
        let filter = ModerationFilter::from_list("bad_word");
        assert_eq!(filter.is_blocked("a bad_word here"), Some("bad_word"));
        assert_eq!(filter.is_blocked("bad word"), None);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alpha\nbeta").unwrap();
        let filter = ModerationFilter::load(file.path()).unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.is_blocked("beta test"), Some("beta"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = ModerationFilter::load(Path::new("/nonexistent/no.txt")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
