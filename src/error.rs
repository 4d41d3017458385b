//! Error type for the retrieval core.
//!
//! Cold start, empty seeds and sparse graphs are not errors: they surface as
//! empty results from the stage that detected them.

use std::time::Duration;

use thiserror::Error;

use crate::NoteId;

/// Errors raised by a retrieval call or a centrality-maintaining edge write.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A tunable parameter is out of range or malformed. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The persisted graph or note store could not be read or written.
    #[error("Store access error: {0}")]
    StoreAccess(#[from] rusqlite::Error),

    /// Persisted state breaks an invariant the ranking depends on.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The wall-clock backstop fired before the call completed.
    #[error("Retrieval timed out after {0:?}")]
    Timeout(Duration),

    /// The reference note of a related-notes query does not exist.
    #[error("Note with id {0} does not exist")]
    NoteNotFound(NoteId),
}

impl RetrievalError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Whether the caller may fall back to keyword-only search.
    ///
    /// Only store failures qualify; configuration and invariant errors must reach the user.
    pub fn allows_keyword_fallback(&self) -> bool {
        matches!(self, Self::StoreAccess(_))
    }
}

/// Result alias for retrieval operations.
pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_message_includes_detail() {
        let err = RetrievalError::config("decay_factor must be in (0, 1), got 1.5");
        assert_eq!(
            err.to_string(),
            "Configuration error: decay_factor must be in (0, 1), got 1.5"
        );
    }

    #[test]
    fn rusqlite_errors_convert_to_store_access() {
        let err: RetrievalError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, RetrievalError::StoreAccess(_)));
        assert!(err.allows_keyword_fallback());
    }

    #[test]
    fn invariant_and_timeout_do_not_allow_fallback() {
        assert!(!RetrievalError::invariant("negative centrality").allows_keyword_fallback());
        assert!(!RetrievalError::Timeout(Duration::from_millis(5)).allows_keyword_fallback());
        assert!(!RetrievalError::config("bad").allows_keyword_fallback());
    }

    #[test]
    fn note_not_found_names_the_note() {
        let err = RetrievalError::NoteNotFound(NoteId::new(17));
        assert_eq!(err.to_string(), "Note with id 17 does not exist");
    }
}
