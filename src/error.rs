//! Typed errors returned by keyword sources.
//!
//! Every [`KeywordSource`](crate::traits::KeywordSource) operation returns
//! `Result<_, SourceError>` instead of panicking. Callers decide what to do
//! with a failure: the save path blocks persistence, the generation path may
//! fall back to stored terms (see [`crate::service::TermPolicy`]).
//!
//! # Categories
//!
//! | Kind | Typical codes | HTTP status |
//! |------|---------------|-------------|
//! | `Validation` | `url_invalid`, `delimiter_not_found`, `column_count_mismatch` | 400 |
//! | `NotFound` | `file_missing`, `attachment_missing` | 404 |
//! | `Fetch` | `http_status`, `http_request`, `csv_parse`, `feed_parse` | 502 |
//! | `Blocked` | `ai_blocked` | 403 |

use serde::Serialize;

/// Broad category of a [`SourceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source configuration is missing or malformed.
    Validation,
    /// A referenced resource (attachment, file) no longer exists.
    NotFound,
    /// The upstream fetch or parse failed.
    Fetch,
    /// The upstream service refused the request.
    Blocked,
}

impl ErrorKind {
    /// HTTP status used by the API server for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Fetch => 502,
            ErrorKind::Blocked => 403,
        }
    }
}

/// Error carrying a machine code and a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct SourceError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn fetch(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fetch, code, message)
    }

    pub fn blocked(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Blocked, code, message)
    }

    /// Wraps a transport error from `reqwest` as a fetch failure.
    pub fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::fetch("http_timeout", format!("Request to {} timed out", url))
        } else {
            Self::fetch("http_request", format!("Request to {} failed: {}", url, err))
        }
    }

    /// Wraps a storage error encountered while serving a source operation.
    pub fn from_db(err: impl std::fmt::Display) -> Self {
        Self::fetch("database", format!("Database query failed: {}", err))
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_message() {
        let err = SourceError::validation("url_invalid", "The RSS feed URL is not valid.");
        assert_eq!(err.to_string(), "The RSS feed URL is not valid.");
        assert_eq!(err.code, "url_invalid");
        assert!(err.is_validation());
    }

    #[test]
    fn statuses_follow_kind() {
        assert_eq!(ErrorKind::Validation.http_status(), 400);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::Fetch.http_status(), 502);
        assert_eq!(ErrorKind::Blocked.http_status(), 403);
    }

    #[test]
    fn survives_anyhow_round_trip() {
        let err: anyhow::Error = SourceError::blocked("ai_blocked", "blocked").into();
        let back = err.downcast_ref::<SourceError>().unwrap();
        assert_eq!(back.kind, ErrorKind::Blocked);
    }
}
