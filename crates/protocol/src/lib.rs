//! Wire and data types shared between the search primary and its agents.
//!
//! Everything that crosses the agent channel is defined here: the broadcast
//! payload, the error reply, and the identifier newtypes that correlate one
//! logical request with its set of partial responses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod ids;

pub use ids::{AgentId, RequestId};

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("filename must not be empty")]
    EmptyFilename,

    #[error("filename must not contain path separators or parent references: {0}")]
    UnsafeFilename(String),

    #[error("last must be a positive integer")]
    ZeroLast,
}

/// A client search request, immutable once validated.
///
/// `filename` names a log file relative to each node's read directory;
/// `keyword` keeps only lines containing the literal substring; `last` caps
/// the result to the N most recent lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<u64>,
}

impl SearchRequest {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            keyword: None,
            last: None,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_last(mut self, last: u64) -> Self {
        self.last = Some(last);
        self
    }

    /// Reject malformed parameters before any filesystem access or broadcast.
    ///
    /// Filenames are untrusted input: they end up in temp-file names and in
    /// the argument vector of the external sort, so anything that could
    /// escape the read directory is refused here.
    pub fn validate(&self) -> Result<()> {
        if self.filename.is_empty() {
            return Err(ProtocolError::EmptyFilename);
        }
        if self.filename.contains('/')
            || self.filename.contains('\\')
            || self.filename == "."
            || self.filename == ".."
            || self.filename.starts_with('-')
        {
            return Err(ProtocolError::UnsafeFilename(self.filename.clone()));
        }
        if self.last == Some(0) {
            return Err(ProtocolError::ZeroLast);
        }
        Ok(())
    }
}

/// Payload broadcast to every agent for one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRequest {
    pub request_id: RequestId,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<u64>,
}

impl FileRequest {
    pub fn from_search(request_id: RequestId, search: &SearchRequest) -> Self {
        Self {
            request_id,
            filename: search.filename.clone(),
            keyword: search.keyword.clone(),
            last: search.last,
        }
    }
}

/// Why an agent could not produce a partial result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Unreadable,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::NotFound => write!(f, "not_found"),
            ErrorCode::Unreadable => write!(f, "unreadable"),
            ErrorCode::Internal => write!(f, "internal"),
        }
    }
}

/// Error reply an agent sends in place of a byte stream.
///
/// Agents must always answer, success or error; the primary's response
/// counting depends on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentError {
    pub request_id: RequestId,
    pub filename: String,
    pub code: ErrorCode,
}

pub(crate) fn clock_token() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos ^ COUNTER.fetch_add(1, Ordering::Relaxed).rotate_left(32)
}
