//! Error type for the bridge.
//!
//! Every failure talking to Whisparr or Stash, or touching the filesystem,
//! funnels into [`BridgeError`]. The hook entry point logs these and never
//! lets them escape the process.

use std::path::Path;

/// Errors raised while reconciling a scene.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A Whisparr call returned a non-2xx status or failed in transport.
    #[error("{}", remote_message(.method, .url, .status, .body))]
    RemoteService {
        /// HTTP method of the failed call.
        method: String,
        /// Full request URL (without query string).
        url: String,
        /// Response status, absent for transport failures.
        status: Option<u16>,
        /// Response body or transport error text.
        body: String,
        /// The underlying transport error, if any.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// No usable Whisparr record exists and none could be created.
    #[error("Whisparr record not found for '{title}': {reason}")]
    RecordNotFound {
        /// Scene title the lookup was for.
        title: String,
        /// Why no record could be settled on.
        reason: String,
    },

    /// A manual-import or rename command was rejected.
    #[error("Import failed for {path}: {message}")]
    ImportFailure {
        /// File (or record) the command was for.
        path: String,
        /// Human-readable error description.
        message: String,
    },

    /// Talking to Stash failed.
    #[error("Stash error: {0}")]
    Stash(String),

    /// A filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn remote_message(method: &str, url: &str, status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("HTTP {code} error for {method} {url}: {body}"),
        None => format!("HTTP request failed for {method} {url}: {body}"),
    }
}

impl BridgeError {
    /// Error for a response with a failing status code.
    pub fn http_status(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        BridgeError::RemoteService {
            method: method.into(),
            url: url.into(),
            status: Some(status),
            body: body.into(),
            source: None,
        }
    }

    /// Error wrapping a transport failure (DNS, connection reset, timeout).
    pub fn transport(method: impl Into<String>, url: impl Into<String>, source: reqwest::Error) -> Self {
        BridgeError::RemoteService {
            method: method.into(),
            url: url.into(),
            status: None,
            body: source.to_string(),
            source: Some(source),
        }
    }

    /// Convenience constructor for [`BridgeError::RecordNotFound`].
    pub fn record_not_found(title: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::RecordNotFound {
            title: title.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`BridgeError::ImportFailure`].
    pub fn import_failure(path: &Path, message: impl Into<String>) -> Self {
        BridgeError::ImportFailure {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Status code of a [`BridgeError::RemoteService`] error, if it had one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::RemoteService { status, .. } => *status,
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
