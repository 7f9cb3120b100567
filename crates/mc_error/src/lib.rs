//! Shared error taxonomy for the media chunking and frame-serving core.
//!
//! Every crate in this workspace returns [`CoreError`] (or a type alias of
//! [`CoreResult`]) at its boundary, rather than inventing its own error enum
//! per crate. The variants mirror the taxonomy in the specification's error
//! handling design, not a type-for-type Python port.

/// Errors produced anywhere in the media-core crates.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// Out-of-range frame/chunk number, non-monotonic frame id list, unknown
    /// segment type or writer class.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Absent image record, empty cloud storage, missing required manifest.
    #[error("not found: {0}")]
    NotFound(String),

    /// Decoder or encoder failure, with the offending source name.
    #[error("media decode error in {source_name}: {message}")]
    MediaDecodeError {
        source_name: String,
        message: String,
    },

    /// A chunk writer aborted mid-stream; the sink is left undefined.
    #[error("chunk write error: {0}")]
    ChunkWriteError(String),

    /// Blob store, manifest, or cache backend I/O failure.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Cloud storage binding was deleted between lookup and use.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// `IntegrityWarning` in the spec's taxonomy is non-fatal by design: a
/// checksum mismatch on a cloud download or a cache entry just triggers a
/// rebuild/re-yield rather than propagating as an error. We represent it as a
/// plain log line through this helper rather than as a `CoreError` variant,
/// since nothing downstream ever needs to match on it.
pub fn warn_integrity_mismatch(context: &str) {
    tracing::warn!("integrity check failed: {context}");
}

/// Format an error including its chain of sources, e.g. `outer -> inner -> root`.
pub fn format_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut string = error.to_string();
    for source in std::iter::successors(error.source(), |error| error.source()) {
        string.push_str(" -> ");
        string.push_str(&source.to_string());
    }
    string
}

fn seen_messages() -> &'static parking_lot::Mutex<std::collections::HashSet<String>> {
    static SEEN: std::sync::OnceLock<parking_lot::Mutex<std::collections::HashSet<String>>> =
        std::sync::OnceLock::new();
    SEEN.get_or_init(|| parking_lot::Mutex::new(std::collections::HashSet::new()))
}

pub trait ResultExt<T> {
    /// Log a warning if there is an `Err`, but swallow it and return `None`.
    ///
    /// Only logs the exact same `"{msg}: {err}"` text once per process —
    /// used at the boundary of the cache for deserialization/CRC failures,
    /// which recover locally instead of propagating (see the cache's
    /// propagation policy) and would otherwise spam the same warning on
    /// every cache miss.
    fn warn_on_err_once(self, msg: impl std::fmt::Display) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn warn_on_err_once(self, msg: impl std::fmt::Display) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let text = format!("{msg}: {err}");
                if seen_messages().lock().insert(text.clone()) {
                    tracing::warn!("{text}");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_chain_includes_all_sources() {
        let err = anyhow::format_err!("root_cause")
            .context("inner_context")
            .context("outer_context");

        assert_eq!(err.to_string(), "outer_context");
        assert_eq!(
            format_chain(err.as_ref()),
            "outer_context -> inner_context -> root_cause"
        );
    }

    #[test]
    fn warn_on_err_once_passes_through_ok() {
        let ok: Result<i32, String> = Ok(42);
        assert_eq!(ok.warn_on_err_once("ctx"), Some(42));
    }

    #[test]
    fn warn_on_err_once_swallows_err() {
        let err: Result<i32, String> = Err("boom".to_owned());
        assert_eq!(err.warn_on_err_once("ctx"), None);
    }

    #[test]
    fn warn_on_err_once_dedups_identical_messages() {
        let first: Result<i32, String> = Err("dedup-test-message".to_owned());
        let second: Result<i32, String> = Err("dedup-test-message".to_owned());
        assert_eq!(first.warn_on_err_once("ctx"), None);
        // Second call with the exact same text must not log again, but must
        // still swallow the error and return None either way.
        assert_eq!(second.warn_on_err_once("ctx"), None);
    }
}
