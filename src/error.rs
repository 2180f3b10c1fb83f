//! Error types for dataset access and reading
//!
//! Two layers of errors exist here:
//!
//! - [`DatasetError`]: an opaque failure reported by the native raster
//!   library (open failed, decode failed, transfer aborted, ...). The crate
//!   never inspects its structure beyond the message text.
//! - [`ReaderError`]: the reader's own taxonomy. Every variant is fatal;
//!   failures that should degrade to nodata are absorbed before a
//!   `ReaderError` is ever constructed.
//!
//! Which `DatasetError`s are ignorable is caller policy, expressed as a list
//! of [`ErrorPattern`]s checked by [`error_matches`]. Patterns are plain
//! serializable values so they can travel with a reader snapshot to another
//! worker process.

use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;

use crate::raster_spec::Window;

/// A failure reported by the native dataset layer.
///
/// Implementations of [`crate::DatasetSource`] and [`crate::RawDataset`]
/// construct these from whatever error type the underlying library produces.
/// The message is the matching surface for [`error_matches`]; the original
/// cause, when available, is preserved for diagnostics.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DatasetError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl DatasetError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The message text, as matched by [`error_matches`].
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A rule describing a class of [`DatasetError`] that should degrade to
/// nodata instead of propagating.
///
/// The matching rule is deliberately injectable data rather than a hardcoded
/// strategy: callers choose substring or exact matching per entry, and the
/// list round-trips through serde together with the rest of the reader
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPattern {
    /// Matches when the error message contains the given fragment.
    MessageContains(String),
    /// Matches only the exact error message.
    MessageEquals(String),
}

impl ErrorPattern {
    #[must_use]
    pub fn matches(&self, err: &DatasetError) -> bool {
        match self {
            ErrorPattern::MessageContains(fragment) => err.message().contains(fragment.as_str()),
            ErrorPattern::MessageEquals(message) => err.message() == message,
        }
    }
}

/// Check a native-layer failure against the caller's recognized-error rules.
#[must_use]
pub fn error_matches(err: &DatasetError, patterns: &[ErrorPattern]) -> bool {
    patterns.iter().any(|p| p.matches(err))
}

/// Fatal reader failures.
///
/// Variants carry enough context (url, window, cause) to diagnose without a
/// retry; the reader itself never retries.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Opening the dataset failed and the failure matched no recognized
    /// error pattern.
    #[error("error opening {url:?}: {source}")]
    Open {
        url: String,
        #[source]
        source: DatasetError,
    },

    /// The dataset exposes a band count other than exactly one. Always
    /// fatal: multi-band assets must be split into one asset per band
    /// upstream, so this is a misconfiguration rather than a transient
    /// condition.
    #[error(
        "asset {url:?} has {count} bands; expected exactly 1 \
         (represent each band as a separate asset)"
    )]
    BandCount { url: String, count: usize },

    /// A read failed and the failure matched no recognized error pattern.
    #[error("error reading {window} from {url:?}: {source}")]
    Read {
        url: String,
        window: Window,
        #[source]
        source: DatasetError,
    },

    /// A decoded chunk reported a band count the post-processing step cannot
    /// interpret. Internal invariant violation.
    #[error("unexpected band count {count} in chunk for {window}; expected 1 (data) or 2 (data + alpha)")]
    UnexpectedBands { count: usize, window: Window },

    /// A decoded chunk's shape does not match the requested window.
    /// Internal invariant violation.
    #[error("chunk for {window} has shape {got:?}, expected {expected:?}")]
    ChunkShape {
        window: Window,
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A post-processed value does not fit the configured output type.
    /// Internal invariant violation, the counterpart of an output dtype
    /// mismatch.
    #[error("value {value} does not fit output type {ty}")]
    OutputCast { value: f64, ty: &'static str },
}
