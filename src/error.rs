//! Error types for data pipelines.
//!
//! Errors fall into a small taxonomy that decides how operators react to them:
//!
//! - **Record** errors concern a single record (a transform failed, a field is
//!   missing). Operators configured with `warn_only` skip the record and log a
//!   warning; everything else escalates.
//! - **Stream** errors come from the byte streams underneath leaf sources (I/O,
//!   corrupt archives) and always escalate.
//! - **Pipeline** errors describe an inconsistent graph or checkpoint (unequal zip
//!   lengths, malformed tapes). They always mark the pipeline broken.

use crate::data::Data;
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

/// Result type for data pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A single record could not be produced or transformed.
    Record,
    /// The byte stream underneath a leaf source failed.
    Stream,
    /// The pipeline graph or its checkpoint is inconsistent.
    Pipeline,
    /// An argument passed by the caller is invalid.
    InvalidArgument,
    /// An internal invariant was violated.
    Internal,
}

impl ErrorKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Stream => "stream",
            Self::Pipeline => "pipeline",
            Self::InvalidArgument => "invalid_argument",
            Self::Internal => "internal",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        [
            Self::Record,
            Self::Stream,
            Self::Pipeline,
            Self::InvalidArgument,
            Self::Internal,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == name)
    }
}

/// Error type for data pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A record could not be produced or transformed.
    #[error("{message}")]
    Record {
        /// Human-readable description.
        message: String,
        /// The failure raised by user code, if any.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Reading the underlying byte stream failed.
    #[error("Stream error: {message}")]
    Stream {
        /// Human-readable description.
        message: String,
        /// The I/O failure, if any.
        #[source]
        source: Option<io::Error>,
    },

    /// The pipeline is in an inconsistent state.
    #[error("Data pipeline error: {0}")]
    Pipeline(String),

    /// A previous error broke the pipeline; it must be reset before reuse.
    #[error("The data pipeline is broken by a previous operation and cannot be used until it is reset.")]
    Broken,

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a record error without an underlying cause.
    pub fn record<S: Into<String>>(message: S) -> Self {
        Self::Record {
            message: message.into(),
            source: None,
        }
    }

    /// Create a record error wrapping a failure raised by a user functor.
    pub fn from_user<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::Record {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a stream error wrapping an I/O failure.
    pub fn stream<S: Into<String>>(message: S, source: io::Error) -> Self {
        Self::Stream {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a pipeline-level error.
    pub fn pipeline<S: Into<String>>(message: S) -> Self {
        Self::Pipeline(message.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Record { .. } => ErrorKind::Record,
            Self::Stream { .. } => ErrorKind::Stream,
            Self::Pipeline(_) | Self::Broken => ErrorKind::Pipeline,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a `warn_only` operator may skip the offending record.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Record)
    }

    fn message(&self) -> String {
        match self {
            Self::Record { message, .. } | Self::Stream { message, .. } => message.clone(),
            Self::Pipeline(message) | Self::InvalidArgument(message) | Self::Internal(message) => {
                message.clone()
            }
            Self::Broken => self.to_string(),
        }
    }

    /// Encode a failure that an operator has buffered but not yet delivered,
    /// so a checkpoint can carry it.
    ///
    /// Causes are flattened into the message; the kind is kept.
    pub(crate) fn to_pending(&self) -> Data {
        use std::fmt::Write as _;

        let mut message = self.message();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            let _ = write!(message, ": {err}");
            cause = std::error::Error::source(err);
        }

        let mut map = BTreeMap::new();
        map.insert("kind".to_string(), Data::from(self.kind().as_str()));
        map.insert("message".to_string(), Data::String(message));
        Data::Dict(map)
    }

    /// Decode a failure written by [`Error::to_pending`].
    pub(crate) fn from_pending(data: &Data) -> Option<Self> {
        let map = data.as_dict()?;
        let kind = ErrorKind::parse(map.get("kind")?.as_str()?)?;
        let message = map.get("message")?.as_str()?.to_string();

        Some(match kind {
            ErrorKind::Record => Self::record(message),
            ErrorKind::Stream => Self::Stream {
                message,
                source: None,
            },
            ErrorKind::Pipeline => Self::Pipeline(message),
            ErrorKind::InvalidArgument => Self::InvalidArgument(message),
            ErrorKind::Internal => Self::Internal(message),
        })
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Stream {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_reports_pipeline_kind() {
        assert_eq!(Error::Broken.kind(), ErrorKind::Pipeline);
        assert!(!Error::Broken.is_recoverable());
    }

    #[test]
    fn user_errors_are_recoverable_records() {
        let err = Error::from_user("map failed", anyhow::anyhow!("boom"));
        assert_eq!(err.kind(), ErrorKind::Record);
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "map failed");
    }

    #[test]
    fn pending_failures_keep_kind_and_cause() {
        let err = Error::from_user("map failed", anyhow::anyhow!("boom"));
        let restored = Error::from_pending(&err.to_pending()).unwrap();
        assert_eq!(restored.kind(), ErrorKind::Record);
        assert_eq!(restored.to_string(), "map failed: boom");

        let err: Error = io::Error::other("disk gone").into();
        let restored = Error::from_pending(&err.to_pending()).unwrap();
        assert_eq!(restored.kind(), ErrorKind::Stream);

        assert!(Error::from_pending(&Data::Int(3)).is_none());
    }

    #[test]
    fn io_errors_become_stream_errors() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated").into();
        assert_eq!(err.kind(), ErrorKind::Stream);
    }
}
