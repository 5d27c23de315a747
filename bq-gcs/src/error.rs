//! Error types and result definitions for extract function operations.
//!
//! [`BqGcsError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source, the callsite location and a captured backtrace. The
//! kind drives the HTTP answer, the metrics labels and the Sentry exception type.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for extract function operations.
pub type BqGcsResult<T> = Result<T, BqGcsError>;

/// Main error type for extract function operations.
#[derive(Debug, Clone)]
pub struct BqGcsError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Categories of errors raised while handling an invocation.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Startup Errors
    ConfigError,
    AuthenticationError,
    SecretAccessFailed,

    // Input Errors
    PayloadDecodeFailed,
    InvalidPayloadShape,
    UnsupportedOperation,

    // Upstream Errors
    ExtractJobFailed,
    PublishFailed,
    ApiRequestFailed,

    // IO & Serialization Errors
    IoError,
    DeserializationError,
    ConversionError,

    // State Errors
    InvalidState,
}

impl ErrorKind {
    /// Returns `true` when the failure was caused by the incoming message itself.
    ///
    /// Redelivering such a message fails the same way.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::PayloadDecodeFailed
                | ErrorKind::InvalidPayloadShape
                | ErrorKind::UnsupportedOperation
        )
    }
}

impl BqGcsError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        BqGcsError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl PartialEq for BqGcsError {
    fn eq(&self, other: &BqGcsError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for BqGcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        write_detail(self.detail.as_deref(), f, 1)?;
        write_backtrace(self.backtrace.as_ref(), f, 1)?;

        Ok(())
    }
}

impl error::Error for BqGcsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() && rendered_backtrace != "disabled backtrace" {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Creates a [`BqGcsError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for BqGcsError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> BqGcsError {
        BqGcsError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`BqGcsError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for BqGcsError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> BqGcsError {
        BqGcsError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`std::io::Error`] to [`BqGcsError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for BqGcsError {
    #[track_caller]
    fn from(err: std::io::Error) -> BqGcsError {
        let detail = err.to_string();
        BqGcsError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`BqGcsError`] with the appropriate error kind.
impl From<serde_json::Error> for BqGcsError {
    #[track_caller]
    fn from(err: serde_json::Error) -> BqGcsError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        BqGcsError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`std::string::FromUtf8Error`] to [`BqGcsError`] with [`ErrorKind::ConversionError`].
impl From<std::string::FromUtf8Error> for BqGcsError {
    #[track_caller]
    fn from(err: std::string::FromUtf8Error) -> BqGcsError {
        let detail = err.to_string();
        BqGcsError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("UTF-8 string conversion failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`base64::DecodeError`] to [`BqGcsError`] with [`ErrorKind::ConversionError`].
impl From<base64::DecodeError> for BqGcsError {
    #[track_caller]
    fn from(err: base64::DecodeError) -> BqGcsError {
        let detail = err.to_string();
        BqGcsError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Base64 decoding failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`chrono::ParseError`] to [`BqGcsError`] with [`ErrorKind::ConversionError`].
impl From<chrono::ParseError> for BqGcsError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> BqGcsError {
        let detail = err.to_string();
        BqGcsError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`reqwest::Error`] to [`BqGcsError`] with [`ErrorKind::ApiRequestFailed`].
impl From<reqwest::Error> for BqGcsError {
    #[track_caller]
    fn from(err: reqwest::Error) -> BqGcsError {
        let description = if err.is_decode() {
            "Google API response could not be decoded"
        } else if err.is_timeout() {
            "Google API request timed out"
        } else {
            "Google API request failed"
        };

        let detail = err.to_string();
        BqGcsError::from_components(
            ErrorKind::ApiRequestFailed,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`tokio::task::JoinError`] to [`BqGcsError`] with [`ErrorKind::InvalidState`].
impl From<tokio::task::JoinError> for BqGcsError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> BqGcsError {
        let description = if err.is_panic() {
            "Background task panicked"
        } else {
            "Background task was cancelled"
        };

        let detail = err.to_string();
        BqGcsError::from_components(
            ErrorKind::InvalidState,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::{bail, bq_gcs_error};

    fn fails_with_detail(table: &str) -> BqGcsResult<()> {
        bail!(
            ErrorKind::InvalidPayloadShape,
            "Payload has no table or view",
            format!("payload for {table}")
        );
    }

    #[test]
    fn display_contains_kind_description_and_detail() {
        let err = fails_with_detail("orders").unwrap_err();
        let rendered = err.to_string();

        assert!(rendered.starts_with("[InvalidPayloadShape] Payload has no table or view @ "));
        assert!(rendered.contains("Detail:\n    payload for orders"));
        assert_eq!(err.detail(), Some("payload for orders"));
    }

    #[test]
    fn location_points_to_the_callsite() {
        let err = bq_gcs_error!(ErrorKind::ConfigError, "Missing bucket");
        assert_eq!(err.location().file(), file!());
    }

    #[test]
    fn errors_compare_by_kind() {
        let first = bq_gcs_error!(ErrorKind::PublishFailed, "Publish failed", "topic a");
        let second = bq_gcs_error!(ErrorKind::PublishFailed, "Publish failed", "topic b");
        let other = bq_gcs_error!(ErrorKind::ExtractJobFailed, "Extract job failed");

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn source_is_exposed() {
        let io = std::io::Error::other("disk gone");
        let err = bq_gcs_error!(ErrorKind::IoError, "Reading key failed", source: io);

        assert_eq!(err.source().map(|s| s.to_string()), Some("disk gone".into()));
    }

    #[test]
    fn json_errors_map_to_deserialization() {
        let err: BqGcsError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }

    #[test]
    fn input_errors_are_classified() {
        assert!(ErrorKind::InvalidPayloadShape.is_input_error());
        assert!(ErrorKind::UnsupportedOperation.is_input_error());
        assert!(!ErrorKind::ExtractJobFailed.is_input_error());
    }
}
