//! Error types for xpcwire.

use std::fmt;

use thiserror::Error;

use crate::codec::ObjectKind;

/// Main error type for all xpcwire operations.
#[derive(Debug, Error)]
pub enum XpcError {
    /// The value has no dynamic-object representation.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A wire key starts with the reserved `_` prefix.
    #[error("invalid field name {0:?}: wire keys cannot start with an underscore")]
    InvalidFieldName(String),

    /// The decode target is incompatible with the object's runtime kind.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// The decode target cannot hold the object (e.g. a dictionary into a map).
    #[error("unsupported decode target: {0}")]
    UnsupportedTarget(String),

    /// Send, send-and-wait and reply only accept structs.
    #[error("message must be a struct, got {0}")]
    PayloadMustBeStruct(ObjectKind),

    /// Failure reported by the transport.
    #[error(transparent)]
    Transport(#[from] RichError),

    /// The transport refused to create the listener.
    #[error("failed to create listener {endpoint}: {source}")]
    RegistrationFailed {
        endpoint: String,
        #[source]
        source: RichError,
    },

    /// The transport refused the peer requirement of a listener.
    #[error("failed to set peer requirement on listener {endpoint}: {source}")]
    RequirementRejected {
        endpoint: String,
        #[source]
        source: RichError,
    },

    /// The transport refused to activate the listener.
    #[error("failed to activate listener {endpoint}: {source}")]
    ActivationFailed {
        endpoint: String,
        #[source]
        source: RichError,
    },

    /// One or more listeners failed to close.
    #[error(transparent)]
    Close(#[from] CloseErrors),

    /// `run` was called on a listener whose dispatch loop already started.
    #[error("listener {0} is already running")]
    AlreadyRunning(String),

    /// Free-form error raised through serde.
    #[error("codec error: {0}")]
    Codec(String),
}

impl serde::ser::Error for XpcError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        XpcError::Codec(msg.to_string())
    }
}

impl serde::de::Error for XpcError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        XpcError::Codec(msg.to_string())
    }

    fn invalid_type(unexp: serde::de::Unexpected, exp: &dyn serde::de::Expected) -> Self {
        XpcError::TypeMismatch {
            expected: exp.to_string(),
            found: unexp.to_string(),
        }
    }
}

/// Result type alias using XpcError.
pub type Result<T> = std::result::Result<T, XpcError>;

/// Plain message error, the underlying cause of every [`RichError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MessageError(String);

/// Failure reported by the transport, with a retryability hint.
///
/// The flag is advisory: nothing in this crate retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause} (canRetry={can_retry})")]
pub struct RichError {
    #[source]
    cause: MessageError,
    can_retry: bool,
}

impl RichError {
    /// Create a new rich error.
    pub fn new(message: impl Into<String>, can_retry: bool) -> Self {
        Self {
            cause: MessageError(message.into()),
            can_retry,
        }
    }

    /// Human-readable description reported by the transport.
    pub fn message(&self) -> &str {
        &self.cause.0
    }

    /// Whether the transport considers the operation retryable.
    pub fn can_retry(&self) -> bool {
        self.can_retry
    }
}

/// Every failure collected while closing a set of listeners.
#[derive(Debug, Default)]
pub struct CloseErrors(Vec<XpcError>);

impl CloseErrors {
    pub(crate) fn new(errors: Vec<XpcError>) -> Self {
        Self(errors)
    }

    /// The individual failures, in listener order.
    pub fn errors(&self) -> &[XpcError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CloseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseErrors {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_rich_error_display() {
        let err = RichError::new("connection interrupted", true);
        assert_eq!(err.to_string(), "connection interrupted (canRetry=true)");
        assert_eq!(err.message(), "connection interrupted");
        assert!(err.can_retry());
    }

    #[test]
    fn test_rich_error_source_is_plain_message() {
        let err = RichError::new("no such endpoint", false);
        let source = err.source().expect("rich error has a cause");
        assert_eq!(source.to_string(), "no such endpoint");
        assert!(source.source().is_none());
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: XpcError = RichError::new("boom", false).into();
        assert_eq!(err.to_string(), "boom (canRetry=false)");
    }

    #[test]
    fn test_startup_failures_are_distinguishable() {
        let cause = RichError::new("denied", false);
        let registration = XpcError::RegistrationFailed {
            endpoint: "a".into(),
            source: cause.clone(),
        };
        let activation = XpcError::ActivationFailed {
            endpoint: "a".into(),
            source: cause,
        };

        assert!(matches!(registration, XpcError::RegistrationFailed { .. }));
        assert!(matches!(activation, XpcError::ActivationFailed { .. }));
        assert_ne!(registration.to_string(), activation.to_string());
    }

    #[test]
    fn test_close_errors_lists_every_failure() {
        let errors = CloseErrors::new(vec![
            RichError::new("first", false).into(),
            RichError::new("second", true).into(),
        ]);

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.to_string(),
            "first (canRetry=false)\nsecond (canRetry=true)"
        );
    }
}
