//! Error types for the Anomalo provider.

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while reconciling Anomalo resources.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Caller-supplied data violates a precondition.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Locally tracked identity data is inconsistent.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An object verified moments ago has disappeared.
    #[error("Possible race condition: {0}")]
    RaceCondition(String),

    /// A call to the Anomalo API failed; the message carries the cause.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The Anomalo API answered with a non-success status.
    #[error("API error: {0}")]
    Api(String),

    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// Get the error message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::InvalidInput(msg)
            | Self::InvalidState(msg)
            | Self::RaceCondition(msg)
            | Self::Upstream(msg)
            | Self::Api(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Unimplemented(msg) => msg,
            Self::Http(_) => "http error (see Debug output)",
            Self::Serialization(_) => "serialization error (see Debug output)",
        }
    }

    /// Wrap a failed API call with the operation context an operator needs.
    ///
    /// ```
    /// use anomalo_provider::ProviderError;
    ///
    /// let cause = ProviderError::Api("HTTP 500 from create_check".to_string());
    /// let err = ProviderError::upstream("creating check on table 5", cause);
    /// assert_eq!(
    ///     err.message(),
    ///     "creating check on table 5: API error: HTTP 500 from create_check"
    /// );
    /// ```
    pub fn upstream(context: impl std::fmt::Display, cause: ProviderError) -> Self {
        Self::Upstream(format!("{}: {}", context, cause))
    }

    /// Short, stable summary for the error kind.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Resource not found",
            Self::InvalidInput(_) => "Invalid input",
            Self::InvalidState(_) => "Invalid state",
            Self::RaceCondition(_) => "Possible race condition",
            Self::Upstream(_) | Self::Api(_) | Self::Http(_) => "Anomalo API request failed",
            Self::Serialization(_) => "Serialization error",
            Self::Configuration(_) => "Configuration error",
            Self::UnknownResource(_) => "Unknown resource type",
            Self::Unimplemented(_) => "Unimplemented",
        }
    }

    /// Whether this error means the remote object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<&ProviderError> for Diagnostic {
    fn from(err: &ProviderError) -> Self {
        let detail = match err {
            ProviderError::Http(e) => e.to_string(),
            ProviderError::Serialization(e) => e.to_string(),
            other => other.message().to_string(),
        };
        Diagnostic::error(err.summary()).with_detail(detail)
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        Diagnostic::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("check 12 on table 5".to_string());
        assert_eq!(format!("{}", err), "Resource not found: check 12 on table 5");

        let err = ProviderError::InvalidInput("bad import id".to_string());
        assert_eq!(format!("{}", err), "Invalid input: bad import id");

        let err = ProviderError::RaceCondition("check vanished".to_string());
        assert_eq!(format!("{}", err), "Possible race condition: check vanished");

        let err = ProviderError::UnknownResource("anomalo_widget".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: anomalo_widget");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::InvalidState("static id 0".to_string());
        assert_eq!(err.message(), "static id 0");

        let err = ProviderError::Configuration("missing host".to_string());
        assert_eq!(err.message(), "missing host");
    }

    #[test]
    fn test_upstream_keeps_cause() {
        let err = ProviderError::upstream(
            "deleting check 7 on table 3",
            ProviderError::Api("HTTP 502 from delete_check: bad gateway".to_string()),
        );
        assert!(matches!(err, ProviderError::Upstream(_)));
        assert!(err.message().starts_with("deleting check 7 on table 3"));
        assert!(err.message().contains("bad gateway"));
    }

    #[test]
    fn test_error_to_diagnostic() {
        let diag: Diagnostic = ProviderError::NotFound("check 12".to_string()).into();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.summary, "Resource not found");
        assert_eq!(diag.detail, Some("check 12".to_string()));

        let diag = Diagnostic::from(&ProviderError::Upstream("boom".to_string()));
        assert_eq!(diag.summary, "Anomalo API request failed");
    }

    #[test]
    fn test_serialization_error_detail() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProviderError::from(json_err);
        let diag = Diagnostic::from(&err);
        assert_eq!(diag.summary, "Serialization error");
        assert!(diag.detail.unwrap().contains("EOF"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(ProviderError::NotFound("x".to_string()).is_not_found());
        assert!(!ProviderError::RaceCondition("x".to_string()).is_not_found());
        assert!(!ProviderError::Upstream("x".to_string()).is_not_found());
    }
}
