//! Error types for the CloudWatch agent operator

use thiserror::Error;

/// Main error type for reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid operator configuration (bad filter pattern, missing CRD, ...)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The custom resource spec failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// An object could not be converted to or from its wire form
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Failure attributed to one generated object
    #[error("{key}: {source}")]
    ObjectError {
        key: String,
        #[source]
        source: Box<Error>,
    },

    /// One or more objects failed during a reconcile pass
    #[error("{} object(s) failed: {}", .0.len(), join_errors(.0))]
    BatchError(Vec<Error>),
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Whether the outer controller should requeue quickly
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => {
                resp.code == 409 || resp.code == 429 || resp.code >= 500
            }
            Error::KubeError(_) => true,
            Error::ObjectError { source, .. } => source.is_retriable(),
            Error::BatchError(errors) => errors.iter().any(Error::is_retriable),
            Error::ConfigError(_) | Error::ValidationError(_) | Error::SerializationError(_) => {
                false
            }
        }
    }

    /// Whether this is an optimistic-concurrency write conflict (HTTP 409)
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 409,
            Error::ObjectError { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Whether the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            Error::ObjectError { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Attach the `Kind/namespace/name` of the object that failed
    pub fn for_object(self, key: impl Into<String>) -> Self {
        Error::ObjectError {
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// Fold a list of errors into a single result
    ///
    /// An empty list is success; a single error is returned as is.
    pub fn from_batch(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::BatchError(errors)),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn test_conflict_detection() {
        assert!(api_error(409, "Conflict").is_conflict());
        assert!(!api_error(404, "NotFound").is_conflict());
        assert!(!Error::ValidationError("x".into()).is_conflict());
    }

    #[test]
    fn test_retriable_classification() {
        assert!(api_error(409, "Conflict").is_retriable());
        assert!(api_error(503, "ServiceUnavailable").is_retriable());
        assert!(!api_error(422, "Invalid").is_retriable());
        assert!(!Error::ValidationError("bad".into()).is_retriable());
    }

    #[test]
    fn test_batch_reports_every_error() {
        let err = Error::from_batch(vec![
            Error::ConfigError("first".into()),
            Error::ValidationError("second".into()),
        ])
        .unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("2 object(s) failed"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[test]
    fn test_object_error_keeps_classification() {
        let err = api_error(409, "Conflict").for_object("Service/ns/agent");
        assert!(err.is_conflict());
        assert!(err.to_string().starts_with("Service/ns/agent: "));
    }

    #[test]
    fn test_batch_of_one_is_unwrapped() {
        let err = Error::from_batch(vec![Error::ConfigError("only".into())]).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(Error::from_batch(Vec::new()).is_ok());
    }
}
