//! Resource operation errors

use thiserror::Error;

use ks_protocol::{Code, ResultPayload};

/// Operation an API failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    Apply,
}

impl Operation {
    /// Result code reported for a failure of this operation
    pub fn code(self) -> Code {
        match self {
            Operation::List => Code::ListError,
            Operation::Get => Code::GetError,
            Operation::Create => Code::CreateError,
            Operation::Update => Code::UpdateError,
            Operation::Delete => Code::DeleteError,
            Operation::Apply => Code::ApplyError,
        }
    }
}

/// Errors from the dynamic resource engine and the handlers built on it
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Missing or malformed request parameters
    #[error("{0}")]
    Params(String),

    /// The API server rejected or failed an operation
    #[error("{}", api_message(.source))]
    Api {
        op: Operation,
        #[source]
        source: kube::Error,
    },

    /// Output could not be rendered in the requested encoding
    #[error("{0}")]
    Encode(String),

    /// Object could not be converted to or from JSON
    #[error("{0}")]
    Marshal(#[from] serde_json::Error),

    /// A manifest could not be decoded
    #[error("{0}")]
    Manifest(String),
}

impl ResourceError {
    /// Wrap a client error raised during `op`
    pub fn api(op: Operation, source: kube::Error) -> Self {
        ResourceError::Api { op, source }
    }

    /// Result code for this error
    pub fn code(&self) -> Code {
        match self {
            ResourceError::Params(_) => Code::ParamsError,
            ResourceError::Api { op, .. } => op.code(),
            ResourceError::Encode(_) => Code::EncodeError,
            ResourceError::Marshal(_) => Code::MarshalError,
            ResourceError::Manifest(_) => Code::ApplyError,
        }
    }

    /// Whether the API server answered "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::Api { source, .. } if is_not_found(source))
    }
}

impl From<ResourceError> for ResultPayload {
    fn from(e: ResourceError) -> Self {
        ResultPayload::failure(e.code(), e.to_string())
    }
}

/// Whether a client error is the API server's 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

/// The API server's own message when there is one
fn api_message(err: &kube::Error) -> String {
    match err {
        kube::Error::Api(response) if !response.message.is_empty() => response.message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn not_found() -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "configmaps \"missing\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        })
    }

    #[test]
    fn test_api_error_uses_server_message() {
        let err = ResourceError::api(Operation::Get, not_found());
        assert_eq!(err.to_string(), "configmaps \"missing\" not found");
        assert_eq!(err.code(), Code::GetError);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_payload_conversion() {
        let payload: ResultPayload = ResourceError::Params("name is required".into()).into();
        assert_eq!(payload.code, Code::ParamsError);
        assert_eq!(payload.msg, "name is required");
    }

    #[test]
    fn test_operation_codes() {
        assert_eq!(Operation::List.code(), Code::ListError);
        assert_eq!(Operation::Delete.code(), Code::DeleteError);
        assert_eq!(Operation::Apply.code(), Code::ApplyError);
    }
}
