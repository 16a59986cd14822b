use shared::error::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ApiClientError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
    #[error("{detail}")]
    Service { status: u16, detail: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid backup identifier '{0}'")]
    InvalidIdentifier(String),
}

impl ApiClientError {
    pub fn service(status: u16, detail: impl Into<String>) -> Self {
        Self::Service {
            status,
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Service { status, .. } => ErrorCode::from_status(*status),
            Self::InvalidIdentifier(_) => ErrorCode::Validation,
            Self::Network(_) | Self::Decode(_) => ErrorCode::Internal,
        }
    }
}

impl From<reqwest::Error> for ApiClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else if let Some(status) = value.status() {
            Self::service(status.as_u16(), value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

/// Failure surfaced by the only action that propagates to its caller.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("backup creation failed: {0}")]
    Create(#[source] ApiClientError),
}

impl StoreError {
    pub fn api_error(&self) -> &ApiClientError {
        match self {
            Self::Create(source) => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_classify_failures() {
        assert_eq!(
            ApiClientError::service(401, "missing key").code(),
            ErrorCode::Unauthorized
        );
        assert_eq!(
            ApiClientError::InvalidIdentifier("..".into()).code(),
            ErrorCode::Validation
        );
        assert_eq!(
            ApiClientError::Network("refused".into()).code(),
            ErrorCode::Internal
        );
    }
}
