use thiserror::Error;

#[derive(Debug, Error)]
pub enum KairosError {
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("operation not supported: {message}")]
    OperationNotSupported { message: String },
    #[error("access denied: {message}")]
    AccessDenied { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl KairosError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::OperationNotSupported {
            message: message.into(),
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message }
            | Self::NotFound { message }
            | Self::OperationNotSupported { message }
            | Self::AccessDenied { message }
            | Self::Storage { message } => message,
        }
    }
}

pub type KairosResult<T> = Result<T, KairosError>;

impl From<sea_orm::DbErr> for KairosError {
    fn from(value: sea_orm::DbErr) -> Self {
        KairosError::storage(value.to_string())
    }
}

impl From<serde_json::Error> for KairosError {
    fn from(value: serde_json::Error) -> Self {
        KairosError::storage(value.to_string())
    }
}
