use thiserror::Error;

/// Flow-level errors surfaced to the view layer
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Initialization failed: {0}")]
    Initialization(ServiceError),

    #[error("Node not found: {id}")]
    NotFound { id: String },

    #[error("Invalid answer for {question_id}: {reason}")]
    Validation { question_id: String, reason: String },

    #[error("Submission rejected{}: {detail}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Submission { status: Option<u16>, detail: String },

    #[error("Evaluation failed{}: {detail}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Evaluation { status: Option<u16>, detail: String },

    #[error("No active session")]
    NoSession,

    #[error("Response superseded by reset")]
    Superseded,

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Evaluation service transport and protocol errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request failed: {message}")]
    Network { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("API error: {status}{}", .detail.as_deref().map(|d| format!(" - {}", d)).unwrap_or_default())]
    Api { status: u16, detail: Option<String> },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage connection failed: {message}")]
    Connection { message: String },

    #[error("Storage operation failed: {message}")]
    Query { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl ServiceError {
    /// HTTP status code, when the server produced a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Result type alias for evaluation service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
