use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegiaError {
    #[error("Network error: {operation}: {reason}")]
    NetworkError { operation: String, reason: String },

    #[error("Timeout error: {operation}: {duration_ms}ms")]
    TimeoutError { operation: String, duration_ms: u64 },

    #[error("Protocol error: {operation}: {reason}")]
    ProtocolError { operation: String, reason: String },

    #[error("Parse error: {content_type}: {reason}")]
    ParseError { content_type: String, reason: String },

    #[error("Change detection failed: {reason}")]
    DetectorError { reason: String },

    #[error("Database operation failed: {operation}: {reason}")]
    DatabaseError { operation: String, reason: String },

    #[error("Event queue overflow: capacity {capacity}")]
    QueueOverflow { capacity: usize },

    #[error("Handler failed: {handler_id}: {reason}")]
    HandlerError { handler_id: String, reason: String },

    #[error("Stream handler failed: {stream_id}: {reason}")]
    StreamHandlerError { stream_id: String, reason: String },

    #[error("Invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("Source error: {source_id}: {reason}")]
    SourceError { source_id: String, reason: String },

    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("Configuration error: {parameter}: {reason}")]
    ConfigurationError { parameter: String, reason: String },

    #[error("Validation error: {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub type RegiaResult<T> = Result<T, RegiaError>;

impl From<serde_json::Error> for RegiaError {
    fn from(err: serde_json::Error) -> Self {
        RegiaError::SerializationError {
            reason: err.to_string(),
        }
    }
}

impl From<uuid::Error> for RegiaError {
    fn from(err: uuid::Error) -> Self {
        RegiaError::ValidationError {
            field: "uuid".to_string(),
            message: err.to_string(),
        }
    }
}
