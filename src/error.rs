use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SearchIndexError {
    #[error("No index generation exists for scope: {0}")]
    NotFound(String),

    #[error("Generation name already exists: {0}")]
    Conflict(String),

    #[error("A writer is already open on generation: {0}")]
    WriterAlreadyOpen(String),

    #[error("Index write failed: {0}")]
    IndexWrite(String),

    #[error("Generation disappeared before it could be opened: {0}")]
    GenerationNotFound(String),

    #[error("Promotion failed: {0}")]
    Promotion(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Regeneration already in progress for scope: {0}")]
    RegenerationInProgress(String),

    #[error("No regeneration in progress for scope: {0}")]
    NoRegenerationInProgress(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Write queue closed for scope: {0}")]
    QueueClosed(String),

    #[error("Write queue full for scope: {0}")]
    QueueFull(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SearchIndexError>;

impl From<std::io::Error> for SearchIndexError {
    fn from(e: std::io::Error) -> Self {
        SearchIndexError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for SearchIndexError {
    fn from(e: tantivy::TantivyError) -> Self {
        SearchIndexError::Tantivy(e.to_string())
    }
}

impl From<serde_json::Error> for SearchIndexError {
    fn from(e: serde_json::Error) -> Self {
        SearchIndexError::Json(e.to_string())
    }
}

impl SearchIndexError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SearchIndexError::NotFound(_) => StatusCode::NOT_FOUND,
            SearchIndexError::Conflict(_) => StatusCode::CONFLICT,
            SearchIndexError::WriterAlreadyOpen(_) => StatusCode::CONFLICT,
            SearchIndexError::IndexWrite(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchIndexError::GenerationNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchIndexError::Promotion(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchIndexError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            SearchIndexError::InvalidScope(_) => StatusCode::BAD_REQUEST,
            SearchIndexError::RegenerationInProgress(_) => StatusCode::CONFLICT,
            SearchIndexError::NoRegenerationInProgress(_) => StatusCode::CONFLICT,
            SearchIndexError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            SearchIndexError::QueueClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchIndexError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchIndexError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchIndexError::Tantivy(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchIndexError::Json(_) => StatusCode::BAD_REQUEST,
            SearchIndexError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Races that go away once "latest" is resolved again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchIndexError::GenerationNotFound(_))
    }

    /// Infrastructure failures. Callers must surface these as
    /// "search temporarily unavailable", never as an empty result page.
    pub fn is_unavailable(&self) -> bool {
        self.status_code() == StatusCode::SERVICE_UNAVAILABLE
    }
}
