use thiserror::Error;

/// Failure taxonomy for the whole backend. Every fallible operation
/// funnels into one of these variants so callers (and the HTTP layer)
/// can branch on a stable code instead of parsing messages.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    AuthRequired,
    #[error("network error: {0}")]
    Network(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("a session is already active")]
    SessionAlreadyActive,
    #[error("the queue is full")]
    QueueFull,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("notion api error: {0}")]
    ExternalApi(#[from] NotionApiError),
    #[error("internal error: {0}")]
    Rpc(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Stable machine-readable code carried in API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthRequired => "auth_required",
            AppError::Network(_) => "network_error",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::SessionAlreadyActive => "already_active",
            AppError::QueueFull => "queue_full",
            AppError::Storage(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::InvalidConfig(_)
            | AppError::Rpc(_) => "rpc_error",
            AppError::ExternalApi(inner) => match inner {
                NotionApiError::Unauthorized | NotionApiError::Forbidden => "auth_required",
                _ => "external_api_error",
            },
            AppError::Unknown(_) => "unknown_error",
        }
    }

    /// Only transient transport failures are worth an automatic retry.
    pub fn retryable(&self) -> bool {
        matches!(self, AppError::Network(_))
            || matches!(
                self,
                AppError::ExternalApi(NotionApiError::Network(_) | NotionApiError::RateLimited)
            )
    }

    pub fn lock_poisoned(what: &str) -> AppError {
        AppError::Rpc(format!("{what} lock poisoned"))
    }
}

/// Typed mapping of Notion API failures. Status-specific variants let the
/// sync engine distinguish auth problems (surface to the user) from
/// transient faults (retried inside the client).
#[derive(Debug, Error)]
pub enum NotionApiError {
    #[error("notion token rejected")]
    Unauthorized,
    #[error("notion integration lacks access")]
    Forbidden,
    #[error("notion object not found: {0}")]
    NotFound(String),
    #[error("notion rate limit exceeded")]
    RateLimited,
    #[error("notion service error (status {0})")]
    Service(u16),
    #[error("invalid notion response: {0}")]
    InvalidResponse(String),
    #[error("network error while calling notion: {0}")]
    Network(String),
}
