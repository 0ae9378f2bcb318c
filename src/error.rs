use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

/// Errors surfaced at the HTTP boundary. Internal layers return their own
/// narrower error types and convert into this one at the handler edge.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BrokerUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::StorageError(other.to_string()),
        }
    }
}

impl From<lapin::Error> for AppError {
    fn from(e: lapin::Error) -> Self {
        AppError::BrokerUnavailable(e.to_string())
    }
}

/// Errors from the tenant use-case layer (4.F).
#[derive(Error, Debug)]
pub enum TenantError {
    #[error("tenant not found: {0}")]
    NotFound(uuid::Uuid),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
}

impl From<TenantError> for AppError {
    fn from(e: TenantError) -> Self {
        match e {
            TenantError::NotFound(id) => AppError::NotFound(format!("tenant {id}")),
            TenantError::InvalidInput(msg) => AppError::InvalidInput(msg),
            TenantError::Storage(e) => AppError::from(e),
            TenantError::Broker(e) => AppError::from(e),
        }
    }
}

/// Errors from the message repository layer (4.G).
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("message not found: {tenant_id}/{id}")]
    NotFound { tenant_id: uuid::Uuid, id: uuid::Uuid },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<MessageError> for AppError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::NotFound { tenant_id, id } => {
                AppError::NotFound(format!("message {tenant_id}/{id}"))
            }
            MessageError::InvalidInput(msg) => AppError::InvalidInput(msg),
            MessageError::Storage(e) => AppError::from(e),
        }
    }
}

/// Errors from the Tenant Manager (4.E).
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("no consumer registered for tenant {0}")]
    NoConsumer(uuid::Uuid),
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<ManagerError> for AppError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::NoConsumer(id) => AppError::NotFound(format!("consumer {id}")),
            ManagerError::Broker(e) => AppError::from(e),
            ManagerError::Storage(e) => AppError::from(e),
        }
    }
}
