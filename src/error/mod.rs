use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Dashboard access required")]
    DashboardAccessRequired,
}

impl GatewayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Proxy(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Backend(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            GatewayError::DashboardAccessRequired => StatusCode::FORBIDDEN,
        }
    }

    /// Short, stable label clients can match on
    pub fn title(&self) -> &'static str {
        match self {
            GatewayError::Config(_) | GatewayError::Internal(_) | GatewayError::Io(_) => {
                "Internal server error"
            }
            GatewayError::Proxy(_) | GatewayError::Backend(_) => "Bad gateway",
            GatewayError::Timeout(_) => "Gateway timeout",
            GatewayError::BadRequest(_) => "Bad request",
            GatewayError::AuthenticationRequired => "Authentication required",
            GatewayError::DashboardAccessRequired => "Forbidden",
        }
    }

    /// Human readable explanation returned alongside the title
    pub fn message(&self) -> String {
        match self {
            GatewayError::Config(msg)
            | GatewayError::Proxy(msg)
            | GatewayError::Backend(msg)
            | GatewayError::Timeout(msg)
            | GatewayError::Internal(msg)
            | GatewayError::BadRequest(msg) => msg.clone(),
            GatewayError::Io(e) => e.to_string(),
            GatewayError::AuthenticationRequired => {
                "You must be signed in to access this resource".to_string()
            }
            GatewayError::DashboardAccessRequired => {
                "Your account does not have access to the dashboard".to_string()
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.title(),
            "message": self.message(),
        }));

        (status, body).into_response()
    }
}
