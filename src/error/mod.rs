use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Metrics encoding error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Failures on the client side of the relay connection
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Server closed the connection before the handshake completed")]
    HandshakeClosed,

    #[error("Handshake frame carried no connection id")]
    MissingSocketId,

    #[error("No handshake frame received in time")]
    HandshakeTimeout,

    #[error("Invalid frame: {0}")]
    Protocol(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Metrics(_) => "METRICS_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let code = self.code();
        let log_message = self.to_string();
        let client_message = if is_production() {
            "Internal server error".to_string()
        } else {
            log_message.clone()
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::from(prometheus::Error::Msg("boom".into()));
        assert_eq!(err.code(), "METRICS_ERROR");
        assert!(err.to_string().starts_with("Metrics encoding error"));
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::from(prometheus::Error::Msg("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_client_error_messages() {
        let err: ClientError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Invalid frame"));
        assert_eq!(
            ClientError::HandshakeClosed.to_string(),
            "Server closed the connection before the handshake completed"
        );
    }
}
