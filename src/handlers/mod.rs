//! Routes the gateway answers itself instead of forwarding.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use axum::{extract::State, http::StatusCode, Json};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

/// Backend endpoint that emails sign-in links
pub const MAGIC_LINK_BACKEND_PATH: &str = "/api/magic_link/";

/// Shared state for the local handlers
#[derive(Clone)]
pub struct HandlerState {
    client: reqwest::Client,
    magic_link_url: Arc<str>,
    timeout: Duration,
}

impl HandlerState {
    pub fn new(client: reqwest::Client, config: &GatewayConfig) -> Self {
        Self {
            client,
            magic_link_url: Arc::from(config.backend.endpoint(MAGIC_LINK_BACKEND_PATH)),
            timeout: Duration::from_secs(config.session.magic_link_timeout_secs),
        }
    }
}

/// `GET /health`
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

/// `POST /api/magic-link/`: validate the address and ask the backend to send a sign-in link
pub async fn magic_link_handler(
    State(state): State<HandlerState>,
    Json(payload): Json<MagicLinkRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(GatewayError::BadRequest(
            "Please enter a valid email address".to_string(),
        ));
    }

    let response = state
        .client
        .post(state.magic_link_url.as_ref())
        .timeout(state.timeout)
        .json(&MagicLinkRequest {
            email: email.clone(),
        })
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(format!("Magic link request timed out: {}", e))
            } else {
                GatewayError::Backend(format!("Magic link request failed: {}", e))
            }
        })?;

    let status = response.status();
    if status.is_success() {
        info!("Magic link requested");
        return Ok((
            StatusCode::OK,
            Json(json!({ "message": "Check your email for a sign-in link" })),
        ));
    }

    warn!(status = %status, "Backend refused magic link request");
    if status.is_client_error() {
        Err(GatewayError::BadRequest(
            "Unable to send a sign-in link to that address".to_string(),
        ))
    } else {
        Err(GatewayError::Backend(format!(
            "Magic link endpoint returned {}",
            status
        )))
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    })
}

/// Loose syntactic check; the backend owns real validation
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_pattern().is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last@department.gov.uk"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@signs.com"));
        assert!(!is_valid_email("spaces in@x.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[tokio::test]
    async fn test_magic_link_uses_its_own_timeout() {
        use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut config = GatewayConfig::with_backend(server.uri());
        config.session.timeout_secs = 10;
        config.session.magic_link_timeout_secs = 1;
        let state = HandlerState::new(reqwest::Client::new(), &config);
        assert_eq!(state.timeout, Duration::from_secs(1));

        let result = magic_link_handler(
            State(state),
            Json(MagicLinkRequest {
                email: "a@b.com".to_string(),
            }),
        )
        .await;

        match result {
            Err(e) => assert_eq!(e.status_code(), StatusCode::GATEWAY_TIMEOUT),
            Ok(_) => panic!("expected the relay to time out"),
        }
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(body) = health_handler().await;
        assert_eq!(body["status"], "ok");
    }
}
