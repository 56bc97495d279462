use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::User;

/// Outcome of a single identity check
#[derive(Debug)]
pub enum IdentityCheck {
    /// 2xx with a readable user body
    Authenticated(User),
    /// Any other answer from the backend
    Rejected(StatusCode),
    /// The backend could not be reached in time
    Unavailable(String),
}

/// Client for the backend "who am I" endpoint
pub struct IdentityClient {
    client: reqwest::Client,
    whoami_url: String,
    timeout: Duration,
    fallback_user_agent: HeaderValue,
}

impl IdentityClient {
    /// Create an identity client from configuration
    pub fn new(client: reqwest::Client, config: &GatewayConfig) -> Result<Self> {
        let fallback_user_agent = HeaderValue::from_str(&config.session.fallback_user_agent)
            .map_err(|e| GatewayError::Config(format!("Invalid fallback user agent: {}", e)))?;

        Ok(Self {
            client,
            whoami_url: config.backend.endpoint(&config.session.whoami_path),
            timeout: Duration::from_secs(config.session.timeout_secs),
            fallback_user_agent,
        })
    }

    pub fn whoami_url(&self) -> &str {
        &self.whoami_url
    }

    /// Ask the backend who owns the session cookies in `headers`.
    ///
    /// Never fails: transport problems come back as [`IdentityCheck::Unavailable`].
    pub async fn check(&self, headers: &HeaderMap) -> IdentityCheck {
        let user_agent = headers
            .get(header::USER_AGENT)
            .cloned()
            .unwrap_or_else(|| self.fallback_user_agent.clone());

        let mut request = self
            .client
            .get(&self.whoami_url)
            .timeout(self.timeout)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, "application/json");

        if let Some(cookie) = headers.get(header::COOKIE) {
            request = request.header(header::COOKIE, cookie.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return IdentityCheck::Unavailable(describe_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            return IdentityCheck::Rejected(status);
        }

        match response.json::<User>().await {
            Ok(user) => IdentityCheck::Authenticated(user),
            Err(e) if e.is_timeout() => IdentityCheck::Unavailable(describe_error(&e)),
            Err(e) => {
                warn!(error = %e, "Identity endpoint returned an unreadable user body");
                IdentityCheck::Rejected(status)
            }
        }
    }
}

fn describe_error(e: &reqwest::Error) -> String {
    let description = if e.is_timeout() {
        format!("identity check timed out: {}", e)
    } else if e.is_connect() {
        format!("failed to connect to identity endpoint: {}", e)
    } else {
        format!("identity check failed: {}", e)
    };
    debug!(error = %description, "Identity check transport error");
    description
}
