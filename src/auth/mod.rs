pub mod identity;
pub mod middleware;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::metrics;
use crate::routes::{self, RouteAccess, RouteTable};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use identity::{IdentityCheck, IdentityClient};

/// User record returned by the backend identity endpoint, kept exactly as sent
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct User(Map<String, Value>);

impl User {
    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    /// Falsy values (`null`, `false`, `0`, `""`, missing) all mean no access
    pub fn has_dashboard_access(&self) -> bool {
        self.0.get("has_dashboard_access").map_or(false, is_truthy)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for User {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Per-request authentication state, stored in the request extensions.
///
/// Only protected requests carry one; public requests never do.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub is_authenticated: bool,
    pub user: Option<User>,
}

impl SessionContext {
    pub fn authenticated(user: User) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
        }
    }

    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Whether the attached user carries the dashboard entitlement
    pub fn has_dashboard_access(&self) -> bool {
        self.is_authenticated
            && self
                .user
                .as_ref()
                .map_or(false, User::has_dashboard_access)
    }

    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().and_then(User::email)
    }
}

/// Result of the session validation stage
#[derive(Debug)]
pub enum SessionValidation {
    /// Public route, nothing was checked
    Skipped,
    /// Continue to the next stage with this context
    Continue(SessionContext),
    /// Short-circuit with the unauthenticated response
    Rejected,
    /// The path would be rewritten on the way upstream; refuse it outright
    Malformed,
}

/// How unauthenticated requests are answered
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub fail_open: bool,
    pub sign_in_path: String,
    pub api_prefix: String,
}

/// Session authentication service shared by the middleware stages
pub struct AuthService {
    identity: IdentityClient,
    routes: RouteTable,
    policy: AuthPolicy,
}

impl AuthService {
    /// Create the service from configuration, sharing the given HTTP client
    pub fn new(client: reqwest::Client, config: &GatewayConfig) -> Result<Self> {
        let identity = IdentityClient::new(client, config)?;

        Ok(Self {
            identity,
            routes: RouteTable::from_config(&config.access),
            policy: AuthPolicy {
                fail_open: config.session.fail_open,
                sign_in_path: config.session.sign_in_path.clone(),
                api_prefix: config.session.api_prefix.clone(),
            },
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Check the request's session against the identity endpoint
    pub async fn validate_session(&self, path: &str, headers: &HeaderMap) -> SessionValidation {
        if routes::has_dot_segments(path) {
            warn!(path = %path, "Refusing path with dot segments");
            metrics::record_access_denied("malformed_path");
            return SessionValidation::Malformed;
        }

        if self.routes.is_public(path) {
            debug!(path = %path, "Public route, skipping session validation");
            return SessionValidation::Skipped;
        }

        match self.identity.check(headers).await {
            IdentityCheck::Authenticated(user) => {
                debug!(email = user.email().unwrap_or_default(), "Session validated");
                metrics::record_session_check("authenticated");
                SessionValidation::Continue(SessionContext::authenticated(user))
            }
            IdentityCheck::Rejected(status) => {
                debug!(status = %status, path = %path, "Session rejected by identity endpoint");
                metrics::record_session_check("rejected");
                SessionValidation::Rejected
            }
            IdentityCheck::Unavailable(error) => {
                metrics::record_session_check("unavailable");
                if self.policy.fail_open {
                    warn!(
                        error = %error,
                        path = %path,
                        "Identity endpoint unavailable, continuing unauthenticated"
                    );
                    SessionValidation::Continue(SessionContext::unauthenticated())
                } else {
                    warn!(
                        error = %error,
                        path = %path,
                        "Identity endpoint unavailable, rejecting request"
                    );
                    SessionValidation::Rejected
                }
            }
        }
    }

    /// Enforce an access level against the session attached by `validate_session`
    pub fn authorize(
        &self,
        access: RouteAccess,
        context: Option<&SessionContext>,
        path: &str,
    ) -> std::result::Result<(), Response> {
        if access == RouteAccess::Public {
            return Ok(());
        }

        let context = match context {
            Some(ctx) if ctx.is_authenticated => ctx,
            _ => {
                metrics::record_access_denied("unauthenticated");
                return Err(self.handle_unauthenticated(path));
            }
        };

        if access == RouteAccess::Dashboard && !context.has_dashboard_access() {
            info!(
                email = context.email().unwrap_or_default(),
                path = %path,
                "Dashboard access denied"
            );
            metrics::record_access_denied("dashboard");
            return Err(GatewayError::DashboardAccessRequired.into_response());
        }

        Ok(())
    }

    /// Answer an unauthenticated request: JSON 401 for API paths, sign-in redirect otherwise
    pub fn handle_unauthenticated(&self, path: &str) -> Response {
        if path.starts_with(&self.policy.api_prefix) {
            GatewayError::AuthenticationRequired.into_response()
        } else {
            (
                StatusCode::FOUND,
                [(header::LOCATION, self.policy.sign_in_path.clone())],
            )
                .into_response()
        }
    }
}
