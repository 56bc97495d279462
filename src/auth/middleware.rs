use super::{AuthService, SessionContext, SessionValidation};
use crate::error::GatewayError;
use crate::routes::RouteAccess;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Validate the session of every non-public request and attach a [`SessionContext`]
pub async fn validate_session(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match auth.validate_session(&path, request.headers()).await {
        SessionValidation::Skipped => next.run(request).await,
        SessionValidation::Continue(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        SessionValidation::Rejected => auth.handle_unauthenticated(&path),
        SessionValidation::Malformed => {
            GatewayError::BadRequest("Request path must not contain dot segments".to_string())
                .into_response()
        }
    }
}

/// Require an authenticated session. Runs after [`validate_session`].
pub async fn require_auth(
    State(auth): State<Arc<AuthService>>,
    request: Request,
    next: Next,
) -> Response {
    gate(&auth, RouteAccess::Protected, request, next).await
}

/// Require an authenticated session with dashboard access. Runs after [`validate_session`].
pub async fn require_dashboard_access(
    State(auth): State<Arc<AuthService>>,
    request: Request,
    next: Next,
) -> Response {
    gate(&auth, RouteAccess::Dashboard, request, next).await
}

/// Apply whichever of the stages above the route table asks for
pub async fn enforce_access(
    State(auth): State<Arc<AuthService>>,
    request: Request,
    next: Next,
) -> Response {
    let access = auth.routes().classify(request.uri().path());
    gate(&auth, access, request, next).await
}

async fn gate(auth: &AuthService, access: RouteAccess, request: Request, next: Next) -> Response {
    let context = request.extensions().get::<SessionContext>();
    let decision = auth.authorize(access, context, request.uri().path());

    match decision {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
