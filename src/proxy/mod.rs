use crate::auth::SessionContext;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::metrics;
use crate::routes::has_dot_segments;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Proxy handler state
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub upstream: Arc<str>,
    pub user_header: HeaderName,
    pub timeout: Duration,
}

impl ProxyState {
    /// Create proxy state forwarding to the configured backend
    pub fn new(client: reqwest::Client, config: &GatewayConfig) -> Result<Self> {
        let user_header = HeaderName::from_bytes(config.session.user_header.as_bytes())
            .map_err(|e| GatewayError::Config(format!("Invalid user header name: {}", e)))?;

        Ok(Self {
            client,
            upstream: Arc::from(config.backend.base()),
            user_header,
            timeout: Duration::from_secs(config.server.timeout_secs),
        })
    }
}

/// Build the shared HTTP client. Redirects are passed back to the browser, never followed.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Forward a request that made it through the access stages to the upstream
pub async fn proxy_handler(
    State(state): State<ProxyState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<Body>,
) -> Result<Response<Body>> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path();

    // The upstream must receive the same path the access stages classified
    if has_dot_segments(path) {
        return Err(GatewayError::BadRequest(
            "Request path must not contain dot segments".to_string(),
        ));
    }

    let timer = metrics::Timer::new(method.to_string(), path.to_string());

    let mut upstream_url = format!("{}{}", state.upstream, path);
    if let Some(query) = uri.query() {
        upstream_url.push('?');
        upstream_url.push_str(query);
    }

    let session = req.extensions().get::<SessionContext>().cloned();
    let mut headers = forwarded_headers(req.headers(), &state.user_header);

    if let Some(email) = session.as_ref().filter(|s| s.is_authenticated).and_then(|s| s.email()) {
        match HeaderValue::from_str(email) {
            Ok(value) => {
                headers.insert(state.user_header.clone(), value);
            }
            Err(_) => warn!(email = %email, "User email is not a valid header value"),
        }
    }

    if let Some(ConnectInfo(addr)) = connect_info {
        append_forwarded_for(&mut headers, addr);
    }

    debug!(upstream_url = %upstream_url, "Forwarding to upstream");

    let body_bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| GatewayError::Proxy(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    let response = send_request(
        &state.client,
        method.clone(),
        headers,
        body_bytes,
        &upstream_url,
        state.timeout,
    )
    .await;

    match &response {
        Ok(resp) => {
            info!(
                method = %method,
                path = %uri.path(),
                status = %resp.status(),
                latency_ms = timer.elapsed() * 1000.0,
                "Request completed"
            );
            timer.record(resp.status().as_u16());
        }
        Err(e) => {
            warn!(
                method = %method,
                path = %uri.path(),
                error = %e,
                latency_ms = timer.elapsed() * 1000.0,
                "Request failed"
            );
            timer.record(e.status_code().as_u16());
        }
    }

    response
}

/// Send request to the upstream service
async fn send_request(
    client: &reqwest::Client,
    method: Method,
    headers: HeaderMap,
    body_bytes: Bytes,
    upstream_url: &str,
    timeout: Duration,
) -> Result<Response<Body>> {
    let upstream_response = client
        .request(method, upstream_url)
        .headers(headers)
        .body(body_bytes)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(format!("Upstream request timed out: {}", e))
            } else if e.is_connect() {
                GatewayError::Backend(format!("Failed to connect to upstream: {}", e))
            } else {
                GatewayError::Proxy(format!("Upstream request failed: {}", e))
            }
        })?;

    let mut response_builder = Response::builder().status(upstream_response.status());

    for (name, value) in upstream_response.headers().iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            response_builder = response_builder.header(name, value);
        }
    }

    let body_bytes = upstream_response
        .bytes()
        .await
        .map_err(|e| GatewayError::Backend(format!("Failed to read upstream response: {}", e)))?;

    response_builder
        .body(Body::from(body_bytes))
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {}", e)))
}

/// Copy request headers for the upstream, dropping hop-by-hop headers, `Host`
/// and any client-supplied copy of the identity header
fn forwarded_headers(original: &HeaderMap, user_header: &HeaderName) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(original.len());

    for (name, value) in original.iter() {
        if is_hop_by_hop_header(name.as_str()) || *name == header::HOST || name == user_header {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(host) = original.get(header::HOST) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }

    headers
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let name = HeaderName::from_static("x-forwarded-for");
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, addr.ip()),
        None => addr.ip().to_string(),
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

/// Check if a header is a hop-by-hop header that should not be forwarded
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop_header("Connection"));
        assert!(is_hop_by_hop_header("keep-alive"));
        assert!(is_hop_by_hop_header("Transfer-Encoding"));
        assert!(!is_hop_by_hop_header("Cookie"));
        assert!(!is_hop_by_hop_header("Content-Type"));
    }

    #[test]
    fn test_forwarded_headers_strip_identity_and_host() {
        let user_header = HeaderName::from_static("x-authenticated-email");
        let mut original = HeaderMap::new();
        original.insert(header::HOST, "consult.example".parse().unwrap());
        original.insert(header::COOKIE, "sessionid=abc".parse().unwrap());
        original.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        original.insert(user_header.clone(), "spoof@evil.com".parse().unwrap());

        let headers = forwarded_headers(&original, &user_header);

        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(&user_header).is_none());
        assert_eq!(headers.get(header::COOKIE).unwrap(), "sessionid=abc");
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "consult.example");
    }

    #[test]
    fn test_append_forwarded_for() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1:5000".parse().unwrap());
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2:5000".parse().unwrap());
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1, 10.0.0.2");
    }

    #[test]
    fn test_proxy_state_creation() {
        let config = GatewayConfig::with_backend("http://localhost:8000/");
        let state = ProxyState::new(build_client().unwrap(), &config).unwrap();
        assert_eq!(&*state.upstream, "http://localhost:8000");
        assert_eq!(state.user_header.as_str(), "x-authenticated-email");
        assert_eq!(state.timeout, Duration::from_secs(30));
    }
}
