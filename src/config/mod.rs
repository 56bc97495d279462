use crate::error::{GatewayError, Result};
use http::HeaderName;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Prefix for environment variable overrides, e.g. `CONSULT_GATEWAY__BACKEND__URL`
pub const ENV_PREFIX: &str = "CONSULT_GATEWAY";

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream backend API
    pub backend: BackendConfig,
    /// Session validation settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Route access lists
    #[serde(default)]
    pub access: AccessConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prometheus metrics settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout for forwarded requests in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `http://localhost:8000`
    pub url: String,
}

impl BackendConfig {
    /// Base URL without a trailing slash, ready for path concatenation
    pub fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Absolute URL for a backend path
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base(), path)
    }
}

/// Session validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identity endpoint path on the backend
    #[serde(default = "default_whoami_path")]
    pub whoami_path: String,
    /// Timeout for the identity check in seconds
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,
    /// Timeout for relaying a magic-link request in seconds
    #[serde(default = "default_magic_link_timeout")]
    pub magic_link_timeout_secs: u64,
    /// User-Agent sent when the client did not supply one
    #[serde(default = "default_user_agent")]
    pub fallback_user_agent: String,
    /// Let requests continue unauthenticated when the identity endpoint is unreachable
    #[serde(default = "default_true")]
    pub fail_open: bool,
    /// Where unauthenticated browser requests are redirected
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,
    /// Paths under this prefix get JSON errors instead of redirects
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Header carrying the authenticated email to the upstream
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

/// Route access lists. Each entry matches the path itself and everything below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Routes reachable without a session
    #[serde(default = "default_public_routes")]
    pub public_routes: Vec<String>,
    /// Routes that additionally require the dashboard access flag
    #[serde(default = "default_dashboard_routes")]
    pub dashboard_routes: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the compact format
    #[serde(default)]
    pub json: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`
    #[serde(default)]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_whoami_path() -> String {
    "/api/user/me/".to_string()
}

fn default_session_timeout() -> u64 {
    5
}

fn default_magic_link_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    concat!("consult-gateway/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_sign_in_path() -> String {
    "/sign-in/".to_string()
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_user_header() -> String {
    "x-authenticated-email".to_string()
}

fn default_public_routes() -> Vec<String> {
    [
        "/",
        "/health",
        "/sign-in",
        "/magic-link",
        "/api/magic-link",
        "/how-it-works",
        "/data-sharing",
        "/get-involved",
        "/privacy",
        "/_app",
        "/static",
        "/assets",
        "/favicon.ico",
        "/robots.txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dashboard_routes() -> Vec<String> {
    vec!["/consultations".to_string(), "/api/consultations".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            whoami_path: default_whoami_path(),
            timeout_secs: default_session_timeout(),
            magic_link_timeout_secs: default_magic_link_timeout(),
            fallback_user_agent: default_user_agent(),
            fail_open: default_true(),
            sign_in_path: default_sign_in_path(),
            api_prefix: default_api_prefix(),
            user_header: default_user_header(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            public_routes: default_public_routes(),
            dashboard_routes: default_dashboard_routes(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file, with environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()), ENV_PREFIX)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None, ENV_PREFIX)
    }

    /// Layer an optional YAML file under environment variables with the given prefix
    pub fn load(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(GatewayError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder
                .add_source(::config::File::from(path).format(::config::FileFormat::Yaml));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| GatewayError::Config(format!("Failed to load config: {}", e)))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.is_empty() {
            return Err(GatewayError::Config(
                "Backend URL cannot be empty".to_string(),
            ));
        }

        let backend = Url::parse(&self.backend.url).map_err(|e| {
            GatewayError::Config(format!("Invalid backend URL '{}': {}", self.backend.url, e))
        })?;
        if backend.scheme() != "http" && backend.scheme() != "https" {
            return Err(GatewayError::Config(format!(
                "Backend URL must start with http:// or https://: {}",
                self.backend.url
            )));
        }

        if self.session.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "Session timeout must be > 0".to_string(),
            ));
        }

        if self.session.magic_link_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "Magic link timeout must be > 0".to_string(),
            ));
        }

        for (name, path) in [
            ("whoami_path", &self.session.whoami_path),
            ("sign_in_path", &self.session.sign_in_path),
            ("api_prefix", &self.session.api_prefix),
        ] {
            if !path.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "session.{} must start with '/': {}",
                    name, path
                )));
            }
        }

        HeaderName::from_bytes(self.session.user_header.as_bytes()).map_err(|_| {
            GatewayError::Config(format!(
                "Invalid user header name: {}",
                self.session.user_header
            ))
        })?;

        for route in self
            .access
            .public_routes
            .iter()
            .chain(self.access.dashboard_routes.iter())
        {
            if !route.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "Access route must start with '/': {}",
                    route
                )));
            }
        }

        // The sign-in page itself has to be reachable or every redirect loops
        let public = crate::routes::RouteTable::from_config(&self.access);
        if !public.is_public(&self.session.sign_in_path) {
            return Err(GatewayError::Config(format!(
                "Sign-in path {} must be listed in access.public_routes",
                self.session.sign_in_path
            )));
        }

        Ok(())
    }

    /// Create a configuration pointing at the given backend, everything else defaulted
    pub fn with_backend(url: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig { url: url.into() },
            session: SessionConfig::default(),
            access: AccessConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
