use crate::config::AccessConfig;

/// Access level required for a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Reachable without a session, never validated
    Public,
    /// Requires an authenticated session
    Protected,
    /// Requires an authenticated session with dashboard access
    Dashboard,
}

/// Static route classification built from the access lists
#[derive(Debug, Clone)]
pub struct RouteTable {
    public: Vec<String>,
    dashboard: Vec<String>,
}

impl RouteTable {
    /// Create a route table from access configuration
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            public: config.public_routes.clone(),
            dashboard: config.dashboard_routes.clone(),
        }
    }

    /// Classify a request path
    pub fn classify(&self, path: &str) -> RouteAccess {
        if has_dot_segments(path) {
            // Never public, the upstream would see a different path
            RouteAccess::Protected
        } else if self.is_public(path) {
            RouteAccess::Public
        } else if self.dashboard.iter().any(|entry| matches_entry(entry, path)) {
            RouteAccess::Dashboard
        } else {
            RouteAccess::Protected
        }
    }

    /// Check whether a path bypasses session validation
    pub fn is_public(&self, path: &str) -> bool {
        !has_dot_segments(path) && self.public.iter().any(|entry| matches_entry(entry, path))
    }
}

/// Whether an HTTP client would rewrite `path` before sending it: `.` or `..`
/// segments (plain or percent-encoded) and backslashes, which URL parsers treat as `/`.
pub fn has_dot_segments(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    if lowered.contains('\\') || lowered.contains("%5c") {
        return true;
    }

    lowered.split('/').any(|segment| {
        let segment = segment.replace("%2e", ".");
        segment == "." || segment == ".."
    })
}

/// A path matches an entry when it equals it or sits below it.
/// `/` only ever matches itself.
fn matches_entry(entry: &str, path: &str) -> bool {
    if path == entry {
        return true;
    }
    if entry == "/" {
        return false;
    }

    let base = entry.trim_end_matches('/');
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
