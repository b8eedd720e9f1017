//! Replicator Configuration: a validated, immutable descriptor
//! consumed by [`crate::replicator::Replicator::new`].

use crate::error::ConfigError;
use crate::filter::{FilterParams, UserFilter};
use crate::interceptor::{CookieSessionInterceptor, Interceptor};
use crate::store::RevisionStore;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Push,
    Pull,
}

#[derive(Clone)]
pub(crate) struct Credentials {
    pub username: String,
    pub password: String,
}

/// Immutable, defensively-copied replication configuration. Built
/// only through [`ReplicatorConfigurationBuilder`], which is where header
/// validation happens.
#[derive(Clone)]
pub struct ReplicatorConfiguration {
    pub(crate) direction: Direction,
    pub(crate) local: Option<Arc<dyn RevisionStore>>,
    pub(crate) remote: String,
    pub(crate) optional_headers: BTreeMap<String, String>,
    pub(crate) filter_name: Option<String>,
    pub(crate) filter_params: FilterParams,
    pub(crate) push_filter: Option<Arc<dyn UserFilter>>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) http_interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ReplicatorConfiguration {
    pub fn builder(direction: Direction) -> ReplicatorConfigurationBuilder {
        ReplicatorConfigurationBuilder::new(direction)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The interceptor chain in the order a request actually travels
    /// through it: user-provided interceptors, then the cookie-session
    /// interceptor if credentials were supplied.
    pub(crate) fn resolved_interceptors(&self) -> Vec<Arc<dyn Interceptor>> {
        let mut chain = self.http_interceptors.clone();
        if let Some(creds) = &self.credentials {
            chain.push(Arc::new(CookieSessionInterceptor::new(
                creds.username.clone(),
                creds.password.clone(),
            )));
        }
        chain
    }
}

/// Name characters a header name is allowed to contain: RFC 7230 `token`.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || "!#$%&'*+-.^_`|~".contains(c)
}

fn validate_header(name: &str, value: &str) -> Result<(), ConfigError> {
    const FORBIDDEN: [&str; 3] = ["host", "content-length", "transfer-encoding"];
    if name.is_empty() || !name.chars().all(is_token_char) {
        return Err(ConfigError::HeaderValidationFailed(format!(
            "invalid header name: {name:?}"
        )));
    }
    if FORBIDDEN.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::HeaderValidationFailed(format!(
            "header {name:?} is set by the transport and cannot be overridden"
        )));
    }
    if value.contains('\r') || value.contains('\n') {
        return Err(ConfigError::HeaderValidationFailed(format!(
            "header {name:?} value contains a control character"
        )));
    }
    Ok(())
}

pub struct ReplicatorConfigurationBuilder {
    direction: Direction,
    local: Option<Arc<dyn RevisionStore>>,
    remote: Option<String>,
    optional_headers: BTreeMap<String, String>,
    filter_name: Option<String>,
    filter_params: FilterParams,
    push_filter: Option<Arc<dyn UserFilter>>,
    credentials: Option<Credentials>,
    http_interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ReplicatorConfigurationBuilder {
    fn new(direction: Direction) -> Self {
        ReplicatorConfigurationBuilder {
            direction,
            local: None,
            remote: None,
            optional_headers: BTreeMap::new(),
            filter_name: None,
            filter_params: FilterParams::default(),
            push_filter: None,
            credentials: None,
            http_interceptors: Vec::new(),
        }
    }

    pub fn local(mut self, store: Arc<dyn RevisionStore>) -> Self {
        self.local = Some(store);
        self
    }

    pub fn remote(mut self, url: impl Into<String>) -> Self {
        self.remote = Some(url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self, ConfigError> {
        let (name, value) = (name.into(), value.into());
        validate_header(&name, &value)?;
        self.optional_headers.insert(name, value);
        Ok(self)
    }

    pub fn filter_name(mut self, name: impl Into<String>) -> Self {
        self.filter_name = Some(name.into());
        self
    }

    pub fn filter_params(mut self, params: FilterParams) -> Self {
        self.filter_params = params;
        self
    }

    pub fn push_filter(mut self, filter: Arc<dyn UserFilter>) -> Self {
        self.push_filter = Some(filter);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.http_interceptors.push(interceptor);
        self
    }

    /// Validate once more (headers may have been poked via lower-level
    /// construction paths in the future) and freeze the configuration.
    /// Missing `local`/`remote` is NOT rejected here — that produces
    /// `UndefinedSource` only once a controller actually tries to start,
    /// not at configuration build time.
    pub fn build(self) -> Result<ReplicatorConfiguration, ConfigError> {
        for (name, value) in &self.optional_headers {
            validate_header(name, value)?;
        }
        if self.push_filter.is_some() && self.direction != Direction::Push {
            return Err(ConfigError::HeaderValidationFailed(
                "push_filter is only valid for a Push replication".to_string(),
            ));
        }
        Ok(ReplicatorConfiguration {
            direction: self.direction,
            local: self.local,
            remote: self.remote.unwrap_or_default(),
            optional_headers: self.optional_headers,
            filter_name: self.filter_name,
            filter_params: self.filter_params,
            push_filter: self.push_filter,
            credentials: self.credentials,
            http_interceptors: self.http_interceptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn rejects_control_characters_in_header_values() {
        let err = ReplicatorConfiguration::builder(Direction::Pull)
            .header("X-Custom", "evil\r\nSet-Cookie: hijacked")
            .unwrap_err();
        assert!(matches!(err, ConfigError::HeaderValidationFailed(_)));
    }

    #[test]
    fn rejects_forbidden_header_names() {
        let err = ReplicatorConfiguration::builder(Direction::Pull)
            .header("Host", "evil.example")
            .unwrap_err();
        assert!(matches!(err, ConfigError::HeaderValidationFailed(_)));
    }

    #[test]
    fn credentials_append_cookie_interceptor_after_user_interceptors() {
        struct Marker;
        impl Interceptor for Marker {
            fn apply(&self, req: &mut crate::interceptor::Request) {
                req.headers.insert("X-Marker".to_string(), "1".to_string());
            }
        }
        let config = ReplicatorConfiguration::builder(Direction::Pull)
            .local(Arc::new(MemoryStore::new()))
            .remote("ws://example.invalid/db")
            .interceptor(Arc::new(Marker))
            .credentials("alice", "hunter2")
            .build()
            .unwrap();

        let chain = config.resolved_interceptors();
        assert_eq!(chain.len(), 2);
        let mut req = crate::interceptor::Request::default();
        for interceptor in &chain {
            interceptor.apply(&mut req);
        }
        assert_eq!(req.headers["X-Marker"], "1");
        assert!(req.headers["Cookie"].starts_with("SyncGatewaySession="));
    }

    #[test]
    fn missing_local_and_remote_is_allowed_at_build_time() {
        let config = ReplicatorConfiguration::builder(Direction::Push)
            .build()
            .unwrap();
        assert!(config.local.is_none());
        assert_eq!(config.remote, "");
    }
}
