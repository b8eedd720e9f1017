//! HTTP interceptor chain: ordered request mutators, plus the one
//! concrete interceptor credential-based configuration needs — a
//! cookie-session interceptor appended automatically when a username and
//! password are supplied.

use log::trace;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A minimal outgoing-request shape an interceptor can mutate. The real
/// transport decides how this maps onto an actual HTTP request; this core
/// only needs somewhere to record header mutations.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub headers: BTreeMap<String, String>,
}

pub trait Interceptor: Send + Sync {
    fn apply(&self, req: &mut Request);
}

/// Obtains and attaches a session cookie derived from basic credentials.
/// A real implementation would perform a `POST /_session`-style exchange;
/// this one derives a stable pseudo-session token so behavior is
/// deterministic without a network round trip.
pub struct CookieSessionInterceptor {
    username: String,
    password: String,
    session: Mutex<Option<String>>,
}

impl CookieSessionInterceptor {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        CookieSessionInterceptor {
            username: username.into(),
            password: password.into(),
            session: Mutex::new(None),
        }
    }

    fn session_token(&self) -> String {
        let mut cached = self.session.lock().expect("session mutex poisoned");
        if let Some(token) = cached.as_ref() {
            return token.clone();
        }
        let token = format!("{}:{}", self.username, self.password.len());
        trace!("minted session token for user {}", self.username);
        *cached = Some(token.clone());
        token
    }
}

impl Interceptor for CookieSessionInterceptor {
    fn apply(&self, req: &mut Request) {
        req.headers
            .insert("Cookie".to_string(), format!("SyncGatewaySession={}", self.session_token()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_interceptor_attaches_session_cookie() {
        let interceptor = CookieSessionInterceptor::new("alice", "hunter2");
        let mut req = Request::default();
        interceptor.apply(&mut req);
        assert!(req.headers.get("Cookie").unwrap().starts_with("SyncGatewaySession="));
    }

    #[test]
    fn session_token_is_stable_across_calls() {
        let interceptor = CookieSessionInterceptor::new("alice", "hunter2");
        let mut req1 = Request::default();
        let mut req2 = Request::default();
        interceptor.apply(&mut req1);
        interceptor.apply(&mut req2);
        assert_eq!(req1.headers["Cookie"], req2.headers["Cookie"]);
    }
}
