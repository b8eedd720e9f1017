use std::fmt;

/// Which side of the system raised an error: preserved as a tagged variant
/// rather than collapsed into a single integer, the same distinction the
/// wrapped transport keeps between its own failures and ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDomain {
    Replicator,
    Transport,
}

/// A `(domain, code)` tagged error as reported by a `Transport` or a
/// `RevisionStore`. Analogous to the raw status struct a lower transport
/// layer would hand back, kept intact rather than flattened so a caller can
/// still branch on `code`.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportError {
    pub domain: ErrorDomain,
    pub code: i32,
    pub message: String,
}

impl TransportError {
    pub fn new(domain: ErrorDomain, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{:?} error {}: {}", self.domain, self.code, self.message)
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "TransportError {{ domain: {:?}, code: {}, message: {:?} }}",
            self.domain, self.code, self.message
        )
    }
}

impl std::error::Error for TransportError {}

/// Error kinds surfaced by a [`crate::Replicator`], either immediately from
/// `start()` or later from `error()` once the replicator is terminal.
pub enum Error {
    /// `start()` was called more than once, or after the replicator left
    /// `Pending`. Never stored as the replicator's terminal error.
    AlreadyStarted,
    /// the transport refused to construct a job.
    TransportInitFailed(TransportError),
    /// configuration is missing a local store or a remote endpoint.
    UndefinedSource,
    /// the transport reported the local datastore vanished mid-run.
    LocalDatastoreDeleted(TransportError),
    /// any other transport-reported failure, passed through verbatim.
    Transport(TransportError),
}

/// couchbase-lite-core reuses the code `10` (`kC4ErrorNotOpen`) under
/// `LiteCoreDomain` to mean "database file was deleted out from under us";
/// we keep the same numeric tag so logs from both layers read consistently.
const LOCAL_DATASTORE_DELETED_CODE: i32 = 10;

impl Error {
    /// Project a transport's terminal error into the replicator's own
    /// taxonomy, re-tagging the one code this layer cares about and passing
    /// everything else through unchanged.
    pub(crate) fn from_transport(err: TransportError) -> Self {
        if err.domain == ErrorDomain::Transport && err.code == LOCAL_DATASTORE_DELETED_CODE {
            Error::LocalDatastoreDeleted(err)
        } else {
            Error::Transport(err)
        }
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::AlreadyStarted => Error::AlreadyStarted,
            Error::TransportInitFailed(e) => Error::TransportInitFailed(e.clone()),
            Error::UndefinedSource => Error::UndefinedSource,
            Error::LocalDatastoreDeleted(e) => Error::LocalDatastoreDeleted(e.clone()),
            Error::Transport(e) => Error::Transport(e.clone()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyStarted => fmt.write_str("replicator already started"),
            Error::TransportInitFailed(err) => write!(fmt, "transport init failed: {}", err),
            Error::UndefinedSource => {
                fmt.write_str("configuration is missing a local store or remote endpoint")
            }
            Error::LocalDatastoreDeleted(err) => {
                write!(fmt, "local datastore deleted: {}", err)
            }
            Error::Transport(err) => write!(fmt, "transport error: {}", err),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyStarted => write!(fmt, "AlreadyStarted"),
            Error::TransportInitFailed(err) => write!(fmt, "TransportInitFailed({:?})", err),
            Error::UndefinedSource => write!(fmt, "UndefinedSource"),
            Error::LocalDatastoreDeleted(err) => write!(fmt, "LocalDatastoreDeleted({:?})", err),
            Error::Transport(err) => write!(fmt, "Transport({:?})", err),
        }
    }
}

impl std::error::Error for Error {}

/// Raised by [`crate::config::ReplicatorConfigurationBuilder::build`] when a
/// header is rejected; a controller is never constructed in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    HeaderValidationFailed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::HeaderValidationFailed(msg) => {
                write!(fmt, "header validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A transactional failure reported by a [`crate::store::RevisionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Raised by [`crate::conflict::ConflictEngine::resolve`] (or the
/// higher-level `resolve_with_configured_resolver` helper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// no resolver was supplied where one was required.
    ResolverNotFound,
    /// the resolver returned a revision absent from the conflict set.
    InvalidResolverOutput,
    /// the underlying transaction failed; surfaced verbatim.
    Store(StoreError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::ResolverNotFound => fmt.write_str("no resolver supplied"),
            ResolveError::InvalidResolverOutput => {
                fmt.write_str("resolver returned a revision outside the conflict set")
            }
            ResolveError::Store(err) => write!(fmt, "{}", err),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        ResolveError::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
