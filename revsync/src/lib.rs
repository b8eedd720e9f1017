//! Mobile-side replication and conflict-resolution engine for a
//! CouchDB-style document store.
//!
//! A [`store::RevisionStore`] holds each document's revision DAG; a
//! [`conflict::ConflictEngine`] collapses divergent branches with a
//! user-supplied [`conflict::Resolver`]; a [`replicator::Replicator`]
//! drives a single push or pull session against a [`transport::Transport`]
//! built from a [`config::ReplicatorConfiguration`].
//!
//! ```no_run
//! use revsync::config::{Direction, ReplicatorConfiguration};
//! use revsync::replicator::Replicator;
//! use revsync::store::MemoryStore;
//! use revsync::transport::ScriptedTransportFactory;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let config = ReplicatorConfiguration::builder(Direction::Pull)
//!     .local(store)
//!     .remote("wss://example.com/db")
//!     .build()
//!     .expect("valid configuration");
//! let replicator = Replicator::new(config, Arc::new(ScriptedTransportFactory::new()));
//! replicator.start().expect("replication should start");
//! ```

pub mod config;
pub mod conflict;
pub mod error;
pub mod filter;
pub mod interceptor;
pub mod registry;
pub mod replicator;
pub mod revision;
pub mod store;
pub mod transport;

pub use config::{Direction, ReplicatorConfiguration, ReplicatorConfigurationBuilder};
pub use conflict::{ConflictEngine, HighestGenerationWins, Resolver};
pub use error::{ConfigError, Error, ResolveError, StoreError, TransportError};
pub use registry::Registry;
pub use replicator::{Delegate, Replicator, ReplicatorState};
pub use revision::{AttachmentRef, DocId, Revision, RevId, RevisionView};
pub use store::{MemoryStore, NewRevision, RevisionStore, StoreTransaction};
pub use transport::{ScriptedTransport, ScriptedTransportFactory, Transport, TransportFactory};
