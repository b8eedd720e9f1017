//! Filter Bridge: adapts a user-supplied push filter, which speaks
//! in terms of a high-level revision view, into the low-level shape a
//! `Transport` actually invokes per candidate revision.

use crate::revision::{DocId, RevId};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Parameters passed alongside a filter invocation (remote filter params
/// for pull, pass-through params for push).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterParams(pub Map<String, Value>);

/// The revision shape a `Transport` hands to its low-level filter callback.
#[derive(Debug, Clone)]
pub struct LowLevelRevision {
    pub doc_id: DocId,
    pub rev_id: RevId,
    pub body: Map<String, Value>,
    pub deleted: bool,
    pub sequence: u64,
}

/// The revision shape a user's push filter actually sees. Attachments are
/// intentionally omitted — filtering decisions are made on document
/// identity and body, not on blob metadata.
#[derive(Debug, Clone)]
pub struct FilterRevisionView {
    pub doc_id: DocId,
    pub rev_id: RevId,
    pub body: Map<String, Value>,
    pub deleted: bool,
    pub sequence: u64,
}

impl From<&LowLevelRevision> for FilterRevisionView {
    fn from(low: &LowLevelRevision) -> Self {
        FilterRevisionView {
            doc_id: low.doc_id.clone(),
            rev_id: low.rev_id.clone(),
            body: low.body.clone(),
            deleted: low.deleted,
            sequence: low.sequence,
        }
    }
}

macro_rules! define_trait_alias {
    ($alias:ident, $($tt:tt)+) => {
        pub trait $alias: $($tt)+ {}
        impl<T> $alias for T where T: $($tt)+ {}
    };
}

define_trait_alias!(UserFilter, Fn(&FilterRevisionView, &FilterParams) -> bool + Send + Sync + 'static);
define_trait_alias!(TransportFilter, Fn(&LowLevelRevision, &FilterParams) -> bool + Send + Sync + 'static);

/// Wrap a user filter so a `Transport` can call it with its own low-level
/// revision shape. The user filter is captured by value at wrap time: later
/// mutation of the configuration it came from has no effect on an in-flight
/// replication.
pub fn bridge_filter(user_filter: Arc<dyn UserFilter>) -> Arc<dyn TransportFilter> {
    Arc::new(move |low: &LowLevelRevision, params: &FilterParams| {
        let view = FilterRevisionView::from(low);
        user_filter(&view, params)
    })
}
