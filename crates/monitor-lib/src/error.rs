//! Error taxonomy for the collection pipeline
//!
//! The split mirrors how failures are handled: spec-source and
//! persistence errors abort a cycle, usage-source errors degrade it,
//! and retention-sweep errors are logged without touching committed data.
//! All of them are caught at the collector boundary; nothing escapes to
//! the scheduler.

use std::time::Duration;

use thiserror::Error;

use crate::quantity::QuantityError;

/// Control-plane failures. Fatal for the cycle: no rows are written and
/// the next scheduled tick retries from scratch.
#[derive(Debug, Error)]
pub enum SpecSourceError {
    #[error("Kubernetes client setup failed: {0}")]
    Client(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("pod list timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid resource quantity on container {container:?}: {source}")]
    Quantity {
        container: String,
        #[source]
        source: QuantityError,
    },
}

/// Metrics-backend failures. Degraded, never fatal: the affected metric
/// falls back to an empty map and the cycle stores zero-usage rows.
#[derive(Debug, Error)]
pub enum UsageSourceError {
    #[error("invalid metrics backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("metrics backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metrics backend query failed: {0}")]
    Query(String),

    #[error("unexpected metrics backend response: {0}")]
    Decode(String),
}

/// Store write failures. Fatal for the cycle with all-or-nothing
/// semantics: a rejected batch leaves no rows behind.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cycle at timestamp {timestamp} already exists")]
    DuplicateCycle { timestamp: i64 },

    #[error("cycle timestamp {timestamp} is older than latest stored {latest}")]
    NonMonotonicCycle { timestamp: i64, latest: i64 },
}

/// What went wrong with a collection cycle, as reported by the collector
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("spec source: {0}")]
    SpecSource(#[from] SpecSourceError),

    #[error("persistence: {0}")]
    Persistence(#[from] StoreError),
}
