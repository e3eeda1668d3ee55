//! Wayback Machine lookups: CDX client, retry policy and the batch resolver.

mod client;
mod error;
mod resolver;
mod retry;

pub use client::{
    snapshot_url, Lookup, WaybackClient, WaybackClientBuilder, DEFAULT_TIMEOUT_SECS, WAYBACK_HOST,
};
pub use error::LookupError;
pub use resolver::{
    AggregateFailure, Outcome, Resolution, Resolver, SkipReason, SkipRules, UrlFailure,
};
pub use retry::{RetryError, RetryPolicy, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY};
