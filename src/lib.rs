//! webarchive: swap live URLs in text for their Wayback Machine snapshots.

pub mod archive;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod source;
pub mod urls;

// Re-exports for CLI and consumers.
pub use archive::{
    AggregateFailure, Lookup, LookupError, Resolution, Resolver, RetryPolicy, SkipRules,
    WaybackClient, WaybackClientBuilder,
};
pub use cancel::CancelToken;
pub use urls::{extract_urls, substitute_urls};
