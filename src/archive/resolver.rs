//! Turns candidate URLs into a replacement map, one lookup at a time.
//!
//! Each distinct URL ends in one [Outcome]: it is skipped, or attempted up to the
//! retry bound and then resolved or recorded as failed. A failure never stops the
//! batch; all failures come back together as one [AggregateFailure].

use super::client::{Lookup, WAYBACK_HOST};
use super::error::LookupError;
use super::retry::{RetryError, RetryPolicy};
use crate::cancel::CancelToken;
use log::info;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Suffixes that mark script resources, which are never looked up.
const SKIP_SUFFIXES: &[&str] = &[".js"];

/// Which URLs are left alone without asking the archive.
#[derive(Debug, Clone)]
pub struct SkipRules {
    hosts: HashSet<String>,
}

impl Default for SkipRules {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl SkipRules {
    /// The archive's own host is always included; `extra_hosts` adds to it.
    pub fn new<I, S>(extra_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut hosts: HashSet<String> = extra_hosts
            .into_iter()
            .map(|h| h.into().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        hosts.insert(WAYBACK_HOST.to_string());
        Self { hosts }
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Reason to skip `url`, or None if it should be looked up.
    pub fn check(&self, url: &str) -> Option<SkipReason> {
        if SKIP_SUFFIXES.iter().any(|s| url.ends_with(s)) {
            return Some(SkipReason::Script);
        }
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return Some(SkipReason::Unparsable),
        };
        match parsed.host_str() {
            Some(host) if self.hosts.contains(host) => Some(SkipReason::Host),
            Some(_) => None,
            None => Some(SkipReason::Unparsable),
        }
    }
}

/// Why a URL was not looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Ends in `.js`.
    Script,
    /// Host is the archive itself or a configured skip host.
    Host,
    /// Not a well-formed absolute URL.
    Unparsable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Script => "script resource",
            SkipReason::Host => "skipped host",
            SkipReason::Unparsable => "not a valid URL",
        };
        f.write_str(s)
    }
}

/// Where one distinct URL ended up after a resolve pass.
#[derive(Debug)]
pub enum Outcome {
    Resolved(String),
    Skipped(SkipReason),
    Failed(UrlFailure),
}

/// A URL whose every attempt failed.
#[derive(Debug, Error)]
#[error("{url}: {source}")]
pub struct UrlFailure {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: LookupError,
}

/// All per-URL failures of one batch, plus whether the batch was interrupted.
#[derive(Debug, Default)]
pub struct AggregateFailure {
    pub failures: Vec<UrlFailure>,
    pub cancelled: bool,
}

impl AggregateFailure {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// URLs that exhausted their retries, in first-occurrence order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.url.as_str())
    }
}

impl fmt::Display for AggregateFailure {
    /// One line per failed URL, then a line for the interruption if any.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for failure in &self.failures {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}", failure)?;
            first = false;
        }
        if self.cancelled {
            if !first {
                writeln!(f)?;
            }
            write!(f, "interrupted before all URLs were resolved")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Outcome of a resolve pass: whatever resolved, plus the combined failure if any.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Original URL to archived URL. Never holds skipped or failed URLs.
    pub replacements: HashMap<String, String>,
    pub error: Option<AggregateFailure>,
}

impl Resolution {
    /// Split into the map and a `Result` carrying the aggregate failure.
    pub fn into_parts(self) -> (HashMap<String, String>, Result<(), AggregateFailure>) {
        let result = match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        };
        (self.replacements, result)
    }
}

/// Sequential resolver over any [Lookup] implementation.
pub struct Resolver<L> {
    lookup: L,
    skip: SkipRules,
    retry: RetryPolicy,
}

impl<L: Lookup> Resolver<L> {
    pub fn new(lookup: L, skip: SkipRules, retry: RetryPolicy) -> Self {
        Self {
            lookup,
            skip,
            retry,
        }
    }

    /// Resolve each distinct candidate in first-occurrence order.
    ///
    /// On cancellation no further lookups start; what resolved so far is kept and the
    /// returned error is marked cancelled.
    pub fn resolve<S: AsRef<str>>(&self, candidates: &[S], cancel: &CancelToken) -> Resolution {
        let mut replacements = HashMap::with_capacity(candidates.len());
        let mut failed: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        for candidate in candidates {
            let url = candidate.as_ref();
            if replacements.contains_key(url) || failed.contains(url) || skipped.contains(url) {
                continue;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.resolve_one(url, cancel) {
                Outcome::Resolved(archived) => {
                    replacements.insert(url.to_string(), archived);
                }
                Outcome::Skipped(_) => {
                    skipped.insert(url.to_string());
                }
                Outcome::Failed(failure) => {
                    if failure.source.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    failed.insert(url.to_string());
                    failures.push(failure);
                }
            }
        }

        let error = if failures.is_empty() && !cancelled {
            None
        } else {
            Some(AggregateFailure {
                failures,
                cancelled,
            })
        };
        Resolution {
            replacements,
            error,
        }
    }

    /// Skip `url`, or look it up under the retry policy until it resolves or gives up.
    fn resolve_one(&self, url: &str, cancel: &CancelToken) -> Outcome {
        if let Some(reason) = self.skip.check(url) {
            info!("skip {} ({})", url, reason);
            return Outcome::Skipped(reason);
        }
        let attempts = self.retry.attempts();
        let delay = self.retry.delay();
        let result = self.retry.run(
            cancel,
            |n, e: &LookupError| {
                info!("error {}", e);
                if n < attempts {
                    info!("retry {} in {:?}", n, delay);
                }
            },
            |n| {
                info!("lookup {} (attempt {}/{})", url, n, attempts);
                self.lookup.lookup(url, cancel)
            },
        );
        match result {
            Ok(archived) => {
                info!("found {}", archived);
                Outcome::Resolved(archived)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                info!("failed {}", url);
                Outcome::Failed(UrlFailure {
                    url: url.to_string(),
                    attempts,
                    source: last,
                })
            }
            Err(RetryError::Cancelled { attempts }) => Outcome::Failed(UrlFailure {
                url: url.to_string(),
                attempts,
                source: LookupError::Cancelled {
                    url: url.to_string(),
                },
            }),
        }
    }
}
