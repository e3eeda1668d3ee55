//! Errors from looking up one URL in the Wayback Machine index.

use thiserror::Error;

/// Failure of a single CDX lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The archive answered 404: it has no snapshot for this URL.
    #[error("could not find {url:?} in WayBack machine")]
    NotFound { url: String },

    /// The CDX response was not a header row plus a matching data row with a `timestamp` column.
    #[error("bad response from WayBack machine: {rows:?}")]
    MalformedResponse { rows: Vec<Vec<String>> },

    /// Transport problem, non-404 error status, or undecodable body.
    #[error("problem connecting to WayBack machine: {source}")]
    Connectivity {
        #[source]
        source: reqwest::Error,
    },

    /// The request was abandoned because the run was interrupted.
    #[error("lookup of {url:?} cancelled")]
    Cancelled { url: String },
}

impl LookupError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LookupError::Cancelled { .. })
    }
}
