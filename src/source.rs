//! Where the text to rewrite comes from: stdin, a local file, or a remote URL.

use crate::archive::WaybackClient;
use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Cannot read standard input: {source}")]
    Stdin { source: std::io::Error },

    #[error("Cannot read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot fetch {url}: {source}")]
    Remote { url: String, source: reqwest::Error },
}

/// Input selector. `-` or no value means stdin; `http(s)://` means a remote URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Source {
    #[default]
    Stdin,
    File(PathBuf),
    Url(String),
}

impl Source {
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "-" {
            Source::Stdin
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Source::Url(trimmed.to_string())
        } else {
            Source::File(PathBuf::from(s))
        }
    }

    /// Read the whole source as text. Remote sources go through `client`.
    pub fn read(&self, client: &WaybackClient) -> Result<String, SourceError> {
        match self {
            Source::Stdin => {
                let mut body = String::new();
                std::io::stdin()
                    .read_to_string(&mut body)
                    .map_err(|source| SourceError::Stdin { source })?;
                Ok(body)
            }
            Source::File(path) => {
                std::fs::read_to_string(path).map_err(|source| SourceError::File {
                    path: path.clone(),
                    source,
                })
            }
            Source::Url(url) => client
                .fetch_text(url)
                .map_err(|source| SourceError::Remote {
                    url: url.clone(),
                    source,
                }),
        }
    }
}
