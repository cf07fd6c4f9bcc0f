// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Fetching log resources by relative path.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The resource does not exist (HTTP 404 or missing file). The caller
    /// can distinguish "not sequenced yet" from a hard failure.
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("fetch failed for {path}: {reason}")]
    Failed { path: String, reason: String },
}

/// Narrow capability for reading the log's static tree.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher for a log rooted at an `http://`, `https://` or `file://` URL.
#[derive(Debug, Clone)]
pub enum LogFetcher {
    Http {
        root: Url,
        client: reqwest::Client,
    },
    File {
        root: PathBuf,
    },
}

impl LogFetcher {
    pub fn new(root: &Url) -> Result<Self, FetchError> {
        match root.scheme() {
            "http" | "https" => Ok(Self::Http {
                root: root.clone(),
                client: reqwest::Client::new(),
            }),
            "file" => {
                let path = root
                    .to_file_path()
                    .map_err(|()| FetchError::Failed {
                        path: root.to_string(),
                        reason: "file URL has no local path".to_string(),
                    })?;
                Ok(Self::File { root: path })
            }
            scheme => Err(FetchError::Failed {
                path: root.to_string(),
                reason: format!("unsupported URL scheme {scheme}"),
            }),
        }
    }
}

#[async_trait]
impl Fetcher for LogFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        match self {
            LogFetcher::Http { root, client } => {
                let url = root.join(path).map_err(|err| FetchError::Failed {
                    path: path.to_string(),
                    reason: err.to_string(),
                })?;
                let response = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|err| FetchError::Failed {
                        path: path.to_string(),
                        reason: err.to_string(),
                    })?;
                match response.status() {
                    reqwest::StatusCode::OK => {
                        let body = response.bytes().await.map_err(|err| FetchError::Failed {
                            path: path.to_string(),
                            reason: err.to_string(),
                        })?;
                        Ok(body.to_vec())
                    }
                    reqwest::StatusCode::NOT_FOUND => Err(FetchError::NotFound {
                        path: path.to_string(),
                    }),
                    status => Err(FetchError::Failed {
                        path: path.to_string(),
                        reason: format!("unexpected HTTP status {status}"),
                    }),
                }
            }
            LogFetcher::File { root } => {
                let full = root.join(path);
                match tokio::fs::read(&full).await {
                    Ok(bytes) => Ok(bytes),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        Err(FetchError::NotFound {
                            path: path.to_string(),
                        })
                    }
                    Err(err) => Err(FetchError::Failed {
                        path: path.to_string(),
                        reason: err.to_string(),
                    }),
                }
            }
        }
    }
}
