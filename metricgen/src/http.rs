//! Contains a remote implementation using HTTP to deliver samples to the ingestion endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use thiserror::Error;

use crate::sample::Sample;

/// Reasons a single sample was not accepted by the remote.
///
/// These errors never abort a run; generators count them as failures and carry on.
#[derive(Debug, Error)]
pub enum SendError {
    /// The remote rejected the sample because of rate limiting (`429`).
    #[error("rate limited")]
    RateLimited,

    /// The remote responded with a status other than `202 Accepted`.
    #[error("unexpected status: {0}")]
    Status(StatusCode),

    /// The request did not complete, e.g. connection refused, DNS failure or timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A remote implementation using HTTP to post samples.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    url: String,
}

impl HttpRemote {
    /// Creates a new remote posting to `url`, aborting every request after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The URL samples are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts a single sample as JSON.
    ///
    /// Only `202 Accepted` counts as success.
    pub async fn send(&self, sample: &Sample) -> Result<(), SendError> {
        let response = self.client.post(&self.url).json(sample).send().await?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(()),
            StatusCode::TOO_MANY_REQUESTS => Err(SendError::RateLimited),
            status => Err(SendError::Status(status)),
        }
    }
}
