//! Shared REST client

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::feed::errors::{FeedError, FeedResult};

/// Thin wrapper over `reqwest::Client`. Every collaborator API goes
/// through [`get_json`](Self::get_json), which retries exactly once on a
/// network-level error (connect failure or timeout) and never on HTTP
/// status errors.
#[derive(Clone, Debug)]
pub struct RestClient {
    http: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> FeedResult<T> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        match self.fetch(&url).await {
            Ok(value) => Ok(value),
            Err(e) if is_network_error(&e) => {
                warn!(%url, error = %e, "network error, retrying once");
                self.fetch(&url).await.map_err(FeedError::from)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, reqwest::Error> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        response.error_for_status()?.json::<T>().await
    }
}

fn is_network_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}
