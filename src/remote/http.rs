// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP client for the remote backend.
//!
//! JSON over HTTP with bearer-token auth. Entities travel in their wire
//! shape (`id`, `content`, `updated_at`); upserts are acknowledged with the
//! authoritative timestamp the backend assigned. Transient transport
//! failures are retried with the configured policy before they surface as
//! [`SyncError::Network`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::entity::{Entity, Query};
use crate::error::SyncError;
use crate::metrics::{LatencyTimer, METRIC_REMOTE_LATENCY};
use crate::resilience::retry::{retry, RetryConfig};

use super::RemoteStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Acknowledgement body of an upsert.
#[derive(Debug, Deserialize)]
struct UpsertAck {
    updated_at: i64,
}

/// JSON-over-HTTP implementation of [`RemoteStore`].
#[derive(Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpRemote {
    /// Build a client for `base_url` (trailing slash tolerated).
    ///
    /// No request is issued here; construction only sets up the connection
    /// pool.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            api_key,
            retry: RetryConfig::query(),
        })
    }

    /// Override the transport retry policy (default: [`RetryConfig::query`]).
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn entities_url(&self, collection: &str) -> String {
        format!("{}/collections/{}/entities", self.base_url, collection)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn ping(&self) -> Result<(), SyncError> {
        // Probes are already scheduled repeatedly; no retry layer here.
        let url = format!("{}/health", self.base_url);
        self.authorize(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_since(
        &self,
        collection: &str,
        checkpoint: i64,
    ) -> Result<Vec<Entity>, SyncError> {
        retry("remote.fetch_since", &self.retry, || async {
            let _timer = LatencyTimer::new(METRIC_REMOTE_LATENCY, collection);
            let request = self
                .client
                .get(self.entities_url(collection))
                .query(&[("since", checkpoint.to_string())]);
            let entities = self
                .authorize(request)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Entity>>()
                .await?;
            Ok(entities)
        })
        .await
    }

    async fn upsert(&self, collection: &str, entity: &Entity) -> Result<i64, SyncError> {
        retry("remote.upsert", &self.retry, || async {
            let _timer = LatencyTimer::new(METRIC_REMOTE_LATENCY, collection);
            let request = self.client.post(self.entities_url(collection)).json(entity);
            let ack: UpsertAck = self
                .authorize(request)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(ack.updated_at)
        })
        .await
    }

    async fn fetch(&self, collection: &str, query: &Query) -> Result<Vec<Entity>, SyncError> {
        let params: Vec<(String, String)> = query
            .filters()
            .iter()
            .map(|(field, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (field.clone(), rendered)
            })
            .collect();

        retry("remote.fetch", &self.retry, || async {
            let _timer = LatencyTimer::new(METRIC_REMOTE_LATENCY, collection);
            let request = self.client.get(self.entities_url(collection)).query(&params);
            let entities = self
                .authorize(request)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Entity>>()
                .await?;
            Ok(entities)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let remote = HttpRemote::new("https://api.example.com/v1/", None).unwrap();
        assert_eq!(
            remote.entities_url("matches"),
            "https://api.example.com/v1/collections/matches/entities"
        );
    }

    #[test]
    fn upsert_ack_parses() {
        let ack: UpsertAck = serde_json::from_str(r#"{"updated_at": 1724400000000}"#).unwrap();
        assert_eq!(ack.updated_at, 1_724_400_000_000);
    }

    #[test]
    fn entity_wire_shape_round_trips() {
        let wire = r#"{"id":"p1","content":{"id":"p1","match_id":"m1","home_score":5},"updated_at":42}"#;
        let entity: Entity = serde_json::from_str(wire).unwrap();
        assert_eq!(entity.id, "p1");
        assert_eq!(entity.updated_at, 42);
        assert!(!entity.dirty);
    }
}
