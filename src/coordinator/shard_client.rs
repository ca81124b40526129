//! Coordinator-side view of a worker node
//!
//! `ShardClient` is the narrow interface the lifecycle layer dispatches
//! through. `HttpShardClient` reaches a worker over its HTTP/JSON API; the
//! in-process `LocalShard` (see `crate::shard`) implements the same trait.

use crate::common::error::{ErrorCode, ShardError};
use crate::common::telemetry::ResourceSnapshot;
use crate::common::utils::encode_name;
use crate::coordinator::model::{CollectionDefinition, OperationError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a shard reports about one collection replica
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub size: u64,
    pub memory: u64,
    pub loaded: bool,
}

/// Resource report of a worker node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResources {
    pub snapshot: ResourceSnapshot,
    /// Abstract capacity left for the stable_disk tier
    pub disk_available: u64,
}

/// Operations the coordinator can run against one node.
#[async_trait]
pub trait ShardClient: Send + Sync {
    fn node_id(&self) -> &str;

    async fn create(&self, definition: &CollectionDefinition) -> Result<ShardInfo, ShardError>;

    async fn delete(&self, name: &str) -> Result<(), ShardError>;

    async fn load(&self, name: &str) -> Result<ShardInfo, ShardError>;

    async fn release(&self, name: &str) -> Result<(), ShardError>;

    async fn info(&self, name: &str) -> Result<ShardInfo, ShardError>;

    async fn ping(&self) -> Result<(), ShardError>;

    async fn resources(&self) -> Result<NodeResources, ShardError>;
}

/// Bounds one shard call. An elapsed deadline is a shard error, never a
/// pending result.
pub async fn call_with_timeout<T, F>(
    node: &str,
    timeout: Duration,
    call: F,
) -> Result<T, ShardError>
where
    F: std::future::Future<Output = Result<T, ShardError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ShardError::Timeout {
            node: node.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Worker reached over HTTP
pub struct HttpShardClient {
    node_id: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpShardClient {
    pub fn new(
        node_id: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Http(e.to_string()))?;
        Ok(Self {
            node_id: node_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/shard/collections/{}", self.base_url, encode_name(name))
    }

    fn transport_error(&self, e: reqwest::Error) -> ShardError {
        if e.is_timeout() {
            ShardError::Timeout {
                node: self.node_id.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            ShardError::Marshal {
                node: self.node_id.clone(),
                reason: e.to_string(),
            }
        } else {
            ShardError::Unreachable {
                node: self.node_id.clone(),
                reason: e.to_string(),
            }
        }
    }

    /// Sends the request and turns non-success statuses into shard errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        collection: Option<&str>,
    ) -> Result<reqwest::Response, ShardError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            if let Some(collection) = collection {
                return Err(ShardError::NotFound {
                    node: self.node_id.clone(),
                    collection: collection.to_string(),
                });
            }
        }

        let body = response.text().await.unwrap_or_default();
        let reported: Option<OperationError> = serde_json::from_str(&body).ok();
        let reason = reported
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body));

        let internal = status.is_server_error()
            || reported.map(|e| e.code) == Some(ErrorCode::InternalFuncError);
        if internal {
            Err(ShardError::Internal {
                node: self.node_id.clone(),
                reason,
            })
        } else {
            Err(ShardError::Rejected {
                node: self.node_id.clone(),
                reason,
            })
        }
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ShardError> {
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| ShardError::Marshal {
            node: self.node_id.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ShardClient for HttpShardClient {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn create(&self, definition: &CollectionDefinition) -> Result<ShardInfo, ShardError> {
        let url = format!("{}/shard/collections", self.base_url);
        let response = self
            .send(self.client.post(url).json(definition), None)
            .await?;
        self.decode(response).await
    }

    async fn delete(&self, name: &str) -> Result<(), ShardError> {
        self.send(self.client.delete(self.collection_url(name)), Some(name))
            .await?;
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<ShardInfo, ShardError> {
        let url = format!("{}/load", self.collection_url(name));
        let response = self.send(self.client.post(url), Some(name)).await?;
        self.decode(response).await
    }

    async fn release(&self, name: &str) -> Result<(), ShardError> {
        let url = format!("{}/release", self.collection_url(name));
        self.send(self.client.post(url), Some(name)).await?;
        Ok(())
    }

    async fn info(&self, name: &str) -> Result<ShardInfo, ShardError> {
        let response = self
            .send(self.client.get(self.collection_url(name)), Some(name))
            .await?;
        self.decode(response).await
    }

    async fn ping(&self) -> Result<(), ShardError> {
        let url = format!("{}/shard/ping", self.base_url);
        self.send(self.client.get(url), None).await?;
        Ok(())
    }

    async fn resources(&self) -> Result<NodeResources, ShardError> {
        let url = format!("{}/shard/resources", self.base_url);
        let response = self.send(self.client.get(url), None).await?;
        self.decode(response).await
    }
}
