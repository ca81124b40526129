//! Boundary API of the coordinator
//!
//! Translates requests into lifecycle calls and folds every result into the
//! `{status, error?}` envelope. `status=true` with no `error` is the only
//! unambiguous success; `status=true` with an `error` is a warning (a
//! degraded release, a Get whose live refresh failed).

use crate::common::telemetry::{ResourceSampler, ResourceSnapshot};
use crate::common::{Error, Result};
use crate::coordinator::lifecycle::{CollectionView, LifecycleCoordinator};
use crate::coordinator::model::{
    CollectionDefinition, CollectionRecord, CollectionStatus, OperationError,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Telemetry of the coordinator's own host
pub type SystemInfo = ResourceSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionName {
    pub collection_name: String,
    #[serde(default)]
    pub with_size: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetCollections {
    #[serde(default)]
    pub with_size: bool,
}

/// Bare envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: true,
            error: None,
        }
    }

    pub fn failed(e: &Error) -> Self {
        Self {
            status: false,
            error: Some(OperationError::from(e)),
        }
    }
}

pub type DeleteCollectionResponse = Response;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionDefinition>,
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionDefinition>,
    #[serde(default)]
    pub collection_size: u32,
    #[serde(default)]
    pub collection_memory: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_status: Option<CollectionStatus>,
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl CollectionDetail {
    fn from_record(record: CollectionRecord, warning: Option<OperationError>) -> Self {
        Self {
            collection_size: saturating_size(record.size),
            collection_memory: record.memory,
            collection_status: Some(record.status),
            collection: Some(record.definition),
            status: true,
            error: warning,
        }
    }

    fn failed(e: &Error) -> Self {
        Self {
            collection: None,
            collection_size: 0,
            collection_memory: 0,
            collection_status: None,
            status: false,
            error: Some(OperationError::from(e)),
        }
    }
}

/// One entry of a GetAllCollections listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionList {
    pub collection: CollectionDefinition,
    pub collection_size: u32,
    pub collection_memory: u64,
    pub collection_status: CollectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl From<CollectionView> for CollectionList {
    fn from(view: CollectionView) -> Self {
        Self {
            collection_size: saturating_size(view.record.size),
            collection_memory: view.record.memory,
            collection_status: view.record.status,
            collection: view.record.definition,
            error: view.refresh_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionLists {
    pub collections: Vec<CollectionList>,
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

fn saturating_size(size: u64) -> u32 {
    u32::try_from(size).unwrap_or(u32::MAX)
}

pub struct CoordinatorService {
    lifecycle: Arc<LifecycleCoordinator>,
    sampler: ResourceSampler,
}

impl CoordinatorService {
    pub fn new(lifecycle: Arc<LifecycleCoordinator>) -> Self {
        Self {
            lifecycle,
            sampler: ResourceSampler::new(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleCoordinator> {
        &self.lifecycle
    }

    /// Runs a mutating operation on its own task. If the caller goes away
    /// the task still finishes and records its result; a panic inside it
    /// becomes an internal error.
    async fn detached<T, F, Fut>(&self, operation: &'static str, task: F) -> Result<T>
    where
        F: FnOnce(Arc<LifecycleCoordinator>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(task(self.lifecycle.clone())).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(operation, "Operation task aborted: {}", e);
                Err(Error::Internal(format!("{} aborted: {}", operation, e)))
            }
        }
    }

    pub fn ping(&self) -> Response {
        Response::ok()
    }

    pub async fn create_collection(&self, definition: CollectionDefinition) -> CollectionResponse {
        let result = self
            .detached("create", move |lifecycle| async move {
                lifecycle.create(definition).await
            })
            .await;
        match result {
            Ok(record) => CollectionResponse {
                collection: Some(record.definition),
                status: true,
                error: None,
            },
            Err(e) => CollectionResponse {
                collection: None,
                status: false,
                error: Some(OperationError::from(&e)),
            },
        }
    }

    pub async fn delete_collection(&self, name: String) -> DeleteCollectionResponse {
        let result = self
            .detached("delete", move |lifecycle| async move {
                lifecycle.delete(&name).await
            })
            .await;
        match result {
            Ok(()) => Response::ok(),
            Err(e) => Response::failed(&e),
        }
    }

    pub async fn get_collection(&self, request: CollectionName) -> CollectionDetail {
        match self
            .lifecycle
            .get(&request.collection_name, request.with_size)
            .await
        {
            Ok(view) => CollectionDetail::from_record(view.record, view.refresh_error),
            Err(e) => CollectionDetail::failed(&e),
        }
    }

    pub async fn get_all_collections(&self, request: GetCollections) -> CollectionLists {
        let collections = self
            .lifecycle
            .get_all(request.with_size)
            .await
            .into_iter()
            .map(CollectionList::from)
            .collect();
        CollectionLists {
            collections,
            status: true,
            error: None,
        }
    }

    pub async fn load_collection(&self, name: String) -> CollectionDetail {
        let result = self
            .detached("load", move |lifecycle| async move {
                lifecycle.load(&name).await
            })
            .await;
        match result {
            Ok(record) => CollectionDetail::from_record(record, None),
            Err(e) => CollectionDetail::failed(&e),
        }
    }

    pub async fn release_collection(&self, name: String) -> Response {
        let result = self
            .detached("release", move |lifecycle| async move {
                lifecycle.release(&name).await
            })
            .await;
        match result {
            Ok(report) => Response {
                status: true,
                error: report.warning().map(|w| OperationError::from(&w)),
            },
            Err(e) => Response::failed(&e),
        }
    }

    pub fn load_resource_info(&self) -> SystemInfo {
        self.sampler.sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorCode;

    #[test]
    fn test_envelope_omits_absent_error() {
        let json = serde_json::to_value(Response::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": true }));
    }

    #[test]
    fn test_failed_envelope() {
        let response = Response::failed(&Error::NotFound("docs".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], false);
        assert_eq!(json["error"]["error_code"], "INTERNAL_FUNC_ERROR");
        assert_eq!(
            response.error.map(|e| e.code),
            Some(ErrorCode::InternalFuncError)
        );
    }

    #[test]
    fn test_size_saturates() {
        assert_eq!(saturating_size(7), 7);
        assert_eq!(saturating_size(u64::MAX), u32::MAX);
    }

    #[test]
    fn test_collection_name_defaults() {
        let request: CollectionName =
            serde_json::from_str(r#"{"collection_name":"docs"}"#).unwrap();
        assert!(!request.with_size);
    }
}
