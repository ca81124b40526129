//! Collection lifecycle state machine
//!
//! ```text
//!            create ok              load ok
//! Creating ────────────► Created ──────────► Loaded
//!    │                    ▲   ▲  (Loading)     │
//!    │ shard error        │   └────────────────┘ release (Releasing)
//!    ▼                    │
//! Failed ──── load (provisioned only) ──► Loaded
//!    │
//!    └── delete ──► (removed)       Created | Loaded ── delete ──► (removed)
//! ```
//!
//! Every state-changing operation holds the per-name operation lock from
//! the registry for its whole duration, so `Creating`, `Loading`,
//! `Releasing` and `Deleting` are only ever observed by readers. Shard
//! calls inside one operation are dispatched concurrently and aggregated
//! into a [`DispatchOutcome`] once all of them have finished or timed out.

use crate::common::config::RetryConfig;
use crate::common::error::ShardError;
use crate::common::utils::{
    panic_message, retry_with_backoff, timestamp_now_millis, validate_name,
};
use crate::common::{Error, Result};
use crate::coordinator::model::{
    CollectionDefinition, CollectionRecord, CollectionStatus, OperationError, ShardPlacement,
    ShardStatus,
};
use crate::coordinator::nodes::NodeDirectory;
use crate::coordinator::placement::PlacementPolicy;
use crate::coordinator::registry::CollectionRegistry;
use crate::coordinator::shard_client::{call_with_timeout, ShardClient};
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Aggregated result of one operation dispatched to several shards
#[derive(Debug)]
pub enum DispatchOutcome<T> {
    Success(Vec<(String, T)>),
    PartialFailure {
        succeeded: Vec<(String, T)>,
        failed: Vec<(String, ShardError)>,
    },
    Failure(Vec<(String, ShardError)>),
}

impl<T> DispatchOutcome<T> {
    /// Folds per-node results, keeping node order.
    pub fn from_results(results: Vec<(String, std::result::Result<T, ShardError>)>) -> Self {
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (node, result) in results {
            match result {
                Ok(value) => succeeded.push((node, value)),
                Err(e) => failed.push((node, e)),
            }
        }
        match (succeeded.is_empty(), failed.is_empty()) {
            (_, true) => DispatchOutcome::Success(succeeded),
            (true, false) => DispatchOutcome::Failure(failed),
            (false, false) => DispatchOutcome::PartialFailure { succeeded, failed },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }

    pub fn succeeded(&self) -> &[(String, T)] {
        match self {
            DispatchOutcome::Success(ok) => ok,
            DispatchOutcome::PartialFailure { succeeded, .. } => succeeded,
            DispatchOutcome::Failure(_) => &[],
        }
    }

    pub fn failed(&self) -> &[(String, ShardError)] {
        match self {
            DispatchOutcome::Success(_) => &[],
            DispatchOutcome::PartialFailure { failed, .. } => failed,
            DispatchOutcome::Failure(failed) => failed,
        }
    }

    /// Error to surface for this outcome, led by the first failing shard.
    pub fn error(&self, operation: &'static str) -> Option<Error> {
        match self {
            DispatchOutcome::Success(_) => None,
            DispatchOutcome::PartialFailure { succeeded, failed } => {
                failed.first().map(|(_, first)| Error::PartialFailure {
                    operation,
                    failed: failed.len(),
                    total: failed.len() + succeeded.len(),
                    first: first.clone(),
                })
            }
            DispatchOutcome::Failure(failed) => {
                failed.first().map(|(_, first)| Error::Shard(first.clone()))
            }
        }
    }
}

/// Shard failures tolerated by a release
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub warnings: Vec<(String, ShardError)>,
    /// Shards the release was dispatched to
    pub total: usize,
}

impl ReleaseReport {
    pub fn warning(&self) -> Option<Error> {
        let (_, first) = self.warnings.first()?;
        Some(Error::PartialFailure {
            operation: "release",
            failed: self.warnings.len(),
            total: self.total,
            first: first.clone(),
        })
    }
}

/// A record as returned by Get, plus the refresh failure if any
#[derive(Debug, Clone)]
pub struct CollectionView {
    pub record: CollectionRecord,
    pub refresh_error: Option<OperationError>,
}

pub struct LifecycleCoordinator {
    registry: Arc<CollectionRegistry>,
    nodes: Arc<NodeDirectory>,
    placement: PlacementPolicy,
    shard_timeout: Duration,
    retry: RetryConfig,
}

impl LifecycleCoordinator {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        nodes: Arc<NodeDirectory>,
        placement: PlacementPolicy,
        shard_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            registry,
            nodes,
            placement,
            shard_timeout,
            retry,
        }
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn nodes(&self) -> &Arc<NodeDirectory> {
        &self.nodes
    }

    /// Runs `op` against every node concurrently with a per-call timeout.
    /// Idempotent calls are retried on transport failures. A panicking call
    /// counts as an internal error of its shard.
    async fn fan_out<T, F, Fut>(
        &self,
        operation: &'static str,
        nodes: &[String],
        idempotent: bool,
        op: F,
    ) -> Vec<(String, std::result::Result<T, ShardError>)>
    where
        F: Fn(Arc<dyn ShardClient>) -> Fut,
        Fut: Future<Output = std::result::Result<T, ShardError>>,
    {
        let op = &op;
        let calls = nodes.iter().map(|node_id| async move {
            let call = async {
                match self.nodes.client(node_id) {
                    Ok(client) if idempotent => {
                        retry_with_backoff(
                            || call_with_timeout(node_id, self.shard_timeout, op(client.clone())),
                            self.retry.max_attempts,
                            self.retry.initial_backoff(),
                        )
                        .await
                    }
                    Ok(client) => {
                        call_with_timeout(node_id, self.shard_timeout, op(client)).await
                    }
                    Err(e) => Err(ShardError::Unreachable {
                        node: node_id.clone(),
                        reason: e.to_string(),
                    }),
                }
            };
            let result = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(ShardError::Internal {
                    node: node_id.clone(),
                    reason: format!("{} panicked: {}", operation, panic_message(&*payload)),
                }),
            };
            if let Err(e) = &result {
                tracing::warn!(node = %node_id, operation, "Shard call failed: {}", e);
            }
            (node_id.clone(), result)
        });
        join_all(calls).await
    }

    /// Refreshes telemetry when fewer than `needed` of `candidates` have a
    /// fresh snapshot.
    async fn ensure_fresh(&self, candidates: &[String], needed: usize) {
        let ttl = self.placement.config().snapshot_ttl();
        let now = timestamp_now_millis();
        let fresh = self
            .nodes
            .snapshots()
            .iter()
            .filter(|s| candidates.contains(&s.node_id) && s.is_fresh(now, ttl))
            .count();
        if fresh < needed {
            self.nodes.refresh().await;
        }
    }

    fn invalid_state(record: &CollectionRecord, operation: &'static str) -> Error {
        Error::InvalidState {
            name: record.name().to_string(),
            status: record.status.to_string(),
            operation,
        }
    }

    pub async fn create(&self, definition: CollectionDefinition) -> Result<CollectionRecord> {
        validate_name(&definition.name)?;
        definition.validate()?;

        let start = Instant::now();
        let (_, _guard) = self.registry.create(definition.clone())?;
        let name = definition.name.as_str();

        let candidates = self.nodes.node_ids();
        self.ensure_fresh(&candidates, self.placement.replicas()).await;
        let nodes = match self
            .placement
            .select_nodes(&definition, None, &self.nodes.snapshots())
        {
            Ok(nodes) => nodes,
            Err(e) => {
                // The name was never really taken.
                self.registry.remove(name)?;
                tracing::warn!(collection = %name, "Placement failed: {}", e);
                return Err(e);
            }
        };

        self.registry.update(name, |r| {
            r.placements = nodes
                .iter()
                .map(|n| (n.clone(), ShardPlacement::pending()))
                .collect();
        })?;

        let def = &definition;
        let outcome = DispatchOutcome::from_results(
            self.fan_out("create", &nodes, false, |client: Arc<dyn ShardClient>| async move {
                client.create(def).await
            })
            .await,
        );

        if outcome.is_success() {
            let record = self.registry.update(name, |r| {
                for (node, info) in outcome.succeeded() {
                    if let Some(p) = r.placements.get_mut(node) {
                        p.status = ShardStatus::Created;
                        p.size = info.size;
                        p.memory = info.memory;
                        p.last_error = None;
                    }
                }
                r.status = CollectionStatus::Created;
                r.provisioned = true;
                r.last_error = None;
                r.recompute_totals();
            })?;
            tracing::info!(
                collection = %name,
                nodes = ?nodes,
                duration_ms = start.elapsed().as_millis() as u64,
                "Collection created"
            );
            return Ok(record);
        }

        // Undo the shards that did get created.
        let created: Vec<String> = outcome.succeeded().iter().map(|(n, _)| n.clone()).collect();
        let compensation = self
            .fan_out("compensate", &created, false, |client: Arc<dyn ShardClient>| async move {
                client.delete(name).await
            })
            .await;

        let error = outcome
            .error("create")
            .unwrap_or_else(|| Error::Internal("create failed without a shard error".into()));
        let surfaced = match error {
            Error::PartialFailure { first, .. } => Error::Shard(first),
            other => other,
        };

        self.registry.update(name, |r| {
            for (node, e) in outcome.failed() {
                if let Some(p) = r.placements.get_mut(node) {
                    p.status = ShardStatus::Failed;
                    p.last_error = Some(OperationError::from(e));
                }
            }
            for (node, result) in &compensation {
                if let Some(p) = r.placements.get_mut(node) {
                    match result {
                        Ok(()) | Err(ShardError::NotFound { .. }) => {
                            p.status = ShardStatus::Pending;
                        }
                        Err(e) => {
                            // Still allocated; a later delete sweeps it.
                            p.status = ShardStatus::Created;
                            p.last_error = Some(OperationError::from(e));
                        }
                    }
                }
            }
            r.status = CollectionStatus::Failed;
            r.provisioned = false;
            r.last_error = Some(OperationError::from(&surfaced));
            r.recompute_totals();
        })?;

        tracing::error!(
            collection = %name,
            failed = outcome.failed().len(),
            total = nodes.len(),
            "Collection create failed: {}",
            surfaced
        );
        Err(surfaced)
    }

    /// Deleting an absent collection succeeds.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let _guard = match self.registry.lock(name).await {
            Ok(guard) => guard,
            Err(Error::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let start = Instant::now();
        let record = self
            .registry
            .update(name, |r| r.status = CollectionStatus::Deleting)?;
        let nodes = record.node_ids();

        let results = self
            .fan_out("delete", &nodes, false, |client: Arc<dyn ShardClient>| async move {
                client.delete(name).await
            })
            .await
            .into_iter()
            .map(|(node, result)| match result {
                Err(ShardError::NotFound { .. }) => (node, Ok(())),
                other => (node, other),
            })
            .collect();
        let outcome = DispatchOutcome::from_results(results);

        match outcome.error("delete") {
            None => {
                self.registry.remove(name)?;
                tracing::info!(
                    collection = %name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Collection deleted"
                );
                Ok(())
            }
            Some(error) => {
                self.registry.update(name, |r| {
                    for (node, _) in outcome.succeeded() {
                        r.placements.remove(node);
                    }
                    for (node, e) in outcome.failed() {
                        if let Some(p) = r.placements.get_mut(node) {
                            p.status = ShardStatus::Failed;
                            p.last_error = Some(OperationError::from(e));
                        }
                    }
                    r.status = CollectionStatus::Failed;
                    r.provisioned = false;
                    r.last_error = Some(OperationError::from(&error));
                    r.recompute_totals();
                })?;
                tracing::error!(collection = %name, "Collection delete incomplete: {}", error);
                Err(error)
            }
        }
    }

    pub async fn load(&self, name: &str) -> Result<CollectionRecord> {
        let _guard = self.registry.lock(name).await?;
        let record = self.registry.get(name)?;
        match record.status {
            CollectionStatus::Loaded => return Ok(record),
            CollectionStatus::Created => {}
            CollectionStatus::Failed if record.provisioned => {}
            _ => return Err(Self::invalid_state(&record, "load")),
        }

        let start = Instant::now();
        let nodes = record.node_ids();
        self.ensure_fresh(&nodes, nodes.len()).await;
        self.placement.validate_nodes(
            &record.definition,
            Some(record.size),
            &nodes,
            &self.nodes.snapshots(),
        )?;

        self.registry
            .update(name, |r| r.status = CollectionStatus::Loading)?;

        let outcome = DispatchOutcome::from_results(
            self.fan_out("load", &nodes, false, |client: Arc<dyn ShardClient>| async move {
                client.load(name).await
            })
            .await,
        );
        let error = outcome.error("load");

        let record = self.registry.update(name, |r| {
            for (node, info) in outcome.succeeded() {
                if let Some(p) = r.placements.get_mut(node) {
                    p.status = if info.loaded {
                        ShardStatus::Loaded
                    } else {
                        ShardStatus::Created
                    };
                    p.size = info.size;
                    p.memory = info.memory;
                    p.last_error = None;
                }
            }
            for (node, e) in outcome.failed() {
                if let Some(p) = r.placements.get_mut(node) {
                    p.status = ShardStatus::Failed;
                    p.last_error = Some(OperationError::from(e));
                }
            }
            let all_loaded = r
                .placements
                .values()
                .all(|p| p.status == ShardStatus::Loaded);
            if error.is_none() && all_loaded {
                r.status = CollectionStatus::Loaded;
                r.last_error = None;
            } else {
                r.status = CollectionStatus::Failed;
                r.last_error = Some(match &error {
                    Some(e) => OperationError::from(e),
                    None => OperationError::from(&Error::Internal(
                        "shard did not report loaded".into(),
                    )),
                });
            }
            r.recompute_totals();
        })?;

        if record.status == CollectionStatus::Loaded {
            tracing::info!(
                collection = %name,
                size = record.size,
                memory = record.memory,
                duration_ms = start.elapsed().as_millis() as u64,
                "Collection loaded"
            );
            return Ok(record);
        }

        let error = error.unwrap_or_else(|| Error::Internal("shard did not report loaded".into()));
        tracing::error!(collection = %name, "Collection load failed: {}", error);
        Err(error)
    }

    /// Shard failures do not block the transition to `Created`; they come
    /// back as warnings.
    pub async fn release(&self, name: &str) -> Result<ReleaseReport> {
        let _guard = self.registry.lock(name).await?;
        let record = self.registry.get(name)?;
        match record.status {
            CollectionStatus::Created => return Ok(ReleaseReport::default()),
            CollectionStatus::Loaded => {}
            _ => return Err(Self::invalid_state(&record, "release")),
        }

        let nodes = record.node_ids();
        self.registry
            .update(name, |r| r.status = CollectionStatus::Releasing)?;

        let outcome = DispatchOutcome::from_results(
            self.fan_out("release", &nodes, true, |client: Arc<dyn ShardClient>| async move {
                client.release(name).await
            })
            .await,
        );

        self.registry.update(name, |r| {
            for p in r.placements.values_mut() {
                p.status = ShardStatus::Created;
                p.memory = 0;
                p.last_error = None;
            }
            for (node, e) in outcome.failed() {
                if let Some(p) = r.placements.get_mut(node) {
                    p.last_error = Some(OperationError::from(e));
                }
            }
            r.status = CollectionStatus::Created;
            r.last_error = None;
            r.recompute_totals();
        })?;

        let report = ReleaseReport {
            warnings: outcome.failed().to_vec(),
            total: nodes.len(),
        };
        match report.warning() {
            Some(warning) => {
                tracing::warn!(collection = %name, "Collection released with errors: {}", warning)
            }
            None => tracing::info!(collection = %name, "Collection released"),
        }
        Ok(report)
    }

    /// Read-only lookup. With `with_size` the live shards are queried and
    /// the record refreshed; a failed query keeps the last-known figures.
    pub async fn get(&self, name: &str, with_size: bool) -> Result<CollectionView> {
        let mut record = self.registry.get(name)?;
        if !with_size {
            record.size = 0;
            record.memory = 0;
            return Ok(CollectionView {
                record,
                refresh_error: None,
            });
        }

        let nodes: Vec<String> = record
            .placements
            .iter()
            .filter(|(_, p)| matches!(p.status, ShardStatus::Created | ShardStatus::Loaded))
            .map(|(n, _)| n.clone())
            .collect();
        if nodes.is_empty() {
            return Ok(CollectionView {
                record,
                refresh_error: None,
            });
        }

        let outcome = DispatchOutcome::from_results(
            self.fan_out("info", &nodes, true, |client: Arc<dyn ShardClient>| async move {
                client.info(name).await
            })
            .await,
        );
        let refresh_error = outcome.error("info").map(|e| OperationError::from(&e));

        let observed = record.status;
        let record = self.registry.update(name, |r| {
            // A transition finished meanwhile; its figures win.
            if r.status != observed {
                return;
            }
            for (node, info) in outcome.succeeded() {
                if let Some(p) = r.placements.get_mut(node) {
                    p.size = info.size;
                    p.memory = info.memory;
                }
            }
            r.recompute_totals();
        })?;

        Ok(CollectionView {
            record,
            refresh_error,
        })
    }

    /// Every collection in creation order. One collection failing to
    /// refresh never drops it from the listing.
    pub async fn get_all(&self, with_size: bool) -> Vec<CollectionView> {
        let records = self.registry.list(with_size);
        if !with_size {
            return records
                .into_iter()
                .map(|record| CollectionView {
                    record,
                    refresh_error: None,
                })
                .collect();
        }

        let views = join_all(records.into_iter().map(|record| async move {
            let refreshed = self.get(record.name(), true).await;
            match refreshed {
                Ok(view) => Some(view),
                // Deleted while listing
                Err(Error::NotFound(_)) => None,
                Err(e) => Some(CollectionView {
                    refresh_error: Some(OperationError::from(&e)),
                    record,
                }),
            }
        }))
        .await;
        views.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorCode;

    fn unreachable(node: &str) -> ShardError {
        ShardError::Unreachable {
            node: node.to_string(),
            reason: "connection refused".into(),
        }
    }

    #[test]
    fn test_outcome_success() {
        let outcome: DispatchOutcome<u32> =
            DispatchOutcome::from_results(vec![("a".into(), Ok(1)), ("b".into(), Ok(2))]);
        assert!(outcome.is_success());
        assert_eq!(outcome.succeeded().len(), 2);
        assert!(outcome.error("load").is_none());
    }

    #[test]
    fn test_outcome_empty_is_success() {
        let outcome: DispatchOutcome<()> = DispatchOutcome::from_results(vec![]);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_outcome_partial_failure() {
        let outcome: DispatchOutcome<u32> = DispatchOutcome::from_results(vec![
            ("a".into(), Ok(1)),
            ("b".into(), Err(unreachable("b"))),
        ]);
        assert!(matches!(outcome, DispatchOutcome::PartialFailure { .. }));
        match outcome.error("load") {
            Some(Error::PartialFailure {
                failed, total, first, ..
            }) => {
                assert_eq!((failed, total), (1, 2));
                assert_eq!(first.node(), "b");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_outcome_failure_surfaces_first() {
        let outcome: DispatchOutcome<u32> = DispatchOutcome::from_results(vec![
            ("a".into(), Err(unreachable("a"))),
            ("b".into(), Err(unreachable("b"))),
        ]);
        let error = outcome.error("create").unwrap();
        assert!(matches!(&error, Error::Shard(e) if e.node() == "a"));
        assert_eq!(error.code(), ErrorCode::CommunicationShardRpcError);
    }

    #[test]
    fn test_release_report_warning() {
        assert!(ReleaseReport::default().warning().is_none());
        let report = ReleaseReport {
            warnings: vec![("b".into(), unreachable("b"))],
            total: 2,
        };
        assert!(matches!(
            report.warning(),
            Some(Error::PartialFailure { failed: 1, total: 2, .. })
        ));
    }
}
