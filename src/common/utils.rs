//! Utility functions for shardcoord

use crate::common::error::ShardError;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Longest accepted collection name, in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Percent-encoding set for names placed in URL path segments
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode a collection name for use as a URL path segment
pub fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, PATH_ENCODE_SET).to_string()
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Worker node health as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Alive,
    /// Last telemetry refresh failed
    Suspect,
    /// Several consecutive refreshes failed
    Dead,
}

impl NodeState {
    /// Can this node receive new shards?
    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeState::Alive)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Alive => write!(f, "alive"),
            NodeState::Suspect => write!(f, "suspect"),
            NodeState::Dead => write!(f, "dead"),
        }
    }
}

/// Retry with exponential backoff.
///
/// Only transport failures are retried; any other error is returned at once.
/// Callers must only pass idempotent operations.
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_attempts: usize,
    initial_delay: Duration,
) -> Result<T, ShardError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ShardError>>,
{
    let mut delay = initial_delay;
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let jitter = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 4);
                let wait = delay + Duration::from_millis(jitter);
                tracing::warn!(
                    node = %e.node(),
                    attempt,
                    "Shard call failed: {}, retrying in {:?}",
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Message carried by a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolves on Ctrl-C; used for graceful server shutdown.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Validate a collection name (non-empty, bounded, path-safe)
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.trim().is_empty() {
        return Err(crate::Error::InvalidName(
            "collection name cannot be empty".into(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(crate::Error::InvalidName(format!(
            "collection name too long (max {} bytes)",
            MAX_NAME_LEN
        )));
    }

    if name.chars().any(|c| c.is_control() || c == '/') {
        return Err(crate::Error::InvalidName(format!(
            "collection name {:?} contains invalid characters",
            name
        )));
    }

    Ok(())
}
