//! Host resource telemetry
//!
//! A `ResourceSnapshot` is the most recent observation of one host's CPU
//! load and memory. Snapshots are plain values: they are never mutated
//! after sampling and carry the time they were taken so readers can judge
//! staleness.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use sysinfo::System;

/// One observation of a host's resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Seconds since boot
    pub uptime: u64,
    pub cpu_load1: f64,
    pub cpu_load5: f64,
    pub cpu_load15: f64,
    pub mem_total: u64,
    pub mem_available: u64,
    pub mem_used: u64,
    pub mem_free: u64,
    pub mem_used_percent: f64,
    /// Unix milliseconds at sampling time
    #[serde(default)]
    pub sampled_at_ms: u64,
}

impl ResourceSnapshot {
    /// Builds a snapshot from raw memory figures, deriving the used percentage.
    pub fn from_memory(
        uptime: u64,
        load: (f64, f64, f64),
        mem_total: u64,
        mem_available: u64,
        mem_used: u64,
        mem_free: u64,
    ) -> Self {
        let mem_used_percent = if mem_total == 0 {
            0.0
        } else {
            (mem_used as f64 / mem_total as f64 * 100.0).min(100.0)
        };
        Self {
            uptime,
            cpu_load1: load.0,
            cpu_load5: load.1,
            cpu_load15: load.2,
            mem_total,
            mem_available,
            mem_used,
            mem_free,
            mem_used_percent,
            sampled_at_ms: crate::common::utils::timestamp_now_millis(),
        }
    }
}

/// Samples the local host with `sysinfo`.
pub struct ResourceSampler {
    system: Mutex<System>,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Refreshes memory figures and returns a fresh snapshot.
    pub fn sample(&self) -> ResourceSnapshot {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();

        let load = System::load_average();
        ResourceSnapshot::from_memory(
            System::uptime(),
            (load.one, load.five, load.fifteen),
            system.total_memory(),
            system.available_memory(),
            system.used_memory(),
            system.free_memory(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_percent() {
        let snap = ResourceSnapshot::from_memory(10, (0.5, 0.4, 0.3), 1000, 600, 250, 500);
        assert!((snap.mem_used_percent - 25.0).abs() < f64::EPSILON);
        assert_eq!(snap.cpu_load5, 0.4);
    }

    #[test]
    fn test_zero_total_memory() {
        let snap = ResourceSnapshot::from_memory(0, (0.0, 0.0, 0.0), 0, 0, 0, 0);
        assert_eq!(snap.mem_used_percent, 0.0);
    }

    #[test]
    fn test_sample_local_host() {
        let sampler = ResourceSampler::new();
        let snap = sampler.sample();
        assert!(snap.mem_total >= snap.mem_free);
        assert!(snap.mem_used_percent >= 0.0 && snap.mem_used_percent <= 100.0);
        assert!(snap.sampled_at_ms > 0);
    }
}
