//! Host resource guard.
//!
//! Samples host CPU and memory usage on a fixed interval. When either
//! crosses its threshold the guard runs an early expiry sweep to release
//! idle sessions' files and channels. It never rejects work.

use std::sync::Arc;
use std::time::Duration;

use sketchflow_core::resources::{evaluate, ResourceSample, ResourceThresholds};
use sysinfo::System;
use tokio_util::sync::CancellationToken;

use crate::background::session_sweeper;
use crate::session::SessionRegistry;

/// Reads host usage through `sysinfo`.
///
/// CPU usage is a delta between refreshes, so the first sample after
/// construction reads low.
pub struct ResourceSampler {
    system: System,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system }
    }

    pub fn sample(&mut self) -> ResourceSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (self.system.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        ResourceSample {
            cpu_percent: self.system.global_cpu_usage(),
            memory_percent,
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the guard loop until `cancel` is triggered.
pub async fn run(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    thresholds: ResourceThresholds,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        cpu_threshold = thresholds.cpu_percent,
        memory_threshold = thresholds.memory_percent,
        "Resource guard started",
    );

    let mut sampler = ResourceSampler::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Resource guard stopping");
                break;
            }
            _ = ticker.tick() => {
                let sample = sampler.sample();
                check(&registry, &sample, &thresholds).await;
            }
        }
    }
}

/// Evaluate one sample and sweep if any threshold is exceeded.
///
/// Returns the number of sessions removed by the early sweep.
pub async fn check(
    registry: &SessionRegistry,
    sample: &ResourceSample,
    thresholds: &ResourceThresholds,
) -> usize {
    let breaches = evaluate(sample, thresholds);
    if breaches.is_empty() {
        tracing::debug!(
            cpu = sample.cpu_percent,
            memory = sample.memory_percent,
            "Resource usage within limits",
        );
        return 0;
    }

    for breach in &breaches {
        tracing::warn!(
            metric = breach.metric_name,
            value = breach.value,
            threshold = breach.threshold,
            "Resource threshold exceeded, sweeping early",
        );
    }
    session_sweeper::sweep_once(registry).await
}
