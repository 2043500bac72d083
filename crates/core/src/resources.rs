//! Threshold evaluation for host resource samples.
//!
//! Pure logic. The caller samples CPU and memory and decides what to do with
//! the breaches (the resource guard triggers an early session sweep).

/// Metric name for host CPU usage.
pub const METRIC_CPU: &str = "cpu_percent";

/// Metric name for host memory usage.
pub const METRIC_MEMORY: &str = "memory_percent";

/// One sample of host resource usage, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Upper bounds above which the guard reacts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceThresholds {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_percent: 80.0,
        }
    }
}

/// A metric that exceeded its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdBreach {
    pub metric_name: &'static str,
    pub value: f32,
    pub threshold: f32,
}

/// Return every metric in `sample` strictly above its threshold.
pub fn evaluate(sample: &ResourceSample, thresholds: &ResourceThresholds) -> Vec<ThresholdBreach> {
    [
        (METRIC_CPU, sample.cpu_percent, thresholds.cpu_percent),
        (METRIC_MEMORY, sample.memory_percent, thresholds.memory_percent),
    ]
    .into_iter()
    .filter(|(_, value, threshold)| value > threshold)
    .map(|(metric_name, value, threshold)| ThresholdBreach {
        metric_name,
        value,
        threshold,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: f32, mem: f32) -> ResourceSample {
        ResourceSample {
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    #[test]
    fn below_thresholds_is_quiet() {
        assert!(evaluate(&sample(10.0, 20.0), &ResourceThresholds::default()).is_empty());
    }

    #[test]
    fn exactly_at_threshold_is_not_a_breach() {
        assert!(evaluate(&sample(80.0, 80.0), &ResourceThresholds::default()).is_empty());
    }

    #[test]
    fn reports_each_breached_metric() {
        let breaches = evaluate(&sample(95.0, 81.5), &ResourceThresholds::default());
        assert_eq!(breaches.len(), 2);
        assert_eq!(breaches[0].metric_name, METRIC_CPU);
        assert_eq!(breaches[1].metric_name, METRIC_MEMORY);
        assert_eq!(breaches[1].value, 81.5);
    }

    #[test]
    fn custom_thresholds() {
        let thresholds = ResourceThresholds {
            cpu_percent: 50.0,
            memory_percent: 99.0,
        };
        let breaches = evaluate(&sample(60.0, 90.0), &thresholds);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric_name, METRIC_CPU);
        assert_eq!(breaches[0].threshold, 50.0);
    }
}
