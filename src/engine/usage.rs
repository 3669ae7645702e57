// ABOUTME: Normalized resource usage derived from raw engine counters.
// ABOUTME: CPU percent comes from the delta between the current and previous sample.

use serde::Serialize;

use crate::runtime::StatsSample;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
}

impl ResourceUsage {
    pub fn from_sample(sample: &StatsSample) -> Self {
        let memory_percent = if sample.memory_limit == 0 {
            0.0
        } else {
            sample.memory_usage as f64 / sample.memory_limit as f64 * 100.0
        };

        Self {
            cpu_percent: cpu_percent(sample),
            memory_usage: sample.memory_usage,
            memory_limit: sample.memory_limit,
            memory_percent,
            network_rx_bytes: sample.network_rx_bytes,
            network_tx_bytes: sample.network_tx_bytes,
            block_read_bytes: sample.block_read_bytes,
            block_write_bytes: sample.block_write_bytes,
        }
    }
}

/// `(cpu_delta / system_delta) * online_cpus * 100`, or 0 when the system
/// counter did not advance.
pub fn cpu_percent(sample: &StatsSample) -> f64 {
    let cpu_delta = sample.cpu_total as f64 - sample.precpu_total as f64;
    let system_delta = sample.system_cpu as f64 - sample.presystem_cpu as f64;

    if system_delta <= 0.0 || cpu_delta < 0.0 {
        return 0.0;
    }

    let cpus = f64::from(sample.online_cpus.max(1));
    cpu_delta / system_delta * cpus * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_percent_scales_by_online_cpus() {
        let sample = StatsSample {
            cpu_total: 300,
            precpu_total: 100,
            system_cpu: 2_000,
            presystem_cpu: 1_000,
            online_cpus: 4,
            ..Default::default()
        };
        // 200 / 1000 * 4 * 100
        assert!((cpu_percent(&sample) - 80.0).abs() < 1e-9);
    }

    #[test]
    fn zero_system_delta_is_zero_percent() {
        let sample = StatsSample {
            cpu_total: 500,
            precpu_total: 100,
            system_cpu: 1_000,
            presystem_cpu: 1_000,
            online_cpus: 2,
            ..Default::default()
        };
        assert_eq!(cpu_percent(&sample), 0.0);
    }

    #[test]
    fn memory_percent_guards_missing_limit() {
        let usage = ResourceUsage::from_sample(&StatsSample {
            memory_usage: 256,
            memory_limit: 0,
            ..Default::default()
        });
        assert_eq!(usage.memory_percent, 0.0);

        let usage = ResourceUsage::from_sample(&StatsSample {
            memory_usage: 256,
            memory_limit: 1024,
            ..Default::default()
        });
        assert!((usage.memory_percent - 25.0).abs() < 1e-9);
    }
}
