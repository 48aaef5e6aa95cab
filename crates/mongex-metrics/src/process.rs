use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    collector::Collector,
    types::{Labels, Metric, MetricDesc},
};

/// Process-level gauges, sampled once in `describe` and replayed by `collect`.
pub struct ProcessCollector {
    started_at: Instant,
    boot_time: DateTime<Utc>,
    snapshot: Mutex<Option<Vec<Metric>>>,
}

impl ProcessCollector {
    pub fn new(started_at: Instant, boot_time: DateTime<Utc>) -> Self {
        Self {
            started_at,
            boot_time,
            snapshot: Mutex::new(None),
        }
    }

    fn sample(&self) -> Vec<Metric> {
        let mut metrics = vec![
            Metric::gauge(
                "process_start_time_seconds",
                "Start time of the process since unix epoch in seconds",
                self.boot_time.timestamp() as f64,
                Labels::new(),
            ),
            Metric::gauge(
                "process_uptime_seconds",
                "Process uptime in seconds",
                self.started_at.elapsed().as_secs_f64(),
                Labels::new(),
            ),
        ];

        if let Some(resident_bytes) = read_resident_memory_bytes() {
            metrics.push(Metric::gauge(
                "process_resident_memory_bytes",
                "Resident memory size of the process in bytes",
                resident_bytes as f64,
                Labels::new(),
            ));
        }

        if let Ok(parallelism) = std::thread::available_parallelism() {
            metrics.push(Metric::gauge(
                "process_available_parallelism",
                "Number of worker threads the runtime can schedule on",
                parallelism.get() as f64,
                Labels::new(),
            ));
        }

        metrics
    }
}

#[async_trait]
impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    async fn describe(&self) -> Vec<MetricDesc> {
        let mut snapshot = self.snapshot.lock().await;
        let metrics = self.sample();
        let descs = metrics.iter().map(Metric::desc).collect();
        *snapshot = Some(metrics);
        descs
    }

    async fn collect(&self) -> Vec<Metric> {
        self.snapshot.lock().await.clone().unwrap_or_default()
    }
}

#[cfg(target_os = "linux")]
fn read_resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb = rest
                .split_whitespace()
                .next()
                .and_then(|value| value.parse::<u64>().ok())?;
            return kb.checked_mul(1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_resident_memory_bytes() -> Option<u64> {
    None
}
