// Metrics collection and tracking

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use prompt_core::FlushReport;
use serde::Serialize;

/// Latency samples kept for percentile estimates
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Per-endpoint metrics
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub total_latency_ms: Arc<AtomicU64>,
    pub min_latency_ms: Arc<AtomicU64>,
    pub max_latency_ms: Arc<AtomicU64>,
    pub latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            samples.push_back(latency_ms);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.pop_front();
            }
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        if let Ok(samples) = self.latency_samples.lock() {
            if samples.is_empty() {
                return 0;
            }
            let mut sorted: Vec<u64> = samples.iter().copied().collect();
            sorted.sort_unstable();
            let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
            sorted[index]
        } else {
            0
        }
    }

    pub fn stats(&self) -> EndpointStats {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStats {
    pub successes: u64,
    pub failures: u64,
}

/// Outcome counters for the prompt/image pipeline
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub flushes: Arc<AtomicU64>,
    pub pending: Arc<AtomicU64>,
    pub ignored: Arc<AtomicU64>,
    pub degraded: Arc<AtomicU64>,
    pub upstream_errors: Arc<AtomicU64>,
    pub providers: Arc<Mutex<HashMap<String, ProviderStats>>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            flushes: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(AtomicU64::new(0)),
            ignored: Arc::new(AtomicU64::new(0)),
            degraded: Arc::new(AtomicU64::new(0)),
            upstream_errors: Arc::new(AtomicU64::new(0)),
            providers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn record_flush(&self, report: &FlushReport) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        if report.degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut providers) = self.providers.lock() {
            for failure in &report.provider_failures {
                providers
                    .entry(failure.provider_id.clone())
                    .or_default()
                    .failures += 1;
            }
            if let Some(provider) = &report.provider {
                providers.entry(provider.clone()).or_default().successes += 1;
            }
        }
    }

    pub fn record_pending(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn degraded_rate(&self) -> f64 {
        let flushes = self.flushes.load(Ordering::Relaxed);
        if flushes == 0 {
            return 0.0;
        }
        let degraded = self.degraded.load(Ordering::Relaxed);
        (degraded as f64 / flushes as f64) * 100.0
    }

    pub fn snapshot(&self) -> PipelineMetricsResponse {
        PipelineMetricsResponse {
            flushes: self.flushes.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            degraded_rate: self.degraded_rate(),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            providers: self
                .providers
                .lock()
                .map(|p| p.clone())
                .unwrap_or_default(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Comprehensive metrics structure
#[derive(Debug, Clone)]
pub struct AppMetrics {
    pub fragment: EndpointMetrics,
    pub flush: EndpointMetrics,
    pub chat: EndpointMetrics,
    pub pipeline: PipelineMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self {
            fragment: EndpointMetrics::new(),
            flush: EndpointMetrics::new(),
            chat: EndpointMetrics::new(),
            pipeline: PipelineMetrics::new(),
        }
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct DetailedMetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub pipeline: PipelineMetricsResponse,
    pub conversations: usize,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub fragment: EndpointStats,
    pub flush: EndpointStats,
    pub chat: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PipelineMetricsResponse {
    pub flushes: u64,
    pub pending: u64,
    pub ignored: u64,
    pub degraded: u64,
    pub degraded_rate: f64,
    pub upstream_errors: u64,
    pub providers: HashMap<String, ProviderStats>,
}
