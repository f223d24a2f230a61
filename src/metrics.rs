use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Request metrics
    pub static ref CLASSIFY_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("classify_requests_total", "Total classification requests by outcome"),
        &["outcome"]
    ).unwrap();

    // Latency metrics (in seconds)
    pub static ref INFERENCE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "inference_duration_seconds",
            "Model inference latency in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).unwrap();

    pub static ref POOL_WAIT: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "engine_pool_wait_seconds",
            "Time spent waiting for a free engine slot in seconds"
        )
        .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
    ).unwrap();

    // Pool metrics
    pub static ref POOL_SLOTS_IN_USE: IntGauge = IntGauge::new(
        "engine_pool_slots_in_use",
        "Current number of engine slots running a prediction"
    ).unwrap();

    // Staging metrics
    pub static ref STAGED_ARTIFACTS_LEAKED: IntCounter = IntCounter::new(
        "staged_artifacts_leaked_total",
        "Total number of staged images that could not be removed"
    ).unwrap();
}

static INIT: Once = Once::new();

/// Initialize metrics registry. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY.register(Box::new(CLASSIFY_REQUESTS.clone())).unwrap();
        REGISTRY.register(Box::new(INFERENCE_LATENCY.clone())).unwrap();
        REGISTRY.register(Box::new(POOL_WAIT.clone())).unwrap();
        REGISTRY.register(Box::new(POOL_SLOTS_IN_USE.clone())).unwrap();
        REGISTRY.register(Box::new(STAGED_ARTIFACTS_LEAKED.clone())).unwrap();

        tracing::info!("Metrics registry initialized with {} collectors", REGISTRY.gather().len());
    });
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    pub fn observe_duration_seconds(&self, histogram: &Histogram) {
        let duration = self.start.elapsed();
        histogram.observe(duration.as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
