// Prometheus metrics for the Arena API

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref DRAFTS_SAVED: IntCounter = IntCounter::new(
        "arena_drafts_saved_total",
        "Total number of drafts saved"
    )
    .expect("metric can be created");

    // outcome: finalized | idempotent | rejected | timeout | error
    pub static ref SUBMISSIONS: CounterVec = CounterVec::new(
        Opts::new("arena_submissions_total", "Total submit calls by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref SUBMIT_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "arena_submit_latency_ms",
            "Submit latency in milliseconds"
        )
        .buckets(vec![10.0, 100.0, 500.0, 1000.0, 5000.0, 15000.0, 30000.0, 60000.0, 120000.0]),
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref FINAL_SCORES: Histogram = Histogram::with_opts(
        HistogramOpts::new("arena_final_score", "Final team scores")
            .buckets(vec![0.0, 5.0, 10.0, 20.0, 30.0, 50.0, 75.0, 100.0, 150.0, 200.0])
    )
    .expect("metric can be created");
}

/// Initialize metrics registry. Safe to call more than once.
pub fn init_metrics() {
    // AlreadyReg on repeat calls is expected
    let _ = REGISTRY.register(Box::new(DRAFTS_SAVED.clone()));
    let _ = REGISTRY.register(Box::new(SUBMISSIONS.clone()));
    let _ = REGISTRY.register(Box::new(SUBMIT_LATENCY.clone()));
    let _ = REGISTRY.register(Box::new(FINAL_SCORES.clone()));
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_draft_saved() {
    DRAFTS_SAVED.inc();
}

pub fn record_submit(outcome: &str, latency_ms: f64) {
    SUBMISSIONS.with_label_values(&[outcome]).inc();
    SUBMIT_LATENCY.with_label_values(&[outcome]).observe(latency_ms);
}

pub fn record_final_score(score: u32) {
    FINAL_SCORES.observe(score as f64);
}
