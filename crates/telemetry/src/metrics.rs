// Metric definitions are static; a bad definition is a programming error
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Recognition Metrics ====
    pub static ref RECOGNITION_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_requests_total",
                "Total number of detection requests by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_PLATES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_plates_total",
                "Plate readings accepted or rejected by the confidence threshold",
            ),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "recognition_inference_seconds",
                "Time spent per pipeline stage",
            )
            .buckets(vec![0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0]),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Registry Metrics ====
    pub static ref REGISTRY_REGISTRATIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "registry_registrations_total",
                "Total number of registration attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
