//! Operator metrics
//!
//! Render passes are labelled by GatewayClass, gateway renders by
//! gateway. The applier counts the objects it writes back.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Operator metrics registry
    pub static ref CONTROLLER_METRICS_REGISTRY: Registry = Registry::new();

    /// Render pass duration per class
    static ref RENDER_PASS_DURATION: HistogramVec = {
        let opts = HistogramOpts::new(
            "turngate_render_pass_duration_seconds",
            "Render pass duration in seconds",
        );
        let histogram = HistogramVec::new(opts, &["gatewayclass"])
            .expect("Failed to create histogram");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// Render passes total
    static ref RENDER_PASSES_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "turngate_render_passes_total",
            "Total number of render passes",
        );
        let counter = IntCounterVec::new(opts, &["gatewayclass", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Gateway renders total
    static ref GATEWAY_RENDERS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "turngate_gateway_renders_total",
            "Total number of gateway renders",
        );
        let counter = IntCounterVec::new(opts, &["gateway", "namespace", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Objects written back to the API server
    static ref APPLIED_OBJECTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "turngate_applied_objects_total",
            "Total number of objects and statuses applied",
        );
        let counter = IntCounterVec::new(opts, &["kind", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record one render pass over a GatewayClass
pub fn record_render_pass(gatewayclass: &str, duration_secs: f64, result: &str) {
    RENDER_PASS_DURATION
        .with_label_values(&[gatewayclass])
        .observe(duration_secs);

    RENDER_PASSES_TOTAL
        .with_label_values(&[gatewayclass, result])
        .inc();
}

/// Record the outcome of rendering one gateway
pub fn record_gateway_render(gateway: &str, namespace: &str, result: &str) {
    GATEWAY_RENDERS_TOTAL
        .with_label_values(&[gateway, namespace, result])
        .inc();
}

/// Record one apply or status patch
pub fn record_apply(kind: &str, result: &str) {
    APPLIED_OBJECTS_TOTAL.with_label_values(&[kind, result]).inc();
}

/// Gather operator metrics in the text exposition format
pub fn gather_controller_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = CONTROLLER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
