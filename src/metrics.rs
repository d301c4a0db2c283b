//! Prometheus metrics for the HTTP API.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, HttpBody},
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::models::LogLevel;

struct Inner {
    registry: Registry,
    requests_total: IntCounterVec,
    request_latency: HistogramVec,
    response_size: HistogramVec,
    api_errors: IntCounterVec,
    active_requests: IntGauge,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    anomalies_detected: IntCounter,
    model_train_time: Histogram,
    log_count: IntGaugeVec,
}

/// Handle to the service's metric registry. Cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("adea_requests_total", "Total request count"),
            &["method", "endpoint", "status"],
        )?;
        let request_latency = HistogramVec::new(
            HistogramOpts::new("adea_request_latency_seconds", "Request latency"),
            &["endpoint"],
        )?;
        let response_size = HistogramVec::new(
            HistogramOpts::new("adea_response_size_bytes", "Response size in bytes")
                .buckets(exponential_buckets(64.0, 4.0, 8)?),
            &["endpoint"],
        )?;
        let api_errors = IntCounterVec::new(
            Opts::new("adea_api_errors_total", "API error count"),
            &["endpoint", "error_type"],
        )?;
        let active_requests = IntGauge::new("adea_active_requests", "Number of active requests")?;
        let cache_hits = IntCounter::new("adea_cache_hits_total", "Number of cache hits")?;
        let cache_misses = IntCounter::new("adea_cache_misses_total", "Number of cache misses")?;
        let anomalies_detected = IntCounter::new(
            "adea_anomalies_detected_total",
            "Number of anomalies detected",
        )?;
        let model_train_time = Histogram::with_opts(HistogramOpts::new(
            "adea_model_train_time_seconds",
            "Time spent training the model",
        ))?;
        let log_count = IntGaugeVec::new(
            Opts::new("adea_log_count", "Number of logs in database"),
            &["level"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;
        registry.register(Box::new(response_size.clone()))?;
        registry.register(Box::new(api_errors.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(anomalies_detected.clone()))?;
        registry.register(Box::new(model_train_time.clone()))?;
        registry.register(Box::new(log_count.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                requests_total,
                request_latency,
                response_size,
                api_errors,
                active_requests,
                cache_hits,
                cache_misses,
                anomalies_detected,
                model_train_time,
                log_count,
            }),
        })
    }

    pub fn record_error(&self, endpoint: &str, error_type: &str) {
        self.inner
            .api_errors
            .with_label_values(&[endpoint, error_type])
            .inc();
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.inc();
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.inc();
    }

    pub fn record_anomalies(&self, count: usize) {
        self.inner.anomalies_detected.inc_by(count as u64);
    }

    pub fn record_train_time(&self, seconds: f64) {
        self.inner.model_train_time.observe(seconds);
    }

    pub fn set_log_count(&self, level: LogLevel, count: u64) {
        self.inner
            .log_count
            .with_label_values(&[level.as_str()])
            .set(count as i64);
    }

    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.get()
    }

    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_misses.get()
    }

    pub fn error_count(&self, endpoint: &str, error_type: &str) -> u64 {
        self.inner
            .api_errors
            .with_label_values(&[endpoint, error_type])
            .get()
    }

    fn observe_response(&self, method: &str, endpoint: &str, status: u16, elapsed: f64, size: u64) {
        self.inner
            .requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.inner
            .request_latency
            .with_label_values(&[endpoint])
            .observe(elapsed);
        self.inner
            .response_size
            .with_label_values(&[endpoint])
            .observe(size as f64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Per-request accounting: active gauge, latency, status and response size.
pub async fn track_requests(
    State(metrics): State<Metrics>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    metrics.inner.active_requests.inc();
    let response = next.run(request).await;
    metrics.inner.active_requests.dec();

    let size = response.body().size_hint().exact().unwrap_or(0);
    metrics.observe_response(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
        size,
    );

    response
}
