use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts as PromOpts, Registry,
    TextEncoder,
};

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_in_flight_requests: IntGauge,
    recognitions_total: IntCounterVec,
    recognition_duration_seconds: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn build() -> prometheus::Result<Metrics> {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        PromOpts::new(
            "voicebook_http_requests_total",
            "Total HTTP requests served by voicebook-server.",
        ),
        &["route", "status"],
    )?;

    let http_request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "voicebook_http_request_duration_seconds",
            "HTTP request latency in seconds.",
        ),
        &["route", "status"],
    )?;

    let http_in_flight_requests = IntGauge::new(
        "voicebook_http_in_flight_requests",
        "Current number of in-flight HTTP requests.",
    )?;

    let recognitions_total = IntCounterVec::new(
        PromOpts::new(
            "voicebook_recognitions_total",
            "Recognizer runs by outcome.",
        ),
        &["outcome"],
    )?;

    // Recognition of a long take can run for minutes.
    let recognition_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "voicebook_recognition_duration_seconds",
            "Wall time of recognizer runs in seconds.",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["outcome"],
    )?;

    registry.register(Box::new(http_requests_total.clone()))?;
    registry.register(Box::new(http_request_duration_seconds.clone()))?;
    registry.register(Box::new(http_in_flight_requests.clone()))?;
    registry.register(Box::new(recognitions_total.clone()))?;
    registry.register(Box::new(recognition_duration_seconds.clone()))?;

    Ok(Metrics {
        registry,
        http_requests_total,
        http_request_duration_seconds,
        http_in_flight_requests,
        recognitions_total,
        recognition_duration_seconds,
    })
}

/// Build and install the registry. Until this succeeds every recording call is a no-op.
pub fn init() -> prometheus::Result<()> {
    if METRICS.get().is_none() {
        let _ = METRICS.set(build()?);
    }
    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// `outcome` is a short label such as `ok`, `timeout` or `failed`.
pub fn record_recognition(outcome: &str, elapsed: Duration) {
    let Some(m) = metrics() else {
        return;
    };
    m.recognitions_total.with_label_values(&[outcome]).inc();
    m.recognition_duration_seconds
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub async fn prometheus_metrics() -> Response {
    let Some(m) = metrics() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response();
    };

    let families = m.registry.gather();
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&families, &mut buf).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        )],
        buf,
    )
        .into_response()
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let Some(m) = metrics() else {
        return next.run(req).await;
    };

    // Label by route template so ids don't explode the label space.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    if route == "/metrics" || route == "/healthz" {
        return next.run(req).await;
    }

    let start = Instant::now();

    m.http_in_flight_requests.inc();
    let response = next.run(req).await;
    m.http_in_flight_requests.dec();

    let status = response.status().as_u16().to_string();
    m.http_requests_total
        .with_label_values(&[route.as_str(), status.as_str()])
        .inc();
    m.http_request_duration_seconds
        .with_label_values(&[route.as_str(), status.as_str()])
        .observe(start.elapsed().as_secs_f64());

    response
}
