use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Document store metrics
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref ASSESSMENTS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "assessments_created_total",
        "Total number of assessments created"
    )
    .unwrap();

    pub static ref ASSESSMENTS_FINISHED_TOTAL: IntCounter = register_int_counter!(
        "assessments_finished_total",
        "Total number of finish-assessment calls that succeeded"
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_submitted_total",
        "Total number of answers submitted",
        &["kind"]
    )
    .unwrap();

    pub static ref GRADES_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "grades_submitted_total",
        "Total number of audio grades written",
        &["grade"]
    )
    .unwrap();

    pub static ref SIGNED_URL_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "signed_url_failures_total",
        "Audio references that could not be turned into signed URLs"
    )
    .unwrap();

    pub static ref AUDIO_UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "audio_uploads_total",
        "Total number of audio uploads",
        &["status"]
    )
    .unwrap();

    pub static ref ADMIN_USER_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admin_user_actions_total",
        "User management actions performed by administrators",
        &["action", "status"]
    )
    .unwrap();

    pub static ref LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Login attempts",
        &["status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_admin_action(action: &str, succeeded: bool) {
    let status = if succeeded { "success" } else { "error" };
    ADMIN_USER_ACTIONS_TOTAL
        .with_label_values(&[action, status])
        .inc();
}
