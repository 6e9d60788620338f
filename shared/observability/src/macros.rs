//! Logging macros for outbound calls, retries and toggles.

/// Outbound request to a dependency (index, completion, storefront, assistant).
#[macro_export]
macro_rules! log_external_call {
    ($service:expr, $endpoint:expr) => {
        tracing::debug!(target: "external", service = $service, endpoint = $endpoint, "calling external service");
    };
    ($service:expr, $endpoint:expr, $duration_ms:expr, $status:expr) => {
        tracing::debug!(target: "external", service = $service, endpoint = $endpoint, duration_ms = $duration_ms, status = $status, "external call returned");
    };
}

/// A transient failure about to be retried after `delay_ms`.
#[macro_export]
macro_rules! log_retry {
    ($operation:expr, $retry:expr, $max_retries:expr, $error:expr, $delay_ms:expr) => {
        tracing::warn!(target: "retry", operation = $operation, retry = $retry, max_retries = $max_retries, error = %$error, delay_ms = $delay_ms, "retrying after transient error");
    };
}

/// Startup record of a feature toggle decision.
#[macro_export]
macro_rules! log_feature {
    ($feature:expr, $enabled:expr) => {
        tracing::info!(target: "features", feature = $feature, enabled = $enabled, "feature toggle");
    };
}
