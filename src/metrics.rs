// metrics.rs - Prometheus counters for the gateway client
use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    pub calls_total: IntCounter,
    pub call_failures: IntCounter,
    pub call_duration_seconds: Histogram,
    pub key_fetches: IntCounter,
    pub key_fetch_failures: IntCounter,
    pub session_retries: IntCounter,
    pub integrity_failures: IntCounter,
    pub business_errors: IntCounter,
    pub credential_resets: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some("veilgate".into()), None)?;

        macro_rules! register_counter {
            ($name:expr, $help:expr) => {{
                let counter = IntCounter::new($name, $help)?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        macro_rules! register_histogram {
            ($name:expr, $help:expr, $buckets:expr) => {{
                let opts = HistogramOpts::new($name, $help).buckets($buckets.to_vec());
                let hist = Histogram::with_opts(opts)?;
                registry.register(Box::new(hist.clone()))?;
                hist
            }};
        }

        let calls_total = register_counter!("calls_total", "Gateway calls issued");
        let call_failures = register_counter!("call_failures", "Gateway calls that returned an error");
        let call_duration_seconds = register_histogram!(
            "call_duration_seconds",
            "End-to-end gateway call latency",
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        );
        let key_fetches = register_counter!("key_fetches", "Session key fetches attempted");
        let key_fetch_failures =
            register_counter!("key_fetch_failures", "Session key fetches that failed");
        let session_retries = register_counter!(
            "session_retries",
            "Calls replayed after a session key expiry"
        );
        let integrity_failures = register_counter!(
            "integrity_failures",
            "Response signature verification failures"
        );
        let business_errors =
            register_counter!("business_errors", "Non-zero business codes returned");
        let credential_resets = register_counter!(
            "credential_resets",
            "Times stored credentials were cleared after a 401"
        );

        Ok(Self {
            registry,
            calls_total,
            call_failures,
            call_duration_seconds,
            key_fetches,
            key_fetch_failures,
            session_retries,
            integrity_failures,
            business_errors,
            credential_resets,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_metrics_registry() {
        let metrics = Metrics::new().expect("metrics");
        metrics.calls_total.inc();
        metrics.session_retries.inc();
        metrics.call_duration_seconds.observe(0.2);
        assert!(!metrics.gather().is_empty());
    }
}
