use prometheus::{Encoder, Registry, TextEncoder};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the process-wide tracing subscriber. Every binary calls this
/// once at startup, before anything else logs.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(true);
    let _ = tracing_subscriber::registry()
    .with(filter)
    .with(fmt_layer)
    .try_init();
    tracing::info!(service = service_name, "tracing initialized");
}

/// Renders a Prometheus registry as the `/metrics` response body.
pub fn render_metrics(registry: &Registry) -> Result<String, prometheus::Error> {
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntCounter;

    #[test]
    fn renders_registered_counters() {
        let registry = Registry::new();
        let counter = IntCounter::new("test_total", "a test counter").unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc();
        let text = render_metrics(&registry).unwrap();
        assert!(text.contains("test_total 1"));
    }
}

