//! Prometheus metrics for model usage, latency and user feedback.

use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry, CounterVec, Encoder,
    GaugeVec, Registry, TextEncoder,
};

use hatbot_core::{split_provider_model, Error, Result};

/// `model_id` label value for a `"Provider: model"` label: the model part.
/// Labels without a separator are used as they are.
pub fn model_id(label: &str) -> &str {
    split_provider_model(label).map_or(label, |(_, model)| model)
}

/// Counters and gauges exposed on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    pub feedback_stars: CounterVec,
    pub model_usage: CounterVec,
    pub request_duration: GaugeVec,
    registry: Registry,
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let feedback_stars = register_counter_vec_with_registry!(
            "feedback_stars",
            "Number of feedback stars",
            &["stars", "model_id"],
            registry
        )
        .map_err(metric_error)?;

        let model_usage = register_counter_vec_with_registry!(
            "model_usage",
            "Number of times a model was used",
            &["model_id"],
            registry
        )
        .map_err(metric_error)?;

        let request_duration = register_gauge_vec_with_registry!(
            "request_duration_seconds",
            "Request duration in seconds",
            &["model_id"],
            registry
        )
        .map_err(metric_error)?;

        Ok(Self {
            feedback_stars,
            model_usage,
            request_duration,
            registry,
        })
    }

    /// Make every star series for `model_id` visible before any rating arrives.
    pub fn initialize_feedback(&self, model_id: &str) {
        for stars in 1..=5u8 {
            self.feedback_stars
                .with_label_values(&[stars.to_string().as_str(), model_id])
                .inc_by(0.0);
        }
    }

    pub fn record_usage(&self, model_id: &str) {
        self.model_usage.with_label_values(&[model_id]).inc();
    }

    pub fn record_duration(&self, model_id: &str, seconds: f64) {
        self.request_duration
            .with_label_values(&[model_id])
            .set(seconds);
    }

    pub fn record_feedback(&self, model_id: &str, stars: u8) {
        self.feedback_stars
            .with_label_values(&[stars.to_string().as_str(), model_id])
            .inc();
    }

    /// Metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_series_initialized_at_zero() {
        let metrics = Metrics::new().unwrap();
        metrics.initialize_feedback("gpt-4o");
        let text = metrics.render().unwrap();
        for stars in 1..=5 {
            assert!(text.contains(&format!(
                "feedback_stars{{model_id=\"gpt-4o\",stars=\"{}\"}} 0",
                stars
            )));
        }
    }

    #[test]
    fn test_usage_duration_and_feedback() {
        let metrics = Metrics::new().unwrap();
        metrics.record_usage("m");
        metrics.record_usage("m");
        metrics.record_duration("m", 1.5);
        metrics.record_feedback("m", 4);

        assert_eq!(metrics.model_usage.with_label_values(&["m"]).get(), 2.0);
        assert_eq!(metrics.request_duration.with_label_values(&["m"]).get(), 1.5);
        assert_eq!(metrics.feedback_stars.with_label_values(&["4", "m"]).get(), 1.0);

        let text = metrics.render().unwrap();
        assert!(text.contains("# TYPE model_usage counter"));
        assert!(text.contains("request_duration_seconds{model_id=\"m\"} 1.5"));
    }

    #[test]
    fn test_model_id_is_model_part_of_label() {
        assert_eq!(model_id("OpenAI: gpt-4o"), "gpt-4o");
        assert_eq!(model_id("OpenShift AI (vLLM): granite-3.1-8b"), "granite-3.1-8b");
        assert_eq!(model_id("granite"), "granite");
    }
}
