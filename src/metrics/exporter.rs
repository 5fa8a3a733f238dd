use crate::metrics::collector::Metrics;
use crate::Result;
use prometheus::{Encoder, TextEncoder};

pub struct PrometheusExporter {
    metrics: Metrics,
}

impl PrometheusExporter {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let families = self.metrics.registry().gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| crate::PodtagError::MetricsError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_pod_event("added");
        metrics.record_span("enriched");

        let text = PrometheusExporter::new(metrics).render().unwrap();

        assert!(text.contains("# TYPE podtag_pod_events_total counter"));
        assert!(text.contains("podtag_pod_events_total{kind=\"added\"} 1"));
        assert!(text.contains("podtag_spans_total{outcome=\"enriched\"} 1"));
        assert!(text.contains("podtag_indexed_pods 0"));
    }
}
