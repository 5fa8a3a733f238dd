pub mod collector;
pub mod exporter;

pub use collector::Metrics;
pub use exporter::PrometheusExporter;
