use crate::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Process-wide counters, registered on a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pod_events: IntCounterVec,
    collisions: IntCounter,
    indexed_pods: IntGauge,
    lookups: IntCounterVec,
    spans: IntCounterVec,
    forward_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pod_events = IntCounterVec::new(
            Opts::new("podtag_pod_events_total", "Pod events applied to the index"),
            &["kind"],
        )?;
        let collisions = IntCounter::new(
            "podtag_identity_collisions_total",
            "Pods that displaced a same-named pod from another namespace",
        )?;
        let indexed_pods = IntGauge::new("podtag_indexed_pods", "Pods currently in the index")?;
        let lookups = IntCounterVec::new(
            Opts::new("podtag_lookups_total", "Index lookups by result"),
            &["result"],
        )?;
        let spans = IntCounterVec::new(
            Opts::new("podtag_spans_total", "Spans processed by enrichment outcome"),
            &["outcome"],
        )?;
        let forward_failures = IntCounter::new(
            "podtag_forward_failures_total",
            "Span batches that could not be forwarded downstream",
        )?;

        registry.register(Box::new(pod_events.clone()))?;
        registry.register(Box::new(collisions.clone()))?;
        registry.register(Box::new(indexed_pods.clone()))?;
        registry.register(Box::new(lookups.clone()))?;
        registry.register(Box::new(spans.clone()))?;
        registry.register(Box::new(forward_failures.clone()))?;

        Ok(Self {
            registry,
            pod_events,
            collisions,
            indexed_pods,
            lookups,
            spans,
            forward_failures,
        })
    }

    pub fn record_pod_event(&self, kind: &str) {
        self.pod_events.with_label_values(&[kind]).inc();
    }

    pub fn record_collision(&self) {
        self.collisions.inc();
    }

    /// A pod entered the index under a new identity
    pub fn pod_indexed(&self) {
        self.indexed_pods.inc();
    }

    /// An indexed pod was removed
    pub fn pod_removed(&self) {
        self.indexed_pods.dec();
    }

    pub fn record_lookup(&self, found: bool) {
        let result = if found { "hit" } else { "miss" };
        self.lookups.with_label_values(&[result]).inc();
    }

    pub fn record_span(&self, outcome: &str) {
        self.spans.with_label_values(&[outcome]).inc();
    }

    pub fn record_forward_failure(&self) {
        self.forward_failures.inc();
    }

    pub fn pod_events(&self, kind: &str) -> u64 {
        self.pod_events.with_label_values(&[kind]).get()
    }

    pub fn collisions(&self) -> u64 {
        self.collisions.get()
    }

    pub fn indexed_pods(&self) -> i64 {
        self.indexed_pods.get()
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.with_label_values(&["hit"]).get()
            + self.lookups.with_label_values(&["miss"]).get()
    }

    pub fn spans(&self, outcome: &str) -> u64 {
        self.spans.with_label_values(&[outcome]).get()
    }

    pub fn forward_failures(&self) -> u64 {
        self.forward_failures.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
