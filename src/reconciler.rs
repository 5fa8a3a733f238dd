//! Applies pod lifecycle events to the shared pod index
//!
//! One reconciler runs per event source. Several reconcilers may write into
//! the same [`PodIndex`] concurrently.

use crate::index::PodIndex;
use crate::k8s::event_source::{EventSource, EventStream, PodEvent};
use crate::k8s::types::{IdentityScheme, NamespaceScope, PodRecord};
use crate::metrics::Metrics;
use crate::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a single event did to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Replaced,
    /// Name-only indexing: a pod from another namespace was displaced
    Collision { displaced_namespace: String },
    Removed,
    /// Delete for an identity that was not indexed
    Absent,
    /// Malformed event, ignored
    Skipped,
}

pub struct Reconciler<S> {
    source: S,
    events: EventStream,
    scope: NamespaceScope,
    index: PodIndex,
    scheme: IdentityScheme,
    metrics: Metrics,
}

impl<S: EventSource> Reconciler<S> {
    /// Subscribe to `source` for `scope`. Errors here should abort startup.
    pub async fn subscribe(
        mut source: S,
        scope: NamespaceScope,
        index: PodIndex,
        scheme: IdentityScheme,
        metrics: Metrics,
    ) -> Result<Self> {
        let events = source.subscribe(&scope).await?;

        Ok(Self {
            source,
            events,
            scope,
            index,
            scheme,
            metrics,
        })
    }

    /// Consume events until cancelled or the stream ends, then stop the source.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(scope = %self.scope, scheme = %self.scheme, "Reconciler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(scope = %self.scope, "Reconciler shutdown requested");
                    break;
                }
                next = self.events.next() => match next {
                    Some(event) => {
                        self.apply(event);
                    }
                    None => {
                        warn!(scope = %self.scope, "Pod event stream ended");
                        break;
                    }
                }
            }
        }

        self.source.stop().await;
        info!(scope = %self.scope, tracked = self.index.len(), "Reconciler stopped");
    }

    /// Apply a single event to the index
    pub fn apply(&self, event: PodEvent) -> ApplyOutcome {
        let kind = event.kind();
        let outcome = match event {
            PodEvent::Added(record) => self.handle_added(record),
            PodEvent::Deleted(record) => self.handle_deleted(&record),
            PodEvent::Malformed(reason) => {
                warn!(scope = %self.scope, %reason, "Skipping malformed pod event");
                ApplyOutcome::Skipped
            }
        };

        match &outcome {
            ApplyOutcome::Inserted => self.metrics.pod_indexed(),
            ApplyOutcome::Removed => self.metrics.pod_removed(),
            _ => {}
        }
        self.metrics.record_pod_event(kind);
        outcome
    }

    fn handle_added(&self, record: PodRecord) -> ApplyOutcome {
        let identity = self.scheme.identity_of(&record);
        let namespace = record.namespace.clone();

        let displaced = self.index.set(identity.clone(), record);
        debug!(%namespace, pod = %identity, "Added pod to index");

        match displaced {
            Some(previous)
                if self.scheme == IdentityScheme::NameOnly && previous.namespace != namespace =>
            {
                warn!(
                    pod = %identity,
                    displaced_namespace = %previous.namespace,
                    %namespace,
                    "Pod name collision across namespaces, keeping the latest"
                );
                self.metrics.record_collision();
                ApplyOutcome::Collision {
                    displaced_namespace: previous.namespace.clone(),
                }
            }
            Some(_) => ApplyOutcome::Replaced,
            None => ApplyOutcome::Inserted,
        }
    }

    fn handle_deleted(&self, record: &PodRecord) -> ApplyOutcome {
        let identity = self.scheme.identity_of(record);

        match self.index.delete(&identity) {
            Some(_) => {
                debug!(namespace = %record.namespace, pod = %identity, "Deleted pod from index");
                ApplyOutcome::Removed
            }
            None => ApplyOutcome::Absent,
        }
    }
}
