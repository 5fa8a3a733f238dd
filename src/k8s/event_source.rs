//! Pod lifecycle event sources
//!
//! An event source turns some upstream feed into a stream of [`PodEvent`]s.
//! Payloads are decoded into [`PodRecord`]s here, at the boundary; anything
//! that does not decode becomes [`PodEvent::Malformed`] so the consumer can
//! skip it without special casing.

use crate::k8s::client::K8sClient;
use crate::k8s::types::{NamespaceScope, PodRecord};
use crate::{PodtagError, Result};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, AbortHandle, BoxStream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A decoded pod lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum PodEvent {
    Added(PodRecord),
    Deleted(PodRecord),
    /// Payload that could not be decoded as a pod
    Malformed(String),
}

impl PodEvent {
    pub fn added(pod: &Pod) -> Self {
        match PodRecord::try_from(pod) {
            Ok(record) => PodEvent::Added(record),
            Err(e) => PodEvent::Malformed(e.to_string()),
        }
    }

    pub fn deleted(pod: &Pod) -> Self {
        match PodRecord::try_from(pod) {
            Ok(record) => PodEvent::Deleted(record),
            Err(e) => PodEvent::Malformed(e.to_string()),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            PodEvent::Added(_) => "added",
            PodEvent::Deleted(_) => "deleted",
            PodEvent::Malformed(_) => "malformed",
        }
    }
}

pub type EventStream = BoxStream<'static, PodEvent>;

#[async_trait]
pub trait EventSource: Send {
    /// Open the event stream. Failure here is fatal for the caller.
    async fn subscribe(&mut self, scope: &NamespaceScope) -> Result<EventStream>;

    /// Release the upstream subscription. Safe to call more than once.
    async fn stop(&mut self);
}

/// Event source backed by a Kubernetes pod watch
pub struct KubeEventSource {
    client: K8sClient,
    abort: Option<AbortHandle>,
}

impl KubeEventSource {
    pub fn new(client: K8sClient) -> Self {
        Self {
            client,
            abort: None,
        }
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn subscribe(&mut self, scope: &NamespaceScope) -> Result<EventStream> {
        let pods = self.client.pods_in(scope);

        // The watcher is lazy and retries on its own, so probe access up front.
        pods.list(&ListParams::default().limit(1))
            .await
            .map_err(|e| PodtagError::SubscriptionFailed {
                scope: scope.to_string(),
                reason: e.to_string(),
            })?;

        info!(%scope, "Subscribed to pod events");

        let label = scope.to_string();
        let events = watcher::watcher(pods, watcher::Config::default())
            .default_backoff()
            .filter_map(move |result| future::ready(decode_watch_event(&label, result)));

        let (events, handle) = stream::abortable(events);
        self.abort = Some(handle);

        Ok(events.boxed())
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.abort.take() {
            handle.abort();
            debug!("Pod watch stopped");
        }
    }
}

fn decode_watch_event(
    scope: &str,
    result: std::result::Result<Event<Pod>, watcher::Error>,
) -> Option<PodEvent> {
    match result {
        Ok(Event::Apply(pod)) | Ok(Event::InitApply(pod)) => Some(PodEvent::added(&pod)),
        Ok(Event::Delete(pod)) => Some(PodEvent::deleted(&pod)),
        Ok(Event::Init) => {
            debug!(scope, "Pod watch (re)listing");
            None
        }
        Ok(Event::InitDone) => {
            info!(scope, "Pod watch initial sync complete");
            None
        }
        Err(e) => {
            warn!(scope, error = %e, "Pod watch error, backing off");
            None
        }
    }
}

/// In-process event source fed through a channel
///
/// Used to drive reconcilers from something other than a cluster, and in tests.
pub struct ChannelEventSource {
    rx: Option<mpsc::Receiver<PodEvent>>,
    stopped: Arc<AtomicBool>,
}

impl ChannelEventSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<PodEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        let source = Self {
            rx: Some(rx),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        (tx, source)
    }

    /// Flag that flips to `true` once [`EventSource::stop`] has been called
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn subscribe(&mut self, scope: &NamespaceScope) -> Result<EventStream> {
        let rx = self.rx.take().ok_or_else(|| PodtagError::SubscriptionFailed {
            scope: scope.to_string(),
            reason: "channel already subscribed".to_string(),
        })?;

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }

    async fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_apply_and_delete() {
        let added = decode_watch_event("test", Ok(Event::Apply(pod("default", "nginx"))));
        assert_eq!(added, Some(PodEvent::Added(PodRecord::new("default", "nginx"))));

        let initial = decode_watch_event("test", Ok(Event::InitApply(pod("default", "redis"))));
        assert_eq!(initial, Some(PodEvent::Added(PodRecord::new("default", "redis"))));

        let deleted = decode_watch_event("test", Ok(Event::Delete(pod("default", "nginx"))));
        assert_eq!(deleted, Some(PodEvent::Deleted(PodRecord::new("default", "nginx"))));
    }

    #[test]
    fn test_decode_skips_bookkeeping_events() {
        assert_eq!(decode_watch_event("test", Ok(Event::Init)), None);
        assert_eq!(decode_watch_event("test", Ok(Event::InitDone)), None);
    }

    #[test]
    fn test_decode_nameless_pod_is_malformed() {
        let event = decode_watch_event("test", Ok(Event::Apply(Pod::default())));
        assert!(matches!(event, Some(PodEvent::Malformed(_))));
    }

    #[tokio::test]
    async fn test_channel_source_subscribes_once() {
        let (_tx, mut source) = ChannelEventSource::new(1);

        assert!(source.subscribe(&NamespaceScope::All).await.is_ok());
        let err = source.subscribe(&NamespaceScope::All).await.err().unwrap();
        assert!(matches!(err, PodtagError::SubscriptionFailed { .. }));
    }
}
