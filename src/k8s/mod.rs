pub mod client;
pub mod event_source;
pub mod types;

pub use client::K8sClient;
pub use event_source::{ChannelEventSource, EventSource, KubeEventSource, PodEvent};
pub use types::{IdentityScheme, NamespaceScope, PodIdentity, PodRecord};
