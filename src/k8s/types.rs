use crate::{PodtagError, Result};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Additional pod metadata carried alongside labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodMetadata {
    pub uid: Option<String>,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
    pub phase: Option<String>,
}

/// Snapshot of a pod as delivered by a single event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub metadata: PodMetadata,
}

impl PodRecord {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            metadata: PodMetadata::default(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl TryFrom<&Pod> for PodRecord {
    type Error = PodtagError;

    fn try_from(pod: &Pod) -> Result<Self> {
        let metadata = &pod.metadata;
        let spec = pod.spec.as_ref();
        let status = pod.status.as_ref();

        let name = metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PodtagError::KubernetesError("pod has no name".to_string()))?;
        let namespace = metadata
            .namespace
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                PodtagError::KubernetesError(format!("pod {} has no namespace", name))
            })?;

        Ok(Self {
            namespace,
            name,
            labels: metadata.labels.clone().unwrap_or_default(),
            metadata: PodMetadata {
                uid: metadata.uid.clone(),
                node_name: spec.and_then(|s| s.node_name.clone()),
                pod_ip: status.and_then(|s| s.pod_ip.clone()),
                phase: status.and_then(|s| s.phase.clone()),
            },
        })
    }
}

/// How pods are keyed in the index, chosen once per deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityScheme {
    /// Keyed by (namespace, name)
    #[default]
    Namespaced,
    /// Keyed by name alone; names are assumed unique across namespaces
    NameOnly,
}

impl IdentityScheme {
    pub fn identity_of(&self, record: &PodRecord) -> PodIdentity {
        match self {
            IdentityScheme::Namespaced => PodIdentity::Namespaced {
                namespace: record.namespace.clone(),
                name: record.name.clone(),
            },
            IdentityScheme::NameOnly => PodIdentity::Name(record.name.clone()),
        }
    }

    /// Parse `namespace/name` or `name` depending on the scheme.
    pub fn parse(&self, value: &str) -> Result<PodIdentity> {
        let invalid = || PodtagError::InvalidIdentity {
            value: value.to_string(),
            expected: self.expected_form(),
        };

        let parts: Vec<&str> = value.split('/').collect();
        match (self, parts.as_slice()) {
            (IdentityScheme::Namespaced, [namespace, name])
                if !namespace.is_empty() && !name.is_empty() =>
            {
                Ok(PodIdentity::Namespaced {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            (IdentityScheme::NameOnly, [name]) if !name.is_empty() => {
                Ok(PodIdentity::Name(name.to_string()))
            }
            _ => Err(invalid()),
        }
    }

    pub const fn expected_form(&self) -> &'static str {
        match self {
            IdentityScheme::Namespaced => "namespace/name",
            IdentityScheme::NameOnly => "name",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            IdentityScheme::Namespaced => "namespaced",
            IdentityScheme::NameOnly => "name-only",
        }
    }
}

impl fmt::Display for IdentityScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Index key for a pod
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PodIdentity {
    Namespaced { namespace: String, name: String },
    Name(String),
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodIdentity::Namespaced { namespace, name } => write!(f, "{}/{}", namespace, name),
            PodIdentity::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Namespaces an event source subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    All,
    Namespace(String),
}

impl NamespaceScope {
    /// One scope per configured namespace, or a single cluster-wide scope.
    pub fn from_namespaces(namespaces: &[String]) -> Vec<Self> {
        if namespaces.is_empty() {
            vec![NamespaceScope::All]
        } else {
            namespaces
                .iter()
                .map(|ns| NamespaceScope::Namespace(ns.clone()))
                .collect()
        }
    }
}

impl fmt::Display for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceScope::All => write!(f, "all namespaces"),
            NamespaceScope::Namespace(ns) => write!(f, "namespace {}", ns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodSpec, PodStatus};
    use kube::api::ObjectMeta;

    fn k8s_pod(namespace: Option<&str>, name: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: namespace.map(String::from),
                name: name.map(String::from),
                uid: Some("abc-123".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "nginx".to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-1".to_string()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                pod_ip: Some("10.0.0.5".to_string()),
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_record_from_k8s_pod() {
        let record = PodRecord::try_from(&k8s_pod(Some("default"), Some("nginx"))).unwrap();

        assert_eq!(record.namespace, "default");
        assert_eq!(record.name, "nginx");
        assert_eq!(record.labels.get("app").map(String::as_str), Some("nginx"));
        assert_eq!(record.metadata.uid.as_deref(), Some("abc-123"));
        assert_eq!(record.metadata.node_name.as_deref(), Some("node-1"));
        assert_eq!(record.metadata.pod_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.metadata.phase.as_deref(), Some("Running"));
    }

    #[test]
    fn test_record_requires_name_and_namespace() {
        assert!(PodRecord::try_from(&k8s_pod(Some("default"), None)).is_err());
        assert!(PodRecord::try_from(&k8s_pod(None, Some("nginx"))).is_err());
        assert!(PodRecord::try_from(&k8s_pod(Some("default"), Some(""))).is_err());
    }

    #[test]
    fn test_identity_of_follows_scheme() {
        let record = PodRecord::new("ns1", "pod-a");

        assert_eq!(
            IdentityScheme::Namespaced.identity_of(&record),
            PodIdentity::Namespaced {
                namespace: "ns1".to_string(),
                name: "pod-a".to_string()
            }
        );
        assert_eq!(
            IdentityScheme::NameOnly.identity_of(&record),
            PodIdentity::Name("pod-a".to_string())
        );
    }

    #[test]
    fn test_parse_namespaced() {
        let id = IdentityScheme::Namespaced.parse("ns1/pod-a").unwrap();
        assert_eq!(id.to_string(), "ns1/pod-a");

        for bad in ["pod-a", "ns1/", "/pod-a", "a/b/c", ""] {
            assert!(
                IdentityScheme::Namespaced.parse(bad).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_name_only() {
        let id = IdentityScheme::NameOnly.parse("pod-a").unwrap();
        assert_eq!(id, PodIdentity::Name("pod-a".to_string()));

        assert!(IdentityScheme::NameOnly.parse("ns1/pod-a").is_err());
        assert!(IdentityScheme::NameOnly.parse("").is_err());
    }

    #[test]
    fn test_scopes_from_namespaces() {
        assert_eq!(NamespaceScope::from_namespaces(&[]), vec![NamespaceScope::All]);
        assert_eq!(
            NamespaceScope::from_namespaces(&["a".to_string(), "b".to_string()]),
            vec![
                NamespaceScope::Namespace("a".to_string()),
                NamespaceScope::Namespace("b".to_string())
            ]
        );
    }

    #[test]
    fn test_scheme_serde_names() {
        let scheme: IdentityScheme = serde_yaml::from_str("name-only").unwrap();
        assert_eq!(scheme, IdentityScheme::NameOnly);
        assert_eq!(scheme.to_string(), "name-only");
    }
}
