use crate::k8s::types::NamespaceScope;
use crate::{PodtagError, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::{debug, info};

#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            PodtagError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    pub fn pods_in(&self, scope: &NamespaceScope) -> Api<Pod> {
        match scope {
            NamespaceScope::All => self.pods_all(),
            NamespaceScope::Namespace(ns) => self.pods(ns),
        }
    }
}
