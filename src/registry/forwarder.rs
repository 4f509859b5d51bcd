use super::service::RegistryService;
use super::view::DefaultsView;
use crate::core::{Result, RwcError};
use crate::validation::SetDefaultsRequest;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Trait for components that carry registry operations from a router to a
/// config server node.
#[async_trait]
pub trait RegistryForwarder: Send + Sync {
    /// Runs `getDefaults` on the target node.
    async fn forward_get(&self, target_node: &str, force_refresh: bool) -> Result<DefaultsView>;

    /// Runs `setDefaults` on the target node.
    async fn forward_set(
        &self,
        target_node: &str,
        request: SetDefaultsRequest,
    ) -> Result<DefaultsView>;

    /// Reads the raw persisted record as stored by the target node.
    async fn fetch_persisted(&self, target_node: &str) -> Result<Option<serde_json::Value>>;
}

/// An in-memory implementation of `RegistryForwarder` for testing.
///
/// Simulates network transmission by directly invoking peer registries.
#[derive(Clone, Default)]
pub struct InMemoryRegistryForwarder {
    peers: Arc<Mutex<HashMap<String, Arc<RegistryService>>>>,
}

impl InMemoryRegistryForwarder {
    /// Creates a new, empty forwarder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer node, enabling it to receive forwarded operations.
    pub async fn register_peer(
        &self,
        node_id: impl Into<String>,
        registry: Arc<RegistryService>,
    ) -> Result<()> {
        let node_id = node_id.into();
        if node_id.trim().is_empty() {
            return Err(RwcError::ExecutionError(
                "node_id must not be empty".to_string(),
            ));
        }
        self.peers.lock().await.insert(node_id, registry);
        Ok(())
    }

    /// Removes a peer; later operations targeting it fail as unreachable.
    pub async fn unregister_peer(&self, node_id: &str) -> bool {
        self.peers.lock().await.remove(node_id).is_some()
    }

    async fn peer(&self, node_id: &str) -> Result<Arc<RegistryService>> {
        let peers = self.peers.lock().await;
        peers.get(node_id).cloned().ok_or_else(|| {
            RwcError::ExecutionError(format!(
                "Registry forwarder target node '{}' is not registered",
                node_id
            ))
        })
    }
}

#[async_trait]
impl RegistryForwarder for InMemoryRegistryForwarder {
    async fn forward_get(&self, target_node: &str, force_refresh: bool) -> Result<DefaultsView> {
        let peer = self.peer(target_node).await?;
        peer.get_defaults(force_refresh).await
    }

    async fn forward_set(
        &self,
        target_node: &str,
        request: SetDefaultsRequest,
    ) -> Result<DefaultsView> {
        let peer = self.peer(target_node).await?;
        peer.set_defaults(request).await
    }

    async fn fetch_persisted(&self, target_node: &str) -> Result<Option<serde_json::Value>> {
        let peer = self.peer(target_node).await?;
        peer.persisted_document().await
    }
}
