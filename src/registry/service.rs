use super::config::RegistryConfig;
use super::forwarder::RegistryForwarder;
use super::view::DefaultsView;
use crate::cache::{CacheEntry, LocalCache};
use crate::core::{OpTime, Result, RwDefaultsDocument, RwcError};
use crate::storage::DefaultsStore;
use crate::topology::{TopologyGate, TopologyRole};
use crate::validation::{
    ConcernUpdate, NormalizedUpdate, SetDefaultsRequest, ValidationContext, ValidationEngine,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{Instrument, Level, event, info_span};

enum RegistryBackend {
    /// Holds a cache and writes through to the durable store.
    Local {
        store: Arc<dyn DefaultsStore>,
        cache: LocalCache,
        validator: ValidationEngine,
        write_lock: Mutex<()>,
    },
    /// Router: no state of its own, every call goes to a config server.
    Forwarding {
        forwarder: Arc<dyn RegistryForwarder>,
        config_servers: Vec<String>,
    },
}

/// The default read/write concern registry of one node.
///
/// Serves `getDefaults`/`setDefaults` according to the node's role: local
/// nodes answer from their cache and write through to the store, routers
/// forward to the config servers.
pub struct RegistryService {
    config: RegistryConfig,
    topology: Arc<dyn TopologyGate>,
    backend: RegistryBackend,
}

impl RegistryService {
    /// Creates a registry backed by a durable store.
    pub fn new(
        config: RegistryConfig,
        topology: Arc<dyn TopologyGate>,
        store: Arc<dyn DefaultsStore>,
    ) -> Result<Self> {
        Self::with_validator(config, topology, store, ValidationEngine::new())
    }

    /// Creates a registry with a custom validation rule chain.
    pub fn with_validator(
        config: RegistryConfig,
        topology: Arc<dyn TopologyGate>,
        store: Arc<dyn DefaultsStore>,
        validator: ValidationEngine,
    ) -> Result<Self> {
        config.validate().map_err(RwcError::ExecutionError)?;
        if topology.is_router() {
            return Err(RwcError::ExecutionError(
                "a router holds no defaults of its own; use RegistryService::router".to_string(),
            ));
        }
        Ok(Self {
            config,
            topology,
            backend: RegistryBackend::Local {
                store,
                cache: LocalCache::new(),
                validator,
                write_lock: Mutex::new(()),
            },
        })
    }

    /// Creates a router registry that forwards to the given config server nodes, in order.
    pub fn router(
        config: RegistryConfig,
        topology: Arc<dyn TopologyGate>,
        forwarder: Arc<dyn RegistryForwarder>,
        config_servers: Vec<String>,
    ) -> Result<Self> {
        config.validate().map_err(RwcError::ExecutionError)?;
        if !topology.is_router() {
            return Err(RwcError::ExecutionError(format!(
                "forwarding registry requires a router topology, node is {}",
                topology.role()
            )));
        }
        if config_servers.is_empty() {
            return Err(RwcError::ExecutionError(
                "router needs at least one config server to forward to".to_string(),
            ));
        }
        Ok(Self {
            config,
            topology,
            backend: RegistryBackend::Forwarding {
                forwarder,
                config_servers,
            },
        })
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn role(&self) -> TopologyRole {
        self.topology.role()
    }

    /// Returns the current defaults.
    ///
    /// With `force_refresh` false the cached entry is returned as-is and the
    /// view is marked in-memory; a cache that was never loaded or has been
    /// invalidated is refreshed first. With `force_refresh` true the store is
    /// always read.
    pub async fn get_defaults(&self, force_refresh: bool) -> Result<DefaultsView> {
        let span = info_span!(
            "registry.defaults.get",
            node_id = %self.config.node_id,
            role = %self.topology.role(),
            force_refresh
        );
        self.get_defaults_inner(force_refresh).instrument(span).await
    }

    async fn get_defaults_inner(&self, force_refresh: bool) -> Result<DefaultsView> {
        if self.topology.role() == TopologyRole::Standalone || !self.topology.is_registry_supported()
        {
            return Err(self.unsupported_error());
        }

        let (store, cache) = match &self.backend {
            RegistryBackend::Local { store, cache, .. } => (store, cache),
            RegistryBackend::Forwarding {
                forwarder,
                config_servers,
            } => return Self::forward_get(forwarder, config_servers, force_refresh).await,
        };

        let cached = if force_refresh || cache.needs_refresh()? {
            None
        } else {
            cache.snapshot()?
        };
        let entry = match cached {
            Some(entry) => entry,
            None => Self::refresh(store.as_ref(), cache).await?,
        };

        let view = self.render(&entry);
        Ok(if force_refresh { view } else { view.mark_in_memory() })
    }

    /// Validates and applies a partial update, then persists and caches the merged record.
    pub async fn set_defaults(&self, request: SetDefaultsRequest) -> Result<DefaultsView> {
        let span = info_span!(
            "registry.defaults.set",
            node_id = %self.config.node_id,
            role = %self.topology.role()
        );
        self.set_defaults_inner(request).instrument(span).await
    }

    async fn set_defaults_inner(&self, request: SetDefaultsRequest) -> Result<DefaultsView> {
        let role = self.topology.role();
        if role == TopologyRole::Standalone {
            return Err(RwcError::RegistryUnsupportedOnStandalone);
        }

        let (store, cache, validator, write_lock) = match &self.backend {
            RegistryBackend::Local {
                store,
                cache,
                validator,
                write_lock,
            } => (store, cache, validator, write_lock),
            RegistryBackend::Forwarding {
                forwarder,
                config_servers,
            } => return Self::forward_set(forwarder, config_servers, request).await,
        };

        if !self.topology.is_write_eligible() {
            return Err(RwcError::NotWritable(format!(
                "node '{}' is not the primary ({})",
                self.config.node_id, role
            )));
        }
        if !self.topology.is_registry_supported() {
            return Err(self.unsupported_error());
        }

        let _guard = write_lock.lock().await;

        let current = store.load().await?;
        let context = ValidationContext {
            explicit_write_concern_set: current
                .as_ref()
                .is_some_and(RwDefaultsDocument::has_explicit_write_concern),
            require_majority: self.config.flags.blocks_write_concern_unset(),
        };
        let update = validator.validate(&request, &context).inspect_err(|err| {
            event!(Level::DEBUG, error = %err, "defaults update rejected");
        })?;

        let mut merged = current.unwrap_or_default();
        apply_update(&mut merged, update);
        merged.update_wall_clock_time = Some(Utc::now());

        let durability = self.config.durability;
        let op_time = match timeout(durability.timeout, store.save(&merged, durability)).await {
            Ok(Ok(op_time)) => op_time,
            Ok(Err(err)) => {
                event!(Level::WARN, error = %err, "defaults write failed");
                return Err(err);
            }
            Err(_) => {
                // The store may still commit after we stop waiting.
                cache.invalidate()?;
                event!(
                    Level::WARN,
                    timeout_ms = durability.timeout.as_millis() as u64,
                    "defaults write timed out, outcome unknown"
                );
                return Err(RwcError::PersistenceUnavailable(format!(
                    "defaults write did not satisfy its durability contract within {:?}",
                    durability.timeout
                )));
            }
        };
        merged.update_op_time = Some(op_time);
        event!(Level::INFO, op_time = %op_time, "defaults record committed");

        let entry = cache.install(Some(merged), Utc::now())?;
        Ok(self.render(&entry))
    }

    /// Drops the cached state so the next read goes to the store.
    pub fn invalidate(&self) -> Result<()> {
        match &self.backend {
            RegistryBackend::Local { cache, .. } => cache.invalidate(),
            RegistryBackend::Forwarding { .. } => Ok(()),
        }
    }

    /// Feeds a gossiped op time of the defaults record into the cache.
    ///
    /// Returns whether the cache became stale.
    pub fn observe_op_time(&self, observed: OpTime) -> Result<bool> {
        match &self.backend {
            RegistryBackend::Local { cache, .. } => cache.observe_op_time(observed),
            RegistryBackend::Forwarding { .. } => Ok(false),
        }
    }

    /// The raw persisted record, addressed by its fixed identifier.
    pub async fn persisted_document(&self) -> Result<Option<serde_json::Value>> {
        match &self.backend {
            RegistryBackend::Local { store, .. } => Ok(store
                .load()
                .await?
                .map(|document| document.to_persisted_json())),
            RegistryBackend::Forwarding {
                forwarder,
                config_servers,
            } => {
                let mut last_err = None;
                for target in config_servers {
                    match forwarder.fetch_persisted(target).await {
                        Ok(document) => return Ok(document),
                        Err(err) => last_err = Some(err),
                    }
                }
                Err(last_err.unwrap_or_else(no_config_servers))
            }
        }
    }

    async fn refresh(store: &dyn DefaultsStore, cache: &LocalCache) -> Result<CacheEntry> {
        let document = store.load().await?;
        event!(
            Level::DEBUG,
            found = document.is_some(),
            "defaults cache refreshed"
        );
        cache.install(document, Utc::now())
    }

    fn render(&self, entry: &CacheEntry) -> DefaultsView {
        let flags = &self.config.flags;
        let implicit_write_majority = flags.default_write_concern_majority
            && self.topology.implicit_default_write_concern_majority();
        DefaultsView::from_cache(entry, flags, implicit_write_majority)
    }

    fn unsupported_error(&self) -> RwcError {
        if self.topology.role() == TopologyRole::Standalone {
            RwcError::RegistryUnsupportedOnStandalone
        } else {
            RwcError::RegistryUnsupportedOnShardMember
        }
    }

    async fn forward_get(
        forwarder: &Arc<dyn RegistryForwarder>,
        config_servers: &[String],
        force_refresh: bool,
    ) -> Result<DefaultsView> {
        let mut last_err = None;
        for target in config_servers {
            match forwarder.forward_get(target, force_refresh).await {
                Ok(view) => return Ok(view),
                Err(err) => {
                    event!(Level::DEBUG, target = %target, error = %err, "forwarded get failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(no_config_servers))
    }

    async fn forward_set(
        forwarder: &Arc<dyn RegistryForwarder>,
        config_servers: &[String],
        request: SetDefaultsRequest,
    ) -> Result<DefaultsView> {
        let mut last_err = None;
        for target in config_servers {
            match forwarder.forward_set(target, request.clone()).await {
                Ok(view) => return Ok(view),
                Err(err @ RwcError::NotWritable(_)) => {
                    event!(Level::DEBUG, target = %target, "config server is not primary, trying next");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(no_config_servers))
    }
}

fn no_config_servers() -> RwcError {
    RwcError::ExecutionError("no config server available to forward to".to_string())
}

fn apply_update(document: &mut RwDefaultsDocument, update: NormalizedUpdate) {
    match update.read_concern {
        Some(ConcernUpdate::Set(rc)) => document.default_read_concern = Some(rc),
        Some(ConcernUpdate::Unset) => document.default_read_concern = None,
        None => {}
    }
    match update.write_concern {
        Some(ConcernUpdate::Set(wc)) => document.default_write_concern = Some(wc),
        Some(ConcernUpdate::Unset) => document.default_write_concern = None,
        None => {}
    }
}
