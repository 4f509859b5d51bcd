// ============================================================================
// Default Read/Write Concern Registry
// ============================================================================

pub mod core;
pub mod validation;
pub mod storage;
pub mod cache;
pub mod topology;
pub mod registry;
pub mod commands;

// Re-export main types for convenience
pub use crate::core::{
    ConcernSource, DEFAULTS_DOCUMENT_ID, OpTime, ReadConcern, ReadConcernLevel, Result,
    RwDefaultsDocument, RwcError, WriteAcknowledgment, WriteConcern,
};
pub use crate::validation::{
    ConcernUpdate, NormalizedUpdate, SetDefaultsRequest, ValidationContext, ValidationEngine,
    ValidationRule,
};
pub use crate::storage::{
    DefaultsStore, DurabilityContract, DurabilityLevel, FileDefaultsStore, InMemoryDefaultsStore,
};
pub use crate::cache::{CacheEntry, LocalCache};
pub use crate::topology::{StaticTopologyGate, TopologyGate, TopologyRole, VotingShape};
pub use crate::registry::{
    DefaultsView, FeatureFlags, InMemoryRegistryForwarder, RegistryConfig, RegistryForwarder,
    RegistryService,
};
pub use crate::commands::{RegistryCommand, run_command};
