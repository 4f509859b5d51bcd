use crate::storage::DurabilityContract;
use std::time::Duration;

/// Cluster-wide capabilities that change what the registry surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Surface an implicit `local` read concern and the read concern source.
    pub default_read_concern_local: bool,
    /// Require-majority: compute an implicit majority write concern, surface
    /// the write concern source, and refuse to unset a concrete write concern.
    pub default_write_concern_majority: bool,
}

impl FeatureFlags {
    pub fn reports_read_concern_source(&self) -> bool {
        self.default_read_concern_local
    }

    pub fn reports_write_concern_source(&self) -> bool {
        self.default_write_concern_majority
    }

    pub fn blocks_write_concern_unset(&self) -> bool {
        self.default_write_concern_majority
    }

    pub fn all_disabled() -> Self {
        Self {
            default_read_concern_local: false,
            default_write_concern_majority: false,
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            default_read_concern_local: true,
            default_write_concern_majority: true,
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Identity of this node, used for forwarding and logs
    pub node_id: String,

    /// Capability flags
    pub flags: FeatureFlags,

    /// Durability contract for writes of the defaults record
    pub durability: DurabilityContract,
}

impl RegistryConfig {
    /// Create a new configuration with all capabilities enabled
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            flags: FeatureFlags::default(),
            durability: DurabilityContract::default(),
        }
    }

    /// Set the capability flags
    pub fn flags(mut self, flags: FeatureFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Toggle the implicit `local` read concern default
    pub fn default_read_concern_local(mut self, enabled: bool) -> Self {
        self.flags.default_read_concern_local = enabled;
        self
    }

    /// Toggle the require-majority capability
    pub fn default_write_concern_majority(mut self, enabled: bool) -> Self {
        self.flags.default_write_concern_majority = enabled;
        self
    }

    /// Set the durability contract
    pub fn durability(mut self, durability: DurabilityContract) -> Self {
        self.durability = durability;
        self
    }

    /// Set how long a defaults write may wait for its durability contract
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.durability.timeout = timeout;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.trim().is_empty() {
            return Err("node_id cannot be empty".to_string());
        }

        if !self.durability.is_at_least_majority() {
            return Err("defaults must be written with majority durability".to_string());
        }

        if self.durability.timeout.is_zero() {
            return Err("write timeout must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new("node-0")
    }
}
