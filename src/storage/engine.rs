use crate::core::{OpTime, Result, RwDefaultsDocument};
use async_trait::async_trait;
use std::time::Duration;

/// Acknowledgment threshold a defaults write must reach before it counts as committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityLevel {
    /// Acknowledged by the local node only.
    Local,
    /// Acknowledged by a majority of voting members.
    #[default]
    Majority,
}

/// Durability contract attached to every defaults write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurabilityContract {
    pub level: DurabilityLevel,
    /// Require the write to be journaled before acknowledging.
    pub journal: bool,
    /// Give up (and report the write as unavailable) after this long.
    pub timeout: Duration,
}

impl DurabilityContract {
    pub fn majority(timeout: Duration) -> Self {
        Self {
            level: DurabilityLevel::Majority,
            journal: true,
            timeout,
        }
    }

    pub fn local(timeout: Duration) -> Self {
        Self {
            level: DurabilityLevel::Local,
            journal: false,
            timeout,
        }
    }

    pub fn is_at_least_majority(&self) -> bool {
        self.level == DurabilityLevel::Majority
    }
}

impl Default for DurabilityContract {
    fn default() -> Self {
        Self::majority(Duration::from_secs(10))
    }
}

/// Votes needed for a majority of `voting_members`.
pub fn majority_of(voting_members: usize) -> usize {
    voting_members / 2 + 1
}

/// Durable home of the single defaults record - allows pluggable storage backends
#[async_trait]
pub trait DefaultsStore: Send + Sync {
    /// Read the current record, if one was ever written.
    async fn load(&self) -> Result<Option<RwDefaultsDocument>>;

    /// Replace the record under the given durability contract.
    ///
    /// The store assigns the op time at commit and returns it; the
    /// `update_op_time` of the passed document is ignored.
    async fn save(
        &self,
        document: &RwDefaultsDocument,
        durability: DurabilityContract,
    ) -> Result<OpTime>;
}
