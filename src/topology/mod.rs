//! Node roles and the authority each role has over the defaults registry.

use crate::storage::majority_of;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

/// Closed set of roles a node can play in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyRole {
    Standalone,
    ReplicaSetPrimary,
    ReplicaSetSecondary,
    ShardPrimary,
    ShardSecondary,
    ConfigServerPrimary,
    ConfigServerSecondary,
    Router,
}

impl TopologyRole {
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "standalone" => Some(Self::Standalone),
            "replica-set-primary" | "primary" => Some(Self::ReplicaSetPrimary),
            "replica-set-secondary" | "secondary" => Some(Self::ReplicaSetSecondary),
            "shard-primary" => Some(Self::ShardPrimary),
            "shard-secondary" => Some(Self::ShardSecondary),
            "config-server-primary" | "config-primary" => Some(Self::ConfigServerPrimary),
            "config-server-secondary" | "config-secondary" => Some(Self::ConfigServerSecondary),
            "router" => Some(Self::Router),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::ReplicaSetPrimary => "replica-set-primary",
            Self::ReplicaSetSecondary => "replica-set-secondary",
            Self::ShardPrimary => "shard-primary",
            Self::ShardSecondary => "shard-secondary",
            Self::ConfigServerPrimary => "config-server-primary",
            Self::ConfigServerSecondary => "config-server-secondary",
            Self::Router => "router",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            Self::ReplicaSetPrimary | Self::ShardPrimary | Self::ConfigServerPrimary
        )
    }

    pub fn is_shard_member(&self) -> bool {
        matches!(self, Self::ShardPrimary | Self::ShardSecondary)
    }

    pub fn is_config_server(&self) -> bool {
        matches!(self, Self::ConfigServerPrimary | Self::ConfigServerSecondary)
    }

    /// The same node after winning an election.
    pub fn stepped_up(&self) -> Self {
        match self {
            Self::ReplicaSetSecondary => Self::ReplicaSetPrimary,
            Self::ShardSecondary => Self::ShardPrimary,
            Self::ConfigServerSecondary => Self::ConfigServerPrimary,
            other => *other,
        }
    }

    /// The same node after losing its primary status.
    pub fn stepped_down(&self) -> Self {
        match self {
            Self::ReplicaSetPrimary => Self::ReplicaSetSecondary,
            Self::ShardPrimary => Self::ShardSecondary,
            Self::ConfigServerPrimary => Self::ConfigServerSecondary,
            other => *other,
        }
    }
}

impl fmt::Display for TopologyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voting makeup of a replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingShape {
    /// Data-bearing members with a vote.
    pub writable_voting_members: usize,
    pub arbiters: usize,
}

impl VotingShape {
    pub fn new(writable_voting_members: usize, arbiters: usize) -> Self {
        Self {
            writable_voting_members,
            arbiters,
        }
    }

    pub fn voting_members(&self) -> usize {
        self.writable_voting_members + self.arbiters
    }

    /// Majority writes are the safe implicit default unless arbiters make a
    /// majority of data-bearing voters unreachable after a single failure
    /// (the primary-secondary-arbiter shape).
    pub fn supports_implicit_majority(&self) -> bool {
        !(self.arbiters > 0
            && self.writable_voting_members <= majority_of(self.voting_members()))
    }
}

impl Default for VotingShape {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// Role and write eligibility of the local node, as seen by the registry.
pub trait TopologyGate: Send + Sync {
    fn role(&self) -> TopologyRole;

    /// Voting makeup of the node's own replication group, if it has one.
    fn voting_shape(&self) -> Option<VotingShape>;

    /// True only on the current writable primary of a replication group.
    fn is_write_eligible(&self) -> bool {
        self.role().is_primary()
    }

    /// False on standalone nodes and on shard members.
    fn is_registry_supported(&self) -> bool {
        !matches!(
            self.role(),
            TopologyRole::Standalone | TopologyRole::ShardPrimary | TopologyRole::ShardSecondary
        )
    }

    /// A router forwards both operations to the config servers.
    fn is_router(&self) -> bool {
        self.role() == TopologyRole::Router
    }

    /// Whether `w: "majority"` is the safe computed default for this deployment.
    fn implicit_default_write_concern_majority(&self) -> bool {
        match self.role() {
            TopologyRole::Standalone => false,
            TopologyRole::Router
            | TopologyRole::ConfigServerPrimary
            | TopologyRole::ConfigServerSecondary => true,
            _ => self
                .voting_shape()
                .is_some_and(|shape| shape.supports_implicit_majority()),
        }
    }
}

/// A topology whose role is set explicitly and may change on elections.
#[derive(Debug)]
pub struct StaticTopologyGate {
    role: RwLock<TopologyRole>,
    voting_shape: Option<VotingShape>,
}

impl StaticTopologyGate {
    pub fn new(role: TopologyRole, voting_shape: Option<VotingShape>) -> Self {
        Self {
            role: RwLock::new(role),
            voting_shape,
        }
    }

    pub fn standalone() -> Self {
        Self::new(TopologyRole::Standalone, None)
    }

    pub fn router() -> Self {
        Self::new(TopologyRole::Router, None)
    }

    pub fn replica_set(role: TopologyRole, voting_shape: VotingShape) -> Self {
        Self::new(role, Some(voting_shape))
    }

    pub fn set_role(&self, role: TopologyRole) {
        let mut current = self.role.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = role;
    }

    pub fn step_up(&self) {
        let role = self.role().stepped_up();
        self.set_role(role);
    }

    pub fn step_down(&self) {
        let role = self.role().stepped_down();
        self.set_role(role);
    }
}

impl TopologyGate for StaticTopologyGate {
    fn role(&self) -> TopologyRole {
        *self.role.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn voting_shape(&self) -> Option<VotingShape> {
        self.voting_shape
    }
}
