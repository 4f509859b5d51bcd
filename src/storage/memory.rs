use super::engine::{DefaultsStore, DurabilityContract, DurabilityLevel, majority_of};
use crate::core::{OpTime, Result, RwDefaultsDocument, RwcError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

struct ReplicatedDefaults {
    document: Option<RwDefaultsDocument>,
    last_op_time: Option<OpTime>,
    term: i64,
    voting_members: usize,
    reachable_members: usize,
    commit_delay: Option<Duration>,
}

/// Defaults record replicated across one replication group.
///
/// Clones share the same state, so every node of a group can hold its own
/// handle and observe the same committed record.
#[derive(Clone)]
pub struct InMemoryDefaultsStore {
    state: Arc<RwLock<ReplicatedDefaults>>,
}

impl InMemoryDefaultsStore {
    /// A replication group with `voting_members` voters, all reachable.
    pub fn new(voting_members: usize) -> Self {
        let voting_members = voting_members.max(1);
        Self {
            state: Arc::new(RwLock::new(ReplicatedDefaults {
                document: None,
                last_op_time: None,
                term: 1,
                voting_members,
                reachable_members: voting_members,
                commit_delay: None,
            })),
        }
    }

    /// Simulate a partition: only `reachable` voters (including the primary) acknowledge writes.
    pub async fn set_reachable_members(&self, reachable: usize) {
        let mut state = self.state.write().await;
        state.reachable_members = reachable.min(state.voting_members);
    }

    /// Delay every commit, e.g. to exercise the durability timeout.
    pub async fn set_commit_delay(&self, delay: Option<Duration>) {
        self.state.write().await.commit_delay = delay;
    }

    /// A new primary was elected; later writes are stamped with the new term.
    pub async fn step_up_term(&self) -> i64 {
        let mut state = self.state.write().await;
        state.term += 1;
        state.term
    }

    pub async fn last_op_time(&self) -> Option<OpTime> {
        self.state.read().await.last_op_time
    }
}

#[async_trait]
impl DefaultsStore for InMemoryDefaultsStore {
    async fn load(&self) -> Result<Option<RwDefaultsDocument>> {
        Ok(self.state.read().await.document.clone())
    }

    async fn save(
        &self,
        document: &RwDefaultsDocument,
        durability: DurabilityContract,
    ) -> Result<OpTime> {
        let delay = self.state.read().await.commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if durability.level == DurabilityLevel::Majority {
            let required = majority_of(state.voting_members);
            if state.reachable_members < required {
                return Err(RwcError::PersistenceUnavailable(format!(
                    "majority write needs {} of {} voting members, only {} reachable",
                    required, state.voting_members, state.reachable_members
                )));
            }
        }

        let op_time = OpTime::next_in_term(state.last_op_time, state.term);
        let mut committed = document.clone();
        committed.update_op_time = Some(op_time);
        state.document = Some(committed);
        state.last_op_time = Some(op_time);
        Ok(op_time)
    }
}
