//! Per-node cache of the last-known defaults record.

use crate::core::{OpTime, Result, RwDefaultsDocument};
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use tracing::{Level, event};

/// What a node currently believes the defaults are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// `None` until a defaults record has been observed.
    pub document: Option<RwDefaultsDocument>,
    /// Time of the last refresh attempt, successful or not.
    pub local_update_wall_clock_time: DateTime<Utc>,
}

impl CacheEntry {
    pub fn update_op_time(&self) -> Option<OpTime> {
        self.document.as_ref().and_then(|doc| doc.update_op_time)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    stale: bool,
}

/// In-memory holder of the defaults, never persisted.
#[derive(Debug, Default)]
pub struct LocalCache {
    state: RwLock<CacheState>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current entry, `None` before the first refresh.
    pub fn snapshot(&self) -> Result<Option<CacheEntry>> {
        Ok(self.state.read()?.entry.clone())
    }

    /// True before the first refresh and after an invalidation.
    pub fn needs_refresh(&self) -> Result<bool> {
        let state = self.state.read()?;
        Ok(state.entry.is_none() || state.stale)
    }

    /// Record the outcome of a refresh or a committed write.
    ///
    /// The liveness timestamp always moves; the document is only replaced
    /// when it is not older than the cached one, so a slow refresh racing a
    /// newer write cannot roll the cache back.
    pub fn install(&self, document: Option<RwDefaultsDocument>, now: DateTime<Utc>) -> Result<CacheEntry> {
        let mut state = self.state.write()?;
        let cached_op_time = state.entry.as_ref().and_then(CacheEntry::update_op_time);
        let incoming_op_time = document.as_ref().and_then(|doc| doc.update_op_time);

        let keep_cached = cached_op_time.is_some() && incoming_op_time < cached_op_time;
        let document = if keep_cached {
            event!(
                Level::DEBUG,
                cached = ?cached_op_time,
                incoming = ?incoming_op_time,
                "ignoring older defaults record"
            );
            state.entry.as_ref().and_then(|entry| entry.document.clone())
        } else {
            document
        };

        let entry = CacheEntry {
            document,
            local_update_wall_clock_time: now,
        };
        state.entry = Some(entry.clone());
        state.stale = false;
        Ok(entry)
    }

    /// Force the next read to go to the store.
    pub fn invalidate(&self) -> Result<()> {
        self.state.write()?.stale = true;
        event!(Level::DEBUG, "defaults cache invalidated");
        Ok(())
    }

    /// Compare a gossiped op time with the cached one; invalidate when it is newer.
    ///
    /// Returns whether the cache was invalidated.
    pub fn observe_op_time(&self, observed: OpTime) -> Result<bool> {
        let mut state = self.state.write()?;
        let cached = state.entry.as_ref().and_then(CacheEntry::update_op_time);
        if cached.is_some_and(|cached| cached >= observed) {
            return Ok(false);
        }
        state.stale = true;
        event!(
            Level::DEBUG,
            observed = %observed,
            cached = ?cached,
            "newer defaults op time observed"
        );
        Ok(true)
    }
}
