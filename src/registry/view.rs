use super::config::FeatureFlags;
use crate::cache::CacheEntry;
use crate::core::{ConcernSource, OpTime, ReadConcern, WriteConcern};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response shape of both registry operations.
///
/// Absent fields are omitted from the serialized form; presence carries
/// meaning (e.g. no `updateOpTime` means nothing was ever set).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultsView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_read_concern: Option<ReadConcern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_write_concern: Option<WriteConcern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_op_time: Option<OpTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_wall_clock_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_update_wall_clock_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_read_concern_source: Option<ConcernSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_write_concern_source: Option<ConcernSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_memory: Option<bool>,
}

impl DefaultsView {
    /// Builds the in-memory view of a cache entry.
    ///
    /// `implicit_write_majority` is whether the computed write concern default
    /// is `w: "majority"` for this deployment.
    pub fn from_cache(
        entry: &CacheEntry,
        flags: &FeatureFlags,
        implicit_write_majority: bool,
    ) -> Self {
        let document = entry.document.clone().unwrap_or_default();

        let explicit_read = document.default_read_concern;
        let (default_read_concern, default_read_concern_source) = match explicit_read {
            Some(rc) => (
                Some(rc),
                flags
                    .reports_read_concern_source()
                    .then_some(ConcernSource::Global),
            ),
            None if flags.default_read_concern_local => (
                Some(ReadConcern::implicit_default()),
                Some(ConcernSource::Implicit),
            ),
            None => (None, None),
        };

        let explicit_write = document.default_write_concern.filter(|wc| !wc.is_empty());
        let default_write_concern_source = flags.reports_write_concern_source().then_some(
            if explicit_write.is_some() {
                ConcernSource::Global
            } else {
                ConcernSource::Implicit
            },
        );
        let default_write_concern = match explicit_write {
            Some(wc) => Some(wc),
            None if implicit_write_majority => Some(WriteConcern::implicit_majority()),
            None => None,
        };

        Self {
            default_read_concern,
            default_write_concern,
            update_op_time: document.update_op_time,
            update_wall_clock_time: document.update_wall_clock_time,
            local_update_wall_clock_time: Some(entry.local_update_wall_clock_time),
            default_read_concern_source,
            default_write_concern_source,
            in_memory: None,
        }
    }

    /// Marks a response served from the cache without a refresh.
    pub fn mark_in_memory(mut self) -> Self {
        self.in_memory = Some(true);
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory == Some(true)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }
}
