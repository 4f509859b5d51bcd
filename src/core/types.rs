use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed identifier of the single defaults record in the cluster metadata store.
pub const DEFAULTS_DOCUMENT_ID: &str = "ReadWriteConcernDefaults";

/// Logical position of a durable write.
///
/// Ordered by term first, then by the position within the term, so a write
/// made by a newer primary always compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpTime {
    #[serde(rename = "t")]
    pub term: i64,
    pub ts: u64,
}

impl OpTime {
    pub fn new(term: i64, ts: u64) -> Self {
        Self { term, ts }
    }

    /// The next position inside the given term.
    pub fn next_in_term(previous: Option<OpTime>, term: i64) -> OpTime {
        match previous {
            Some(prev) if prev.term == term => OpTime::new(term, prev.ts + 1),
            Some(prev) if prev.term > term => OpTime::new(prev.term, prev.ts + 1),
            _ => OpTime::new(term, 1),
        }
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ts: {}, t: {} }}", self.ts, self.term)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConcernLevel {
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

impl ReadConcernLevel {
    pub fn parse(level: &str) -> Option<Self> {
        match level {
            "local" => Some(Self::Local),
            "available" => Some(Self::Available),
            "majority" => Some(Self::Majority),
            "linearizable" => Some(Self::Linearizable),
            "snapshot" => Some(Self::Snapshot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Available => "available",
            Self::Majority => "majority",
            Self::Linearizable => "linearizable",
            Self::Snapshot => "snapshot",
        }
    }

    /// Linearizable and snapshot reads only make sense per operation.
    pub fn is_default_eligible(&self) -> bool {
        matches!(self, Self::Local | Self::Available | Self::Majority)
    }
}

impl fmt::Display for ReadConcernLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConcern {
    pub level: ReadConcernLevel,
}

impl ReadConcern {
    pub fn new(level: ReadConcernLevel) -> Self {
        Self { level }
    }

    /// Fallback surfaced when no read concern was ever set.
    pub fn implicit_default() -> Self {
        Self::new(ReadConcernLevel::Local)
    }
}

/// Acknowledgment target of a write concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAcknowledgment {
    Nodes(u32),
    Majority,
}

impl Serialize for WriteAcknowledgment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Nodes(n) => serializer.serialize_u32(*n),
            Self::Majority => serializer.serialize_str("majority"),
        }
    }
}

impl<'de> Deserialize<'de> for WriteAcknowledgment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Nodes(u32),
            Mode(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Nodes(0) => Err(de::Error::custom("w must be at least 1")),
            Repr::Nodes(n) => Ok(Self::Nodes(n)),
            Repr::Mode(mode) if mode == "majority" => Ok(Self::Majority),
            Repr::Mode(mode) => Err(de::Error::custom(format!(
                "unrecognized write concern mode '{}'",
                mode
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<WriteAcknowledgment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub j: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wtimeout: Option<u64>,
}

impl WriteConcern {
    pub fn nodes(n: u32) -> Self {
        Self {
            w: Some(WriteAcknowledgment::Nodes(n)),
            j: None,
            wtimeout: None,
        }
    }

    pub fn majority() -> Self {
        Self {
            w: Some(WriteAcknowledgment::Majority),
            j: None,
            wtimeout: None,
        }
    }

    /// The computed majority default, reported with an explicit zero timeout.
    pub fn implicit_majority() -> Self {
        Self {
            wtimeout: Some(0),
            ..Self::majority()
        }
    }

    pub fn journal(mut self, j: bool) -> Self {
        self.j = Some(j);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.w.is_none() && self.j.is_none() && self.wtimeout.is_none()
    }
}

/// Whether an effective default came from the persisted record or a computed fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcernSource {
    Global,
    Implicit,
}

/// The single persisted defaults record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RwDefaultsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_read_concern: Option<ReadConcern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_write_concern: Option<WriteConcern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_op_time: Option<OpTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_wall_clock_time: Option<DateTime<Utc>>,
}

impl RwDefaultsDocument {
    pub fn has_explicit_write_concern(&self) -> bool {
        self.default_write_concern
            .as_ref()
            .is_some_and(|wc| !wc.is_empty())
    }

    /// Renders the record the way it is stored, addressed by its fixed identifier.
    pub fn to_persisted_json(&self) -> serde_json::Value {
        let mut record = serde_json::Map::new();
        record.insert(
            "_id".to_string(),
            serde_json::Value::String(DEFAULTS_DOCUMENT_ID.to_string()),
        );
        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) {
            record.extend(fields);
        }
        serde_json::Value::Object(record)
    }
}
