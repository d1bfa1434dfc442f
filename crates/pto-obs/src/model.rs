//! Paths, conditions, observations and observation sets

use crate::db::{StoredObservation, StoredSet};
use chrono::{DateTime, TimeZone, Utc};
use pto_common::coerce::{as_int, as_string, as_string_array, format_time, parse_time};
use pto_common::{Config, Error, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const KEY_SOURCES: &str = "_sources";
pub const KEY_ANALYZER: &str = "_analyzer";
pub const KEY_LINK: &str = "__link";
pub const KEY_DATA: &str = "__data";
pub const KEY_COUNT: &str = "__obs_count";

/// A path through the network, as whitespace-separated path elements.
/// An id of 0 means the string has not been resolved yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    pub id: u64,
    pub string: String,
}

impl Path {
    #[must_use]
    pub fn new(string: impl Into<String>) -> Self {
        Self {
            id: 0,
            string: string.into(),
        }
    }

    /// Path elements in order
    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.string.split_whitespace()
    }
}

/// A named condition observed on a path. Id 0 means unresolved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Condition {
    pub id: u64,
    pub name: String,
}

impl Condition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

/// A group of observations produced by one analyzer from a set of sources
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservationSet {
    /// Set id; 0 until the set has been inserted
    pub id: u64,
    pub sources: Vec<String>,
    pub analyzer: String,
    metadata: BTreeMap<String, String>,

    // Derived, never persisted
    link: Option<String>,
    data_link: Option<String>,
    count: Option<u64>,
}

impl ObservationSet {
    #[must_use]
    pub fn new(sources: Vec<String>, analyzer: impl Into<String>) -> Self {
        Self {
            sources,
            analyzer: analyzer.into(),
            ..Self::default()
        }
    }

    pub(crate) fn from_stored(id: u64, stored: StoredSet) -> Self {
        Self {
            id,
            sources: stored.sources,
            analyzer: stored.analyzer,
            metadata: stored.metadata,
            ..Self::default()
        }
    }

    pub(crate) fn to_stored(&self) -> StoredSet {
        StoredSet {
            sources: self.sources.clone(),
            analyzer: self.analyzer.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Set an extension field. `_`-prefixed keys are reserved.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if key.starts_with('_') {
            return Err(Error::malformed(format!("reserved metadata key: {key}")));
        }
        self.metadata.insert(key, value.into());
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn keys(&self) -> BTreeSet<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    #[must_use]
    pub fn data_link(&self) -> Option<&str> {
        self.data_link.as_deref()
    }

    #[must_use]
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn set_count(&mut self, count: u64) {
        self.count = Some(count);
    }

    /// Fill in the public and data links relative to the service base URL
    pub fn link_via(&mut self, config: &Config) -> Result<()> {
        let link = format!("obs/{:016x}", self.id);
        self.data_link = Some(config.link_to(&format!("{link}/data"))?);
        self.link = Some(config.link_to(&link)?);
        Ok(())
    }

    /// Decode from a JSON object; `_sources` and `_analyzer` are required
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::malformed("observation set must be a JSON object"));
        };

        let sources = map
            .get(KEY_SOURCES)
            .ok_or_else(|| Error::missing_field("sources"))
            .and_then(as_string_array)?;
        let analyzer = map
            .get(KEY_ANALYZER)
            .ok_or_else(|| Error::missing_field("analyzer"))
            .and_then(as_string)?;
        if analyzer.is_empty() {
            return Err(Error::missing_field("analyzer"));
        }

        let mut set = Self::new(sources, analyzer);
        for (k, v) in map {
            // `__` keys are server-computed, other `_` keys reserved
            if k.starts_with('_') {
                continue;
            }
            set.metadata.insert(k.clone(), as_string(v)?);
        }
        Ok(set)
    }

    /// Encode as a JSON object
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for ObservationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(KEY_SOURCES, &self.sources)?;
        map.serialize_entry(KEY_ANALYZER, &self.analyzer)?;
        if let Some(link) = &self.link {
            map.serialize_entry(KEY_LINK, link)?;
        }
        if let Some(link) = &self.data_link {
            map.serialize_entry(KEY_DATA, link)?;
        }
        if let Some(count) = self.count {
            map.serialize_entry(KEY_COUNT, &count)?;
        }
        for (k, v) in &self.metadata {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObservationSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// A single observation of a condition on a path over a time interval
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Observation id; 0 until inserted
    pub id: u64,
    pub set_id: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub path: Path,
    pub condition: Condition,
    /// Optional value; 0 is omitted on the wire
    pub value: i64,
}

impl Observation {
    /// Decode from the array wire form
    /// `[set_id, start, end, path, condition(, value)]`
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Array(items) = value else {
            return Err(Error::malformed("observation must be a JSON array"));
        };
        if items.len() < 5 {
            return Err(Error::malformed(format!(
                "observation needs at least 5 elements, got {}",
                items.len()
            )));
        }

        let set_id = as_int(&items[0])?;
        let set_id = u64::try_from(set_id)
            .map_err(|_| Error::malformed(format!("bad observation set id {set_id}")))?;
        let start = time_element(&items[1])?;
        let end = time_element(&items[2])?;
        if start > end {
            return Err(Error::malformed(format!(
                "observation starts after it ends: {} > {}",
                format_time(&start),
                format_time(&end)
            )));
        }

        let value = items.get(5).map(as_int).transpose()?.unwrap_or(0);

        Ok(Self {
            id: 0,
            set_id,
            start,
            end,
            path: Path::new(as_string(&items[3])?),
            condition: Condition::new(as_string(&items[4])?),
            value,
        })
    }

    /// Row form; path and condition ids must be resolved
    pub(crate) fn to_stored(&self) -> Result<StoredObservation> {
        if self.path.id == 0 || self.condition.id == 0 {
            return Err(Error::internal(format!(
                "unresolved observation on {:?} / {:?}",
                self.path.string, self.condition.name
            )));
        }
        Ok(StoredObservation {
            set_id: self.set_id,
            start: self.start.timestamp(),
            end: self.end.timestamp(),
            path_id: self.path.id,
            condition_id: self.condition.id,
            value: self.value,
        })
    }

    pub(crate) fn from_stored(
        id: u64,
        stored: &StoredObservation,
        path: Path,
        condition: Condition,
    ) -> Result<Self> {
        Ok(Self {
            id,
            set_id: stored.set_id,
            start: from_unix(stored.start)?,
            end: from_unix(stored.end)?,
            path,
            condition,
            value: stored.value,
        })
    }
}

fn time_element(v: &Value) -> Result<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_time(s),
        _ => Err(Error::malformed(format!("expected timestamp string, got {v}"))),
    }
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::storage(format!("stored timestamp out of range: {secs}")))
}

impl Serialize for Observation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.value == 0 { 5 } else { 6 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.set_id)?;
        seq.serialize_element(&format_time(&self.start))?;
        seq.serialize_element(&format_time(&self.end))?;
        seq.serialize_element(&self.path.string)?;
        seq.serialize_element(&self.condition.name)?;
        if self.value != 0 {
            seq.serialize_element(&self.value)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Observation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}
