//! Inheritable metadata records for campaigns and raw files
//!
//! A file's record may point at its campaign's record; lookups with
//! `inherit = true` fall through to that parent when the local value is
//! absent. Only one level of inheritance exists.
//!
//! Keys starting with `__` are computed by the server (data link, size,
//! creation and modification time) and are dropped when a record is parsed.

use chrono::{DateTime, Utc};
use pto_common::coerce::{as_string, as_time, format_time};
use pto_common::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

pub const KEY_FILE_TYPE: &str = "_file_type";
pub const KEY_OWNER: &str = "_owner";
pub const KEY_TIME_START: &str = "_time_start";
pub const KEY_TIME_END: &str = "_time_end";

pub const KEY_DATA: &str = "__data";
pub const KEY_DATA_SIZE: &str = "__data_size";
pub const KEY_CREATED: &str = "__created";
pub const KEY_MODIFIED: &str = "__modified";

/// Prefix of server-computed keys
pub const RESERVED_PREFIX: &str = "__";

/// Metadata for a raw data object (file or campaign)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMetadata {
    /// Campaign metadata, for files
    parent: Option<Arc<RawMetadata>>,
    file_type: Option<String>,
    owner: Option<String>,
    time_start: Option<DateTime<Utc>>,
    time_end: Option<DateTime<Utc>>,
    /// Free-form extension fields
    metadata: BTreeMap<String, String>,

    // Virtual fields, recomputed from the filesystem
    data_link: Option<String>,
    data_size: u64,
    created: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
}

impl RawMetadata {
    /// Create an empty record with no parent
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent record, if bound
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<RawMetadata>> {
        self.parent.as_ref()
    }

    /// Bind (or unbind) the parent record
    pub fn set_parent(&mut self, parent: Option<Arc<RawMetadata>>) {
        self.parent = parent;
    }

    #[must_use]
    pub fn with_parent(mut self, parent: Arc<RawMetadata>) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    #[must_use]
    pub fn with_time_start(mut self, t: DateTime<Utc>) -> Self {
        self.time_start = Some(t);
        self
    }

    #[must_use]
    pub fn with_time_end(mut self, t: DateTime<Utc>) -> Self {
        self.time_end = Some(t);
        self
    }

    /// Set an extension field.
    ///
    /// Server-computed (`__`) keys and the well-known `_` keys cannot be set
    /// this way.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if key.starts_with(RESERVED_PREFIX) {
            return Err(Error::malformed(format!("reserved metadata key: {key}")));
        }
        if matches!(
            key.as_str(),
            KEY_FILE_TYPE | KEY_OWNER | KEY_TIME_START | KEY_TIME_END
        ) {
            return Err(Error::malformed(format!("{key} has a typed setter")));
        }
        self.metadata.insert(key, value.into());
        Ok(())
    }

    /// Look up an extension field, optionally falling through to the parent
    #[must_use]
    pub fn get(&self, key: &str, inherit: bool) -> Option<&str> {
        match self.metadata.get(key) {
            Some(v) => Some(v.as_str()),
            None if inherit => self
                .parent
                .as_deref()
                .and_then(|p| p.metadata.get(key))
                .map(String::as_str),
            None => None,
        }
    }

    /// Extension field names, unioned with the parent's when inheriting
    #[must_use]
    pub fn keys(&self, inherit: bool) -> BTreeSet<&str> {
        let mut keys: BTreeSet<&str> = self.metadata.keys().map(String::as_str).collect();
        if inherit && let Some(parent) = self.parent.as_deref() {
            keys.extend(parent.metadata.keys().map(String::as_str));
        }
        keys.retain(|k| !k.starts_with(RESERVED_PREFIX));
        keys
    }

    #[must_use]
    pub fn file_type(&self, inherit: bool) -> Option<&str> {
        self.inherited(inherit, |md| non_empty(md.file_type.as_deref()))
    }

    #[must_use]
    pub fn owner(&self, inherit: bool) -> Option<&str> {
        self.inherited(inherit, |md| non_empty(md.owner.as_deref()))
    }

    #[must_use]
    pub fn time_start(&self, inherit: bool) -> Option<DateTime<Utc>> {
        self.inherited(inherit, |md| md.time_start)
    }

    #[must_use]
    pub fn time_end(&self, inherit: bool) -> Option<DateTime<Utc>> {
        self.inherited(inherit, |md| md.time_end)
    }

    fn inherited<'a, T>(&'a self, inherit: bool, field: impl Fn(&'a Self) -> Option<T>) -> Option<T> {
        field(self).or_else(|| {
            if inherit {
                self.parent.as_deref().and_then(field)
            } else {
                None
            }
        })
    }

    /// Link to the data object
    #[must_use]
    pub fn data_link(&self) -> Option<&str> {
        self.data_link.as_deref()
    }

    /// Size of the data object in bytes (0 when there is no data yet)
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Creation time: the data file's modification time
    #[must_use]
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    /// Metadata modification time, never earlier than creation time
    #[must_use]
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Replace all virtual fields at once. Modification time is clamped up
    /// to the creation time.
    pub(crate) fn set_virtual(
        &mut self,
        data_link: String,
        data_size: u64,
        created: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
    ) {
        self.data_link = Some(data_link);
        self.data_size = data_size;
        self.created = created;
        self.modified = match (created, modified) {
            (Some(c), Some(m)) if m < c => Some(c),
            _ => modified,
        };
    }

    /// Drop parent and virtual fields, keeping what is persisted on disk
    pub(crate) fn clear_derived(&mut self) {
        self.parent = None;
        self.data_link = None;
        self.data_size = 0;
        self.created = None;
        self.modified = None;
    }

    /// Check required fields. Campaign records need an owner; file records
    /// also need a filetype and a time range, any of which may be inherited.
    pub fn validate(&self, is_campaign: bool) -> Result<()> {
        if self.owner(true).is_none() {
            return Err(Error::missing_field("owner"));
        }

        if is_campaign {
            return Ok(());
        }

        if self.file_type(true).is_none() {
            return Err(Error::missing_field("file_type"));
        }
        if self.time_start(true).is_none() {
            return Err(Error::missing_field("time_start"));
        }
        if self.time_end(true).is_none() {
            return Err(Error::missing_field("time_end"));
        }
        Ok(())
    }

    /// Encode as a flat JSON object, with parent values folded in when
    /// `inherit` is set. Virtual fields are included when present.
    #[must_use]
    pub fn to_json(&self, inherit: bool) -> Value {
        let mut map = self.well_known_json(inherit);

        if let Some(link) = &self.data_link {
            map.insert(KEY_DATA.to_string(), Value::from(link.as_str()));
        }
        if self.data_size != 0 {
            map.insert(KEY_DATA_SIZE.to_string(), Value::from(self.data_size));
        }
        if let Some(t) = &self.created {
            map.insert(KEY_CREATED.to_string(), Value::from(format_time(t)));
        }
        if let Some(t) = &self.modified {
            map.insert(KEY_MODIFIED.to_string(), Value::from(format_time(t)));
        }

        Value::Object(map)
    }

    /// Encode only the locally stored fields, as written to metadata files
    #[must_use]
    pub fn to_stored_json(&self) -> Value {
        Value::Object(self.well_known_json(false))
    }

    fn well_known_json(&self, inherit: bool) -> Map<String, Value> {
        let mut map = Map::new();

        for k in self.keys(inherit) {
            if let Some(v) = self.get(k, inherit) {
                map.insert(k.to_string(), Value::from(v));
            }
        }

        if let Some(ft) = self.file_type(inherit) {
            map.insert(KEY_FILE_TYPE.to_string(), Value::from(ft));
        }
        if let Some(ow) = self.owner(inherit) {
            map.insert(KEY_OWNER.to_string(), Value::from(ow));
        }
        if let Some(ts) = self.time_start(inherit) {
            map.insert(KEY_TIME_START.to_string(), Value::from(format_time(&ts)));
        }
        if let Some(te) = self.time_end(inherit) {
            map.insert(KEY_TIME_END.to_string(), Value::from(format_time(&te)));
        }
        map
    }

    /// Decode from a flat JSON object. `__` keys are ignored.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::malformed("metadata must be a JSON object"));
        };

        let mut md = Self::new();
        for (k, v) in map {
            match k.as_str() {
                KEY_FILE_TYPE => {
                    md.file_type = Some(field(k, as_string(v))?).filter(|s| !s.is_empty());
                }
                KEY_OWNER => md.owner = Some(field(k, as_string(v))?).filter(|s| !s.is_empty()),
                KEY_TIME_START => md.time_start = Some(field(k, as_time(v))?),
                KEY_TIME_END => md.time_end = Some(field(k, as_time(v))?),
                _ if k.starts_with(RESERVED_PREFIX) => {}
                _ => {
                    md.metadata.insert(k.clone(), field(k, as_string(v))?);
                }
            }
        }
        Ok(md)
    }

    /// Decode from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(&value)
    }

    /// Read a record from a stream and bind it to an optional parent
    pub fn from_reader(mut reader: impl Read, parent: Option<Arc<RawMetadata>>) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let mut md = Self::from_slice(&bytes)?;
        md.parent = parent;
        Ok(md)
    }

    /// Read a record from a file and bind it to an optional parent
    pub fn from_file(path: impl AsRef<Path>, parent: Option<Arc<RawMetadata>>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut md = Self::from_slice(&bytes)
            .map_err(|e| Error::malformed(format!("{}: {e}", path.display())))?;
        md.parent = parent;
        Ok(md)
    }

    /// Write the locally stored fields to a file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = serde_json::to_vec(&self.to_stored_json())?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Empty strings count as unset
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn field<T>(key: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| Error::malformed(format!("{key}: {e}")))
}

impl Serialize for RawMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json(true).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}
