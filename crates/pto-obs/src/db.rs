//! Persistent observation database backed by redb.
//!
//! Id sequences live in their own table and are advanced inside the same
//! write transaction as the rows they number. Ids start at 1; 0 is never
//! handed out.

use crate::tables;
use pto_common::Error;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Error type for observation database operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for DbError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<DbError> for Error {
    fn from(e: DbError) -> Self {
        Self::storage(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Persisted observation set row
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSet {
    pub sources: Vec<String>,
    pub analyzer: String,
    pub metadata: BTreeMap<String, String>,
}

/// Persisted observation row; times are Unix seconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObservation {
    pub set_id: u64,
    pub start: i64,
    pub end: i64,
    pub path_id: u64,
    pub condition_id: u64,
    pub value: i64,
}

/// Observation database
pub struct ObsDb {
    db: Database,
}

impl ObsDb {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::SEQUENCES)?;
            let _t = write_txn.open_table(tables::PATHS)?;
            let _t = write_txn.open_table(tables::PATH_INDEX)?;
            let _t = write_txn.open_table(tables::CONDITIONS)?;
            let _t = write_txn.open_table(tables::CONDITION_INDEX)?;
            let _t = write_txn.open_table(tables::OBSERVATION_SETS)?;
            let _t = write_txn.open_table(tables::OBSERVATIONS)?;
            let _t = write_txn.open_table(tables::SET_OBSERVATIONS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // ---- Sequences ----

    /// Reserve `n` consecutive ids from a sequence, returning the first
    pub fn reserve_ids(&self, seq: &str, n: u64) -> DbResult<u64> {
        let write_txn = self.db.begin_write()?;
        let first = reserve_in(&write_txn, seq, n)?;
        write_txn.commit()?;
        Ok(first)
    }

    // ---- Paths ----

    /// Load `(id, path)` pairs in one write transaction, usually from a
    /// channel receiver. The index keeps the first id seen for a string.
    pub fn bulk_load_paths(&self, rows: impl IntoIterator<Item = (u64, String)>) -> DbResult<u64> {
        let write_txn = self.db.begin_write()?;
        let mut loaded = 0;
        {
            let mut paths = write_txn.open_table(tables::PATHS)?;
            let mut index = write_txn.open_table(tables::PATH_INDEX)?;
            for (id, path) in rows {
                paths.insert(id, path.as_str())?;
                if index.get(path.as_str())?.is_none() {
                    index.insert(path.as_str(), id)?;
                }
                loaded += 1;
            }
        }
        write_txn.commit()?;
        debug!("Bulk loaded {} paths", loaded);
        Ok(loaded)
    }

    /// Every indexed path string with its canonical id
    pub fn load_paths(&self) -> DbResult<Vec<(String, u64)>> {
        self.load_index(tables::PATH_INDEX)
    }

    /// Id of a path string, registering it if needed
    pub fn path_insert_once(&self, path: &str) -> DbResult<u64> {
        self.insert_once(tables::PATHS, tables::PATH_INDEX, tables::SEQ_PATHS, path)
    }

    pub fn path_id(&self, path: &str) -> DbResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::PATH_INDEX)?;
        Ok(table.get(path)?.map(|v| v.value()))
    }

    pub fn path_string(&self, id: u64) -> DbResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::PATHS)?;
        Ok(table.get(id)?.map(|v| v.value().to_string()))
    }

    // ---- Conditions ----

    /// Id of a condition name, registering it if needed
    pub fn condition_insert_once(&self, name: &str) -> DbResult<u64> {
        self.insert_once(
            tables::CONDITIONS,
            tables::CONDITION_INDEX,
            tables::SEQ_CONDITIONS,
            name,
        )
    }

    pub fn condition_name(&self, id: u64) -> DbResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::CONDITIONS)?;
        Ok(table.get(id)?.map(|v| v.value().to_string()))
    }

    /// All registered conditions as `(name, id)`
    pub fn load_conditions(&self) -> DbResult<Vec<(String, u64)>> {
        self.load_index(tables::CONDITION_INDEX)
    }

    fn load_index(&self, index_def: TableDefinition<&str, u64>) -> DbResult<Vec<(String, u64)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(index_def)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (name, id) = entry?;
            result.push((name.value().to_string(), id.value()));
        }
        Ok(result)
    }

    // ---- Observation sets (bincode-encoded) ----

    /// Insert a new set, returning its id
    pub fn insert_set(&self, set: &StoredSet) -> DbResult<u64> {
        let bytes = bincode::serialize(set)?;
        let write_txn = self.db.begin_write()?;
        let id = reserve_in(&write_txn, tables::SEQ_OBSERVATION_SETS, 1)?;
        {
            let mut table = write_txn.open_table(tables::OBSERVATION_SETS)?;
            table.insert(id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(id)
    }

    /// Replace an existing set. Returns false if there is no such set.
    pub fn update_set(&self, id: u64, set: &StoredSet) -> DbResult<bool> {
        let bytes = bincode::serialize(set)?;
        let write_txn = self.db.begin_write()?;
        let exists = {
            let mut table = write_txn.open_table(tables::OBSERVATION_SETS)?;
            let exists = table.get(id)?.is_some();
            if exists {
                table.insert(id, bytes.as_slice())?;
            }
            exists
        };
        if exists {
            write_txn.commit()?;
        }
        Ok(exists)
    }

    pub fn load_set(&self, id: u64) -> DbResult<Option<StoredSet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::OBSERVATION_SETS)?;
        match table.get(id)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Ids of all sets, ascending
    pub fn set_ids(&self) -> DbResult<Vec<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::OBSERVATION_SETS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            result.push(entry?.0.value());
        }
        Ok(result)
    }

    // ---- Observations (bincode-encoded) ----

    /// Insert observation rows in one write transaction, returning their ids
    pub fn insert_observations(&self, rows: &[StoredObservation]) -> DbResult<Vec<u64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let write_txn = self.db.begin_write()?;
        let first = reserve_in(&write_txn, tables::SEQ_OBSERVATIONS, rows.len() as u64)?;
        let mut ids = Vec::with_capacity(rows.len());
        {
            let mut observations = write_txn.open_table(tables::OBSERVATIONS)?;
            let mut by_set = write_txn.open_table(tables::SET_OBSERVATIONS)?;
            for (id, row) in (first..).zip(rows) {
                let bytes = bincode::serialize(row)?;
                observations.insert(id, bytes.as_slice())?;
                by_set.insert((row.set_id, id), ())?;
                ids.push(id);
            }
        }
        write_txn.commit()?;
        Ok(ids)
    }

    pub fn load_observation(&self, id: u64) -> DbResult<Option<StoredObservation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::OBSERVATIONS)?;
        match table.get(id)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Ids of a set's observations, ascending
    pub fn set_observation_ids(&self, set_id: u64) -> DbResult<Vec<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::SET_OBSERVATIONS)?;
        let mut result = Vec::new();
        for entry in table.range((set_id, 0)..=(set_id, u64::MAX))? {
            result.push(entry?.0.value().1);
        }
        Ok(result)
    }

    /// A set's observations in id order, read in one transaction
    pub fn load_set_observations(&self, set_id: u64) -> DbResult<Vec<(u64, StoredObservation)>> {
        let read_txn = self.db.begin_read()?;
        let by_set = read_txn.open_table(tables::SET_OBSERVATIONS)?;
        let observations = read_txn.open_table(tables::OBSERVATIONS)?;
        let mut result = Vec::new();
        for entry in by_set.range((set_id, 0)..=(set_id, u64::MAX))? {
            let id = entry?.0.value().1;
            if let Some(bytes) = observations.get(id)? {
                result.push((id, bincode::deserialize(bytes.value())?));
            }
        }
        Ok(result)
    }

    pub fn count_set_observations(&self, set_id: u64) -> DbResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::SET_OBSERVATIONS)?;
        let mut count = 0;
        for entry in table.range((set_id, 0)..=(set_id, u64::MAX))? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    // ---- Generic helpers ----

    /// Find-or-insert a string in a (forward, index) table pair, all in one
    /// write transaction
    fn insert_once(
        &self,
        forward_def: TableDefinition<u64, &str>,
        index_def: TableDefinition<&str, u64>,
        seq: &str,
        value: &str,
    ) -> DbResult<u64> {
        let write_txn = self.db.begin_write()?;
        let existing = {
            let index = write_txn.open_table(index_def)?;
            index.get(value)?.map(|v| v.value())
        };
        if let Some(id) = existing {
            return Ok(id);
        }

        let id = reserve_in(&write_txn, seq, 1)?;
        {
            let mut forward = write_txn.open_table(forward_def)?;
            forward.insert(id, value)?;
            let mut index = write_txn.open_table(index_def)?;
            index.insert(value, id)?;
        }
        write_txn.commit()?;
        Ok(id)
    }
}

/// Advance a sequence by `n` inside an open write transaction
fn reserve_in(write_txn: &WriteTransaction, seq: &str, n: u64) -> DbResult<u64> {
    let mut table = write_txn.open_table(tables::SEQUENCES)?;
    let first = table.get(seq)?.map_or(1, |v| v.value());
    table.insert(seq, first + n)?;
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_db(dir: &Path) -> ObsDb {
        ObsDb::open(dir.join("obs.redb")).unwrap()
    }

    #[test]
    fn test_reserve_ids_contiguous() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        assert_eq!(db.reserve_ids(tables::SEQ_PATHS, 3).unwrap(), 1);
        assert_eq!(db.reserve_ids(tables::SEQ_PATHS, 2).unwrap(), 4);
        assert_eq!(db.reserve_ids(tables::SEQ_PATHS, 1).unwrap(), 6);
        // Sequences are independent
        assert_eq!(db.reserve_ids(tables::SEQ_CONDITIONS, 1).unwrap(), 1);
    }

    #[test]
    fn test_condition_insert_once() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        let a = db.condition_insert_once("pto.test.succeeded").unwrap();
        let b = db.condition_insert_once("pto.test.failed").unwrap();
        assert_ne!(a, b);
        assert_eq!(db.condition_insert_once("pto.test.succeeded").unwrap(), a);
        assert_eq!(
            db.condition_name(b).unwrap().as_deref(),
            Some("pto.test.failed")
        );
        assert_eq!(db.load_conditions().unwrap().len(), 2);
    }

    #[test]
    fn test_bulk_load_keeps_first_index_entry() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        let loaded = db
            .bulk_load_paths(vec![
                (1, "a * b".to_string()),
                (2, "c * d".to_string()),
                (3, "a * b".to_string()),
            ])
            .unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(db.path_id("a * b").unwrap(), Some(1));
        assert_eq!(db.path_string(3).unwrap().as_deref(), Some("a * b"));

        let mut indexed = db.load_paths().unwrap();
        indexed.sort();
        assert_eq!(
            indexed,
            vec![("a * b".to_string(), 1), ("c * d".to_string(), 2)]
        );
    }

    #[test]
    fn test_set_round_trip() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());

        let mut set = StoredSet {
            sources: vec!["https://example.org/raw/test/a.dat".to_string()],
            analyzer: "https://example.org/analyzer".to_string(),
            metadata: BTreeMap::new(),
        };
        let id = db.insert_set(&set).unwrap();
        assert_eq!(db.load_set(id).unwrap().as_ref(), Some(&set));

        set.metadata.insert("description".to_string(), "x".to_string());
        assert!(db.update_set(id, &set).unwrap());
        assert_eq!(db.load_set(id).unwrap(), Some(set.clone()));
        assert!(!db.update_set(id + 100, &set).unwrap());
        assert_eq!(db.set_ids().unwrap(), vec![id]);
    }

    #[test]
    fn test_observations_grouped_by_set() {
        let dir = tempdir().unwrap();
        let db = open_db(dir.path());
        let row = |set_id| StoredObservation {
            set_id,
            start: 0,
            end: 1,
            path_id: 1,
            condition_id: 1,
            value: 0,
        };

        let ids = db.insert_observations(&[row(1), row(2), row(1)]).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(db.set_observation_ids(1).unwrap(), vec![1, 3]);
        assert_eq!(db.count_set_observations(2).unwrap(), 1);
        assert_eq!(db.count_set_observations(3).unwrap(), 0);
        assert_eq!(db.load_observation(2).unwrap(), Some(row(2)));
        assert_eq!(db.load_set_observations(1).unwrap().len(), 2);
    }

    #[test]
    fn test_reopen_keeps_sequences() {
        let dir = tempdir().unwrap();
        {
            let db = open_db(dir.path());
            db.reserve_ids(tables::SEQ_OBSERVATIONS, 10).unwrap();
        }
        let db = open_db(dir.path());
        assert_eq!(db.reserve_ids(tables::SEQ_OBSERVATIONS, 1).unwrap(), 11);
    }
}
