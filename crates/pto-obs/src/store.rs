//! Observation store: sets, observations and their surrogate-key caches

use crate::codec::{read_observations, write_observations};
use crate::condition::ConditionCache;
use crate::db::ObsDb;
use crate::model::{Condition, Observation, ObservationSet, Path};
use crate::path::PathCache;
use parking_lot::Mutex;
use pto_common::{Config, Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Observation store
pub struct ObservationStore {
    config: Arc<Config>,
    db: ObsDb,
    paths: Mutex<PathCache>,
    conditions: ConditionCache,
}

impl std::fmt::Debug for ObservationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationStore")
            .field("database", &self.config.obs.database)
            .field("paths", &self.paths.lock().len())
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

impl ObservationStore {
    /// Open the configured observation database
    pub fn open(config: Arc<Config>) -> Result<Self> {
        let path = config
            .obs
            .database
            .clone()
            .ok_or_else(|| Error::Configuration("obs.database is not set".to_string()))?;
        let db = ObsDb::open(&path)?;

        let conditions = ConditionCache::new();
        let known_conditions = conditions.preload(&db)?;
        let mut paths = PathCache::new();
        let known_paths = paths.preload(&db)?;
        info!(
            "Opened observation store at {:?} ({} conditions, {} paths)",
            path, known_conditions, known_paths
        );

        Ok(Self {
            config,
            db,
            paths: Mutex::new(paths),
            conditions,
        })
    }

    /// Insert a set that has no id yet. A set that already has one is left
    /// untouched. Links are filled in either way.
    pub fn create_set(&self, set: &mut ObservationSet) -> Result<u64> {
        if set.id == 0 {
            set.id = self.db.insert_set(&set.to_stored())?;
            debug!("Created observation set {:016x}", set.id);
        }
        set.link_via(&self.config)?;
        Ok(set.id)
    }

    /// Load a set with its links and observation count
    pub fn set_by_id(&self, id: u64) -> Result<ObservationSet> {
        let stored = self
            .db
            .load_set(id)?
            .ok_or_else(|| set_not_found(id))?;

        let mut set = ObservationSet::from_stored(id, stored);
        set.set_count(self.db.count_set_observations(id)?);
        set.link_via(&self.config)?;
        Ok(set)
    }

    /// Ids of all sets, ascending
    pub fn set_ids(&self) -> Result<Vec<u64>> {
        Ok(self.db.set_ids()?)
    }

    /// Replace a set's sources, analyzer and extension metadata
    pub fn update_set_metadata(&self, id: u64, set: &ObservationSet) -> Result<ObservationSet> {
        if !self.db.update_set(id, &set.to_stored())? {
            return Err(set_not_found(id));
        }
        self.set_by_id(id)
    }

    /// Insert one observation, resolving its path and condition and
    /// creating the set first if it has no id
    pub fn insert_in_set(&self, obs: &mut Observation, set: &mut ObservationSet) -> Result<u64> {
        self.paths.lock().resolve(&self.db, &mut obs.path)?;
        self.conditions.resolve(&self.db, &mut obs.condition)?;
        self.create_set(set)?;

        obs.set_id = set.id;
        let ids = self.db.insert_observations(&[obs.to_stored()?])?;
        obs.id = ids
            .first()
            .copied()
            .ok_or_else(|| Error::internal("observation insert returned no id"))?;
        Ok(obs.id)
    }

    /// Load every observation in a stream into a set, returning the set's
    /// new observation count.
    ///
    /// The stream is decoded completely before anything is written; a
    /// malformed line inserts no observations. Set ids in the stream are
    /// replaced by `set_id`.
    pub fn ingest_stream(&self, set_id: u64, reader: impl BufRead) -> Result<u64> {
        if self.db.load_set(set_id)?.is_none() {
            return Err(set_not_found(set_id));
        }

        let mut observations = read_observations(reader)?;

        {
            let mut paths = self.paths.lock();
            let mut candidates: BTreeSet<String> =
                observations.iter().map(|o| o.path.string.clone()).collect();
            paths.cache_new_paths(&self.db, &mut candidates, self.config.obs.bulk_channel_capacity)?;

            for obs in &mut observations {
                obs.path.id = paths.get(&obs.path.string).ok_or_else(|| {
                    Error::internal(format!("path {:?} missing after registration", obs.path.string))
                })?;
            }
        }

        let mut rows = Vec::with_capacity(observations.len());
        for obs in &mut observations {
            self.conditions.resolve(&self.db, &mut obs.condition)?;
            obs.set_id = set_id;
            rows.push(obs.to_stored()?);
        }

        self.db.insert_observations(&rows)?;
        let count = self.db.count_set_observations(set_id)?;
        debug!(
            "Ingested {} observations into set {:016x} ({} total)",
            rows.len(),
            set_id,
            count
        );
        Ok(count)
    }

    /// Write a set's observations as a stream in id order, returning the
    /// number written
    pub fn write_set_observations(&self, set_id: u64, writer: impl Write) -> Result<u64> {
        if self.db.load_set(set_id)?.is_none() {
            return Err(set_not_found(set_id));
        }

        let mut path_strings = HashMap::new();
        let mut condition_names = HashMap::new();
        let mut observations = Vec::new();
        for (id, stored) in self.db.load_set_observations(set_id)? {
            let path = self.path_for_id(stored.path_id, &mut path_strings)?;
            let condition = self.condition_for_id(stored.condition_id, &mut condition_names)?;
            observations.push(Observation::from_stored(id, &stored, path, condition)?);
        }

        write_observations(writer, &observations)
    }

    /// Load a single observation
    pub fn observation_by_id(&self, id: u64) -> Result<Observation> {
        let stored = self
            .db
            .load_observation(id)?
            .ok_or_else(|| Error::not_found("observation", id.to_string()))?;
        let path = self.path_for_id(stored.path_id, &mut HashMap::new())?;
        let condition = self.condition_for_id(stored.condition_id, &mut HashMap::new())?;
        Observation::from_stored(id, &stored, path, condition)
    }

    fn path_for_id(&self, id: u64, seen: &mut HashMap<u64, String>) -> Result<Path> {
        if let Some(string) = seen.get(&id) {
            return Ok(Path {
                id,
                string: string.clone(),
            });
        }
        let string = self
            .db
            .path_string(id)?
            .ok_or_else(|| Error::storage(format!("dangling path id {id}")))?;
        seen.insert(id, string.clone());
        Ok(Path { id, string })
    }

    fn condition_for_id(&self, id: u64, seen: &mut HashMap<u64, String>) -> Result<Condition> {
        if let Some(name) = seen.get(&id) {
            return Ok(Condition {
                id,
                name: name.clone(),
            });
        }
        let name = self
            .db
            .condition_name(id)?
            .ok_or_else(|| Error::storage(format!("dangling condition id {id}")))?;
        seen.insert(id, name.clone());
        Ok(Condition { id, name })
    }
}

fn set_not_found(id: u64) -> Error {
    Error::not_found("observation set", format!("{id:016x}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::SEQ_PATHS;
    use std::path::Path as FsPath;
    use tempfile::tempdir;

    const LINE: &str = r#"[0,"2009-02-20T13:00:34Z","2009-02-20T13:15:17Z","1.2.3.4 * 5.6.7.8","pto.test.succeeded"]"#;

    const STREAM: &str = r#"[31337, "2017-10-01T10:06:00Z", "2017-10-01T10:06:00Z", "10.0.0.1 * 10.0.0.2", "pto.test.succeeded"]
	[31337, "2017-10-01T10:06:01Z", "2017-10-01T10:06:02Z", "10.0.0.1 AS1 * AS2 10.0.0.2", "pto.test.schroedinger"]
	[31337, "2017-10-01T10:06:03Z", "2017-10-01T10:06:05Z", "* AS2 10.0.0.0/24", "pto.test.failed"]
	[31337, "2017-10-01T10:06:07Z", "2017-10-01T10:06:11Z", "[2001:db8::33:a4] * [2001:db8:3]/64", "pto.test.succeeded"]
	[31337, "2017-10-01T10:06:09Z", "2017-10-01T10:06:14Z", "[2001:db8::33:a4] * [2001:db8:3]/64", "pto.test.succeeded"]"#;

    fn open_store(dir: &FsPath) -> ObservationStore {
        let config = Config {
            base_url: "https://pto.example.org/".to_string(),
            ..Default::default()
        }
        .with_database(dir.join("obs.redb"));
        ObservationStore::open(Arc::new(config)).unwrap()
    }

    fn test_set() -> ObservationSet {
        let mut set = ObservationSet::new(
            vec!["https://pto.example.org/raw/test001.json".to_string()],
            "https://pto.example.org/analysis/passthrough",
        );
        set.insert("description", "test set").unwrap();
        set
    }

    #[test]
    fn test_open_requires_database() {
        let err = ObservationStore::open(Arc::new(Config::default())).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_insert_in_set_end_to_end() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut obs: Observation = serde_json::from_str(LINE).unwrap();
        let mut set = test_set();
        let obs_id = store.insert_in_set(&mut obs, &mut set).unwrap();
        assert_ne!(set.id, 0);
        assert_ne!(obs.path.id, 0);
        assert_ne!(obs.condition.id, 0);

        let loaded = store.observation_by_id(obs_id).unwrap();
        assert_eq!(loaded.set_id, set.id);
        let encoded = serde_json::to_string(&loaded).unwrap();
        let tail = |s: &str| s.split_once(',').map(|(_, rest)| rest.to_string());
        assert_eq!(tail(&encoded), tail(LINE));
        assert!(encoded.starts_with(&format!("[{},", set.id)));
    }

    #[test]
    fn test_insert_keeps_existing_set_id() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut set = test_set();
        let id = store.create_set(&mut set).unwrap();
        let mut obs: Observation = serde_json::from_str(LINE).unwrap();
        store.insert_in_set(&mut obs, &mut set).unwrap();

        assert_eq!(set.id, id);
        assert_eq!(store.set_ids().unwrap(), vec![id]);
    }

    #[test]
    fn test_set_round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut set = test_set();
        let id = store.create_set(&mut set).unwrap();
        assert_eq!(
            set.link(),
            Some(format!("https://pto.example.org/obs/{id:016x}").as_str())
        );

        let loaded = store.set_by_id(id).unwrap();
        assert_eq!(loaded.analyzer, set.analyzer);
        assert_eq!(loaded.sources, set.sources);
        assert_eq!(loaded.get("description"), Some("test set"));
        assert_eq!(loaded.count(), Some(0));

        let mut changed = loaded.clone();
        changed.insert("description", "updated").unwrap();
        let updated = store.update_set_metadata(id, &changed).unwrap();
        assert_eq!(updated.get("description"), Some("updated"));

        assert!(store.set_by_id(id + 1).unwrap_err().is_not_found());
        assert!(store.update_set_metadata(id + 1, &changed).unwrap_err().is_not_found());
    }

    #[test]
    fn test_ingest_and_export_stream() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut set = test_set();
        let id = store.create_set(&mut set).unwrap();
        assert_eq!(store.ingest_stream(id, STREAM.as_bytes()).unwrap(), 5);
        assert_eq!(store.set_by_id(id).unwrap().count(), Some(5));

        let mut out = Vec::new();
        assert_eq!(store.write_set_observations(id, &mut out).unwrap(), 5);

        let exported = read_observations(out.as_slice()).unwrap();
        let ingested = read_observations(STREAM.as_bytes()).unwrap();
        assert_eq!(exported.len(), ingested.len());
        for (e, i) in exported.iter().zip(&ingested) {
            assert_eq!(e.set_id, id);
            assert_eq!(e.start, i.start);
            assert_eq!(e.end, i.end);
            assert_eq!(e.path.string, i.path.string);
            assert_eq!(e.condition.name, i.condition.name);
        }

        // Shared path strings share an id
        assert_eq!(exported[3].path.id, exported[4].path.id);
    }

    #[test]
    fn test_ingest_malformed_inserts_nothing() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut set = test_set();
        let id = store.create_set(&mut set).unwrap();
        let stream = format!("{STREAM}\n[31337, \"2017-10-01T10:06:00Z\"]\n");
        let err = store.ingest_stream(id, stream.as_bytes()).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(store.set_by_id(id).unwrap().count(), Some(0));
    }

    #[test]
    fn test_ingest_unknown_set() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let err = store.ingest_stream(42, STREAM.as_bytes()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ingest_twice_reuses_paths() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut set = test_set();
        let id = store.create_set(&mut set).unwrap();
        store.ingest_stream(id, STREAM.as_bytes()).unwrap();
        let paths_after_first = store.paths.lock().len();
        assert_eq!(paths_after_first, 4);

        assert_eq!(store.ingest_stream(id, STREAM.as_bytes()).unwrap(), 10);
        assert_eq!(store.paths.lock().len(), paths_after_first);
        assert_eq!(store.conditions.len(), 3);
    }

    #[test]
    fn test_reopen_preloads_conditions() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(dir.path());
            let mut set = test_set();
            let id = store.create_set(&mut set).unwrap();
            store.ingest_stream(id, STREAM.as_bytes()).unwrap();
        }
        let store = open_store(dir.path());
        assert_eq!(store.conditions.len(), 3);
    }

    #[test]
    fn test_reopen_reuses_registered_paths() {
        let dir = tempdir().unwrap();
        let id = {
            let store = open_store(dir.path());
            let mut set = test_set();
            let id = store.create_set(&mut set).unwrap();
            store.ingest_stream(id, STREAM.as_bytes()).unwrap();
            id
        };

        let store = open_store(dir.path());
        assert_eq!(store.paths.lock().len(), 4);
        assert_eq!(store.ingest_stream(id, STREAM.as_bytes()).unwrap(), 10);
        assert_eq!(store.paths.lock().len(), 4);
        // No path ids were handed out by the second ingest
        assert_eq!(store.db.reserve_ids(SEQ_PATHS, 1).unwrap(), 5);
    }

    #[test]
    fn test_store_debug_names_database() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let text = format!("{store:?}");
        assert!(text.starts_with("ObservationStore"), "{text}");
        assert!(text.contains("obs.redb"), "{text}");
    }
}
