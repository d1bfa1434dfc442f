//! Process-local condition id cache

use crate::db::ObsDb;
use crate::model::Condition;
use parking_lot::RwLock;
use pto_common::Result;
use std::collections::HashMap;

/// Condition name → condition id, filled on demand
#[derive(Debug, Default)]
pub struct ConditionCache {
    ids: RwLock<HashMap<String, u64>>,
}

impl ConditionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Warm the cache with every condition already in the database
    pub fn preload(&self, db: &ObsDb) -> Result<usize> {
        let conditions = db.load_conditions()?;
        let mut ids = self.ids.write();
        ids.extend(conditions);
        Ok(ids.len())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.ids.read().get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }

    /// Resolve a condition's id, inserting the name into the database if
    /// it was never seen
    pub fn resolve(&self, db: &ObsDb, condition: &mut Condition) -> Result<u64> {
        if condition.id != 0 {
            return Ok(condition.id);
        }

        let id = match self.get(&condition.name) {
            Some(id) => id,
            None => {
                let id = db.condition_insert_once(&condition.name)?;
                self.ids.write().insert(condition.name.clone(), id);
                id
            }
        };
        condition.id = id;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_find_or_insert() {
        let dir = tempdir().unwrap();
        let db = ObsDb::open(dir.path().join("obs.redb")).unwrap();
        let cache = ConditionCache::new();

        let mut a = Condition::new("pto.test.succeeded");
        let mut b = Condition::new("pto.test.succeeded");
        let mut c = Condition::new("pto.test.failed");
        let id = cache.resolve(&db, &mut a).unwrap();
        assert_eq!(cache.resolve(&db, &mut b).unwrap(), id);
        assert_ne!(cache.resolve(&db, &mut c).unwrap(), id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_preload_from_database() {
        let dir = tempdir().unwrap();
        let db = ObsDb::open(dir.path().join("obs.redb")).unwrap();
        let id = db.condition_insert_once("pto.test.schroedinger").unwrap();

        let cache = ConditionCache::new();
        assert_eq!(cache.preload(&db).unwrap(), 1);
        assert_eq!(cache.get("pto.test.schroedinger"), Some(id));
    }
}
