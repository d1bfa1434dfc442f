//! Process-local path id cache and bulk path registration
//!
//! New path strings are registered in bulk: a block of ids is reserved up
//! front, then a producer thread feeds `(id, path)` pairs through a bounded
//! channel into a single bulk-load transaction running on the caller's
//! thread.
//!
//! Only the local cache is consulted before reserving ids, so the cache is
//! preloaded from the path index when a store opens. Two processes, or one
//! process after its cache was cleared, can still register the same string
//! under different ids; the path index keeps the first one.

use crate::db::{DbResult, ObsDb};
use crate::model::Path;
use crate::tables::SEQ_PATHS;
use crossbeam_channel::{Receiver, bounded};
use pto_common::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Path string → path id
#[derive(Debug, Default)]
pub struct PathCache {
    ids: HashMap<String, u64>,
}

impl PathCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<u64> {
        self.ids.get(path).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Warm the cache with every path in the index
    pub fn preload(&mut self, db: &ObsDb) -> Result<usize> {
        self.ids.extend(db.load_paths()?);
        Ok(self.ids.len())
    }

    /// Forget every cached id
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Register every candidate not already cached.
    ///
    /// On return `candidates` holds exactly the strings registered by this
    /// call, which got consecutive ids in iteration order. Returns the
    /// number registered.
    pub fn cache_new_paths(
        &mut self,
        db: &ObsDb,
        candidates: &mut BTreeSet<String>,
        channel_capacity: usize,
    ) -> Result<u64> {
        self.cache_new_paths_with(db, candidates, channel_capacity, |rx| {
            db.bulk_load_paths(rx)
        })
    }

    fn cache_new_paths_with(
        &mut self,
        db: &ObsDb,
        candidates: &mut BTreeSet<String>,
        channel_capacity: usize,
        loader: impl FnOnce(Receiver<(u64, String)>) -> DbResult<u64>,
    ) -> Result<u64> {
        candidates.retain(|p| !self.ids.contains_key(p));
        if candidates.is_empty() {
            return Ok(0);
        }

        let n = u64::try_from(candidates.len())
            .map_err(|_| Error::internal("too many candidate paths"))?;
        let first = db.reserve_ids(SEQ_PATHS, n)?;
        debug!("Registering {} new paths from id {}", n, first);

        let (tx, rx) = bounded::<(u64, String)>(channel_capacity.max(1));
        let (err_tx, err_rx) = bounded::<Error>(1);

        let ids = &mut self.ids;
        let paths = &*candidates;
        let loaded = std::thread::scope(|s| {
            s.spawn(move || {
                for (id, path) in (first..).zip(paths) {
                    ids.insert(path.clone(), id);
                    if tx.send((id, path.clone())).is_err() {
                        // Receiver gone: the bulk load stopped early
                        let _ = err_tx.send(Error::storage(format!(
                            "bulk path load stopped before path id {id}"
                        )));
                        return;
                    }
                }
            });
            loader(rx)
        });

        let producer_err = err_rx.try_recv().ok();
        let result = match (loaded, producer_err) {
            (Err(e), _) => Err(e.into()),
            (Ok(_), Some(e)) => Err(e),
            (Ok(loaded), None) if loaded != n => Err(Error::storage(format!(
                "bulk path load stored {loaded} of {n} paths"
            ))),
            (Ok(_), None) => Ok(n),
        };

        if result.is_err() {
            let reserved = first..first + n;
            self.ids.retain(|_, id| !reserved.contains(id));
            warn!("Bulk path registration failed; dropped ids {:?} from cache", reserved);
        }
        result
    }

    /// Resolve one path's id, registering it if needed
    pub fn resolve(&mut self, db: &ObsDb, path: &mut Path) -> Result<u64> {
        if path.id != 0 {
            return Ok(path.id);
        }
        if let Some(id) = self.get(&path.string) {
            path.id = id;
            return Ok(id);
        }

        let id = db.path_insert_once(&path.string)?;
        self.ids.insert(path.string.clone(), id);
        path.id = id;
        Ok(id)
    }
}
