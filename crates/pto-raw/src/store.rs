//! Registry of campaigns under the raw data root

use crate::campaign::{CAMPAIGN_METADATA_FILENAME, Campaign, is_plain_file_name};
use crate::metadata::RawMetadata;
use parking_lot::RwLock;
use pto_common::{Config, Error, Result};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw data store: one [`Campaign`] per marked subdirectory of the root
pub struct RawDataStore {
    config: Arc<Config>,
    root: PathBuf,
    campaigns: RwLock<HashMap<String, Arc<Campaign>>>,
}

impl std::fmt::Debug for RawDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDataStore")
            .field("root", &self.root)
            .field("campaigns", &self.campaigns.read().len())
            .finish()
    }
}

impl RawDataStore {
    /// Open the store at the configured root and scan it for campaigns
    pub fn open(config: Arc<Config>) -> Result<Self> {
        let root = config
            .raw
            .root
            .clone()
            .ok_or_else(|| Error::Configuration("raw.root is not set".to_string()))?;

        let store = Self {
            config,
            root,
            campaigns: RwLock::new(HashMap::new()),
        };
        store.scan()?;
        info!(
            "Opened raw data store at {:?} ({} campaigns)",
            store.root,
            store.campaigns.read().len()
        );
        Ok(store)
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the registry from the root directory. Campaigns that are
    /// still present keep their caches; new ones start unloaded. On error
    /// the registry is left as it was.
    ///
    /// The write lock is held for the whole listing, so a concurrent
    /// [`create_campaign`](Self::create_campaign) either lands before the
    /// scan or registers after it.
    pub fn scan(&self) -> Result<()> {
        let mut campaigns = self.campaigns.write();
        let mut found = HashMap::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let dir_name = entry.file_name();
            let Some(name) = dir_name.to_str() else {
                warn!("Skipping non-UTF-8 directory {:?}", entry.path());
                continue;
            };

            match fs::metadata(entry.path().join(CAMPAIGN_METADATA_FILENAME)) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("Skipping {:?}: no campaign metadata", entry.path());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let campaign = campaigns.get(name).map_or_else(
                || Arc::new(Campaign::new(Arc::clone(&self.config), &self.root, name)),
                Arc::clone,
            );
            found.insert(name.to_string(), campaign);
        }

        debug!("Scanned {:?}: {} campaigns", self.root, found.len());
        *campaigns = found;
        Ok(())
    }

    /// Create a new campaign with its metadata and register it.
    ///
    /// The directory is created without holding the registry lock;
    /// `create_dir` decides which of two racing creators wins. If a scan
    /// registered the directory in the meantime, that instance is kept and
    /// returned.
    pub fn create_campaign(&self, name: &str, md: RawMetadata) -> Result<Arc<Campaign>> {
        md.validate(true)?;
        if !is_plain_file_name(name) || name.starts_with('.') {
            return Err(Error::malformed(format!("bad campaign name {name:?}")));
        }

        if self.campaigns.read().contains_key(name) {
            return Err(Error::already_exists("campaign", name));
        }

        let created = Arc::new(Campaign::create(
            Arc::clone(&self.config),
            &self.root,
            name,
            md,
        )?);

        let campaign = Arc::clone(
            self.campaigns
                .write()
                .entry(name.to_string())
                .or_insert(created),
        );
        Ok(campaign)
    }

    /// Look up a registered campaign
    pub fn campaign_for_name(&self, name: &str) -> Result<Arc<Campaign>> {
        self.campaigns
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("campaign", name))
    }

    /// Names of all registered campaigns, in no particular order
    #[must_use]
    pub fn campaign_names(&self) -> Vec<String> {
        self.campaigns.read().keys().cloned().collect()
    }
}
