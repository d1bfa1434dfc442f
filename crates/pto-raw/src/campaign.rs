//! A single campaign directory and its metadata cache
//!
//! Campaign and file metadata are loaded lazily from disk and kept behind
//! one read/write lock. Readers reload on demand, then hold a shared lock;
//! reloads and metadata writes hold the exclusive lock for the whole
//! read-modify-write span, so metadata files are written one at a time.
//!
//! # Directory layout
//!
//! ```text
//! <raw root>/<campaign>/
//!   __pto_campaign_metadata.json        campaign metadata
//!   <file>                              data file
//!   <file>.pto_file_metadata.json       file metadata sidecar
//! ```

use crate::metadata::RawMetadata;
use chrono::{DateTime, Utc};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use pto_common::{Config, Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Name of the campaign metadata file in each campaign directory
pub const CAMPAIGN_METADATA_FILENAME: &str = "__pto_campaign_metadata.json";

/// Suffix of each file metadata sidecar
pub const FILE_METADATA_SUFFIX: &str = ".pto_file_metadata.json";

/// Filetype of a raw file together with its registered MIME type
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawFiletype {
    pub file_type: String,
    #[serde(rename = "mime_type")]
    pub content_type: String,
}

/// Observable state of a campaign's metadata cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing cached; the next access reloads from disk
    Stale,
    /// Campaign and file metadata cached
    Loaded,
}

enum CacheState {
    Stale,
    Loaded(LoadedMetadata),
}

impl CacheState {
    fn loaded(&self) -> Option<&LoadedMetadata> {
        match self {
            Self::Loaded(m) => Some(m),
            Self::Stale => None,
        }
    }

    fn loaded_mut(&mut self) -> Option<&mut LoadedMetadata> {
        match self {
            Self::Loaded(m) => Some(m),
            Self::Stale => None,
        }
    }
}

struct LoadedMetadata {
    campaign: Arc<RawMetadata>,
    /// File records without a parent; keys are the known file names
    files: BTreeMap<String, RawMetadata>,
}

impl LoadedMetadata {
    fn file_with_parent(&self, name: &str) -> Option<RawMetadata> {
        self.files.get(name).map(|md| {
            let mut md = md.clone();
            md.set_parent(Some(Arc::clone(&self.campaign)));
            md
        })
    }
}

/// A campaign in the raw data store
pub struct Campaign {
    config: Arc<Config>,
    name: String,
    path: PathBuf,
    state: RwLock<CacheState>,
}

impl Campaign {
    /// Bind a (stale) campaign to its directory under the raw root
    pub(crate) fn new(config: Arc<Config>, root: &Path, name: &str) -> Self {
        Self {
            config,
            name: name.to_string(),
            path: root.join(name),
            state: RwLock::new(CacheState::Stale),
        }
    }

    /// Create the campaign directory and metadata file, then load it
    pub(crate) fn create(
        config: Arc<Config>,
        root: &Path,
        name: &str,
        mut md: RawMetadata,
    ) -> Result<Self> {
        md.clear_derived();
        md.validate(true)?;

        let cam = Self::new(config, root, name);
        match fs::create_dir(&cam.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::already_exists("campaign", name));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = md.write_to_file(cam.path.join(CAMPAIGN_METADATA_FILENAME)) {
            if let Err(cleanup) = fs::remove_dir(&cam.path) {
                warn!("Failed to remove partial campaign {:?}: {}", cam.path, cleanup);
            }
            return Err(e);
        }

        cam.reload(true)?;
        info!("Created campaign {} at {:?}", name, cam.path);
        Ok(cam)
    }

    /// Campaign name (the directory name)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Campaign directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn cache_state(&self) -> CacheStatus {
        match *self.state.read() {
            CacheState::Stale => CacheStatus::Stale,
            CacheState::Loaded(_) => CacheStatus::Loaded,
        }
    }

    /// Reload metadata from disk if stale (or always, if forced)
    pub fn reload(&self, force: bool) -> Result<()> {
        let mut state = self.state.write();
        self.reload_locked(&mut state, force)
    }

    /// Drop both caches; the next access reloads from disk
    pub fn unload(&self) {
        *self.state.write() = CacheState::Stale;
        debug!("Unloaded campaign {}", self.name);
    }

    fn reload_locked(&self, state: &mut CacheState, force: bool) -> Result<()> {
        if !force && matches!(state, CacheState::Loaded(_)) {
            return Ok(());
        }

        match self.load_from_disk() {
            Ok(loaded) => {
                debug!(
                    "Loaded campaign {} ({} files)",
                    self.name,
                    loaded.files.len()
                );
                *state = CacheState::Loaded(loaded);
                Ok(())
            }
            Err(e) => {
                *state = CacheState::Stale;
                Err(e)
            }
        }
    }

    fn load_from_disk(&self) -> Result<LoadedMetadata> {
        let campaign = Arc::new(RawMetadata::from_file(
            self.path.join(CAMPAIGN_METADATA_FILENAME),
            None,
        )?);

        let mut files = BTreeMap::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let entry_name = entry.file_name();
            let Some(entry_name) = entry_name.to_str() else {
                warn!("Skipping non-UTF-8 entry {:?} in campaign {}", entry_name, self.name);
                continue;
            };
            let Some(file_name) = entry_name.strip_suffix(FILE_METADATA_SUFFIX) else {
                continue;
            };
            if !is_data_name(file_name) {
                warn!(
                    "Skipping metadata file {:?} in campaign {}: not a data file name",
                    entry_name, self.name
                );
                continue;
            }

            let mut md = RawMetadata::from_file(entry.path(), None)?;
            self.update_virtual_metadata(file_name, &mut md)?;
            files.insert(file_name.to_string(), md);
        }

        Ok(LoadedMetadata { campaign, files })
    }

    /// Shared access to the loaded caches, reloading first if stale
    fn read_loaded(&self) -> Result<MappedRwLockReadGuard<'_, LoadedMetadata>> {
        if let Ok(loaded) = RwLockReadGuard::try_map(self.state.read(), CacheState::loaded) {
            return Ok(loaded);
        }

        let mut state = self.state.write();
        self.reload_locked(&mut state, false)?;
        RwLockReadGuard::try_map(RwLockWriteGuard::downgrade(state), CacheState::loaded)
            .map_err(|_| Error::internal(format!("campaign {} unloaded during read", self.name)))
    }

    /// Exclusive access to the loaded caches, reloading first if stale
    fn write_loaded(&self) -> Result<MappedRwLockWriteGuard<'_, LoadedMetadata>> {
        let mut state = self.state.write();
        self.reload_locked(&mut state, false)?;
        RwLockWriteGuard::try_map(state, CacheState::loaded_mut)
            .map_err(|_| Error::internal(format!("campaign {} unloaded during write", self.name)))
    }

    /// Metadata for this campaign
    pub fn campaign_metadata(&self) -> Result<Arc<RawMetadata>> {
        Ok(Arc::clone(&self.read_loaded()?.campaign))
    }

    /// Replace this campaign's metadata
    pub fn put_campaign_metadata(&self, mut md: RawMetadata) -> Result<()> {
        md.clear_derived();
        md.validate(true)?;

        let mut loaded = self.write_loaded()?;
        md.write_to_file(self.path.join(CAMPAIGN_METADATA_FILENAME))?;
        loaded.campaign = Arc::new(md);
        Ok(())
    }

    /// Names of the files in this campaign, sorted
    pub fn file_names(&self) -> Result<Vec<String>> {
        Ok(self.read_loaded()?.files.keys().cloned().collect())
    }

    /// Metadata for a file, bound to the current campaign metadata
    pub fn file_metadata(&self, name: &str) -> Result<RawMetadata> {
        self.read_loaded()?
            .file_with_parent(name)
            .ok_or_else(|| Error::not_found("file", name))
    }

    /// Create or replace the metadata for a file. Returns the stored record
    /// with virtual metadata filled in.
    pub fn put_file_metadata(&self, name: &str, mut md: RawMetadata) -> Result<RawMetadata> {
        let sidecar = self.sidecar_path(name)?;

        let mut loaded = self.write_loaded()?;
        md.clear_derived();
        md.set_parent(Some(Arc::clone(&loaded.campaign)));
        if md.file_type(true).is_none() {
            return Err(Error::missing_field("file_type"));
        }

        md.write_to_file(&sidecar)?;

        md.set_parent(None);
        self.update_virtual_metadata(name, &mut md)?;
        loaded.files.insert(name.to_string(), md);

        loaded
            .file_with_parent(name)
            .ok_or_else(|| Error::internal(format!("file {name} vanished from cache")))
    }

    /// Filetype of a file, if it is registered with a MIME type
    pub fn file_type(&self, name: &str) -> Result<Option<RawFiletype>> {
        let md = self.file_metadata(name)?;
        Ok(md.file_type(true).and_then(|ft| {
            self.config.content_type(ft).map(|ct| RawFiletype {
                file_type: ft.to_string(),
                content_type: ct.to_string(),
            })
        }))
    }

    /// Open a file's data for reading
    pub fn read_file_data(&self, name: &str) -> Result<File> {
        let path = self.data_path(name)?;
        File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::not_found("file data", name)
            } else {
                e.into()
            }
        })
    }

    /// Copy a file's data to a writer, returning the number of bytes copied
    pub fn read_file_data_to(&self, name: &str, out: &mut impl Write) -> Result<u64> {
        let mut file = self.read_file_data(name)?;
        Ok(io::copy(&mut file, out)?)
    }

    /// Store a file's data from a reader. An existing data file is only
    /// replaced when `force` is set. The file's metadata must exist first.
    ///
    /// The copy runs without holding the campaign lock; only the virtual
    /// metadata update afterwards takes it.
    pub fn write_file_data(&self, name: &str, force: bool, mut data: impl Read) -> Result<u64> {
        let path = self.data_path(name)?;
        if !self.read_loaded()?.files.contains_key(name) {
            return Err(Error::not_found("file", name));
        }

        let mut file = if force {
            File::create(&path)?
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        Error::already_exists("file data", name)
                    } else {
                        e.into()
                    }
                })?
        };

        let written = io::copy(&mut data, &mut file)?;
        file.sync_all()?;
        drop(file);
        debug!("Wrote {} bytes to {}/{}", written, self.name, name);

        let mut loaded = self.write_loaded()?;
        if let Some(md) = loaded.files.get_mut(name) {
            self.update_virtual_metadata(name, md)?;
        }
        Ok(written)
    }

    /// Recompute a file's virtual metadata from the filesystem. The caller
    /// must hold the exclusive lock when `md` is in the cache.
    fn update_virtual_metadata(&self, name: &str, md: &mut RawMetadata) -> Result<()> {
        // Data files are immutable once written, so their modification time
        // is the file's creation time.
        let (data_size, created) = match fs::metadata(self.data_path(name)?) {
            Ok(meta) => (meta.len(), Some(to_utc(meta.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (0, None),
            Err(e) => return Err(e.into()),
        };

        let modified = to_utc(fs::metadata(self.sidecar_path(name)?)?.modified()?);
        let link = self
            .config
            .link_to(&format!("raw/{}/{}/data", self.name, name))?;

        md.set_virtual(link, data_size, created, Some(modified));
        Ok(())
    }

    /// Path of a file's data, which must lie directly in the campaign directory
    fn data_path(&self, name: &str) -> Result<PathBuf> {
        if !is_data_name(name) {
            return Err(Error::internal(format!(
                "file name {name:?} does not resolve inside campaign {}",
                self.name
            )));
        }

        let path = self.path.join(name);
        if path.parent() != Some(self.path.as_path()) {
            return Err(Error::internal(format!(
                "path {} escapes campaign {}",
                path.display(),
                self.name
            )));
        }
        Ok(path)
    }

    fn sidecar_path(&self, name: &str) -> Result<PathBuf> {
        self.data_path(name)?;
        Ok(self.path.join(format!("{name}{FILE_METADATA_SUFFIX}")))
    }
}

impl std::fmt::Debug for Campaign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Campaign")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.cache_state())
            .finish()
    }
}

/// True if `name` is exactly one normal path component
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == OsStr::new(name)
    )
}

/// True if `name` can hold data, without colliding with a metadata file
fn is_data_name(name: &str) -> bool {
    is_plain_file_name(name)
        && name != CAMPAIGN_METADATA_FILENAME
        && !name.ends_with(FILE_METADATA_SUFFIX)
}

fn to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config() -> Arc<Config> {
        let mut config = Config {
            base_url: "https://pto.example.org/".to_string(),
            ..Default::default()
        };
        config
            .raw
            .content_types
            .insert("x".to_string(), "application/x-test".to_string());
        Arc::new(config)
    }

    fn create_test_campaign(root: &Path) -> Campaign {
        Campaign::create(
            test_config(),
            root,
            "test",
            RawMetadata::new().with_owner("alice"),
        )
        .unwrap()
    }

    fn file_md() -> RawMetadata {
        RawMetadata::new()
            .with_file_type("x")
            .with_time_start(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .with_time_end(Utc.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap())
    }

    #[test]
    fn test_put_file_and_data() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());

        cam.put_file_metadata("a.dat", file_md()).unwrap();
        let written = cam
            .write_file_data("a.dat", false, &b"0123456789"[..])
            .unwrap();
        assert_eq!(written, 10);

        let md = cam.file_metadata("a.dat").unwrap();
        assert_eq!(md.data_size(), 10);
        assert_eq!(md.owner(true), Some("alice"));
        assert_eq!(md.owner(false), None);
        assert_eq!(
            md.data_link(),
            Some("https://pto.example.org/raw/test/a.dat/data")
        );

        let data_mtime = fs::metadata(dir.path().join("test/a.dat"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(md.created(), Some(DateTime::<Utc>::from(data_mtime)));

        let mut out = Vec::new();
        cam.read_file_data_to("a.dat", &mut out).unwrap();
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn test_modified_clamped_when_sidecar_older() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        cam.put_file_metadata("a.dat", file_md()).unwrap();
        cam.write_file_data("a.dat", false, &b"data"[..]).unwrap();

        // Age the sidecar well before the data file
        let sidecar = dir.path().join("test").join(format!("a.dat{FILE_METADATA_SUFFIX}"));
        let old = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&sidecar)
            .unwrap()
            .set_modified(old)
            .unwrap();

        cam.reload(true).unwrap();
        let md = cam.file_metadata("a.dat").unwrap();
        assert!(md.created().is_some());
        assert_eq!(md.modified(), md.created());
    }

    #[test]
    fn test_missing_data_has_no_creation_time() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        let md = cam.put_file_metadata("b.dat", file_md()).unwrap();
        assert_eq!(md.data_size(), 0);
        assert_eq!(md.created(), None);
        assert!(md.modified().is_some());
    }

    #[test]
    fn test_write_refuses_overwrite_unless_forced() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        cam.put_file_metadata("a.dat", file_md()).unwrap();
        cam.write_file_data("a.dat", false, &b"first"[..]).unwrap();

        let err = cam
            .write_file_data("a.dat", false, &b"second"[..])
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));

        cam.write_file_data("a.dat", true, &b"second!"[..]).unwrap();
        assert_eq!(cam.file_metadata("a.dat").unwrap().data_size(), 7);
    }

    #[test]
    fn test_write_data_requires_metadata() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        let err = cam
            .write_file_data("nometa.dat", false, &b"x"[..])
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("test/nometa.dat").exists());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("secret"), b"top secret").unwrap();
        let cam = create_test_campaign(dir.path());

        for name in ["../secret", "sub/file", "/etc/passwd", "..", ".", ""] {
            let err = cam.read_file_data(name).unwrap_err();
            assert!(matches!(err, Error::Internal(_)), "{name:?} gave {err:?}");
            assert!(!err.is_client_error());
        }

        let err = cam
            .write_file_data("../escape", true, &b"x"[..])
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(!dir.path().join("escape").exists());

        let err = cam.put_file_metadata("../secret", file_md()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_metadata_names_are_not_data() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        let err = cam.read_file_data(CAMPAIGN_METADATA_FILENAME).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_put_file_requires_file_type() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        let err = cam
            .put_file_metadata("a.dat", RawMetadata::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingField(f) if f == "file_type"));
        assert!(cam.file_names().unwrap().is_empty());

        let empty = RawMetadata::from_slice(
            br#"{"_file_type": "", "_time_start": "2020-01-01T00:00:00Z", "_time_end": "2020-01-01T01:00:00Z"}"#,
        )
        .unwrap();
        let err = cam.put_file_metadata("a.dat", empty).unwrap_err();
        assert!(matches!(err, Error::MissingField(f) if f == "file_type"));
    }

    #[test]
    fn test_file_type_inherited_from_campaign() {
        let dir = tempdir().unwrap();
        let cam = Campaign::create(
            test_config(),
            dir.path(),
            "typed",
            RawMetadata::new().with_owner("alice").with_file_type("x"),
        )
        .unwrap();

        cam.put_file_metadata("a.dat", RawMetadata::new()).unwrap();
        assert_eq!(
            cam.file_type("a.dat").unwrap(),
            Some(RawFiletype {
                file_type: "x".to_string(),
                content_type: "application/x-test".to_string(),
            })
        );
    }

    #[test]
    fn test_file_names_sorted() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        for name in ["c.dat", "a.dat", "b.dat"] {
            cam.put_file_metadata(name, file_md()).unwrap();
        }
        assert_eq!(cam.file_names().unwrap(), vec!["a.dat", "b.dat", "c.dat"]);
    }

    #[test]
    fn test_nested_sidecar_name_skipped() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        cam.put_file_metadata("a.dat", file_md()).unwrap();

        let odd = format!("x{FILE_METADATA_SUFFIX}{FILE_METADATA_SUFFIX}");
        fs::write(cam.path.join(&odd), br#"{"_file_type": "test"}"#).unwrap();
        fs::write(cam.path.join(FILE_METADATA_SUFFIX), b"{}").unwrap();
        cam.unload();

        assert_eq!(cam.file_names().unwrap(), vec!["a.dat"]);
        assert!(cam.file_metadata("a.dat").is_ok());
    }

    #[test]
    fn test_unload_and_reload_from_disk() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        cam.put_file_metadata("a.dat", file_md()).unwrap();

        cam.unload();
        assert_eq!(cam.cache_state(), CacheStatus::Stale);

        // Changes made behind the cache's back show up after unload
        let sidecar = dir.path().join("test").join(format!("z.dat{FILE_METADATA_SUFFIX}"));
        fs::write(&sidecar, br#"{"_file_type": "x", "note": "external"}"#).unwrap();

        assert_eq!(cam.file_names().unwrap(), vec!["a.dat", "z.dat"]);
        assert_eq!(cam.cache_state(), CacheStatus::Loaded);
        assert_eq!(
            cam.file_metadata("z.dat").unwrap().get("note", false),
            Some("external")
        );
    }

    #[test]
    fn test_malformed_sidecar_aborts_reload() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        cam.put_file_metadata("a.dat", file_md()).unwrap();

        let sidecar = dir.path().join("test").join(format!("bad.dat{FILE_METADATA_SUFFIX}"));
        fs::write(&sidecar, b"{ not json").unwrap();

        assert!(cam.reload(true).is_err());
        assert_eq!(cam.cache_state(), CacheStatus::Stale);
        assert!(cam.file_metadata("a.dat").is_err());

        fs::remove_file(&sidecar).unwrap();
        assert!(cam.file_metadata("a.dat").is_ok());
    }

    #[test]
    fn test_put_campaign_metadata_updates_inheritance() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        cam.put_file_metadata("a.dat", file_md()).unwrap();

        let err = cam.put_campaign_metadata(RawMetadata::new()).unwrap_err();
        assert!(matches!(err, Error::MissingField(f) if f == "owner"));

        cam.put_campaign_metadata(RawMetadata::new().with_owner("bob"))
            .unwrap();
        assert_eq!(cam.campaign_metadata().unwrap().owner(false), Some("bob"));
        assert_eq!(cam.file_metadata("a.dat").unwrap().owner(true), Some("bob"));

        cam.unload();
        assert_eq!(cam.campaign_metadata().unwrap().owner(false), Some("bob"));
    }

    #[test]
    fn test_missing_file_not_found() {
        let dir = tempdir().unwrap();
        let cam = create_test_campaign(dir.path());
        assert!(cam.file_metadata("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let dir = tempdir().unwrap();
        let cam = Arc::new(create_test_campaign(dir.path()));
        cam.put_file_metadata("a.dat", file_md()).unwrap();
        cam.unload();

        std::thread::scope(|s| {
            for _ in 0..4 {
                let cam = Arc::clone(&cam);
                s.spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(cam.file_metadata("a.dat").unwrap().owner(true), Some("alice"));
                    }
                });
            }
            let cam = Arc::clone(&cam);
            s.spawn(move || {
                for i in 0..20 {
                    cam.put_file_metadata(&format!("f{i:02}.dat"), file_md()).unwrap();
                }
            });
        });

        assert_eq!(cam.file_names().unwrap().len(), 21);
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("a.dat"));
        assert!(is_plain_file_name(".hidden"));
        assert!(!is_plain_file_name("a/"));
        assert!(!is_plain_file_name("./a"));
        assert!(!is_plain_file_name("a/../b"));
    }
}
