//! File-backed storage that survives process restarts

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;

use super::SyncStorage;
use crate::error::{PersistError, PersistResult};

type Entries = BTreeMap<String, String>;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One lock per storage file for the whole process.
fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>> = OnceLock::new();

    let mut locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new())).lock();
    locks.retain(|_, lock| lock.strong_count() > 0);
    if let Some(lock) = locks.get(path).and_then(Weak::upgrade) {
        return lock;
    }
    let lock = Arc::new(Mutex::new(()));
    locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
    lock
}

/// Key-value map stored as a single JSON object file.
///
/// Every operation re-reads the file. All instances in this process that
/// open the same file share one lock, so their read-modify-write cycles never
/// interleave. Writes go to a uniquely named sibling temporary file that is
/// then renamed over the target. Separate processes sharing a file are not
/// coordinated.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Use the file at `path`, creating its parent directory if needed.
    ///
    /// The file itself is created on first write.
    pub fn open<P: AsRef<Path>>(path: P) -> PersistResult<Self> {
        let path = path.as_ref();
        let file_name = path.file_name().ok_or_else(|| {
            PersistError::Configuration(format!("{} does not name a file", path.display()))
        })?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let path = fs::canonicalize(parent)?.join(file_name);

        Ok(Self {
            lock: path_lock(&path),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> PersistResult<Entries> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Entries::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                PersistError::Storage(format!("{} is not a storage file: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &Entries) -> PersistResult<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| PersistError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = entries.len(), "storage file written");
        Ok(())
    }
}

impl SyncStorage for FileStorage {
    fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove_item(&self, key: &str) -> PersistResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}
