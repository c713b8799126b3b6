use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

/// Key-value store for encoded face images, keyed by face name and checksum.
///
/// Both operations are best effort: problems are logged and show up as a
/// miss on `load` or a lost entry on `save`.
pub trait ImageCache: Send + Sync {
    fn load(&self, name: &str, checksum: u32) -> Option<Vec<u8>>;
    fn save(&self, name: &str, checksum: u32, data: &[u8]);
}

/// Quotes a face name so that it is usable as a single path component.
///
/// ASCII letters, digits, `-`, `_` and any `.` that is not the first
/// character are kept; every other byte becomes `%XX`. The empty name maps to
/// `%`, which no other name can produce.
pub fn quote_name(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }

    let mut out = String::with_capacity(name.len());
    for (i, b) in name.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// [`ImageCache`] storing one file per entry below a root directory.
///
/// Layout: `<root>/<first two characters of the quoted name>/<quoted name>/<checksum>`.
pub struct FileCache {
    root: PathBuf,
    max_file_size: u64,
    key_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileCache {
    /// # Arguments
    /// * `root` - Cache directory; created lazily on the first save.
    /// * `max_file_size` - Files larger than this are treated as a miss.
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            max_file_size,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file an entry is stored in.
    pub fn path_for(&self, name: &str, checksum: u32) -> PathBuf {
        let quoted = quote_name(name);
        let mut shard: String = quoted.chars().take(2).collect();
        while shard.len() < 2 {
            shard.push('_');
        }
        self.root
            .join(shard)
            .join(quoted)
            .join(checksum.to_string())
    }

    /// Runs `f` while holding the lock of `path`.
    ///
    /// Lock entries exist only while some thread uses them.
    fn with_key_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one here: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
        result
    }

    #[cfg(test)]
    fn locked_keys(&self) -> usize {
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn read_entry(&self, path: &Path) -> Option<Vec<u8>> {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Cannot stat cached face {}: {e}", path.display());
                return None;
            }
        };

        if len == 0 {
            log::debug!("Ignoring empty cached face {}", path.display());
            return None;
        }
        if len > self.max_file_size {
            log::warn!(
                "Ignoring cached face {}: {len} bytes exceeds limit of {}",
                path.display(),
                self.max_file_size
            );
            return None;
        }

        match fs::read(path) {
            Ok(data) if !data.is_empty() && data.len() as u64 <= self.max_file_size => Some(data),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Cannot read cached face {}: {e}", path.display());
                None
            }
        }
    }
}

impl ImageCache for FileCache {
    fn load(&self, name: &str, checksum: u32) -> Option<Vec<u8>> {
        let path = self.path_for(name, checksum);
        self.with_key_lock(&path, || self.read_entry(&path))
    }

    fn save(&self, name: &str, checksum: u32, data: &[u8]) {
        if data.is_empty() {
            log::warn!("Not caching empty image for face {name}");
            return;
        }

        let path = self.path_for(name, checksum);
        self.with_key_lock(&path, || self.write_entry(&path, name, data));
    }
}

impl FileCache {
    fn write_entry(&self, path: &Path, name: &str, data: &[u8]) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Cannot create face cache dir {}: {e}", parent.display());
                return;
            }
        }

        // Readers only ever see complete files.
        let tmp_path = path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp_path, data) {
            log::warn!("Cannot write cached face {}: {e}", tmp_path.display());
            let _ = fs::remove_file(&tmp_path);
            return;
        }
        if let Err(e) = fs::rename(&tmp_path, path) {
            log::warn!("Cannot replace cached face {}: {e}", path.display());
            let _ = fs::remove_file(&tmp_path);
            return;
        }
        log::debug!("Cached face {name} ({} bytes) at {}", data.len(), path.display());
    }
}

/// [`ImageCache`] that keeps entries in memory.
#[derive(Default)]
pub struct MemoryImageCache {
    entries: Mutex<HashMap<(String, u32), Vec<u8>>>,
}

impl MemoryImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImageCache for MemoryImageCache {
    fn load(&self, name: &str, checksum: u32) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(name.to_string(), checksum))
            .cloned()
    }

    fn save(&self, name: &str, checksum: u32, data: &[u8]) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((name.to_string(), checksum), data.to_vec());
    }
}
