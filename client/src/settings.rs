use std::fs;
use std::path::{Path, PathBuf};

use cf_core::constants::{CONCURRENT_ASKFACE_COMMANDS, DEFAULT_MAX_CACHED_FILE_SIZE};
use serde::{Deserialize, Serialize};

use crate::filepaths;

/// Configuration of the face pipeline, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceSettings {
    /// Root directory of the on-disk face cache.
    pub cache_dir: PathBuf,
    /// Cached files larger than this many bytes are ignored.
    pub max_cached_file_size: u64,
    /// Maximum number of askface commands awaiting an answer.
    pub concurrent_askface_limit: usize,
    /// PNG shown for faces that could not be loaded. The built-in
    /// checkerboard is used when unset.
    pub unknown_image: Option<PathBuf>,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            cache_dir: filepaths::get_cache_directory(),
            max_cached_file_size: DEFAULT_MAX_CACHED_FILE_SIZE,
            concurrent_askface_limit: CONCURRENT_ASKFACE_COMMANDS,
            unknown_image: None,
        }
    }
}

impl FaceSettings {
    /// Reads settings from `path`.
    ///
    /// A missing or unparsable file yields the defaults.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Cannot read face settings {}: {e}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_slice::<FaceSettings>(&bytes) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to parse face settings {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Writes settings to `path` as pretty JSON.
    ///
    /// The file is written to a temporary sibling first and renamed into
    /// place.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create settings dir {:?}: {e}", parent))?;
            }
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize face settings: {e}"))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, format!("{json}\n"))
            .map_err(|e| format!("Failed to write {:?}: {e}", tmp_path))?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            format!("Failed to replace {:?}: {e}", path)
        })
    }
}
