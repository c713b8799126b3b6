use std::path::PathBuf;

/// Returns the directory containing the running executable.
///
/// Falls back to `"."` if `current_exe()` cannot be resolved.
fn exe_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the base directory for client data.
///
/// During `cargo run` this is the crate root so that data does not end up in
/// `target/`. Otherwise it is the directory of the executable.
fn get_data_directory() -> PathBuf {
    if std::env::var("CARGO_MANIFEST_DIR").is_ok() {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    } else {
        exe_directory()
    }
}

/// Returns the default face cache directory.
///
/// # Returns
/// * `PathBuf` pointing to `<data_dir>/cache/faces/`.
pub fn get_cache_directory() -> PathBuf {
    let cache_directory = get_data_directory().join("cache").join("faces");
    log::info!("Using face cache directory at: {}", cache_directory.display());
    cache_directory
}

/// Returns the default location of the face settings file.
///
/// # Returns
/// * `PathBuf` pointing to `<data_dir>/faces.json`.
pub fn get_settings_file() -> PathBuf {
    get_data_directory().join("faces.json")
}
