use rand::{distributions::Alphanumeric, Rng};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const ID_RANDOM_LEN: usize = 10;

/// Generate an opaque identifier for a new dashboard entity
///
/// Identifiers are a short kind prefix followed by random lowercase
/// alphanumerics, e.g. `g_k3v9x0a1qz` for a group.
///
/// # Examples
///
/// ```
/// use iron_dash::utils::generate_id;
///
/// let id = generate_id("g");
/// assert!(id.starts_with("g_"));
/// assert_eq!(id.len(), 12);
/// ```
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_RANDOM_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{prefix}_{suffix}")
}

/// Path of the staging file used while atomically replacing `path`
///
/// The staging file lives in the same directory so the final rename never
/// crosses a filesystem boundary.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to the staging file next to `path` and flush it to disk.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written.
pub fn stage_file(path: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp = temp_path_for(path);
    let mut file = fs::File::create(&temp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(temp)
}

/// Replace `path` with `bytes` so readers only ever see the old or new content.
///
/// # Errors
///
/// Returns an error if staging or the final rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp = stage_file(path, bytes)?;
    fs::rename(&temp, path)
}
