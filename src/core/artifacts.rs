//! Locating plugins and naming shipped files.

use super::error::{fs_err, ArtifactKind, Error, FsOp, Result};
use std::path::{Path, PathBuf};

/// Plugin search path: the explicit directories in order, then `./plugins`,
/// then the directory holding the running executable.
pub fn plugin_search_dirs(explicit: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs = explicit.to_vec();
    dirs.push(PathBuf::from("plugins"));
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }
    dirs
}

/// First regular file named `name` in `search_dirs`.
pub fn locate_plugin(name: &str, search_dirs: &[PathBuf]) -> Result<PathBuf> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::Contract(format!(
            "plugin name \"{}\" must be a bare file name",
            name
        )));
    }
    search_dirs
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| Error::Artifact {
            kind: ArtifactKind::Plugin,
            name: name.to_string(),
        })
}

/// Workspace file name for a local file: the BLAKE3 hash of its resolved
/// absolute path, then its own name. The same source always maps to the same
/// name; distinct sources never share one.
pub fn unique_file_name(path: &Path) -> Result<String> {
    let resolved = std::fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::Artifact {
            kind: ArtifactKind::File,
            name: path.display().to_string(),
        },
        _ => fs_err(FsOp::Canonicalize, path, e),
    })?;
    Ok(name_for_resolved(&resolved))
}

pub(crate) fn name_for_resolved(resolved: &Path) -> String {
    let hash = blake3::hash(resolved.as_os_str().as_encoded_bytes());
    let file_name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}", hash.to_hex(), file_name)
}
