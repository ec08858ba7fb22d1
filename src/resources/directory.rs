//! Directories and whole directory paths.

use super::permissions::PermissionSpec;
use super::{entry_kind, EntryKind, Fs, Outcome};
use crate::core::error::{fs_err, Error, FsOp, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

impl Fs {
    /// Make sure `path` is a real directory (not a symlink to one) and carries
    /// `permissions`.
    pub fn ensure_directory(
        &self,
        path: &Path,
        permissions: &PermissionSpec,
        backup: bool,
    ) -> Result<Outcome> {
        let _enter = self.span.enter();
        info!(path = %path.display(), "ensuring directory");

        if entry_kind(path) == Some(EntryKind::Dir) {
            debug!(path = %path.display(), "directory already present");
            return self.ensure_permissions(path, permissions);
        }

        self.remove(path, backup)?;

        info!(path = %path.display(), "creating directory");
        fs::create_dir(path).map_err(|e| fs_err(FsOp::CreateDir, path, e))?;
        self.ensure_permissions(path, permissions)?;
        Ok(Outcome::Changed)
    }

    /// Apply [`Fs::ensure_directory`] to every segment of the absolute `path`,
    /// from the top down, consuming one permission descriptor per segment.
    /// `/` itself is never touched.
    pub fn ensure_path(
        &self,
        path: &Path,
        permissions: &[PermissionSpec],
        backup: bool,
    ) -> Result<Outcome> {
        let _enter = self.span.enter();
        info!(path = %path.display(), "ensuring path");

        let segments = segments(path)?;
        if segments.len() != permissions.len() {
            return Err(Error::Contract(format!(
                "{} permission descriptors given for {} segments of \"{}\"",
                permissions.len(),
                segments.len(),
                path.display()
            )));
        }

        let mut current = PathBuf::from("/");
        let mut outcome = Outcome::Unchanged;
        for (segment, spec) in segments.iter().zip(permissions) {
            current.push(segment);
            debug!(segment = %current.display(), permissions = %spec, "ensuring segment");
            outcome = outcome.or(self.ensure_directory(&current, spec, backup)?);
        }
        Ok(outcome)
    }
}

fn segments(path: &Path) -> Result<Vec<&std::ffi::OsStr>> {
    if !path.is_absolute() {
        return Err(Error::Contract(format!(
            "path \"{}\" must be absolute",
            path.display()
        )));
    }
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::RootDir => {}
            Component::Normal(s) => out.push(s),
            Component::CurDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(Error::Contract(format!(
                    "path \"{}\" must be normalised",
                    path.display()
                )))
            }
        }
    }
    Ok(out)
}
