//! Regular files rendered from templates.

use super::permissions::PermissionSpec;
use super::template::Template;
use super::{entry_kind, resolved_kind, EntryKind, Fs, Outcome};
use crate::core::error::{fs_err, Error, FsOp, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Keep an existing file untouched.
    Asis,
    /// Always rewrite.
    #[default]
    Force,
    /// Rewrite only if the template is strictly newer than the target.
    Update,
}

impl FromStr for FileMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asis" => Ok(Self::Asis),
            "force" => Ok(Self::Force),
            "update" => Ok(Self::Update),
            other => Err(Error::Contract(format!(
                "unknown file mode \"{}\" (expected asis, force or update)",
                other
            ))),
        }
    }
}

/// Rendered content, prepared before the old target is removed.
enum Content {
    Text(String),
    /// No substitutions: copy the source byte for byte.
    Copy,
}

impl Fs {
    /// Make sure `path` is a regular file rendered from `template`.
    ///
    /// A directory at `path` is replaced (after a warning). A symlink to a
    /// regular file counts as an existing file for `asis` and `update`. The
    /// template is rendered before anything is removed, so an unreadable
    /// template never costs the existing target.
    pub fn ensure_file(
        &self,
        path: &Path,
        template: &Template,
        permissions: &PermissionSpec,
        mode: FileMode,
        backup: bool,
    ) -> Result<Outcome> {
        let _enter = self.span.enter();
        info!(path = %path.display(), ?mode, "ensuring file");

        let existing = match entry_kind(path) {
            Some(EntryKind::Symlink) if resolved_kind(path) == Some(EntryKind::File) => {
                Some(EntryKind::File)
            }
            kind => kind,
        };
        match existing {
            Some(EntryKind::Dir) => {
                warn!(path = %path.display(), "creating file instead of directory");
            }
            Some(EntryKind::File) => match mode {
                FileMode::Asis => {
                    debug!(path = %path.display(), "target exists and mode is asis");
                    return Ok(Outcome::Unchanged);
                }
                FileMode::Update => {
                    if !template_is_newer(&template.source, path)? {
                        debug!(path = %path.display(), "target is not older than template");
                        return self.ensure_permissions(path, permissions);
                    }
                }
                FileMode::Force => {}
            },
            _ => {}
        }

        let content = if template.substitutions.is_empty() {
            fs::metadata(&template.source)
                .map_err(|e| fs_err(FsOp::StatTemplate, &template.source, e))?;
            Content::Copy
        } else {
            Content::Text(template.render()?)
        };

        self.remove(path, backup)?;

        match content {
            Content::Text(text) => {
                info!(path = %path.display(), "creating file");
                fs::write(path, text).map_err(|e| fs_err(FsOp::CreateFile, path, e))?;
            }
            Content::Copy => {
                info!(path = %path.display(), source = %template.source.display(), "copying file");
                fs::copy(&template.source, path)
                    .map_err(|e| fs_err(FsOp::CopyTemplate, &template.source, e))?;
            }
        }

        self.ensure_permissions(path, permissions)?;
        Ok(Outcome::Changed)
    }
}

fn template_is_newer(source: &Path, target: &Path) -> Result<bool> {
    let source_mtime = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(|e| fs_err(FsOp::StatTemplate, source, e))?;
    let target_mtime = fs::metadata(target)
        .and_then(|m| m.modified())
        .map_err(|e| fs_err(FsOp::Stat, target, e))?;
    Ok(source_mtime > target_mtime)
}
