//! The `paths` plugin: files, directories, symlinks and text in files.
//!
//! Reads `variables.paths`, a list of subtasks tagged by `ensure`:
//!
//! ```yaml
//! variables:
//!   paths:
//!     - path: /home/{user}/.profile
//!       ensure: file
//!       template: profile          # logical name from `files`
//!       mode: update               # asis | force | update
//!       permissions: "{user},{user},600"
//!     - path: /home/{user}/long/path
//!       ensure: path
//!       permissions: "/-/-/{user},{user},700/./."
//!     - path: /home/{user}/.bashrc
//!       ensure: in_file
//!       text: "source ~/.aliases\n"
//!   profile:                      # extra template substitutions
//!     greeting: Hello
//! ```

use crate::core::error::{ArtifactKind, Error, Result};
use crate::core::types::{scalar_to_string, Payload};
use crate::resources::{FileMode, Fs, Outcome, PermissionSpec, Setting, Template};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

fn yes() -> bool {
    true
}

fn inherit_owner_with_mode(mode: u32) -> PermissionSpec {
    PermissionSpec {
        owner: Setting::Inherit,
        group: Setting::Inherit,
        mode: Setting::Value(mode),
    }
}

fn default_file_permissions() -> PermissionSpec {
    inherit_owner_with_mode(0o600)
}

fn default_dir_permissions() -> PermissionSpec {
    inherit_owner_with_mode(0o700)
}

fn default_file_mode() -> FileMode {
    FileMode::Update
}

/// One entry of `variables.paths`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "ensure", rename_all = "snake_case")]
pub enum PathSubtask {
    Absent {
        path: PathBuf,
        #[serde(default = "yes")]
        backup: bool,
    },
    File {
        path: PathBuf,
        template: String,
        #[serde(default = "default_file_mode")]
        mode: FileMode,
        #[serde(default = "default_file_permissions")]
        permissions: PermissionSpec,
        #[serde(default = "yes")]
        backup: bool,
    },
    Dir {
        path: PathBuf,
        #[serde(default = "default_dir_permissions")]
        permissions: PermissionSpec,
        #[serde(default = "yes")]
        backup: bool,
    },
    Path {
        path: PathBuf,
        /// One descriptor per segment: `"/<spec>/<spec>/..."`
        permissions: String,
        #[serde(default = "yes")]
        backup: bool,
    },
    Symlink {
        path: PathBuf,
        target: PathBuf,
        #[serde(default = "yes")]
        backup: bool,
    },
    InFile {
        path: PathBuf,
        text: String,
        #[serde(default)]
        insert_at: Option<String>,
        #[serde(default)]
        needle: Option<String>,
        #[serde(default = "yes")]
        backup: bool,
    },
}

/// Parse `variables.paths` from a payload. A missing list means no work.
pub fn subtasks(payload: &Payload) -> Result<Vec<PathSubtask>> {
    match payload.variables.get("paths") {
        None => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list.clone())
            .map_err(|e| Error::Payload(format!("invalid paths subtask: {}", e))),
    }
}

/// Apply every subtask in order. `workspace` is where shipped files live.
pub fn run(payload: &Payload, workspace: &Path, fs: &Fs) -> Result<Outcome> {
    let mut outcome = Outcome::Unchanged;
    for subtask in subtasks(payload)? {
        outcome = outcome.or(apply(&subtask, payload, workspace, fs)?);
    }
    info!(task = %payload.name, changed = outcome == Outcome::Changed, "paths done");
    Ok(outcome)
}

fn apply(subtask: &PathSubtask, payload: &Payload, workspace: &Path, fs: &Fs) -> Result<Outcome> {
    match subtask {
        PathSubtask::Absent { path, backup } => fs.remove(path, *backup),
        PathSubtask::File {
            path,
            template,
            mode,
            permissions,
            backup,
        } => {
            let template = template_for(template, payload, workspace)?;
            fs.ensure_file(path, &template, permissions, *mode, *backup)
        }
        PathSubtask::Dir {
            path,
            permissions,
            backup,
        } => fs.ensure_directory(path, permissions, *backup),
        PathSubtask::Path {
            path,
            permissions,
            backup,
        } => {
            let specs = PermissionSpec::parse_path(permissions)?;
            fs.ensure_path(path, &specs, *backup)
        }
        PathSubtask::Symlink {
            path,
            target,
            backup,
        } => fs.ensure_symlink(path, target, *backup),
        PathSubtask::InFile {
            path,
            text,
            insert_at,
            needle,
            backup,
        } => fs.ensure_text_in_file(
            path,
            text,
            insert_at.as_deref().filter(|s| !s.is_empty()),
            needle.as_deref(),
            *backup,
        ),
    }
}

/// Template for the logical file `name`: substitutions are the iteration
/// binding, overridden by `variables[name]` when that is a mapping.
fn template_for(name: &str, payload: &Payload, workspace: &Path) -> Result<Template> {
    let remote = payload.files.get(name).ok_or_else(|| Error::Artifact {
        kind: ArtifactKind::File,
        name: format!("{} (task \"{}\")", name, payload.name),
    })?;

    let mut substitutions = payload.binding.clone();
    if let Some(Value::Object(extra)) = payload.variables.get(name) {
        for (key, value) in extra {
            if let Some(s) = scalar_to_string(value) {
                substitutions.insert(key.clone(), s);
            }
        }
    }
    Ok(Template::new(workspace.join(remote), substitutions))
}
