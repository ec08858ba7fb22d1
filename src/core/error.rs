//! Error types shared by the reconciliation engine, the command builder and
//! the orchestrator.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Filesystem action that failed, so callers can tell a broken template
/// apart from an unwritable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Backup,
    Remove,
    Stat,
    StatTemplate,
    ReadTemplate,
    CopyTemplate,
    Read,
    Write,
    CreateFile,
    CreateDir,
    Symlink,
    Chmod,
    Chown,
    Canonicalize,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Backup => "back up",
            Self::Remove => "remove",
            Self::Stat => "stat",
            Self::StatTemplate => "stat template",
            Self::ReadTemplate => "read template",
            Self::CopyTemplate => "copy template",
            Self::Read => "read",
            Self::Write => "write",
            Self::CreateFile => "create file",
            Self::CreateDir => "create directory",
            Self::Symlink => "create symlink",
            Self::Chmod => "change mode of",
            Self::Chown => "change ownership of",
            Self::Canonicalize => "resolve",
        };
        f.write_str(s)
    }
}

/// Failure while loading a plan file.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("could not read plan {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid plan {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("task #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
}

/// Failure while substituting an iteration binding into a task tree.
#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("unresolved variable '{name}' in \"{template}\" (bindings: {binding})")]
    Unresolved {
        name: String,
        template: String,
        binding: String,
    },

    #[error("malformed placeholder in \"{template}\": {reason}")]
    Malformed { template: String, reason: String },
}

/// What kind of artifact could not be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Plugin,
    File,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin => write!(f, "plugin"),
            Self::File => write!(f, "file"),
        }
    }
}

/// All errors raised by upset.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not {op} \"{}\": {source}", path.display())]
    Filesystem {
        op: FsOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{program}` exited with {}:\n{output}", exit_label(*code))]
    Command {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Expansion(#[from] ExpansionError),

    #[error("could not locate {kind} \"{name}\"")]
    Artifact { kind: ArtifactKind, name: String },

    #[error("{0}")]
    Contract(String),

    #[error("unknown owner \"{0}\"")]
    UnknownOwner(String),

    #[error("unknown group \"{0}\"")]
    UnknownGroup(String),

    #[error("invalid plugin payload: {0}")]
    Payload(String),

    #[error("interrupted by user")]
    Interrupted,
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Convenience constructor for [`Error::Filesystem`].
pub(crate) fn fs_err(op: FsOp, path: impl Into<PathBuf>, source: std::io::Error) -> Error {
    Error::Filesystem {
        op,
        path: path.into(),
        source,
    }
}
