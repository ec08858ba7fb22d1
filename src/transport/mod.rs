//! Command builder: argument vectors for local, remote, privileged and copy
//! commands, and the runner that executes them.
//!
//! Commands are built as argv vectors. The only place a shell evaluates a
//! string is the privileged path, where the whole `sudo` line travels
//! base64-encoded so the secret never appears in a process listing.

pub mod local;
pub mod ssh;
pub mod sudo;

pub use local::SystemRunner;

use crate::core::error::{Error, Result};
use nix::unistd::{gethostname, getuid, User};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Output from executing a command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Trimmed stdout and stderr, joined by a newline, empty parts dropped.
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Executes argv vectors. The production implementation spawns processes;
/// tests substitute a recorder.
pub trait Runner {
    /// Run `argv` to completion and return its combined trimmed output, or
    /// [`Error::Command`] on a non-zero exit.
    fn run(&mut self, argv: &[String]) -> Result<String>;
}

/// The user and host this process runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub host: String,
}

impl Identity {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// Look up the invoking user and the local hostname.
    pub fn detect() -> Result<Self> {
        let host = gethostname()
            .map_err(|e| Error::Contract(format!("could not determine hostname: {}", e)))?
            .to_string_lossy()
            .into_owned();
        let user = match User::from_uid(getuid()) {
            Ok(Some(user)) => user.name,
            _ => {
                return Err(Error::Contract(
                    "could not determine the invoking user".to_string(),
                ))
            }
        };
        Ok(Self { user, host })
    }
}

/// Where commands are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user: String,
    pub host: String,
    /// Private key handed to ssh/scp with `-i`.
    pub identity: Option<PathBuf>,
}

impl Target {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, key: impl Into<PathBuf>) -> Self {
        self.identity = Some(key.into());
        self
    }

    /// The invoking identity itself.
    pub fn local(invoker: &Identity) -> Self {
        Self::new(invoker.user.clone(), invoker.host.clone())
    }

    pub fn address(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Copy direction relative to the invoking machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local path to target path.
    To,
    /// Target path to local path.
    From,
}

/// Builds and runs commands on behalf of one invoking identity.
#[derive(Debug)]
pub struct Sys<R: Runner = SystemRunner> {
    invoker: Identity,
    runner: R,
}

impl Sys<SystemRunner> {
    /// Detect the invoking identity and run commands as real processes.
    pub fn detect() -> Result<Self> {
        Ok(Self::new(Identity::detect()?, SystemRunner))
    }
}

impl<R: Runner> Sys<R> {
    pub fn new(invoker: Identity, runner: R) -> Self {
        Self { invoker, runner }
    }

    pub fn invoker(&self) -> &Identity {
        &self.invoker
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    /// Whether `target` is the invoking user on this machine, in which case
    /// commands run locally instead of over ssh.
    pub fn is_local(&self, target: &Target) -> bool {
        target.user == self.invoker.user
            && (target.host == self.invoker.host || is_loopback(&target.host))
    }

    /// Local argv for `parts` when `target` is local, remote argv otherwise.
    pub fn build_command(&self, parts: &[String], target: &Target, elevate: bool) -> Vec<String> {
        if self.is_local(target) {
            local::build_local_command(parts, elevate)
        } else {
            ssh::build_remote_command(parts, target)
        }
    }

    /// Wrap `parts` in a non-interactive `sudo` (see [`sudo`]), executed
    /// locally or remotely depending on `target`.
    pub fn build_privileged_command(
        &self,
        parts: &[String],
        secret: &str,
        target: &Target,
        run_as: Option<&str>,
    ) -> Vec<String> {
        let line = sudo::encode_privileged_line(parts, secret, run_as);
        self.build_command(&sudo::decode_and_eval(&line), target, false)
    }

    /// `cp -p` when `target` is local, `scp -p` otherwise.
    pub fn build_copy_command(
        &self,
        local_path: &Path,
        remote_path: &Path,
        direction: Direction,
        target: &Target,
    ) -> Vec<String> {
        if self.is_local(target) {
            local::build_copy_command(local_path, remote_path, direction)
        } else {
            ssh::build_copy_command(local_path, remote_path, direction, target)
        }
    }

    /// Execute `argv` and return its combined trimmed output.
    pub fn run_command(&mut self, argv: &[String]) -> Result<String> {
        debug!(program = argv.first().map(String::as_str).unwrap_or_default(), "running command");
        self.runner.run(argv)
    }

    /// Create a fresh temporary directory on `target`.
    pub fn make_temporary_directory(&mut self, target: &Target) -> Result<PathBuf> {
        let argv = self.build_command(&["mktemp".to_string(), "-d".to_string()], target, false);
        let out = self.run_command(&argv)?;
        let dir = out.lines().last().map(str::trim).unwrap_or_default();
        if dir.is_empty() {
            return Err(Error::Contract("mktemp returned no directory".to_string()));
        }
        info!(dir, "created temporary directory");
        Ok(PathBuf::from(dir))
    }

    /// Remove a workspace created by [`Sys::make_temporary_directory`].
    /// Workspaces under `/tmp` are removed with `sudo`, since plugins run as
    /// root and leave root-owned files behind.
    pub fn remove_temporary_directory(
        &mut self,
        dir: &Path,
        secret: &str,
        target: &Target,
    ) -> Result<()> {
        let parts = vec![
            "rm".to_string(),
            "-r".to_string(),
            dir.display().to_string(),
        ];
        let argv = if dir.starts_with("/tmp") {
            self.build_privileged_command(&parts, secret, target, None)
        } else {
            self.build_command(&parts, target, false)
        };
        self.run_command(&argv)?;
        info!(dir = %dir.display(), "removed temporary directory");
        Ok(())
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "::1")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Records every argv and answers from a script of canned outputs.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingRunner {
        pub calls: Vec<Vec<String>>,
        pub replies: VecDeque<Result<String>>,
    }

    impl Runner for RecordingRunner {
        fn run(&mut self, argv: &[String]) -> Result<String> {
            self.calls.push(argv.to_vec());
            self.replies.pop_front().unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn sys() -> Sys<RecordingRunner> {
        Sys::new(Identity::new("me", "box"), RecordingRunner::default())
    }

    #[test]
    fn test_exec_output_combined() {
        let out = ExecOutput {
            exit_code: Some(0),
            stdout: "ok\n".into(),
            stderr: "  warn \n".into(),
        };
        assert!(out.success());
        assert_eq!(out.combined(), "ok\nwarn");
        let quiet = ExecOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: "err".into(),
        };
        assert!(!quiet.success());
        assert_eq!(quiet.combined(), "err");
    }

    #[test]
    fn test_is_local() {
        let s = sys();
        assert!(s.is_local(&Target::new("me", "box")));
        assert!(s.is_local(&Target::new("me", "localhost")));
        assert!(!s.is_local(&Target::new("root", "box")));
        assert!(!s.is_local(&Target::new("me", "10.0.0.1")));
    }

    #[test]
    fn test_build_command_dispatch() {
        let s = sys();
        let parts = strings(&["ls", "-l"]);
        assert_eq!(
            s.build_command(&parts, &Target::new("me", "box"), false),
            strings(&["sh", "-c", "ls -l"])
        );
        assert_eq!(
            s.build_command(&parts, &Target::new("me", "box"), true),
            strings(&["sudo", "--", "ls", "-l"])
        );
        let remote = Target::new("admin", "web1").with_identity("/keys/id");
        assert_eq!(
            s.build_command(&parts, &remote, false),
            strings(&["ssh", "-o", "BatchMode=yes", "-i", "/keys/id", "admin@web1", "ls", "-l"])
        );
    }

    #[test]
    fn test_build_privileged_command_hides_secret() {
        let s = sys();
        let argv = s.build_privileged_command(
            &strings(&["cat", "/etc/shadow"]),
            "s3cret",
            &Target::new("admin", "web1"),
            None,
        );
        assert_eq!(&argv[..4], &strings(&["ssh", "-o", "BatchMode=yes", "admin@web1"])[..]);
        assert!(argv.iter().all(|a| !a.contains("s3cret")));
        assert_eq!(argv[4], "echo");
        assert_eq!(&argv[6..], &strings(&["|", "base64", "-d", "|", "sh"])[..]);
        let line = sudo::decode_line(&argv[5]).unwrap();
        assert_eq!(line, "echo \"s3cret\" | sudo -S --prompt= -- cat /etc/shadow\n");
    }

    #[test]
    fn test_build_privileged_command_local() {
        let s = sys();
        let argv = s.build_privileged_command(
            &strings(&["id"]),
            "pw",
            &Target::new("me", "box"),
            Some("postgres"),
        );
        assert_eq!(argv[0], "sh");
        assert_eq!(argv[1], "-c");
        let encoded = argv[2]
            .strip_prefix("echo ")
            .and_then(|s| s.strip_suffix(" | base64 -d | sh"))
            .unwrap();
        assert_eq!(
            sudo::decode_line(encoded).unwrap(),
            "echo \"pw\" | sudo -u postgres -S --prompt= -- id\n"
        );
    }

    #[test]
    fn test_build_copy_command() {
        let s = sys();
        let local = Path::new("/srv/plugins/paths");
        let remote = Path::new("/tmp/tmp.abc/paths");
        assert_eq!(
            s.build_copy_command(local, remote, Direction::To, &Target::new("me", "box")),
            strings(&["cp", "-p", "/srv/plugins/paths", "/tmp/tmp.abc/paths"])
        );
        assert_eq!(
            s.build_copy_command(local, remote, Direction::To, &Target::new("admin", "web1")),
            strings(&[
                "scp",
                "-o",
                "BatchMode=yes",
                "-p",
                "/srv/plugins/paths",
                "admin@web1:/tmp/tmp.abc/paths"
            ])
        );
        assert_eq!(
            s.build_copy_command(local, remote, Direction::From, &Target::new("admin", "web1")),
            strings(&[
                "scp",
                "-o",
                "BatchMode=yes",
                "-p",
                "admin@web1:/tmp/tmp.abc/paths",
                "/srv/plugins/paths"
            ])
        );
    }

    #[test]
    fn test_make_temporary_directory() {
        let mut s = sys();
        s.runner.replies.push_back(Ok("/tmp/tmp.XyZ".to_string()));
        let dir = s.make_temporary_directory(&Target::new("admin", "web1")).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/tmp.XyZ"));
        assert_eq!(s.runner.calls[0].last().unwrap(), "-d");
    }

    #[test]
    fn test_make_temporary_directory_empty_output() {
        let mut s = sys();
        assert!(matches!(
            s.make_temporary_directory(&Target::new("admin", "web1")),
            Err(Error::Contract(_))
        ));
    }

    #[test]
    fn test_remove_temporary_directory_privileged_under_tmp() {
        let mut s = sys();
        let target = Target::new("admin", "web1");
        s.remove_temporary_directory(Path::new("/tmp/tmp.XyZ"), "pw", &target)
            .unwrap();
        s.remove_temporary_directory(Path::new("/var/work/ws"), "pw", &target)
            .unwrap();
        let privileged = &s.runner.calls[0];
        let line = sudo::decode_line(&privileged[5]).unwrap();
        assert!(line.ends_with("-- rm -r /tmp/tmp.XyZ\n"), "{line}");
        assert_eq!(
            &s.runner.calls[1][4..],
            &strings(&["rm", "-r", "/var/work/ws"])[..]
        );
    }
}
