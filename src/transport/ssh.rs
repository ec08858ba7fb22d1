//! Remote command construction over the `ssh` and `scp` binaries.
//!
//! No libssh2 dependency. `BatchMode=yes` keeps both tools from prompting;
//! authentication must come from the agent or the `-i` identity.

use super::{Direction, Target};
use std::path::Path;

fn base_args(program: &str, target: &Target) -> Vec<String> {
    let mut argv = vec![
        program.to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
    ];
    if let Some(ref key) = target.identity {
        argv.push("-i".to_string());
        argv.push(expand_home(key));
    }
    argv
}

/// Argv running `parts` on `target` through ssh. The remote login shell
/// joins and evaluates the trailing words.
pub fn build_remote_command(parts: &[String], target: &Target) -> Vec<String> {
    let mut argv = base_args("ssh", target);
    argv.push(target.address());
    argv.extend(parts.iter().cloned());
    argv
}

/// `scp -p` between the local path and `user@host:remote`.
pub fn build_copy_command(
    local: &Path,
    remote: &Path,
    direction: Direction,
    target: &Target,
) -> Vec<String> {
    let local = local.display().to_string();
    let remote = format!("{}:{}", target.address(), remote.display());
    let (src, dst) = match direction {
        Direction::To => (local, remote),
        Direction::From => (remote, local),
    };
    let mut argv = base_args("scp", target);
    argv.extend(["-p".to_string(), src, dst]);
    argv
}

/// Expand a leading `~/` to `$HOME`.
fn expand_home(key: &Path) -> String {
    let raw = key.display().to_string();
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{}", home, rest);
        }
    }
    raw
}
