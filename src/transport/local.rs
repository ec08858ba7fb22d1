//! Local command construction and process execution.

use super::{Direction, ExecOutput, Runner};
use crate::core::error::{Error, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Argv for running `parts` on this machine.
///
/// Elevated commands go straight to `sudo --`; plain ones are joined and
/// evaluated by `sh -c` so pipelines built by the privileged encoder work.
pub fn build_local_command(parts: &[String], elevate: bool) -> Vec<String> {
    if elevate {
        let mut argv = vec!["sudo".to_string(), "--".to_string()];
        argv.extend(parts.iter().cloned());
        argv
    } else {
        vec!["sh".to_string(), "-c".to_string(), parts.join(" ")]
    }
}

/// `cp -p` in the requested direction.
pub fn build_copy_command(local: &Path, other: &Path, direction: Direction) -> Vec<String> {
    let (src, dst) = match direction {
        Direction::To => (local, other),
        Direction::From => (other, local),
    };
    vec![
        "cp".to_string(),
        "-p".to_string(),
        src.display().to_string(),
        dst.display().to_string(),
    ]
}

/// Run an argv to completion, capturing stdout and stderr.
pub fn exec_local(argv: &[String]) -> Result<ExecOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Contract("cannot run an empty command".to_string()))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

    Ok(ExecOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&mut self, argv: &[String]) -> Result<String> {
        let out = exec_local(argv)?;
        if !out.success() {
            // argv may carry an encoded secret, so only the program is reported
            return Err(Error::Command {
                program: argv.first().cloned().unwrap_or_default(),
                code: out.exit_code,
                output: out.combined(),
            });
        }
        Ok(out.combined())
    }
}
