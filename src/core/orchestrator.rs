//! Orchestrator: drives one plan against one target.
//!
//! Lifecycle of [`Upset::run`]:
//! plan loaded → workspace created → per task: plugin shipped → per
//! iteration: expanded, files shipped, plugin invoked → workspace removed.
//! The workspace is removed whenever it was created, whatever failed.

use super::artifacts::{locate_plugin, unique_file_name};
use super::error::{Error, Result};
use super::expander::expand_task;
use super::interrupt::CancelFlag;
use super::parser;
use super::types::{Binding, ExpandedTask, Payload, Plan, RunSummary, Task};
use crate::plugin::encode_payload;
use crate::transport::{Direction, Runner, Sys, SystemRunner, Target};
use indexmap::{IndexMap, IndexSet};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span, Span};

/// Artifacts already copied to the workspace during this run.
#[derive(Debug, Default)]
struct SentArtifacts {
    plugins: IndexSet<String>,
    files: IndexSet<String>,
}

/// Plan executor for a single target.
#[derive(Debug)]
pub struct Upset<R: Runner = SystemRunner> {
    sys: Sys<R>,
    target: Target,
    plugin_dirs: Vec<PathBuf>,
    run_as: Option<String>,
    sent: SentArtifacts,
    cancel: CancelFlag,
    span: Span,
}

impl<R: Runner> Upset<R> {
    pub fn new(sys: Sys<R>, target: Target, plugin_dirs: Vec<PathBuf>) -> Self {
        let span = info_span!("upset", user = %target.user, host = %target.host);
        Self {
            sys,
            target,
            plugin_dirs,
            run_as: None,
            sent: SentArtifacts::default(),
            cancel: CancelFlag::new(),
            span,
        }
    }

    /// Log under `span` instead of the default per-target span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run plugins as `user` instead of root.
    pub fn with_run_as(mut self, user: Option<String>) -> Self {
        self.run_as = user;
        self
    }

    /// Abort between steps once `flag` is raised.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn sys(&self) -> &Sys<R> {
        &self.sys
    }

    pub fn read_plan(&self, path: &Path) -> Result<Plan> {
        let _enter = self.span.enter();
        info!(plan = %path.display(), "reading plan");
        parser::read_plan(path)
    }

    /// Execute the plan at `plan_path`. `secret` is the sudo password on the
    /// target.
    pub fn run(&mut self, plan_path: &Path, secret: &str) -> Result<RunSummary> {
        let span = self.span.clone();
        let _enter = span.enter();

        let plan = self.read_plan(plan_path)?;
        self.cancel.check()?;

        let workspace = self.sys.make_temporary_directory(&self.target)?;
        let result = self.execute(&plan, &workspace, secret);

        // a child killed by the interrupt surfaces as a command failure
        let result = match result {
            Err(e) if self.cancel.is_cancelled() && !matches!(e, Error::Interrupted) => {
                debug!(error = %e, "failure after interrupt");
                Err(Error::Interrupted)
            }
            other => other,
        };

        if let Err(e) = &result {
            error!(error = %e, "run aborted");
        }

        if let Err(cleanup) = self
            .sys
            .remove_temporary_directory(&workspace, secret, &self.target)
        {
            error!(workspace = %workspace.display(), error = %cleanup, "could not remove workspace");
        }

        result
    }

    fn execute(&mut self, plan: &Plan, workspace: &Path, secret: &str) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for task in plan {
            self.cancel.check()?;
            info!(task = %task.name, plugin = %task.plugin, "running task");
            if self.send_plugin(task, workspace)? {
                summary.plugins_sent += 1;
            }

            for binding in task.iterations() {
                self.cancel.check()?;
                let expanded = expand_task(task, &binding)?;
                let before = self.sent.files.len();
                let remote_files = self.send_files(&expanded, workspace)?;
                summary.files_sent += self.sent.files.len() - before;

                let output = self.run_task(&expanded, &binding, &remote_files, workspace, secret)?;
                for line in output.lines() {
                    info!(task = %task.name, "{}", line);
                }
                summary.invocations += 1;
            }
            summary.tasks += 1;
        }
        Ok(summary)
    }

    /// Copy the task's plugin into the workspace unless it is already there.
    /// Returns whether a copy happened.
    pub fn send_plugin(&mut self, task: &Task, workspace: &Path) -> Result<bool> {
        if self.sent.plugins.contains(&task.plugin) {
            debug!(plugin = %task.plugin, "plugin already sent");
            return Ok(false);
        }
        let local = locate_plugin(&task.plugin, &self.plugin_dirs)?;
        info!(plugin = %task.plugin, source = %local.display(), "sending plugin");
        let argv = self.sys.build_copy_command(
            &local,
            &workspace.join(&task.plugin),
            Direction::To,
            &self.target,
        );
        self.sys.run_command(&argv)?;
        self.sent.plugins.insert(task.plugin.clone());
        Ok(true)
    }

    /// Copy every referenced file not yet in the workspace. Returns the
    /// logical name → workspace file name map handed to the plugin.
    pub fn send_files(
        &mut self,
        task: &ExpandedTask,
        workspace: &Path,
    ) -> Result<IndexMap<String, String>> {
        let mut remote_files = IndexMap::with_capacity(task.files.len());
        for (name, local) in &task.files {
            let local = Path::new(local);
            let remote = unique_file_name(local)?;
            if self.sent.files.contains(&remote) {
                debug!(file = %local.display(), "file already sent");
            } else {
                info!(file = %local.display(), remote = %remote, "sending file");
                let argv = self.sys.build_copy_command(
                    local,
                    &workspace.join(&remote),
                    Direction::To,
                    &self.target,
                );
                self.sys.run_command(&argv)?;
                self.sent.files.insert(remote.clone());
            }
            remote_files.insert(name.clone(), remote);
        }
        Ok(remote_files)
    }

    /// Invoke the plugin for one iteration and return its output.
    pub fn run_task(
        &mut self,
        task: &ExpandedTask,
        binding: &Binding,
        remote_files: &IndexMap<String, String>,
        workspace: &Path,
        secret: &str,
    ) -> Result<String> {
        let payload = Payload {
            name: task.name.clone(),
            plugin: task.plugin.clone(),
            variables: task.variables.clone(),
            files: remote_files.clone(),
            binding: binding.clone(),
        };
        let encoded = encode_payload(&payload)?;
        let inner = format!(
            "cd {} && ./{} {}",
            quote(&workspace.display().to_string()),
            quote(&task.plugin),
            encoded
        );
        let parts = vec!["sh".to_string(), "-c".to_string(), quote(&inner)];
        let argv =
            self.sys
                .build_privileged_command(&parts, secret, &self.target, self.run_as.as_deref());
        info!(task = %task.name, binding = ?binding, "invoking plugin");
        self.sys.run_command(&argv)
    }
}

fn quote(s: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(s)).into_owned()
}
