//! CLI subcommands: run, validate, decode.

use crate::core::artifacts::plugin_search_dirs;
use crate::core::error::{Error, Result};
use crate::core::interrupt::{install_ctrl_c, CancelFlag};
use crate::core::orchestrator::Upset;
use crate::core::parser;
use crate::core::types::{Plan, RunSummary};
use crate::plugin::decode_payload;
use crate::transport::{Sys, Target};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan against a target
    Run {
        /// Path to the plan (.json, otherwise YAML)
        #[arg(short, long)]
        plan: PathBuf,

        /// Remote user (default: the invoking user)
        #[arg(short, long)]
        user: Option<String>,

        /// Remote host (default: this machine, no ssh)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Private key for ssh/scp
        #[arg(short, long)]
        identity: Option<PathBuf>,

        /// Extra plugin directory, searched before ./plugins (repeatable)
        #[arg(long = "plugin-dir")]
        plugin_dirs: Vec<PathBuf>,

        /// Run plugins as this user instead of root
        #[arg(long)]
        run_as: Option<String>,

        /// sudo password on the target; prompted for when unset
        #[arg(long, env = "UPSET_PASSWORD", hide = true, hide_env_values = true)]
        password: Option<String>,
    },

    /// Check a plan without connecting anywhere
    Validate {
        /// Path to the plan
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Print the JSON inside an encoded plugin payload
    Decode {
        /// base64 payload as passed to a plugin
        payload: String,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Run {
            plan,
            user,
            host,
            identity,
            plugin_dirs,
            run_as,
            password,
        } => cmd_run(
            &plan,
            user,
            host,
            identity,
            &plugin_dirs,
            run_as,
            password,
        ),
        Commands::Validate { plan } => cmd_validate(&plan),
        Commands::Decode { payload } => cmd_decode(&payload),
    }
}

/// Install the global subscriber. `verbosity` counts `-v` flags:
/// 0 = error, 1 = warn, 2 = info, 3+ = debug. `RUST_LOG` wins when set.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn cmd_run(
    plan: &Path,
    user: Option<String>,
    host: Option<String>,
    identity: Option<PathBuf>,
    plugin_dirs: &[PathBuf],
    run_as: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let sys = Sys::detect()?;
    let invoker = sys.invoker().clone();
    let mut target = Target::new(
        user.unwrap_or(invoker.user),
        host.unwrap_or(invoker.host),
    );
    if let Some(key) = identity {
        target = target.with_identity(key);
    }

    let secret = match password {
        Some(p) => p,
        None => prompt_secret(&target)?,
    };

    let cancel = CancelFlag::new();
    install_ctrl_c(cancel.clone())?;

    let mut upset = Upset::new(sys, target, plugin_search_dirs(plugin_dirs))
        .with_run_as(run_as)
        .with_cancel_flag(cancel);
    let summary = upset.run(plan, &secret)?;
    println!("{}", format_summary(&summary));
    Ok(())
}

fn prompt_secret(target: &Target) -> Result<String> {
    dialoguer::Password::new()
        .with_prompt(format!("sudo password for {}", target.address()))
        .allow_empty_password(true)
        .interact()
        .map_err(|e| Error::Contract(format!("could not read password: {}", e)))
}

fn cmd_validate(plan_path: &Path) -> Result<()> {
    let plan = parser::read_plan(plan_path)?;
    print!("{}", describe_plan(plan_path, &plan));
    Ok(())
}

fn cmd_decode(encoded: &str) -> Result<()> {
    println!("{}", render_payload(encoded)?);
    Ok(())
}

fn describe_plan(path: &Path, plan: &Plan) -> String {
    let invocations: usize = plan.iter().map(|t| t.iterations().len()).sum();
    let mut out = format!(
        "OK: {} ({} tasks, {} invocations)\n",
        path.display(),
        plan.len(),
        invocations
    );
    for task in plan {
        out.push_str(&format!(
            "  {} [{}] x{}, {} file(s)\n",
            task.name,
            task.plugin,
            task.iterations().len(),
            task.files.len()
        ));
    }
    out
}

fn render_payload(encoded: &str) -> Result<String> {
    let payload = decode_payload(encoded)?;
    serde_json::to_string_pretty(&payload)
        .map_err(|e| Error::Payload(format!("could not render: {}", e)))
}

fn format_summary(summary: &RunSummary) -> String {
    format!(
        "Done: {} task(s), {} invocation(s), {} plugin(s) and {} file(s) sent",
        summary.tasks, summary.invocations, summary.plugins_sent, summary.files_sent
    )
}
