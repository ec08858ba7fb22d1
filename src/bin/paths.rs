//! `paths` plugin: reconcile files, directories and symlinks on the target.
//!
//! Invoked by upset as `./paths <payload>` from inside the workspace.

use upset::plugin::{load_invocation_payload, paths};
use upset::resources::Fs;

fn main() {
    upset::cli::init_tracing(2);

    let result = load_invocation_payload(std::env::args()).and_then(|payload| {
        let span = tracing::info_span!("paths", task = %payload.name);
        let workspace = std::env::current_dir().map_err(|e| upset::Error::Filesystem {
            op: upset::core::error::FsOp::Stat,
            path: ".".into(),
            source: e,
        })?;
        paths::run(&payload, &workspace, &Fs::new(span))
    });

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
