//! Ctrl-C handling.
//!
//! The run loop is synchronous, so the signal is awaited on a helper thread
//! driving a current-thread tokio runtime. The first Ctrl-C only raises a
//! flag that the orchestrator polls between steps; a second one exits
//! immediately.

use super::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Interrupted)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Raise `flag` on Ctrl-C for the rest of the process lifetime.
pub fn install_ctrl_c(flag: CancelFlag) -> Result<()> {
    let spawn_err = |source| Error::Spawn {
        program: "signal handler".to_string(),
        source,
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(spawn_err)?;

    std::thread::Builder::new()
        .name("upset-signal".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "ctrl-c handler failed");
                        return;
                    }
                    if flag.is_cancelled() {
                        warn!("second interrupt, exiting without cleanup");
                        std::process::exit(130);
                    }
                    warn!("received ctrl-c, aborting after the current step");
                    flag.cancel();
                }
            })
        })
        .map_err(spawn_err)?;
    Ok(())
}
