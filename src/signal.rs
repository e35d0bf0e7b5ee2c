//! Cooperative cancellation.
//!
//! A [`ShutdownHandler`] wraps the `Arc<AtomicBool>` that the scanner and
//! executor poll. The scanner checks it between chunks (and skips
//! reconciliation when it fires); the executor checks it between batches.
//!
//! ```rust,no_run
//! use dupestore::scanner::ScannerConfig;
//! use dupestore::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let config = ScannerConfig::default().with_shutdown_flag(handler.get_flag());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// A handler with no shutdown requested and no signal hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set the flag by hand.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The flag to hand to a `ScannerConfig` or `ExecuteConfig`.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag so the handler can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Hook Ctrl+C (and SIGTERM) to a process-wide [`ShutdownHandler`].
///
/// Repeated calls return the already installed handler with its flag
/// cleared.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if another Ctrl+C handler owns
/// the signal.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = GLOBAL_HANDLER.get_or_init(ShutdownHandler::new).clone();
    let flag = handler.get_flag();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        log::warn!("Interrupt received; stopping at the next checkpoint");
    })?;

    log::debug!("Signal handler installed");
    Ok(handler)
}
