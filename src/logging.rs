//! Logging setup for applications embedding dupestore.
//!
//! The library itself only emits `log` records. Binaries and tools that
//! want them printed call [`init_logging`] once at startup.
//!
//! Level selection, highest priority first:
//!
//! 1. `RUST_LOG`, when set
//! 2. `quiet` (errors only)
//! 3. `verbose`: 0 = info, 1 = debug, 2+ = trace
//!
//! Debug builds prefix each line with a timestamp and, when verbose, the
//! module path. Release builds print level and message only.
//!
//! ```rust,no_run
//! use dupestore::logging::init_logging;
//!
//! init_logging(1, false).ok();
//! log::debug!("visible at -v");
//! ```

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};

/// Install the `env_logger` backend.
///
/// # Errors
///
/// Returns [`SetLoggerError`] if a logger is already installed.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<(), SetLoggerError> {
    let from_env = env::var("RUST_LOG").is_ok();
    let level = determine_level(verbose, quiet);

    let mut builder = Builder::new();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level);
    }
    configure_format(&mut builder, verbose);
    builder.try_init()?;

    if from_env {
        log::debug!(
            "Logging configured from RUST_LOG (max level: {})",
            current_level_name()
        );
    } else {
        log::debug!("Logging initialized at level: {}", current_level_name());
    }
    Ok(())
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(debug_assertions)]
fn configure_format(builder: &mut Builder, verbose: u8) {
    builder.format(move |buf, record| {
        let timestamp = buf.timestamp_seconds();
        let level = record.level();
        let style = buf.default_level_style(level);

        if verbose >= 1 {
            writeln!(
                buf,
                "{} {style}{:<5}{style:#} [{}] {}",
                timestamp,
                level,
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        } else {
            writeln!(buf, "{} {style}{:<5}{style:#} {}", timestamp, level, record.args())
        }
    });
}

#[cfg(not(debug_assertions))]
fn configure_format(builder: &mut Builder, _verbose: u8) {
    builder.format(|buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
    });
}

/// Name of the currently active maximum level.
///
/// # Returns
///
/// One of `"off"`, `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
#[must_use]
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
