//! # Logging
//!
//! Diagnostics go through `tracing` and are printed to stderr by a
//! `tracing_subscriber::fmt` layer, so stdout carries nothing but the domains
//! selected with `--print-valid` / `--print-invalid`.
//!
//! ## Filtering
//!
//! - `RUST_LOG`, when set, takes precedence (standard `EnvFilter` syntax).
//! - Otherwise the level is `info`, or `debug` with `--verbose`, which shows
//!   every per-domain check as it runs.
//!
//! ## Example usage
//!
//! ```bash
//! domcheck --tls -v -f domains.txt
//! RUST_LOG=domcheck_broker=trace domcheck --cname edge.cdn.net a.com
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for the given verbosity.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,domcheck=debug,domcheck_broker=debug"
    } else {
        "info"
    }
}

pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(verbose).into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(verbose)
                .with_line_number(verbose)
                .with_file(verbose)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()?;
    Ok(())
}
