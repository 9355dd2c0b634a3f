#![doc = include_str!("../README.md")]

mod checks;
mod config;
mod report;
mod source;
mod telemetry;

use checks::Checks;
use clap::Parser;
use config::{CliArgs, Config, ReportConfig};
use domcheck_broker::{Broker, Predicate};
use futures::StreamExt;
use report::{Next, Reporter, Summary};
use source::KeySource;
use std::{io::Write, process::ExitCode};
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = Config::try_from(args)?;

    telemetry::init_logging(config.verbose)?;
    log_startup_info(&config);

    let checks = Checks::new(&config.checks)?;
    let keys = KeySource::open(&config.source)?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let stdout = std::io::stdout().lock();
    let (summary, failed) = run(
        config.concurrency,
        checks,
        keys,
        config.report,
        cancel,
        stdout,
    )
    .await?;

    tracing::info!(
        "Checked {} domains: {} valid, {} invalid",
        summary.valid + summary.invalid,
        summary.valid,
        summary.invalid
    );

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Pushes every key from `keys` through a broker and reports the verdicts in
/// input order.
///
/// Submission runs on a blocking thread since the key source may block on
/// stdin or a file. It stops early once `cancel` fires, either from a signal
/// or from the reporter after the first invalid domain with `--exit` or a
/// failed write. The results still in flight are always drained before
/// returning.
async fn run<P, W>(
    concurrency: usize,
    predicate: P,
    keys: KeySource,
    report: ReportConfig,
    cancel: CancellationToken,
    out: W,
) -> anyhow::Result<(Summary, bool)>
where
    P: Predicate<String>,
    W: Write,
{
    let mut broker = Broker::new(concurrency, predicate)?;
    let mut results = broker.results()?;

    let handle = tokio::runtime::Handle::current();
    let producer_cancel = cancel.clone();
    let producer = tokio::task::spawn_blocking(move || -> domcheck_broker::Result<u64> {
        let mut submitted = Ok(());
        for key in keys {
            if producer_cancel.is_cancelled() {
                tracing::info!("Submission stopped after {} domains", broker.submitted());
                break;
            }
            if let Err(e) = handle.block_on(broker.submit(key)) {
                submitted = Err(e);
                break;
            }
        }
        // Always shut down, so a worker panic is re-raised here.
        handle.block_on(broker.shutdown())?;
        submitted.map(|()| broker.submitted())
    });

    let mut reporter = Reporter::new(report, out);
    let mut write_error = None;
    while let Some(verdict) = results.next().await {
        match reporter.report(&verdict) {
            Ok(Next::Stop) if !cancel.is_cancelled() => {
                tracing::warn!("{} is invalid, stopping", verdict.key);
                cancel.cancel();
            }
            Ok(_) => {}
            Err(e) => {
                cancel.cancel();
                write_error = Some(e);
                break;
            }
        }
    }
    drop(results);

    let submitted = match producer.await {
        Ok(submitted) => submitted?,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => return Err(e.into()),
    };
    if let Some(e) = write_error {
        return Err(anyhow::Error::new(e).context("Error while writing results"));
    }

    let failed = reporter.failed();
    let summary = reporter.finish()?;
    debug_assert_eq!(summary.total(), submitted);
    Ok((summary, failed))
}

fn log_startup_info(config: &Config) {
    tracing::debug!(
        "Checking domains with concurrency {} (tls: {}, cname: {:?}, cidrs: {}, timeout: {:?})",
        config.concurrency,
        config.checks.tls,
        config.checks.cname,
        config.checks.cidrs.len(),
        config.checks.timeout,
    );
}

async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = cancel.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, finishing domains in flight...");
    cancel.cancel();
}
