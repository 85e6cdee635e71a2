use std::sync::Arc;
use std::time::Duration;

use datamover_config::{DatamoverConfig, MoverKind};
use datamover_events::EventBus;
use datamover_fsops::{
    DirectoryScanner, EntryFilter, EventSink, FreeSpaceProvider, HighwaterMarkWatcher,
    IntraFsMover, PathHandler, ProcessCopier, RetryPolicy, ScanConfig, StatvfsFreeSpace,
    TimeBoundedFreeSpace,
};
use datamover_telemetry::{LogFormat, LoggingConfig, Metrics};
use tracing::{error, info};

use crate::cli::{Cli, Command};
use crate::error::{AppError, AppResult};
use crate::scheduler::Scheduler;

/// Wired components for one incoming/destination pair.
#[derive(Debug, Clone)]
pub struct Services {
    /// Scanner over the incoming directory.
    pub scanner: Arc<DirectoryScanner>,
    /// Free-space watcher on the destination.
    pub watcher: Arc<HighwaterMarkWatcher>,
    /// External copier, present when the process mover is configured.
    pub copier: Option<Arc<ProcessCopier>>,
    /// Shared event and metrics sink.
    pub sink: EventSink,
}

/// Build the scanner, mover and watcher described by `config`.
///
/// # Errors
///
/// Returns an error when the filter patterns are invalid, the destination is
/// unusable for a rename mover, or the incoming directory cannot be prepared.
pub fn build_services(
    config: &DatamoverConfig,
    sink: EventSink,
    provider: Arc<dyn FreeSpaceProvider>,
) -> AppResult<Services> {
    let filter = EntryFilter::from_config(&config.filter)
        .map_err(|err| AppError::fsops("filter.from_config", err))?;
    let destination = config.destination.path().to_path_buf();

    let (handler, copier): (Arc<dyn PathHandler>, Option<Arc<ProcessCopier>>) =
        match config.mover {
            MoverKind::Rename => {
                let mover = IntraFsMover::new(&destination)
                    .map_err(|err| AppError::fsops("mover.new", err))?;
                (Arc::new(mover), None)
            }
            MoverKind::Process => {
                let copier = Arc::new(ProcessCopier::new(
                    &config.copier,
                    &destination,
                    sink.clone(),
                ));
                (Arc::clone(&copier) as Arc<dyn PathHandler>, Some(copier))
            }
        };

    let scanner = DirectoryScanner::new(
        ScanConfig::new(&config.incoming, Arc::new(filter), handler),
        sink.clone(),
    )
    .map_err(|err| AppError::fsops("scanner.new", err))?;

    let watcher = HighwaterMarkWatcher::new(
        config.destination.clone(),
        provider,
        RetryPolicy::from_settings(&config.highwater_retry),
        sink.clone(),
    );

    info!(
        incoming = %config.incoming.display(),
        destination = %config.destination,
        mover = config.mover.as_str(),
        "datamover services wired"
    );

    Ok(Services {
        scanner: Arc::new(scanner),
        watcher: Arc::new(watcher),
        copier,
        sink,
    })
}

/// Load configuration, install logging, and run the selected command.
///
/// # Errors
///
/// Returns an error when configuration, logging, wiring, or the copier check fails.
pub async fn run_cli(cli: Cli) -> AppResult<()> {
    let config = datamover_config::load(cli.config.as_deref())
        .map_err(|err| AppError::config("config.load", err))?;

    let format = config
        .logging
        .format
        .as_deref()
        .map_or_else(LogFormat::infer, LogFormat::from_name);
    datamover_telemetry::init_logging(&LoggingConfig {
        level: &config.logging.level,
        format,
        build_sha: option_env!("DATAMOVER_BUILD_SHA").unwrap_or("dev"),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let sink = EventSink::new(EventBus::new(), metrics);

    match cli.command() {
        Command::Check => check_copier(&config, sink).await,
        Command::Run => run_daemon(&config, sink).await,
    }
}

async fn check_copier(config: &DatamoverConfig, sink: EventSink) -> AppResult<()> {
    let copier = ProcessCopier::new(&config.copier, config.destination.path(), sink);
    verify_copier(Arc::new(copier)).await?;
    info!(
        executable = %config.copier.executable.display(),
        "copy executable passed its check"
    );
    Ok(())
}

async fn run_daemon(config: &DatamoverConfig, sink: EventSink) -> AppResult<()> {
    info!(build_sha = datamover_telemetry::build_sha(), "datamover starting");

    let provider: Arc<dyn FreeSpaceProvider> = Arc::new(TimeBoundedFreeSpace::new(
        Arc::new(StatvfsFreeSpace),
        Duration::from_millis(config.highwater_retry.probe_timeout_ms),
    ));
    let services = build_services(config, sink, provider)?;
    if let Some(copier) = &services.copier {
        verify_copier(Arc::clone(copier)).await?;
    }

    let metrics = services.sink.metrics().clone();
    let scheduler = Scheduler::from_services(&services, config);
    let result = scheduler
        .run_until(async {
            tokio::signal::ctrl_c()
                .await
                .map_err(|source| AppError::Signal { source })
        })
        .await;

    let snapshot = metrics.snapshot();
    info!(
        paths_faulty_total = snapshot.paths_faulty_total,
        scan_failures_total = snapshot.scan_failures_total,
        highwater_below = snapshot.highwater_below,
        "datamover stopped"
    );
    result
}

async fn verify_copier(copier: Arc<ProcessCopier>) -> AppResult<()> {
    tokio::task::spawn_blocking(move || copier.check())
        .await
        .map_err(|err| AppError::join("copier.check", err))?
        .map_err(|err| {
            error!(error = %err, source = ?std::error::Error::source(&err), "copy executable check failed");
            AppError::fsops("copier.check", err)
        })
}
