#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use datamover_app::{Scheduler, build_services};
use datamover_config::{
    CopierConfig, DatamoverConfig, FilterConfig, LoggingSettings, MoverKind,
    PathWithHighwaterMark, RetrySettings,
};
use datamover_events::EventBus;
use datamover_fsops::{EventSink, StatvfsFreeSpace};
use datamover_telemetry::Metrics;
use datamover_test_support::{Scratch, shell_available};

type TestResult<T> = anyhow::Result<T>;

fn process_config(scratch: &Scratch, copy_script: &str) -> TestResult<DatamoverConfig> {
    Ok(DatamoverConfig {
        incoming: scratch.dir("incoming")?,
        destination: PathWithHighwaterMark::new(scratch.dir("outgoing")?, 0),
        mover: MoverKind::Process,
        copier: CopierConfig {
            executable: scratch.script("copy-tool", copy_script)?,
            ..CopierConfig::default()
        },
        check_interval: Duration::from_millis(20),
        highwater_interval: Duration::from_secs(60),
        highwater_retry: RetrySettings::default(),
        filter: FilterConfig::default(),
        pause_on_highwater: false,
        logging: LoggingSettings::default(),
    })
}

#[tokio::test]
async fn shutdown_terminates_running_copy() -> TestResult<()> {
    if !shell_available() {
        return Ok(());
    }
    let scratch = Scratch::new()?;
    let config = process_config(&scratch, "exec sleep 30")?;
    let entry = scratch.file("incoming/slow.bin", "payload")?;

    let events = EventBus::new();
    let sink = EventSink::new(events.clone(), Metrics::new()?);
    let services = build_services(&config, sink, Arc::new(StatvfsFreeSpace))?;
    let copier = services
        .copier
        .clone()
        .ok_or_else(|| anyhow::anyhow!("process mover must expose its copier"))?;
    let scheduler = Scheduler::from_services(&services, &config);

    let started = Instant::now();
    scheduler
        .run_until(async move {
            while !copier.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(())
        })
        .await?;

    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(entry.is_file());
    assert_eq!(services.scanner.faulty_paths().len(), 1);
    let outcomes: Vec<_> = events
        .backlog_since(0)
        .into_iter()
        .filter(|envelope| envelope.event.kind() == "copy_finished")
        .collect();
    assert_eq!(outcomes.len(), 1);
    Ok(())
}

#[tokio::test]
async fn process_mover_drains_incoming_directory() -> TestResult<()> {
    if !shell_available() {
        return Ok(());
    }
    let scratch = Scratch::new()?;
    let config = process_config(
        &scratch,
        r#"if [ -d "$1" ]; then cp -R "$1" "$2"; else cp "$1" "$2/"; fi"#,
    )?;
    scratch.file("incoming/one.txt", "1")?;
    scratch.file("incoming/batch/two.txt", "2")?;

    let sink = EventSink::new(EventBus::new(), Metrics::new()?);
    let services = build_services(&config, sink, Arc::new(StatvfsFreeSpace))?;
    let scheduler = Scheduler::from_services(&services, &config);
    let incoming = config.incoming.clone();
    scheduler
        .run_until(async move {
            for _ in 0..500 {
                let drained = std::fs::read_dir(&incoming)
                    .is_ok_and(|mut entries| entries.next().is_none());
                if drained {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(())
        })
        .await?;

    let outgoing = scratch.path().join("outgoing");
    assert_eq!(std::fs::read_to_string(outgoing.join("one.txt"))?, "1");
    assert_eq!(std::fs::read_to_string(outgoing.join("batch/two.txt"))?, "2");
    Ok(())
}
