#![cfg(unix)]

use std::fs;
use std::sync::Arc;

use datamover_config::CopierConfig;
use datamover_events::{Event, EventBus};
use datamover_fsops::{
    DirectoryScanner, EntryFilter, EventSink, ProcessCopier, ScanConfig,
};
use datamover_telemetry::Metrics;
use datamover_test_support::{Scratch, shell_available};

type TestResult<T> = anyhow::Result<T>;

const COPY_SCRIPT: &str = r#"if [ -d "$1" ]; then cp -R "$1" "$2"; else cp "$1" "$2/"; fi"#;

#[test]
fn scanner_moves_entries_through_copy_tool() -> TestResult<()> {
    if !shell_available() {
        return Ok(());
    }
    let scratch = Scratch::new()?;
    let incoming = scratch.dir("incoming")?;
    let outgoing = scratch.dir("outgoing")?;
    scratch.file_with_mtime("incoming/run-1/data.csv", "1,2,3", 1_000)?;
    scratch.file_with_mtime("incoming/notes.txt", "notes", 500)?;

    let config = CopierConfig {
        executable: scratch.script("copy-tool", COPY_SCRIPT)?,
        ..CopierConfig::default()
    };
    let events = EventBus::new();
    let sink = EventSink::new(events.clone(), Metrics::new()?);
    let copier = Arc::new(ProcessCopier::new(&config, &outgoing, sink.clone()));
    let scanner = DirectoryScanner::new(
        ScanConfig::new(&incoming, Arc::new(EntryFilter::accept_all()), copier),
        sink,
    )?;

    let report = scanner.scan()?;
    assert_eq!(report.moved.len(), 2);
    assert!(report.new_faults.is_empty());
    assert_eq!(fs::read_to_string(outgoing.join("notes.txt"))?, "notes");
    assert_eq!(fs::read_to_string(outgoing.join("run-1/data.csv"))?, "1,2,3");
    assert!(fs::read_dir(&incoming)?.next().is_none());

    let finished: Vec<_> = events
        .backlog_since(0)
        .into_iter()
        .filter_map(|envelope| match envelope.event {
            Event::CopyFinished { outcome, .. } => Some(outcome),
            _ => None,
        })
        .collect();
    assert_eq!(finished, ["ok", "ok"]);
    Ok(())
}

#[test]
fn failing_copy_tool_leaves_entry_faulty() -> TestResult<()> {
    if !shell_available() {
        return Ok(());
    }
    let scratch = Scratch::new()?;
    let incoming = scratch.dir("incoming")?;
    let outgoing = scratch.dir("outgoing")?;
    let entry = scratch.file("incoming/a", "a")?;

    let config = CopierConfig {
        executable: scratch.script("copy-tool", "exit 2")?,
        ..CopierConfig::default()
    };
    let sink = EventSink::new(EventBus::new(), Metrics::new()?);
    let copier = Arc::new(ProcessCopier::new(&config, &outgoing, sink.clone()));
    let scanner = DirectoryScanner::new(
        ScanConfig::new(&incoming, Arc::new(EntryFilter::accept_all()), copier),
        sink.clone(),
    )?;

    let report = scanner.scan()?;
    assert_eq!(report.new_faults, vec![entry.clone()]);
    assert!(entry.is_file());
    assert_eq!(sink.metrics().snapshot().paths_faulty_total, 1);
    let rendered = sink.metrics().render()?;
    assert!(rendered.contains("paths_handled_total{outcome=\"retriable_error\"} 1"));
    Ok(())
}
