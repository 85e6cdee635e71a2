use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use datamover_events::EventBus;
use datamover_fsops::{
    CopyOutcome, DirectoryScanner, EntryFilter, EventSink, IntraFsMover, PathHandler,
    SENTINEL_FILE_NAME, ScanConfig,
};
use datamover_telemetry::Metrics;
use datamover_test_support::{Scratch, set_mtime_secs};

type TestResult<T> = anyhow::Result<T>;

/// Moves everything except entries named `b`, recording dispatch order.
struct RecordingMover {
    inner: IntraFsMover,
    calls: Mutex<Vec<String>>,
}

impl RecordingMover {
    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PathHandler for RecordingMover {
    fn handle(&self, path: &Path) -> CopyOutcome {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.clone());
        if name == "b" {
            return CopyOutcome::retriable("refusing b");
        }
        self.inner.handle(path)
    }
}

struct Fixture {
    scratch: Scratch,
    scanner: DirectoryScanner,
    handler: Arc<RecordingMover>,
    events: EventBus,
}

fn fixture() -> TestResult<Fixture> {
    let scratch = Scratch::new()?;
    let incoming = scratch.dir("incoming")?;
    let outgoing = scratch.dir("outgoing")?;
    let handler = Arc::new(RecordingMover {
        inner: IntraFsMover::new(&outgoing)?,
        calls: Mutex::new(Vec::new()),
    });
    let events = EventBus::new();
    let scanner = DirectoryScanner::new(
        ScanConfig::new(
            &incoming,
            Arc::new(EntryFilter::accept_all()),
            Arc::clone(&handler) as Arc<dyn PathHandler>,
        ),
        EventSink::new(events.clone(), Metrics::new()?),
    )?;
    Ok(Fixture {
        scratch,
        scanner,
        handler,
        events,
    })
}

#[test]
fn oldest_first_with_failing_entry_recorded_once() -> TestResult<()> {
    let fx = fixture()?;
    fx.scratch.file_with_mtime("incoming/a", "a", 1_000)?;
    let b = fx.scratch.file_with_mtime("incoming/b", "b", 3_000)?;
    fx.scratch.file_with_mtime("incoming/c", "c", 2_000)?;

    let report = fx.scanner.scan()?;
    assert_eq!(fx.handler.calls(), ["a", "c", "b"]);
    assert_eq!(report.new_faults, vec![b.clone()]);

    let sentinel = fx.scratch.path().join("incoming").join(SENTINEL_FILE_NAME);
    let contents = fs::read_to_string(&sentinel)?;
    assert_eq!(contents.lines().count(), 1);
    assert_eq!(Path::new(contents.trim()), fs::canonicalize(&b)?);

    fx.scanner.run();
    assert_eq!(fx.handler.calls(), ["a", "c", "b"]);
    assert_eq!(fs::read_to_string(&sentinel)?, contents);

    let outgoing = fx.scratch.path().join("outgoing");
    assert!(outgoing.join("a").is_file());
    assert!(outgoing.join("c").is_file());
    Ok(())
}

#[test]
fn rescanning_processed_directory_is_idle() -> TestResult<()> {
    let fx = fixture()?;
    fx.scratch.file("incoming/a", "a")?;

    assert_eq!(fx.scanner.scan()?.moved.len(), 1);
    let last_id = fx.events.last_event_id();
    for _ in 0..3 {
        let report = fx.scanner.scan()?;
        assert!(report.is_idle());
        assert_eq!(report.skipped_faulty, 0);
    }
    assert_eq!(fx.events.last_event_id(), last_id);
    assert_eq!(fx.handler.calls(), ["a"]);
    Ok(())
}

#[test]
fn deleting_sentinel_retries_faulty_paths() -> TestResult<()> {
    let fx = fixture()?;
    fx.scratch.file("incoming/b", "b")?;
    fx.scanner.run();
    fx.scanner.run();
    assert_eq!(fx.handler.calls(), ["b"]);

    let sentinel = fx.scratch.path().join("incoming").join(SENTINEL_FILE_NAME);
    fs::remove_file(&sentinel)?;
    fx.scanner.run();
    assert_eq!(fx.handler.calls(), ["b", "b"]);
    assert!(sentinel.is_file());
    Ok(())
}

#[test]
fn editing_sentinel_reloads_faults() -> TestResult<()> {
    let fx = fixture()?;
    fx.scratch.file("incoming/b", "b")?;
    fx.scanner.run();

    let sentinel = fx.scratch.path().join("incoming").join(SENTINEL_FILE_NAME);
    fs::write(&sentinel, "")?;
    set_mtime_secs(&sentinel, 4_000_000_000)?;
    fx.scanner.run();
    assert_eq!(fx.handler.calls(), ["b", "b"]);

    let kinds: Vec<_> = fx
        .events
        .backlog_since(0)
        .into_iter()
        .map(|envelope| envelope.event.kind())
        .collect();
    assert!(kinds.contains(&"faults_reloaded"));
    Ok(())
}

#[test]
fn filter_excludes_entries_but_never_the_sentinel_rule() -> TestResult<()> {
    let scratch = Scratch::new()?;
    let incoming = scratch.dir("incoming")?;
    let outgoing = scratch.dir("outgoing")?;
    scratch.file("incoming/keep.dat", "k")?;
    scratch.file("incoming/skip.tmp", "s")?;
    scratch.file(format!("incoming/{SENTINEL_FILE_NAME}"), "")?;

    let filter = |path: &Path| path.extension().is_none_or(|ext| ext != "tmp");
    let scanner = DirectoryScanner::new(
        ScanConfig::new(
            &incoming,
            Arc::new(filter),
            Arc::new(IntraFsMover::new(&outgoing)?),
        ),
        EventSink::new(EventBus::new(), Metrics::new()?),
    )?;
    scratch.file(format!("incoming/{SENTINEL_FILE_NAME}"), "")?;

    let report = scanner.scan()?;
    assert_eq!(report.handled, vec![incoming.join("keep.dat")]);
    assert!(incoming.join("skip.tmp").is_file());
    assert!(incoming.join(SENTINEL_FILE_NAME).is_file());
    Ok(())
}
