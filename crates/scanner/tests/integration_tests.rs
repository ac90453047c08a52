//! End-to-end scanner behavior against real files in a temp directory.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use differ_core::config::{DifferConfig, ExtractConfig, TracebackConfig};
use differ_core::{MemorySink, RecordKind};
use differ_scanner::{
    BlockExtractor, EligibleFile, FileClassifier, FilePosition, PositionMap, PositionStore,
    ScanCycle, ScanCycleBuilder, file_identity, rebuild,
};

const TRACEBACK: &str = "\
2024-01-01 10:00:00 INFO request started
Traceback (most recent call last):
  File \"/usr/lib/python2.7/site-packages/paste/httpserver.py\", line 1068, in process_request_in_thread
  File \"/var/www/app/x.py\", line 12, in run
    value = int(raw)
ValueError: invalid literal for int()
2024-01-01 10:00:01 INFO request finished
";

struct Fixture {
    _dir: tempfile::TempDir,
    logs: PathBuf,
    state: PathBuf,
    sink: Arc<MemorySink>,
    config: DifferConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        std::fs::create_dir(&logs).unwrap();
        let state = dir.path().join("state").join("differ.state");

        let mut config = DifferConfig::default();
        config.scan.targets = vec![logs.display().to_string()];
        config.scan.state_file = state.display().to_string();
        config.scan.max_file_size = 4096;

        Self {
            _dir: dir,
            logs,
            state,
            sink: Arc::new(MemorySink::new()),
            config,
        }
    }

    fn cycle(&self) -> ScanCycle {
        ScanCycleBuilder::new()
            .config(self.config.clone())
            .sink(self.sink.clone())
            .notifier(self.sink.clone())
            .hostname("web01")
            .build()
            .unwrap()
    }

    fn log(&self, name: &str) -> PathBuf {
        self.logs.join(name)
    }

    fn eligible(&self) -> Vec<EligibleFile> {
        FileClassifier::from_config(&self.config.scan).classify().normal
    }
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn default_extractor() -> BlockExtractor {
    BlockExtractor::new(&ExtractConfig::default(), &TracebackConfig::default()).unwrap()
}

#[test]
fn traceback_block_yields_located_record() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, TRACEBACK);

    let outcome = default_extractor().scan(&path, 0).unwrap();
    assert_eq!(outcome.records.len(), 1);

    let record = &outcome.records[0];
    assert_eq!(record.kind, RecordKind::Block);
    assert!(record.source_location.as_deref().unwrap().contains("/var/www/app/x.py"));
    assert_eq!(record.line_number, Some(12));
    assert_eq!(record.method_name.as_deref(), Some("run"));
    assert_eq!(record.truncated_exception_name.as_deref(), Some("ValueError"));
    assert_eq!(record.product.as_deref(), Some("app"));
    assert_eq!(outcome.offset, TRACEBACK.len() as u64);
}

#[test]
fn frame_without_comma_before_method_is_located() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(
        &path,
        "2024-01-01 10:00:00 ERROR [x] boom\n  File \"/var/www/app/x.py\", line 12 in run\nValueError: bad\n\n",
    );

    let outcome = default_extractor().scan(&path, 0).unwrap();
    assert_eq!(outcome.records.len(), 1);

    let record = &outcome.records[0];
    assert!(record.source_location.as_deref().unwrap().contains("/var/www/app/x.py"));
    assert_eq!(record.line_number, Some(12));
    assert_eq!(record.method_name.as_deref(), Some("run"));
    assert_eq!(record.truncated_exception_name.as_deref(), Some("ValueError"));
}

#[test]
fn directory_target_partitions_normal_and_oversized() {
    let fx = Fixture::new();
    std::fs::write(fx.log("a.log"), vec![b'a'; 50]).unwrap();
    std::fs::write(fx.log("b.gz"), b"archived").unwrap();
    std::fs::write(fx.log("c.log"), vec![b'c'; 5000]).unwrap();

    let report = fx.cycle().run_once().unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.oversized_files, 1);

    let stored = fx.sink.errors();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].message.contains("c.log"));
    assert!(stored[0].message.contains("too large"));

    let positions = PositionStore::new(&fx.state).load();
    assert_eq!(positions.len(), 1);
    assert!(positions.get(&fx.log("a.log").display().to_string()).is_some());
}

#[test]
fn known_file_resumes_from_stored_offset() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    std::fs::write(&path, vec![b'.'; 799]).unwrap();
    append(&path, "\n");
    let key = path.display().to_string();
    let identity = file_identity(&std::fs::metadata(&path).unwrap());

    let mut previous = PositionMap::new();
    previous.insert(key.clone(), FilePosition { offset: 500, identity });
    PositionStore::new(&fx.state).persist(&previous).unwrap();

    let rebuilt = rebuild(
        &fx.eligible(),
        &PositionStore::new(&fx.state).load(),
        Duration::from_secs(86_400),
        SystemTime::now(),
    );
    assert_eq!(rebuilt.positions.get(&key).unwrap().offset, 500);

    fx.cycle().run_once().unwrap();
    let after = PositionStore::new(&fx.state).load();
    assert_eq!(after.get(&key).unwrap().offset, 800);
}

#[test]
fn benign_noise_is_never_reported() {
    let fx = Fixture::new();
    append(
        &fx.log("kern.log"),
        "Jan  1 10:00:00 host kernel: [drm:edid_is_valid] ERROR EDID checksum is invalid\n",
    );

    let report = fx.cycle().run_once().unwrap();
    assert_eq!(report.records_emitted, 0);
    assert!(fx.sink.notifications().is_empty());
}

#[test]
fn second_cycle_only_sees_new_lines() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, TRACEBACK);

    let cycle = fx.cycle();
    let first = cycle.run_once().unwrap();
    assert_eq!(first.records_emitted, 1);

    let second = cycle.run_once().unwrap();
    assert_eq!(second.records_emitted, 0);
    assert_eq!(second.bytes_scanned, 0);

    append(&path, "x ERROR database unavailable\n");
    let third = cycle.run_once().unwrap();
    assert_eq!(third.records_emitted, 1);
    assert_eq!(fx.sink.errors().len(), 2);
}

#[cfg(unix)]
#[test]
fn rotation_restarts_from_zero() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, TRACEBACK);

    let cycle = fx.cycle();
    cycle.run_once().unwrap();

    // rotate: move the old file away, write a fresh one under the same name
    let rotated = fx.logs.join("app.log.1.gz");
    std::fs::rename(&path, &rotated).unwrap();
    append(&path, "x ERROR after rotation\n");

    let report = cycle.run_once().unwrap();
    assert_eq!(report.rotations, 1);
    assert_eq!(report.records_emitted, 1);

    let stored = fx.sink.errors();
    assert_eq!(stored.last().unwrap().message, "x ERROR after rotation\n");
}

#[test]
fn truncated_in_place_is_reported_once() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, &"x ERROR one\n".repeat(50));

    let cycle = fx.cycle();
    let first = cycle.run_once().unwrap();
    assert!(first.records_emitted >= 1);
    let key = path.display().to_string();
    let identity = PositionStore::new(&fx.state).load().get(&key).unwrap().identity;

    // copytruncate: same inode, shorter content
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    file.write_all(b"x ERROR after truncate\n").unwrap();
    drop(file);

    let per_cycle: Vec<usize> = (0..3)
        .map(|_| cycle.run_once().unwrap().records_emitted)
        .collect();
    assert_eq!(per_cycle, vec![1, 0, 0]);
    assert_eq!(
        fx.sink.errors().last().unwrap().message,
        "x ERROR after truncate\n"
    );

    let stored = PositionStore::new(&fx.state).load();
    assert_eq!(
        stored.get(&key),
        Some(&FilePosition {
            offset: 23,
            identity
        })
    );
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_skipped_and_keeps_offset() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let locked = fx.log("locked.log");
    let open = fx.log("open.log");
    append(&locked, "x ERROR first\n");
    append(&open, "x ERROR first\n");

    let cycle = fx.cycle();
    cycle.run_once().unwrap();
    let locked_key = locked.display().to_string();
    let before = *PositionStore::new(&fx.state).load().get(&locked_key).unwrap();

    append(&locked, "x ERROR hidden\n");
    append(&open, "x ERROR visible\n");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    if std::fs::File::open(&locked).is_ok() {
        // permission bits do not apply to this user (root)
        return;
    }

    let report = cycle.run_once().unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.records_emitted, 1);
    assert_eq!(fx.sink.errors().last().unwrap().message, "x ERROR visible\n");

    let after = PositionStore::new(&fx.state).load();
    assert_eq!(after.get(&locked_key), Some(&before));
}

#[test]
fn stale_file_is_fast_forwarded() {
    let fx = Fixture::new();
    let path = fx.log("old.log");
    append(&path, TRACEBACK);

    let two_days_later = SystemTime::now() + Duration::from_secs(2 * 86_400);
    let report = fx.cycle().run_once_at(two_days_later).unwrap();
    assert_eq!(report.records_emitted, 0);

    let positions = PositionStore::new(&fx.state).load();
    let position = positions.get(&path.display().to_string()).unwrap();
    assert_eq!(position.offset, TRACEBACK.len() as u64);
}

#[test]
fn tail_budget_forces_close_and_reopens_on_next_line() {
    let config = ExtractConfig {
        max_lines: 3,
        ..ExtractConfig::default()
    };
    let extractor = BlockExtractor::new(&config, &TracebackConfig::default()).unwrap();

    let fx = Fixture::new();
    let path = fx.log("budget.log");
    append(
        &path,
        "x ERROR first\nline two\nline three\nTraceback (most recent call last):\nline five\n",
    );

    let outcome = extractor.scan(&path, 0).unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(
        outcome.records[0].raw_message,
        "x ERROR first\nline two\nline three\n"
    );
    // line max_lines + 1 opened a fresh block
    assert!(outcome.records[1].raw_message.starts_with("Traceback"));
}

#[test]
fn same_range_twice_is_identical() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, TRACEBACK);
    append(&path, "x ERROR second block\n12:00:00 done\n");

    let extractor = default_extractor();
    let now = chrono::Utc::now();
    let first = extractor.scan_at(&path, 0, now).unwrap();
    let second = extractor.scan_at(&path, 0, now).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.records.len(), 2);
}

#[test]
fn notification_wraps_each_file() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, "x ERROR boom\n");

    fx.cycle().run_once().unwrap();
    let notes = fx.sink.notifications();
    assert_eq!(notes.len(), 1);
    let key = path.display().to_string();
    assert_eq!(
        notes[0],
        format!("==> Start errors from : {key}\nx ERROR boom\n==> End errors from {key}\n")
    );
}

#[test]
fn stored_errors_carry_hostname_and_caps() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(
        &path,
        &format!(
            "Traceback (most recent call last):\n  File \"/var/www/kitsapcontrollers/x.py\", line 3, in {}\nKeyError: 'id'\n",
            "m".repeat(40)
        ),
    );

    fx.cycle().run_once().unwrap();
    let stored = &fx.sink.errors()[0];
    assert_eq!(stored.hostname, "web01");
    assert_eq!(stored.product.as_deref(), Some("kitsapco"));
    assert_eq!(stored.method.as_deref().map(str::len), Some(32));
    assert_eq!(stored.exception.as_deref(), Some("KeyError"));
}

#[test]
fn corrupt_state_starts_over() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, "x ERROR boom\n");
    std::fs::create_dir_all(fx.state.parent().unwrap()).unwrap();
    std::fs::write(&fx.state, b"]]]").unwrap();

    let report = fx.cycle().run_once().unwrap();
    assert_eq!(report.records_emitted, 1);
    assert_eq!(PositionStore::new(&fx.state).load().len(), 1);
}

#[test]
fn debug_scan_leaves_state_alone() {
    let fx = Fixture::new();
    let path = fx.log("app.log");
    append(&path, TRACEBACK);

    let outcome = fx.cycle().debug_scan(&path).unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert!(!fx.state.exists());
    assert!(fx.sink.errors().is_empty());
}
