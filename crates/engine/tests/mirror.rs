//! End-to-end mirror cycles against real directory trees

mod common;

use common::{assert_mirrored, fast_options, TestPair, TreeSize, TreeTemplate};
use engine::{stop, ExcludeConfig, StabilityConfig, StopSignal, SyncOptions};
use std::fs;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_empty_replica_receives_nested_tree() {
    let t = TestPair::new();
    t.write_source("a/b.txt", b"X");
    t.write_source("a/c.txt", b"");

    let report = t.pair().run_cycle(&StopSignal::never()).unwrap();

    assert_eq!(report.dirs_created, 1);
    assert_eq!(report.files_created, 2);
    assert!(t.replica.join("a").is_dir());
    assert_eq!(fs::read(t.replica.join("a/b.txt")).unwrap(), b"X");
    assert!(t.replica.join("a/c.txt").is_file());
    assert_mirrored(&t.source, &t.replica);
}

#[test]
fn test_stale_replica_is_corrected() {
    let t = TestPair::new();
    t.write_source("a/b.txt", b"X");
    t.write_replica("a/b.txt", b"Y");
    t.write_replica("a/d.txt", b"obsolete");

    let report = t.pair().run_cycle(&StopSignal::never()).unwrap();

    assert_eq!(report.files_updated, 1);
    assert_eq!(report.files_deleted, 1);
    assert_eq!(fs::read(t.replica.join("a/b.txt")).unwrap(), b"X");
    assert!(!t.replica.join("a/d.txt").exists());
    assert_mirrored(&t.source, &t.replica);
}

#[test]
fn test_second_cycle_is_a_no_op() {
    let t = TestPair::new();
    TreeTemplate::new(TreeSize::Small, 7).generate(&t.source);
    let pair = t.pair();

    let first = pair.run_cycle(&StopSignal::never()).unwrap();
    assert!(first.changes() > 0);

    assert!(pair.plan().unwrap().is_empty());
    let second = pair.run_cycle(&StopSignal::never()).unwrap();
    assert_eq!(second.changes(), 0);
    assert!(second.is_clean());
}

#[test]
fn test_deletions_propagate() {
    let t = TestPair::new();
    t.write_source("keep.txt", b"k");
    t.write_source("gone.txt", b"g");
    t.write_source("tree/sub/leaf.txt", b"l");
    let pair = t.pair();
    pair.run_cycle(&StopSignal::never()).unwrap();

    fs::remove_file(t.source.join("gone.txt")).unwrap();
    fs::remove_dir_all(t.source.join("tree")).unwrap();
    let report = pair.run_cycle(&StopSignal::never()).unwrap();

    assert_eq!(report.files_deleted, 2);
    assert_eq!(report.dirs_deleted, 2);
    assert!(!t.replica.join("gone.txt").exists());
    assert!(!t.replica.join("tree").exists());
    assert!(t.replica.join("keep.txt").exists());
}

#[test]
fn test_content_change_is_detected_but_identical_rewrite_is_not() {
    let t = TestPair::new();
    t.write_source("doc.txt", b"first version");
    let pair = t.pair();
    pair.run_cycle(&StopSignal::never()).unwrap();

    // Same bytes rewritten: new mtime, no content change
    t.write_source("doc.txt", b"first version");
    assert!(pair.plan().unwrap().is_empty());

    // Same length, different bytes
    t.write_source("doc.txt", b"FIRST VERSION");
    let actions = pair.plan().unwrap();
    assert_eq!(actions.files_to_update.len(), 1);

    let report = pair.run_cycle(&StopSignal::never()).unwrap();
    assert_eq!(report.files_updated, 1);
    assert_eq!(fs::read(t.replica.join("doc.txt")).unwrap(), b"FIRST VERSION");
}

#[test]
fn test_random_trees_converge_in_one_cycle() {
    for seed in [1u64, 2, 3] {
        let t = TestPair::new();
        TreeTemplate::new(TreeSize::Medium, seed).generate(&t.source);
        // Unrelated junk in the replica, some of it colliding by name
        TreeTemplate::new(TreeSize::Small, seed + 100).generate(&t.replica);

        let report = t.pair().run_cycle(&StopSignal::never()).unwrap();

        assert!(report.is_clean(), "seed {seed}: {report:?}");
        assert_mirrored(&t.source, &t.replica);
        assert!(t.pair().plan().unwrap().is_empty(), "seed {seed} not idempotent");
    }
}

#[test]
fn test_missing_replica_root_is_recreated() {
    let t = TestPair::new();
    t.write_source("f", b"x");
    fs::remove_dir(&t.replica).unwrap();

    t.pair().run_cycle(&StopSignal::never()).unwrap();

    assert_mirrored(&t.source, &t.replica);
}

#[test]
fn test_missing_source_root_fails_the_cycle() {
    let t = TestPair::new();
    t.write_replica("precious", b"must survive");
    fs::remove_dir(&t.source).unwrap();

    let err = t.pair().run_cycle(&StopSignal::never()).unwrap_err();

    assert!(err.to_string().contains("source scan failed"));
    assert!(t.replica.join("precious").exists());
}

#[test]
fn test_excluded_paths_are_neither_copied_nor_deleted() {
    let t = TestPair::new();
    t.write_source("src/main.rs", b"fn main() {}");
    t.write_source("build/out.o", b"object");
    t.write_source("notes.swp", b"swap");
    t.write_replica("build/keep-me", b"replica-local");

    let options = SyncOptions {
        exclude: ExcludeConfig {
            use_ignore_file: true,
            patterns: vec!["build/".to_string()],
        },
        ..fast_options()
    };
    t.write_source(".replicaignore", b"*.swp\n");

    let report = t.pair_with(options).run_cycle(&StopSignal::never()).unwrap();

    assert!(report.is_clean());
    assert!(t.replica.join("src/main.rs").exists());
    assert!(t.replica.join(".replicaignore").exists());
    assert!(!t.replica.join("notes.swp").exists());
    assert!(!t.replica.join("build/out.o").exists());
    assert_eq!(fs::read(t.replica.join("build/keep-me")).unwrap(), b"replica-local");
}

#[test]
fn test_excluded_replica_directory_survives_source_file_of_same_name() {
    let t = TestPair::new();
    t.write_source("build", b"a file in the source");
    t.write_source("kept.txt", b"k");
    t.write_replica("build/precious.o", b"replica-local");

    let options = SyncOptions {
        exclude: ExcludeConfig {
            use_ignore_file: false,
            patterns: vec!["build/".to_string()],
        },
        ..fast_options()
    };
    let pair = t.pair_with(options);

    for _ in 0..2 {
        let report = pair.run_cycle(&StopSignal::never()).unwrap();

        assert_eq!(report.failures, 1, "{report:?}");
        assert_eq!(
            fs::read(t.replica.join("build/precious.o")).unwrap(),
            b"replica-local"
        );
        assert!(t.replica.join("kept.txt").exists());
    }
}

#[test]
fn test_growing_source_is_copied_once_it_settles() {
    let t = TestPair::new();
    let log = t.source.join("capture.log");
    fs::write(&log, b"").unwrap();

    let writer_path = log.clone();
    let writer = thread::spawn(move || {
        let mut f = fs::OpenOptions::new().append(true).open(&writer_path).unwrap();
        for i in 0..10 {
            writeln!(f, "record {i}").unwrap();
            thread::sleep(Duration::from_millis(30));
        }
    });
    thread::sleep(Duration::from_millis(40));

    let options = SyncOptions {
        stability: StabilityConfig {
            poll_interval_ms: 25,
            quiet_period_ms: 150,
            max_wait_secs: 10,
        },
        ..SyncOptions::default()
    };
    let start = Instant::now();
    let report = t.pair_with(options).run_cycle(&StopSignal::never()).unwrap();
    writer.join().unwrap();

    assert_eq!(report.files_created, 1);
    assert_eq!(report.files_stabilized, 1);
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert_eq!(
        fs::read(t.replica.join("capture.log")).unwrap(),
        fs::read(&log).unwrap()
    );
}

#[test]
fn test_stop_mid_stability_wait_cancels_cycle() {
    let t = TestPair::new();
    t.write_source("fresh.bin", b"just now");

    let options = SyncOptions {
        stability: StabilityConfig {
            poll_interval_ms: 20,
            quiet_period_ms: 60_000,
            max_wait_secs: 120,
        },
        ..SyncOptions::default()
    };
    let (handle, signal) = stop::channel();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.stop();
    });

    let start = Instant::now();
    let report = t.pair_with(options).run_cycle(&signal).unwrap();
    stopper.join().unwrap();

    assert!(report.cancelled);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!t.replica.join("fresh.bin").exists());
}
