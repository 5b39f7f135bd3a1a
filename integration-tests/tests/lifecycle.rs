use serde_json::json;
use std::time::Duration;
use voltaic::{JobStatus, Pipeline, Stage};
use crate::common;

///
/// A sizeable archive that keeps the single worker busy for a while.
///
fn slow_archive(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    common::build_archive(&path, &[
        ("rack1batVol.csv", common::batvol_csv(64, 2000, 5, &[])),
        ("rack1batTemp.csv", common::battemp_csv(40, 2000, 5)),
    ]);
    path
}

///
/// Cancelling a queued job is immediate, emits no documents, and leaves the
/// running job untouched.
///
#[test]
fn cancelling_a_queued_job_is_immediate() {
    let dir = common::scratch_dir("cancel_queued");
    let archive = slow_archive(&dir, "day.tar.gz");

    let pipeline = Pipeline::new(common::settings(&dir.join("out"), "")).unwrap();

    let running = pipeline.submit(vec!(archive.clone())).unwrap();
    let queued = pipeline.submit(vec!(archive)).unwrap();
    pipeline.cancel(&queued);

    let snapshot = common::wait_terminal(&pipeline, &queued, Duration::from_secs(60));
    assert_eq!(snapshot.status(), JobStatus::Cancelled);

    // Cancel is idempotent on a terminal job.
    pipeline.cancel(&queued);
    assert_eq!(pipeline.status(&queued).unwrap().status(), JobStatus::Cancelled);

    assert_eq!(common::wait_terminal(&pipeline, &running, Duration::from_secs(120)).status(), JobStatus::Success);

    // No partial results for the cancelled job.
    assert!(!pipeline.store().job_dir(&queued).exists());
    assert!(pipeline.store().document_path(&running, "report").exists());

    pipeline.shutdown();
}

///
/// A cancel against a running job lands at the next checkpoint; no documents
/// are emitted.
///
#[test]
fn cancelling_a_running_job_stops_at_a_checkpoint() {
    let dir = common::scratch_dir("cancel_running");
    let archive = slow_archive(&dir, "day.tar.gz");

    let pipeline = Pipeline::new(common::settings(&dir.join("out"), "")).unwrap();
    let job_id = pipeline.submit(vec!(archive)).unwrap();

    pipeline.cancel(&job_id);

    let snapshot = common::wait_terminal(&pipeline, &job_id, Duration::from_secs(60));
    assert_eq!(snapshot.status(), JobStatus::Cancelled);
    assert!(!pipeline.store().job_dir(&job_id).exists());

    pipeline.shutdown();
}

///
/// With the guard configured to raise on a zero hard limit, the job fails with
/// the memory error, emits no report, and the bus reports the failure once.
///
#[test]
fn memory_hard_limit_raise_fails_the_job() {
    let dir = common::scratch_dir("memory_raise");
    let archive = slow_archive(&dir, "day.tar.gz");

    let settings = common::settings(&dir.join("out"),
        "MEMORY_SOFT_LIMIT_MB: 0\nMEMORY_HARD_LIMIT_MB: 0\nMEMORY_CHECK_INTERVAL_SEC: 0\nON_LIMIT_ACTION: raise\n");
    let pipeline = Pipeline::new(settings).unwrap();

    let job_id = pipeline.submit(vec!(archive)).unwrap();
    let updates = pipeline.subscribe(&job_id).unwrap();

    let snapshot = common::wait_terminal(&pipeline, &job_id, Duration::from_secs(60));
    assert_eq!(snapshot.status(), JobStatus::Failed);
    assert!(snapshot.error().unwrap().contains("hard limit"));

    assert!(!pipeline.store().document_path(&job_id, "report").exists());

    let terminal: Vec<JobStatus> = updates.iter()
        .map(|update| update.status())
        .filter(JobStatus::is_terminal)
        .collect();
    assert_eq!(terminal, vec!(JobStatus::Failed));

    pipeline.shutdown();
}

///
/// A corrupt archive aborts that archive only; a missing one is skipped. The
/// job succeeds on what remains and the report tallies both.
///
#[test]
fn corrupt_and_missing_archives_do_not_fail_the_job() {
    let dir = common::scratch_dir("bad_inputs");

    let good = dir.join("good.tar.gz");
    common::build_archive(&good, &[
        ("rack1batVol.csv", common::batvol_csv(64, 13, 5, &[])),
        ("rack1batTemp.csv", common::battemp_csv(40, 13, 5)),
    ]);

    let corrupt = dir.join("corrupt.tar.gz");
    std::fs::write(&corrupt, b"not a gzip stream").unwrap();

    let missing = dir.join("never_written.tar.gz");

    let pipeline = Pipeline::new(common::settings(&dir.join("out"), "")).unwrap();
    let job_id = pipeline.submit(vec!(missing, corrupt, good)).unwrap();

    assert_eq!(common::wait_terminal(&pipeline, &job_id, Duration::from_secs(60)).status(), JobStatus::Success);

    let report = pipeline.store().read_document(&job_id, "report").unwrap();
    assert_eq!(report["ingest"]["archives_missing"], json!(1));
    assert_eq!(report["ingest"]["archives_corrupt"], json!(1));
    assert_eq!(report["ingest"]["members_parsed"], json!(2));

    pipeline.shutdown();
}

///
/// A non-empty file list in which nothing is readable fails the job.
///
#[test]
fn a_job_with_no_usable_input_fails() {
    let dir = common::scratch_dir("no_input");

    let pipeline = Pipeline::new(common::settings(&dir.join("out"), "")).unwrap();
    let job_id = pipeline.submit(vec!(dir.join("ghost.tar.gz"))).unwrap();

    let snapshot = common::wait_terminal(&pipeline, &job_id, Duration::from_secs(60));
    assert_eq!(snapshot.status(), JobStatus::Failed);
    assert!(snapshot.error().unwrap().contains("parseable member"));

    pipeline.shutdown();
}

///
/// Any single subscriber observes stage-monotonic updates with the terminal
/// status exactly once, at the end.
///
#[test]
fn progress_is_stage_monotonic_with_one_terminal() {
    let dir = common::scratch_dir("progress");
    let archive = slow_archive(&dir, "day.tar.gz");

    let pipeline = Pipeline::new(common::settings(&dir.join("out"), "")).unwrap();
    let job_id = pipeline.submit(vec!(archive)).unwrap();
    let updates: Vec<_> = pipeline.subscribe(&job_id).unwrap().iter().collect();

    assert!(!updates.is_empty());

    let mut last_ordinal = Stage::Ingest.ordinal();
    for update in &updates {
        assert!(update.stage().ordinal() >= last_ordinal, "stage regressed");
        last_ordinal = update.stage().ordinal();
    }

    let terminal_count = updates.iter().filter(|update| update.status().is_terminal()).count();
    assert_eq!(terminal_count, 1);
    assert!(updates.last().unwrap().status().is_terminal());
    assert_eq!(updates.last().unwrap().status(), JobStatus::Success);

    pipeline.shutdown();
}

///
/// Several jobs drain through a single worker and bounded queue; submission
/// order does not leak into result contents.
///
#[test]
fn jobs_queue_through_a_bounded_single_worker_pool() {
    let dir = common::scratch_dir("queueing");
    let archive = dir.join("day.tar.gz");
    common::build_archive(&archive, &[
        ("rack1batVol.csv", common::batvol_csv(32, 50, 5, &[])),
        ("rack1batTemp.csv", common::battemp_csv(20, 50, 5)),
    ]);

    let settings = common::settings(&dir.join("out"), "WORKER_QUEUE_SIZE: 1\n");
    let pipeline = Pipeline::new(settings).unwrap();

    let jobs: Vec<_> = (0..3)
        .map(|_| pipeline.submit(vec!(archive.clone())).unwrap())
        .collect();

    for job_id in &jobs {
        assert_eq!(common::wait_terminal(&pipeline, job_id, Duration::from_secs(120)).status(), JobStatus::Success);
        assert!(pipeline.store().document_path(job_id, "soh").exists());
    }

    pipeline.shutdown();
}
