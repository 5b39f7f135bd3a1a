use crossbeam::channel;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use core_lib::{blue, config::Settings, formatted_duration_rate};
use crate::align::align_day;
use crate::analysis::{AnalysisContext, Registry};
use crate::error::{error_chain, PipelineError};
use crate::ingest::parsers::parse_member;
use crate::ingest::router::classify;
use crate::ingest::tar_stream::TarStream;
use crate::model::dayraw::DayRaw;
use crate::model::topology::Topology;
use crate::pipeline::guard::ResourceGuard;
use crate::pipeline::job::{Job, JobStatus, Stage};
use crate::pipeline::progress::{ProgressBus, ProgressUpdate};
use crate::store::ResultStore;

///
/// Everything a worker thread needs, shared across the pool.
///
pub(crate) struct WorkerContext {
    pub settings: Arc<Settings>,
    pub registry: Arc<Registry>,
    pub bus: Arc<ProgressBus>,
    pub store: Arc<ResultStore>,
    pub jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

///
/// Tallies accumulated during INGEST, carried into the job report.
///
#[derive(Debug, Default, Serialize)]
struct IngestCounters {
    members_parsed: usize,
    members_ignored: usize,
    rows_dropped: usize,
    archives_missing: usize,
    archives_corrupt: usize,
}

///
/// One worker thread: pop job ids until the queue closes, run each job through
/// the full stage sequence, record the terminal outcome exactly once.
///
pub(crate) fn worker_loop(receiver: channel::Receiver<Uuid>, ctx: WorkerContext) {
    while let Ok(job_id) = receiver.recv() {
        let claim = {
            let mut jobs = ctx.jobs.lock();
            match jobs.get_mut(&job_id) {
                None => None,
                // Cancelled while queued - its terminal update was already published.
                Some(job) if job.status().is_terminal() => None,
                Some(job) => {
                    job.set_status(JobStatus::Running);
                    Some((job.files().to_vec(), job.cancel_flag()))
                },
            }
        };

        let (files, cancel) = match claim {
            Some(claim) => claim,
            None => continue,
        };

        log::info!("Starting job {} over {} archive(s)", job_id, files.len());
        let started = Instant::now();
        let result = run_job(&job_id, &files, &cancel, &ctx);
        finalize(&job_id, result, started.elapsed(), &ctx);
    }
}

///
/// The stage sequence for one job: INGEST -> ALIGN -> ANALYZE -> EXPORT, with a
/// cancellation checkpoint before every stage and between parsed members, and a
/// resource-guard check after every parsed member.
///
fn run_job(job_id: &Uuid, files: &[PathBuf], cancel: &AtomicBool, ctx: &WorkerContext) -> Result<(), PipelineError> {
    let started = Instant::now();
    let mut guard = ResourceGuard::new(*job_id, &ctx.settings);

    // INGEST
    checkpoint(cancel)?;
    let mut day = DayRaw::default();
    let mut counters = IngestCounters::default();

    for (index, path) in files.iter().enumerate() {
        checkpoint(cancel)?;

        let percent = (index * 45 / files.len().max(1)) as u8;
        progress(ctx, job_id, Stage::Ingest, percent, format!("reading {}", path.to_string_lossy()));

        match ingest_archive(path, &mut day, &mut counters, cancel, &mut guard, ctx, job_id) {
            Ok(()) => {},
            Err(err @ PipelineError::Cancelled) => return Err(err),
            Err(err @ PipelineError::MemoryLimitExceeded { .. }) => return Err(err),
            Err(PipelineError::InputNotFound { path }) => {
                log::warn!("Archive {} not found - skipping", path);
                counters.archives_missing += 1;
            },
            Err(PipelineError::CorruptArchive { path, source }) => {
                log::error!("Archive {} unreadable ({}) - abandoning it", path, source);
                counters.archives_corrupt += 1;
            },
            Err(other) => return Err(other),
        }
    }

    // An empty submission is a legal no-op job (it completes with empty documents);
    // a non-empty list in which nothing could be read is a failure.
    if !files.is_empty() && counters.members_parsed == 0 {
        return Err(PipelineError::NoUsableInput)
    }

    // ALIGN
    checkpoint(cancel)?;
    guard.check()?;
    progress(ctx, job_id, Stage::Align, 50, "aligning series onto the time grid".into());

    let topology = Topology::build(&ctx.settings);
    let aligned = align_day(&day, &ctx.settings);
    drop(day); // The raw tables are dead weight from here on.

    // ANALYZE
    checkpoint(cancel)?;
    guard.check()?;
    progress(ctx, job_id, Stage::Analyze, 70, "running analysis plugins".into());

    let analysis_ctx = AnalysisContext::new(&ctx.settings, &topology);
    let outputs = ctx.registry.run_all(&aligned, &analysis_ctx)?;

    // EXPORT
    checkpoint(cancel)?;
    guard.check()?;
    progress(ctx, job_id, Stage::Export, 90, "writing result documents".into());

    let report = job_report(job_id, files, &aligned, &topology, &counters, started.elapsed());
    ctx.store.write_job(job_id, &aligned, &topology, &outputs, report)?;

    Ok(())
}

///
/// Stream one archive's members through the router and parsers into the day
/// aggregate. Stream-level errors abort this archive only; the caller decides
/// whether that fails the job.
///
fn ingest_archive(
    path: &PathBuf,
    day: &mut DayRaw,
    counters: &mut IngestCounters,
    cancel: &AtomicBool,
    guard: &mut ResourceGuard,
    ctx: &WorkerContext,
    job_id: &Uuid) -> Result<(), PipelineError> {

    let mut stream = TarStream::open(path)?;
    let display = stream.path().to_string();
    let mut members = stream.members()?;

    while let Some(member) = members.next() {
        checkpoint(cancel)?;
        let mut member = member?;

        let (kind, rack) = match classify(member.name()) {
            Some(routed) => routed,
            None => {
                log::debug!("Ignoring member {}", member.name());
                counters.members_ignored += 1;
                continue
            },
        };

        let started = Instant::now();
        let table = match parse_member(kind, rack, &mut member) {
            Ok(table) => table,
            // The byte stream under the CSV reader failed: the archive is bad.
            Err(PipelineError::IOError(source)) => {
                return Err(PipelineError::CorruptArchive { path: display, source })
            },
            Err(other) => return Err(other),
        };

        let (duration, _) = formatted_duration_rate(table.len().max(1), started.elapsed());
        log::info!("  parsed {} - {} rows, {} dropped, in {}",
            member.name(), table.len(), table.dropped_rows(), blue(&duration));

        counters.members_parsed += 1;
        counters.rows_dropped += table.dropped_rows();
        progress(ctx, job_id, Stage::Ingest, None::<u8>, format!("parsed {}", member.name()));

        day.merge(kind, rack, table);
        guard.check()?;
    }

    Ok(())
}

fn checkpoint(cancel: &AtomicBool) -> Result<(), PipelineError> {
    match cancel.load(Ordering::Relaxed) {
        true  => Err(PipelineError::Cancelled),
        false => Ok(()),
    }
}

///
/// Record stage/percent on the job and push a RUNNING update on the bus.
///
fn progress(ctx: &WorkerContext, job_id: &Uuid, stage: Stage, percent: impl Into<Option<u8>>, detail: String) {
    let percent = {
        let mut jobs = ctx.jobs.lock();
        let job = match jobs.get_mut(job_id) {
            Some(job) => job,
            None => return,
        };
        job.set_stage(stage);
        if let Some(percent) = percent.into() {
            job.set_percent(percent);
        }
        job.percent()
    };

    ctx.bus.publish(ProgressUpdate::new(*job_id, JobStatus::Running, stage, percent, detail, None));
}

///
/// Resolve the job's outcome in the job table, then report it on the bus exactly
/// once and tear the job's fanout down.
///
fn finalize(job_id: &Uuid, result: Result<(), PipelineError>, elapsed: Duration, ctx: &WorkerContext) {
    let (status, stage, percent, error, detail) = {
        let mut jobs = ctx.jobs.lock();
        let job = jobs.get_mut(job_id).expect("job record vanished mid-run");
        job.set_duration(elapsed);
        log::debug!("Job {} spent {:?} from submission to outcome", job_id, job.submitted().elapsed());

        match result {
            Ok(()) => {
                job.set_status(JobStatus::Success);
                job.set_percent(100);
                let detail = format!("completed in {}", formatted_duration_rate(1, elapsed).0);
                log::info!("Job {} {}", job_id, detail);
                (JobStatus::Success, job.stage(), 100, None, detail)
            },
            Err(PipelineError::Cancelled) => {
                job.set_status(JobStatus::Cancelled);
                log::info!("Job {} cancelled after {}", job_id, formatted_duration_rate(1, elapsed).0);
                (JobStatus::Cancelled, job.stage(), job.percent(), None, "cancelled".to_string())
            },
            Err(err) => {
                let chain = error_chain(&err);
                log::error!("Job {} failed: {}", job_id, chain);
                job.set_status(JobStatus::Failed);
                job.set_error(chain.clone());
                (JobStatus::Failed, job.stage(), job.percent(), Some(chain.clone()), chain)
            },
        }
    };

    ctx.bus.publish(ProgressUpdate::new(*job_id, status, stage, percent, detail, error));
    ctx.bus.finish_job(job_id);
}

fn job_report(
    job_id: &Uuid,
    files: &[PathBuf],
    aligned: &crate::model::aligned::Aligned,
    topology: &Topology,
    counters: &IngestCounters,
    elapsed: Duration) -> serde_json::Value {

    serde_json::json!({
        "job_id": job_id.to_string(),
        "status": JobStatus::Success,
        "duration_ms": elapsed.as_millis() as u64,
        "files": files.iter().map(|path| path.to_string_lossy().to_string()).collect::<Vec<String>>(),
        "grid": {
            "points": aligned.grid().len(),
            "step_sec": aligned.grid().step(),
            "start_epoch": aligned.grid().start(),
            "end_epoch": aligned.grid().end(),
        },
        "racks": aligned.racks().map(|(key, rack)| (key.to_string(), rack.module_count())).collect::<std::collections::BTreeMap<String, usize>>(),
        "topology": {
            "racks": topology.racks().len(),
            "modules_per_rack": topology.racks().first().map_or(0, |rack| rack.modules().len()),
            "cells_per_rack": topology.racks().first().map_or(0, |rack| rack.n_cells_total()),
            "temps_per_rack": topology.racks().first().map_or(0, |rack| rack.n_temps_total()),
        },
        "ingest": counters,
    })
}
