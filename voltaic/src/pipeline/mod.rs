pub mod guard;
pub mod job;
pub mod progress;
mod worker;

pub use job::{JobSnapshot, JobStatus, Stage};
pub use progress::ProgressUpdate;

use crossbeam::channel;
use parking_lot::Mutex;
use uuid::Uuid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;
use core_lib::config::Settings;
use crate::analysis::Registry;
use crate::error::PipelineError;
use crate::pipeline::job::Job;
use crate::pipeline::progress::ProgressBus;
use crate::pipeline::worker::WorkerContext;
use crate::store::ResultStore;

///
/// The job orchestrator: a fixed pool of worker threads fed by a bounded
/// submission queue. This is the only surface surrounding code drives the
/// engine through - submit, status, cancel, subscribe, shutdown.
///
pub struct Pipeline {
    settings: Arc<Settings>,
    bus: Arc<ProgressBus>,
    store: Arc<ResultStore>,
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    sender: Option<channel::Sender<Uuid>>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Result<Self, PipelineError> {
        Self::with_registry(settings, Registry::with_builtins())
    }

    ///
    /// Build a pipeline with a caller-assembled plugin registry. The registry is
    /// frozen from here on - workers share it read-only.
    ///
    pub fn with_registry(settings: Settings, registry: Registry) -> Result<Self, PipelineError> {
        let settings = Arc::new(settings);
        let registry = Arc::new(registry);
        let store = Arc::new(ResultStore::new(settings.output_root())?);
        let bus = Arc::new(ProgressBus::new());
        let jobs: Arc<Mutex<HashMap<Uuid, Job>>> = Arc::new(Mutex::new(HashMap::new()));

        // The bounded queue is the backpressure: submit blocks when it is full.
        let (sender, receiver) = channel::bounded(settings.worker_queue_size());

        let workers = (0..settings.max_workers())
            .map(|index| {
                let receiver = receiver.clone();
                let ctx = WorkerContext {
                    settings: Arc::clone(&settings),
                    registry: Arc::clone(&registry),
                    bus: Arc::clone(&bus),
                    store: Arc::clone(&store),
                    jobs: Arc::clone(&jobs),
                };

                std::thread::Builder::new()
                    .name(format!("voltaic-worker-{}", index))
                    .spawn(move || worker::worker_loop(receiver, ctx))
                    .expect("cannot spawn worker thread")
            })
            .collect::<Vec<JoinHandle<()>>>();

        log::info!("Pipeline ready: {} workers, queue depth {}, plugins [{}]",
            workers.len(),
            settings.worker_queue_size(),
            registry.names().join(", "));

        Ok(Self { settings, bus, store, jobs, sender: Some(sender), workers })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    ///
    /// Admit a job over the given archives. Blocks while the submission queue is
    /// full; the returned id is live immediately for status/cancel/subscribe.
    ///
    pub fn submit(&self, files: Vec<PathBuf>) -> Result<Uuid, PipelineError> {
        let job_id = match std::env::var("VOLTAIC_FIXED_JOB_ID") {
            Ok(fixed) => Uuid::from_str(&fixed).expect("Test JOB_ID has invalid format"),
            Err(_) => Uuid::new_v4(),
        };

        self.jobs.lock().insert(job_id, Job::new(files));

        let sender = self.sender.as_ref().ok_or(PipelineError::QueueClosed)?;
        sender.send(job_id).map_err(|_| PipelineError::QueueClosed)?;

        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(&job_id) {
            // A worker (or a cancel) may already have moved it on.
            if job.status() == JobStatus::Pending {
                job.set_status(JobStatus::Queued);
            }
        }

        log::info!("Submitted job {}", job_id);
        Ok(job_id)
    }

    pub fn status(&self, job_id: &Uuid) -> Option<JobSnapshot> {
        self.jobs.lock().get(job_id).map(Job::snapshot)
    }

    ///
    /// Idempotent cancel. Queued jobs transition immediately (the worker discards
    /// the stale queue entry); running jobs observe the flag at their next
    /// checkpoint; terminal jobs are left alone.
    ///
    pub fn cancel(&self, job_id: &Uuid) {
        let mut jobs = self.jobs.lock();

        let job = match jobs.get_mut(job_id) {
            Some(job) => job,
            None => return,
        };

        match job.status() {
            JobStatus::Pending | JobStatus::Queued => {
                job.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);
                job.set_status(JobStatus::Cancelled);
                log::info!("Cancelled queued job {}", job_id);

                self.bus.publish(ProgressUpdate::new(
                    *job_id, JobStatus::Cancelled, job.stage(), job.percent(),
                    "cancelled before running".into(), None));
                self.bus.finish_job(job_id);
            },
            JobStatus::Running => {
                job.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);
                log::info!("Cancellation requested for running job {}", job_id);
            },
            _ => {}, // Already terminal.
        }
    }

    ///
    /// Subscribe to a job's progress stream. A subscriber to an already-terminal
    /// job receives a single synthetic update carrying the final state.
    ///
    pub fn subscribe(&self, job_id: &Uuid) -> Result<channel::Receiver<ProgressUpdate>, PipelineError> {
        let jobs = self.jobs.lock();

        let job = jobs.get(job_id).ok_or(PipelineError::UnknownJob { job_id: job_id.to_string() })?;

        if job.status().is_terminal() {
            let (sender, receiver) = channel::bounded(1);
            let _ignored = sender.try_send(ProgressUpdate::new(
                *job_id, job.status(), job.stage(), job.percent(),
                "job already finished".into(), job.error().map(String::from)));
            return Ok(receiver) // Sender drops here - the stream ends after one update.
        }

        Ok(self.bus.subscribe(*job_id))
    }

    ///
    /// Close the queue and wait for in-flight jobs to drain.
    ///
    pub fn shutdown(mut self) {
        self.sender = None; // Workers exit once the queue is empty and closed.

        for worker in self.workers.drain(..) {
            let _ignored = worker.join();
        }

        log::info!("Pipeline shut down");
    }
}
