use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

///
/// The linear life cycle of a job. Transitions out of RUNNING are terminal - once
/// a job reaches SUCCESS, FAILED or CANCELLED nothing moves it again and progress
/// updates cease.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Pending   => "PENDING",
            JobStatus::Queued    => "QUEUED",
            JobStatus::Running   => "RUNNING",
            JobStatus::Success   => "SUCCESS",
            JobStatus::Failed    => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", label)
    }
}

///
/// The stage a RUNNING job is in. Advances monotonically - the worker never
/// revisits an earlier stage within one run.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Ingest,
    Align,
    Analyze,
    Export,
}

impl Stage {
    pub fn ordinal(&self) -> usize {
        match self {
            Stage::Ingest  => 1,
            Stage::Align   => 2,
            Stage::Analyze => 3,
            Stage::Export  => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Ingest  => "INGEST",
            Stage::Align   => "ALIGN",
            Stage::Analyze => "ANALYZE",
            Stage::Export  => "EXPORT",
        };
        write!(f, "{}", label)
    }
}

///
/// The pipeline's bookkeeping record for one job.
///
pub(crate) struct Job {
    files: Vec<PathBuf>,
    status: JobStatus,
    stage: Stage,
    percent: u8,
    error: Option<String>,
    cancel: Arc<AtomicBool>,   // Checked by the worker at every checkpoint.
    submitted: Instant,
    duration: Option<Duration>,
}

impl Job {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            status: JobStatus::Pending,
            stage: Stage::Ingest,
            percent: 0,
            error: None,
            cancel: Arc::new(AtomicBool::new(false)),
            submitted: Instant::now(),
            duration: None,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn set_status(&mut self, status: JobStatus) {
        debug_assert!(!self.status.is_terminal(), "terminal jobs never transition");
        self.status = status;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: Stage) {
        debug_assert!(stage.ordinal() >= self.stage.ordinal(), "stages only advance");
        self.stage = stage;
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn set_percent(&mut self, percent: u8) {
        self.percent = percent.min(100);
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn submitted(&self) -> Instant {
        self.submitted
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            stage: self.stage,
            percent: self.percent,
            error: self.error.clone(),
            duration: self.duration,
        }
    }
}

///
/// A point-in-time copy of a job's externally visible state.
///
#[derive(Clone, Debug, Serialize)]
pub struct JobSnapshot {
    status: JobStatus,
    stage: Stage,
    percent: u8,
    error: Option<String>,
    duration: Option<Duration>,
}

impl JobSnapshot {
    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_exactly_the_three_outcomes() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn stages_order_by_ordinal() {
        assert!(Stage::Ingest.ordinal() < Stage::Align.ordinal());
        assert!(Stage::Align.ordinal() < Stage::Analyze.ordinal());
        assert!(Stage::Analyze.ordinal() < Stage::Export.ordinal());
    }

    #[test]
    fn snapshots_copy_the_visible_state() {
        let mut job = Job::new(vec!("day1.tar.gz".into()));
        job.set_status(JobStatus::Running);
        job.set_stage(Stage::Align);
        job.set_percent(50);

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status(), JobStatus::Running);
        assert_eq!(snapshot.stage(), Stage::Align);
        assert_eq!(snapshot.percent(), 50);
        assert!(snapshot.error().is_none());
    }

    #[test]
    fn percent_saturates_at_one_hundred() {
        let mut job = Job::new(vec!());
        job.set_percent(250);
        assert_eq!(job.percent(), 100);
    }
}
