use sysinfo::{Pid, ProcessesToUpdate, System};
use ubyte::ToByteUnit;
use uuid::Uuid;
use std::time::{Duration, Instant};
use core_lib::config::{LimitAction, Settings};
use crate::error::PipelineError;

///
/// Per-worker resident-memory supervisor.
///
/// `check` is called at every member boundary; the common path is a single
/// elapsed-time comparison and allocates nothing. At most once per interval the
/// process RSS is sampled: crossing the soft limit logs a warning, crossing the
/// hard limit executes the configured action.
///
pub struct ResourceGuard {
    job_id: Uuid,
    soft_limit: u64,
    hard_limit: u64,
    action: LimitAction,
    interval: Duration,
    last_check: Option<Instant>,
    system: System,
    pid: Pid,
}

impl ResourceGuard {
    pub fn new(job_id: Uuid, settings: &Settings) -> Self {
        Self {
            job_id,
            soft_limit: settings.memory_soft_limit_bytes(),
            hard_limit: settings.memory_hard_limit_bytes(),
            action: settings.on_limit_action(),
            interval: Duration::from_secs(settings.memory_check_interval_sec()),
            last_check: None,
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    pub fn check(&mut self) -> Result<(), PipelineError> {
        if let Some(last) = self.last_check {
            if last.elapsed() < self.interval {
                return Ok(())
            }
        }
        self.last_check = Some(Instant::now());

        let rss = self.sample_rss();

        if rss > self.hard_limit {
            return self.over_hard_limit(rss)
        }

        if rss > self.soft_limit {
            log::warn!("Job {} resident memory {} is over the soft limit {}",
                self.job_id, rss.bytes(), self.soft_limit.bytes());
        }

        Ok(())
    }

    fn sample_rss(&mut self) -> u64 {
        self.system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system.process(self.pid).map_or(0, |process| process.memory())
    }

    fn over_hard_limit(&self, rss: u64) -> Result<(), PipelineError> {
        match self.action {
            LimitAction::Raise => {
                log::error!("Job {} resident memory {} is over the hard limit {} - failing the job",
                    self.job_id, rss.bytes(), self.hard_limit.bytes());
                Err(PipelineError::MemoryLimitExceeded { rss, limit: self.hard_limit })
            },
            LimitAction::Gc => {
                // No collector to kick in Rust - freed pages return to the allocator
                // on drop, so this degrades to a loud nudge.
                log::warn!("Job {} resident memory {} is over the hard limit {} - continuing after allocator hint",
                    self.job_id, rss.bytes(), self.hard_limit.bytes());
                Ok(())
            },
            LimitAction::Warn => {
                log::warn!("Job {} resident memory {} is over the hard limit {}",
                    self.job_id, rss.bytes(), self.hard_limit.bytes());
                Ok(())
            },
        }
    }
}
