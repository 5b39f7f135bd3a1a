pub mod align;
pub mod analysis;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod store;

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use core_lib::config::Settings;

pub use crate::error::PipelineError;
pub use crate::pipeline::{JobSnapshot, JobStatus, Pipeline, ProgressUpdate, Stage};

///
/// Run a single job to completion on a private pipeline, streaming its progress
/// into the log. This is what the CLI drives; long-lived hosts hold a `Pipeline`
/// themselves and submit/subscribe/cancel against it.
///
pub fn run_once(settings: Settings, files: Vec<PathBuf>) -> Result<JobSnapshot> {
    let pipeline = Pipeline::new(settings)?;
    let job_id = pipeline.submit(files)?;

    for update in pipeline.subscribe(&job_id)? {
        log::info!("[{}] {} {}% - {}",
            update.stage(), update.status(), update.percent(), update.detail());
    }

    let snapshot = pipeline.status(&job_id)
        .ok_or_else(|| anyhow!("job {} disappeared from the pipeline", job_id))?;

    pipeline.shutdown();
    Ok(snapshot)
}
