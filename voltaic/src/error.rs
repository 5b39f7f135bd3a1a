use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {

    #[error("Input archive {path} not found")]
    InputNotFound { path: String },

    #[error("Archive {path} is unreadable")]
    CorruptArchive { path: String, source: std::io::Error },

    #[error("None of the input archives produced a parseable member")]
    NoUsableInput,

    #[error("Worker resident memory {rss} exceeded the hard limit {limit}")]
    MemoryLimitExceeded { rss: u64, limit: u64 },

    #[error("Plugin {plugin} failed - {message}")]
    PluginFailure { plugin: String, message: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job {job_id} is not known to this pipeline")]
    UnknownJob { job_id: String },

    #[error("The submission queue has been shut down")]
    QueueClosed,

    #[error("Unable to write result document {path}")]
    CannotWriteDocument { path: String, source: std::io::Error },

    #[error("Unable to encode result document {path}")]
    CannotEncodeDocument { path: String, source: serde_json::Error },

    #[error("Unable to read result document {path}")]
    CannotReadDocument { path: String, source: std::io::Error },

    #[error("Invalid settings")]
    SettingsError ( #[from] core_lib::error::Error ),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

///
/// Flatten an error and its source chain into a single diagnostic string.
///
/// Kept on the job record so a failed job can report what broke and why without
/// the caller having to walk sources itself.
///
pub fn error_chain(err: &PipelineError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str(" : ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
