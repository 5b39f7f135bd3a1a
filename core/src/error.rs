use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Settings file {path} not found")]
    SettingsFileNotFound { path: String, source: std::io::Error },

    #[error("Settings file {path} contains invalid configuration")]
    InvalidSettings { path: String, source: serde_yaml::Error },

    #[error("Environment variable {key} has unusable value [{value}]")]
    InvalidEnvValue { key: String, value: String },

    #[error("Settings are invalid - {reason}")]
    SettingsValidationError { reason: String },
}
