use serde::Deserialize;
use crate::error::Error;
use std::{io::BufReader, path::{Path, PathBuf}, str::FromStr};

///
/// Runtime settings for the analysis pipeline.
///
/// Settings are loaded from an optional YAML file and then overridden by environment variables
/// of the same name. Every key has a default so a bare `Settings::from_env()` is always valid.
///
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    #[serde(default = "default_data_root")]
    data_root: PathBuf,       // Directory searched for input archives.

    #[serde(default = "default_output_root")]
    output_root: PathBuf,     // Base path under which result documents are written.

    #[serde(default = "default_time_step_sec")]
    time_step_sec: i64,       // Spacing of the uniform time grid.

    #[serde(default = "default_cells_per_module")]
    cells_per_module: usize,  // Contiguous voltage columns forming one module.

    #[serde(default = "default_temp_per_module")]
    temp_per_module: usize,   // Contiguous temperature columns forming one module.

    #[serde(default = "default_module_rows")]
    module_rows: usize,       // Cell grid rows within a module.

    #[serde(default = "default_module_cols")]
    module_cols: usize,       // Cell grid columns within a module.

    #[serde(default = "default_n_racks")]
    n_racks: usize,           // Racks per stack when building the topology.

    #[serde(default = "default_n_modules_per_rack")]
    n_modules_per_rack: usize,

    #[serde(default)]
    max_workers: usize,       // 0 means derive from the CPU count.

    #[serde(default = "default_worker_queue_size")]
    worker_queue_size: usize, // Bounded submission queue depth.

    #[serde(default = "default_memory_soft_limit_mb")]
    memory_soft_limit_mb: u64,

    #[serde(default = "default_memory_hard_limit_mb")]
    memory_hard_limit_mb: u64,

    #[serde(default = "default_memory_check_interval_sec")]
    memory_check_interval_sec: u64,

    #[serde(default)]
    on_limit_action: LimitAction,

    #[serde(default = "default_temp_diff_threshold")]
    temp_diff_threshold: f64, // Per-row temperature spread anomaly threshold (deg C).

    #[serde(default = "default_volt_discharge_cutoff")]
    volt_discharge_cutoff: f64, // Lower voltage bound (V).

    #[serde(default = "default_volt_charge_cutoff")]
    volt_charge_cutoff: f64,    // Upper voltage bound (V).
}

///
/// What the resource guard does when a worker crosses the hard memory limit.
///
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LimitAction {
    Gc,    // Hint the allocator and carry on.
    Warn,  // Log and carry on.
    Raise, // Fail the job.
}

impl Default for LimitAction {
    fn default() -> Self {
        LimitAction::Gc
    }
}

impl FromStr for LimitAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "gc"    => Ok(LimitAction::Gc),
            "warn"  => Ok(LimitAction::Warn),
            "raise" => Ok(LimitAction::Raise),
            other   => Err(format!("unknown limit action '{}'", other)),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            output_root: default_output_root(),
            time_step_sec: default_time_step_sec(),
            cells_per_module: default_cells_per_module(),
            temp_per_module: default_temp_per_module(),
            module_rows: default_module_rows(),
            module_cols: default_module_cols(),
            n_racks: default_n_racks(),
            n_modules_per_rack: default_n_modules_per_rack(),
            max_workers: 0,
            worker_queue_size: default_worker_queue_size(),
            memory_soft_limit_mb: default_memory_soft_limit_mb(),
            memory_hard_limit_mb: default_memory_hard_limit_mb(),
            memory_check_interval_sec: default_memory_check_interval_sec(),
            on_limit_action: LimitAction::default(),
            temp_diff_threshold: default_temp_diff_threshold(),
            volt_discharge_cutoff: default_volt_discharge_cutoff(),
            volt_charge_cutoff: default_volt_charge_cutoff(),
        }
    }
}

impl Settings {
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn time_step_sec(&self) -> i64 {
        self.time_step_sec
    }

    pub fn cells_per_module(&self) -> usize {
        self.cells_per_module
    }

    pub fn temp_per_module(&self) -> usize {
        self.temp_per_module
    }

    pub fn module_rows(&self) -> usize {
        self.module_rows
    }

    pub fn module_cols(&self) -> usize {
        self.module_cols
    }

    pub fn n_racks(&self) -> usize {
        self.n_racks
    }

    pub fn n_modules_per_rack(&self) -> usize {
        self.n_modules_per_rack
    }

    ///
    /// The configured worker count, or one-less-than-the-CPUs when left at zero.
    ///
    pub fn max_workers(&self) -> usize {
        match self.max_workers {
            0 => std::cmp::max(1, num_cpus::get() - 1),
            n => n,
        }
    }

    pub fn worker_queue_size(&self) -> usize {
        self.worker_queue_size
    }

    pub fn memory_soft_limit_bytes(&self) -> u64 {
        self.memory_soft_limit_mb * 1024 * 1024
    }

    pub fn memory_hard_limit_bytes(&self) -> u64 {
        self.memory_hard_limit_mb * 1024 * 1024
    }

    pub fn memory_check_interval_sec(&self) -> u64 {
        self.memory_check_interval_sec
    }

    pub fn on_limit_action(&self) -> LimitAction {
        self.on_limit_action
    }

    pub fn temp_diff_threshold(&self) -> f64 {
        self.temp_diff_threshold
    }

    pub fn volt_discharge_cutoff(&self) -> f64 {
        self.volt_discharge_cutoff
    }

    pub fn volt_charge_cutoff(&self) -> f64 {
        self.volt_charge_cutoff
    }

    ///
    /// Load settings from the YAML file specified, apply environment overrides and validate.
    ///
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let rdr = BufReader::new(std::fs::File::open(path)
            .map_err(|source| Error::SettingsFileNotFound { path: path.to_string_lossy().into(), source })?);

        let mut settings: Self = serde_yaml::from_reader(rdr)
            .map_err(|source| Error::InvalidSettings { path: path.to_string_lossy().into(), source })?;

        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    ///
    /// Defaults overridden by the environment only - used when no settings file is given.
    ///
    pub fn from_env() -> Result<Self, Error> {
        let mut settings = Self::default();
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<(), Error> {
        env_override("DATA_ROOT", &mut self.data_root)?;
        env_override("OUTPUT_ROOT", &mut self.output_root)?;
        env_override("TIME_STEP_SEC", &mut self.time_step_sec)?;
        env_override("CELLS_PER_MODULE", &mut self.cells_per_module)?;
        env_override("TEMP_PER_MODULE", &mut self.temp_per_module)?;
        env_override("MODULE_ROWS", &mut self.module_rows)?;
        env_override("MODULE_COLS", &mut self.module_cols)?;
        env_override("N_RACKS", &mut self.n_racks)?;
        env_override("N_MODULES_PER_RACK", &mut self.n_modules_per_rack)?;
        env_override("MAX_WORKERS", &mut self.max_workers)?;
        env_override("WORKER_QUEUE_SIZE", &mut self.worker_queue_size)?;
        env_override("MEMORY_SOFT_LIMIT_MB", &mut self.memory_soft_limit_mb)?;
        env_override("MEMORY_HARD_LIMIT_MB", &mut self.memory_hard_limit_mb)?;
        env_override("MEMORY_CHECK_INTERVAL_SEC", &mut self.memory_check_interval_sec)?;
        env_override("ON_LIMIT_ACTION", &mut self.on_limit_action)?;
        env_override("TEMP_DIFF_THRESHOLD", &mut self.temp_diff_threshold)?;
        env_override("VOLT_DISCHARGE_CUTOFF", &mut self.volt_discharge_cutoff)?;
        env_override("VOLT_CHARGE_CUTOFF", &mut self.volt_charge_cutoff)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), Error> {
        if self.time_step_sec < 1 {
            return Err(Error::SettingsValidationError { reason: "TIME_STEP_SEC must be at least 1".into() })
        }

        if self.cells_per_module == 0 || self.temp_per_module == 0 {
            return Err(Error::SettingsValidationError { reason: "CELLS_PER_MODULE and TEMP_PER_MODULE must be non-zero".into() })
        }

        if self.module_rows * self.module_cols != self.cells_per_module {
            return Err(Error::SettingsValidationError {
                reason: format!("MODULE_ROWS x MODULE_COLS ({} x {}) must equal CELLS_PER_MODULE ({})",
                    self.module_rows, self.module_cols, self.cells_per_module) })
        }

        if self.worker_queue_size == 0 {
            return Err(Error::SettingsValidationError { reason: "WORKER_QUEUE_SIZE must be non-zero".into() })
        }

        if self.memory_hard_limit_mb < self.memory_soft_limit_mb {
            return Err(Error::SettingsValidationError {
                reason: "MEMORY_HARD_LIMIT_MB must not be below MEMORY_SOFT_LIMIT_MB".into() })
        }

        Ok(())
    }
}

///
/// Replace the target with the parsed value of the environment variable - when it is set.
///
fn env_override<T>(key: &str, target: &mut T) -> Result<(), Error>
where
    T: FromStr
{
    if let Ok(value) = std::env::var(key) {
        log::debug!("Settings override from environment: {}={}", key, value);
        *target = value.parse()
            .map_err(|_| Error::InvalidEnvValue { key: key.into(), value })?;
    }
    Ok(())
}

fn default_data_root() -> PathBuf {
    "data".into()
}

fn default_output_root() -> PathBuf {
    "storage".into()
}

fn default_time_step_sec() -> i64 {
    5
}

fn default_cells_per_module() -> usize {
    32
}

fn default_temp_per_module() -> usize {
    20
}

fn default_module_rows() -> usize {
    4
}

fn default_module_cols() -> usize {
    8
}

fn default_n_racks() -> usize {
    2
}

fn default_n_modules_per_rack() -> usize {
    7
}

fn default_worker_queue_size() -> usize {
    32
}

fn default_memory_soft_limit_mb() -> u64 {
    1024
}

fn default_memory_hard_limit_mb() -> u64 {
    1536
}

fn default_memory_check_interval_sec() -> u64 {
    3
}

fn default_temp_diff_threshold() -> f64 {
    2.0
}

fn default_volt_discharge_cutoff() -> f64 {
    2.8
}

fn default_volt_charge_cutoff() -> f64 {
    3.65
}
