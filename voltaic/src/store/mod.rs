use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use uuid::Uuid;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::analysis::{AnalysisOutputs, PluginKind};
use crate::error::PipelineError;
use crate::model::aligned::{Aligned, SeriesSet};
use crate::model::dayraw::RackKey;
use crate::model::matrix::Matrix;
use crate::model::topology::Topology;

// Documents being written carry this suffix until they are complete - a reader
// never sees a half-written document under its final name.
const IN_PROGRESS: &str = ".inprogress";

pub const DOC_ALIGNED: &str = "aligned";
pub const DOC_FEATURES: &str = "features";
pub const DOC_ANOMALIES: &str = "anomalies";
pub const DOC_SOH: &str = "soh";
pub const DOC_REPORT: &str = "report";

///
/// The emit side of the result store: one directory per job id under the output
/// root, one JSON document per name. Writes are atomic per document (write to a
/// sibling then rename) and serialized store-wide.
///
pub struct ResultStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, PipelineError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, write_lock: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    pub fn document_path(&self, job_id: &Uuid, name: &str) -> PathBuf {
        self.job_dir(job_id).join(format!("{}.json", name))
    }

    ///
    /// Persist everything a successful job emits: the aligned tree (expanded to
    /// global cell/sensor ids through the topology), one document per analyzer
    /// kind, and the job report.
    ///
    pub fn write_job(
        &self,
        job_id: &Uuid,
        aligned: &Aligned,
        topology: &Topology,
        outputs: &AnalysisOutputs,
        mut report: Value) -> Result<(), PipelineError> {

        if outputs.iter().any(|output| output.kind() == PluginKind::Generic) {
            if let Some(object) = report.as_object_mut() {
                object.insert("generic".into(), outputs.document_for(PluginKind::Generic));
            }
        }

        self.write_document(job_id, DOC_ALIGNED, &aligned_document(aligned, topology))?;
        self.write_document(job_id, DOC_FEATURES, &outputs.document_for(PluginKind::Cell))?;
        self.write_document(job_id, DOC_ANOMALIES, &outputs.document_for(PluginKind::Anomaly))?;
        self.write_document(job_id, DOC_SOH, &outputs.document_for(PluginKind::Soh))?;
        self.write_document(job_id, DOC_REPORT, &report)?;

        Ok(())
    }

    pub fn write_document(&self, job_id: &Uuid, name: &str, value: &Value) -> Result<PathBuf, PipelineError> {
        let _guard = self.write_lock.lock();

        let final_path = self.document_path(job_id, name);
        let staging_path = final_path.with_extension(format!("json{}", IN_PROGRESS));
        let display = final_path.to_string_lossy().to_string();

        fs::create_dir_all(self.job_dir(job_id))?;

        let file = File::create(&staging_path)
            .map_err(|source| PipelineError::CannotWriteDocument { path: display.clone(), source })?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|source| PipelineError::CannotEncodeDocument { path: display.clone(), source })?;
        writer.flush()
            .map_err(|source| PipelineError::CannotWriteDocument { path: display.clone(), source })?;

        fs::rename(&staging_path, &final_path)
            .map_err(|source| PipelineError::CannotWriteDocument { path: display, source })?;

        log::debug!("Wrote document {}", final_path.to_string_lossy());
        Ok(final_path)
    }

    ///
    /// Read a document back by job id and name - consumers address results this way.
    ///
    pub fn read_document(&self, job_id: &Uuid, name: &str) -> Result<Value, PipelineError> {
        let path = self.document_path(job_id, name);
        let file = File::open(&path)
            .map_err(|source| PipelineError::CannotReadDocument { path: path.to_string_lossy().into(), source })?;

        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|source| PipelineError::CannotEncodeDocument { path: path.to_string_lossy().into(), source })
    }
}

///
/// The aligned tree as a self-describing document: formatted grid instants, bank
/// and rack summary series, and per-module matrices labelled with the global
/// cell/sensor ids the topology assigns to their channels.
///
fn aligned_document(aligned: &Aligned, topology: &Topology) -> Value {
    let times: Vec<String> = aligned.grid().iter().map(format_instant).collect();

    let mut racks = Map::new();
    for (key, rack) in aligned.racks() {
        let mut modules = Map::new();

        for (&module_id, module) in rack.modules() {
            let cells = channel_ids(topology, key, module_id, module.voltage().cols(), true);
            let sensors = channel_ids(topology, key, module_id, module.temp().cols(), false);

            modules.insert(module_id.to_string(), json!({
                "cells": cells,
                "voltage": matrix_value(module.voltage()),
                "sensors": sensors,
                "temp": matrix_value(module.temp()),
            }));
        }

        racks.insert(key.to_string(), json!({
            "summary": series_value(rack.summary()),
            "modules": Value::Object(modules),
        }));
    }

    json!({
        "time": times,
        "step_sec": aligned.grid().step(),
        "bank": aligned.bank().map(series_value),
        "racks": Value::Object(racks),
    })
}

///
/// Global ids for a module's channels. Racks or modules outside the configured
/// topology (unknown racks, surplus modules) fall back to rack-local numbering.
///
fn channel_ids(topology: &Topology, key: &RackKey, module_id: u32, channels: usize, cells: bool) -> Vec<u32> {
    let mapped = match key {
        RackKey::Rack(rack_id) => match cells {
            true  => topology.module_cell_ids(*rack_id, module_id),
            false => topology.module_temp_ids(*rack_id, module_id),
        },
        RackKey::Unknown => None,
    };

    match mapped {
        Some(ids) if ids.len() == channels => ids,
        _ => {
            let base = (module_id - 1) * channels as u32;
            (1..=channels as u32).map(|c| base + c).collect()
        },
    }
}

fn series_value(series: &SeriesSet) -> Value {
    series.iter()
        .map(|(name, values)| (name.clone(), serde_json::to_value(values).unwrap_or(Value::Null)))
        .collect::<Map<String, Value>>()
        .into()
}

fn matrix_value(matrix: &Matrix) -> Value {
    let rows: Vec<Value> = matrix.row_iter()
        .map(|row| serde_json::to_value(row).unwrap_or(Value::Null))
        .collect();
    Value::Array(rows)
}

fn format_instant(epoch_secs: i64) -> String {
    match NaiveDateTime::from_timestamp_opt(epoch_secs, 0) {
        Some(instant) => instant.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch_secs.to_string(),
    }
}
