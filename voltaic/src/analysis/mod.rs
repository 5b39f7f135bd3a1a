pub mod anomaly;
pub mod cell_features;
pub mod soh;
pub mod stats;

use serde::Serialize;
use core_lib::config::Settings;
use crate::error::{error_chain, PipelineError};
use crate::model::aligned::Aligned;
use crate::model::topology::Topology;

///
/// What family of result a plugin produces - drives which result document its
/// output lands in.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Cell,
    Anomaly,
    Soh,
    Generic,
}

///
/// Read-only job state shared by every plugin in a run.
///
pub struct AnalysisContext<'a> {
    settings: &'a Settings,
    topology: &'a Topology,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(settings: &'a Settings, topology: &'a Topology) -> Self {
        Self { settings, topology }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn topology(&self) -> &Topology {
        self.topology
    }
}

///
/// A named, pure analysis pass over the aligned tree.
///
/// Plugins must not mutate their inputs (the borrow makes that structural) and
/// must be deterministic: the same aligned tree yields byte-identical output.
///
pub trait AnalysisPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> PluginKind;
    fn run(&self, aligned: &Aligned, ctx: &AnalysisContext) -> Result<serde_json::Value, PipelineError>;
}

///
/// The process-wide plugin registry, frozen once the pipeline starts.
///
/// Registration is explicit (no discovery); registering a second plugin under an
/// existing name replaces the first, keeping its registration slot.
///
pub struct Registry {
    plugins: Vec<Box<dyn AnalysisPlugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { plugins: Vec::new() }
    }

    ///
    /// The standard plugin set: cell features, anomaly detection, SOH proxies.
    ///
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(cell_features::CellFeatures));
        registry.register(Box::new(anomaly::AnomalyDetector));
        registry.register(Box::new(soh::SohProxy));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn AnalysisPlugin>) {
        match self.plugins.iter().position(|existing| existing.name() == plugin.name()) {
            Some(slot) => {
                log::warn!("Plugin {} registered twice - the later registration wins", plugin.name());
                self.plugins[slot] = plugin;
            },
            None => self.plugins.push(plugin),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    ///
    /// Run every registered plugin, in registration order, against one aligned
    /// tree. A plugin failure aborts the run with the plugin's name attached.
    ///
    pub fn run_all(&self, aligned: &Aligned, ctx: &AnalysisContext) -> Result<AnalysisOutputs, PipelineError> {
        let mut outputs = Vec::with_capacity(self.plugins.len());

        for plugin in &self.plugins {
            let started = std::time::Instant::now();

            let value = plugin.run(aligned, ctx).map_err(|err| PipelineError::PluginFailure {
                plugin: plugin.name().into(),
                message: error_chain(&err),
            })?;

            log::debug!("Plugin {} completed in {:?}", plugin.name(), started.elapsed());

            outputs.push(AnalysisOutput {
                name: plugin.name(),
                kind: plugin.kind(),
                value,
            });
        }

        Ok(AnalysisOutputs { outputs })
    }
}

///
/// The results of one `run_all`, keyed by plugin name, kind retained so the
/// store can route each output to its document.
///
pub struct AnalysisOutputs {
    outputs: Vec<AnalysisOutput>,
}

pub struct AnalysisOutput {
    name: &'static str,
    kind: PluginKind,
    value: serde_json::Value,
}

impl AnalysisOutput {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

impl AnalysisOutputs {
    pub fn iter(&self) -> impl Iterator<Item = &AnalysisOutput> {
        self.outputs.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.outputs.iter().map(|output| output.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.outputs.iter()
            .find(|output| output.name == name)
            .map(|output| &output.value)
    }

    ///
    /// The merged document body for one plugin kind: the plugin's output directly
    /// when a single plugin produced that kind, or `{plugin: output}` when several did.
    ///
    pub fn document_for(&self, kind: PluginKind) -> serde_json::Value {
        let matching: Vec<&AnalysisOutput> = self.outputs.iter()
            .filter(|output| output.kind == kind)
            .collect();

        match matching.len() {
            0 => serde_json::Value::Object(serde_json::Map::new()),
            1 => matching[0].value.clone(),
            _ => matching.into_iter()
                .map(|output| (output.name.to_string(), output.value.clone()))
                .collect::<serde_json::Map<String, serde_json::Value>>()
                .into(),
        }
    }
}
