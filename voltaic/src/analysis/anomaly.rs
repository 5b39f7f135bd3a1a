use serde::Serialize;
use std::collections::BTreeMap;
use crate::analysis::{AnalysisContext, AnalysisPlugin, PluginKind};
use crate::analysis::stats::{nanmax, nanmin};
use crate::error::PipelineError;
use crate::model::aligned::Aligned;

///
/// Rule-based per-module anomaly screens: instants where the temperature spread
/// across a module's sensors exceeds the threshold, and instants where any cell
/// voltage leaves the [discharge cutoff, charge cutoff] band.
///
pub struct AnomalyDetector;

#[derive(Serialize)]
struct ModuleAnomalies {
    module_id: u32,
    high_temp_spread_idx: Vec<usize>,
    volt_low_idx: Vec<usize>,
    volt_high_idx: Vec<usize>,
}

impl AnalysisPlugin for AnomalyDetector {
    fn name(&self) -> &'static str {
        "anomaly_detector"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Anomaly
    }

    fn run(&self, aligned: &Aligned, ctx: &AnalysisContext) -> Result<serde_json::Value, PipelineError> {
        let spread_threshold = ctx.settings().temp_diff_threshold();
        let volt_low = ctx.settings().volt_discharge_cutoff();
        let volt_high = ctx.settings().volt_charge_cutoff();

        let mut result: BTreeMap<String, Vec<ModuleAnomalies>> = BTreeMap::new();

        for (key, rack) in aligned.racks() {
            let mut rack_out = Vec::with_capacity(rack.module_count());

            for (&module_id, module) in rack.modules() {
                let mut anomalies = ModuleAnomalies {
                    module_id,
                    high_temp_spread_idx: Vec::new(),
                    volt_low_idx: Vec::new(),
                    volt_high_idx: Vec::new(),
                };

                for (t, row) in module.temp().row_iter().enumerate() {
                    let spread = nanmax(row.iter().copied()) - nanmin(row.iter().copied());
                    if spread > spread_threshold {
                        anomalies.high_temp_spread_idx.push(t);
                    }
                }

                for (t, row) in module.voltage().row_iter().enumerate() {
                    // NaN compares false on both sides, so missing cells trip neither bound.
                    if row.iter().any(|&v| v < volt_low) {
                        anomalies.volt_low_idx.push(t);
                    }
                    if row.iter().any(|&v| v > volt_high) {
                        anomalies.volt_high_idx.push(t);
                    }
                }

                rack_out.push(anomalies);
            }

            result.insert(key.to_string(), rack_out);
        }

        serde_json::to_value(result).map_err(|source| PipelineError::CannotEncodeDocument {
            path: self.name().into(),
            source,
        })
    }
}
