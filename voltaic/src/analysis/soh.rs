use serde::Serialize;
use std::collections::BTreeMap;
use crate::analysis::{AnalysisContext, AnalysisPlugin, PluginKind};
use crate::analysis::stats::{gradient, nanmax, nanmean, nanmin};
use crate::error::PipelineError;
use crate::model::aligned::Aligned;
use crate::model::matrix::Matrix;

const EPSILON: f64 = 1e-6;

///
/// Light-weight state-of-health proxies per module, from the cell-mean voltage
/// trajectory: a capacity proxy from the normalised mean voltage and a
/// resistance proxy from the mean dV/dt magnitude.
///
pub struct SohProxy;

#[derive(Serialize)]
struct ModuleSoh {
    soh_capacity: f64,
    soh_resistance: f64,
}

impl AnalysisPlugin for SohProxy {
    fn name(&self) -> &'static str {
        "soh_proxy"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Soh
    }

    fn run(&self, aligned: &Aligned, ctx: &AnalysisContext) -> Result<serde_json::Value, PipelineError> {
        let step = ctx.settings().time_step_sec() as f64;
        let mut result: BTreeMap<String, BTreeMap<u32, ModuleSoh>> = BTreeMap::new();

        for (key, rack) in aligned.racks() {
            let mut rack_out = BTreeMap::new();

            for (&module_id, module) in rack.modules() {
                let v_mean = row_means(module.voltage());
                let dvdt_mean = row_means(&gradient(module.voltage(), step));

                rack_out.insert(module_id, ModuleSoh {
                    soh_capacity: capacity_proxy(&v_mean),
                    soh_resistance: resistance_proxy(&dvdt_mean),
                });
            }

            result.insert(key.to_string(), rack_out);
        }

        serde_json::to_value(result).map_err(|source| PipelineError::CannotEncodeDocument {
            path: self.name().into(),
            source,
        })
    }
}

fn row_means(matrix: &Matrix) -> Vec<f64> {
    matrix.row_iter()
        .map(|row| nanmean(row.iter().copied()))
        .collect()
}

///
/// Mean of the min-max normalised series. The epsilon keeps a flat series (max
/// equals min) bounded instead of dividing by zero.
///
fn capacity_proxy(v_mean: &[f64]) -> f64 {
    let low = nanmin(v_mean.iter().copied());
    let high = nanmax(v_mean.iter().copied());
    nanmean(v_mean.iter().map(|&v| (v - low) / (high - low + EPSILON)))
}

fn resistance_proxy(dvdt_mean: &[f64]) -> f64 {
    nanmean(dvdt_mean.iter().map(|&d| (1.0 / (d.abs() + EPSILON)).tanh()))
}
