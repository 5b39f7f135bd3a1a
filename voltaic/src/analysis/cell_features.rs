use serde::Serialize;
use std::collections::BTreeMap;
use crate::analysis::{AnalysisContext, AnalysisPlugin, PluginKind};
use crate::analysis::stats::{gradient, Welford};
use crate::error::PipelineError;
use crate::model::aligned::Aligned;
use crate::model::matrix::Matrix;

///
/// Per-channel summaries for every aligned module: voltage statistics,
/// temperature statistics and the dV/dt dynamic, one array entry per channel.
///
pub struct CellFeatures;

#[derive(Serialize)]
struct ModuleFeatures {
    v_mean: Vec<f64>,
    v_std: Vec<f64>,
    v_min: Vec<f64>,
    v_max: Vec<f64>,
    t_mean: Vec<f64>,
    t_std: Vec<f64>,
    dvdt_mean: Vec<f64>,
    dvdt_std: Vec<f64>,
}

impl AnalysisPlugin for CellFeatures {
    fn name(&self) -> &'static str {
        "cell_features"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Cell
    }

    fn run(&self, aligned: &Aligned, ctx: &AnalysisContext) -> Result<serde_json::Value, PipelineError> {
        let step = ctx.settings().time_step_sec() as f64;
        let mut result: BTreeMap<String, BTreeMap<u32, ModuleFeatures>> = BTreeMap::new();

        for (key, rack) in aligned.racks() {
            let mut rack_out = BTreeMap::new();

            for (&module_id, module) in rack.modules() {
                let voltage = module.voltage();
                let temp = module.temp();
                let dvdt = gradient(voltage, step);

                let v: Vec<Welford> = channel_accumulators(voltage);
                let t: Vec<Welford> = channel_accumulators(temp);
                let d: Vec<Welford> = channel_accumulators(&dvdt);

                rack_out.insert(module_id, ModuleFeatures {
                    v_mean: v.iter().map(Welford::mean).collect(),
                    v_std: v.iter().map(Welford::std).collect(),
                    v_min: v.iter().map(Welford::min).collect(),
                    v_max: v.iter().map(Welford::max).collect(),
                    t_mean: t.iter().map(Welford::mean).collect(),
                    t_std: t.iter().map(Welford::std).collect(),
                    dvdt_mean: d.iter().map(Welford::mean).collect(),
                    dvdt_std: d.iter().map(Welford::std).collect(),
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

fn channel_accumulators(matrix: &Matrix) -> Vec<Welford> {
    (0..matrix.cols())
        .map(|c| Welford::of(matrix.column_iter(c)))
        .collect()
}
