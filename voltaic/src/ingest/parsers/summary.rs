use std::io::Read;
use crate::error::PipelineError;
use crate::ingest::parsers::parse_frame;
use crate::model::table::ColumnTable;

// Scales that bring the wire units to canonical ones: deci-volts/amps/percent
// to whole, milli-volts to volts, deci-degrees to degrees.
const DECI: f64 = 0.1;
const MILLI: f64 = 0.001;

// (wire header, canonical name, scale). Wire headers for the single-cell extremes
// carry a `Value` suffix which is stripped on the way in; both spellings are accepted.
const BANK_FIELDS: &[(&str, &str, f64)] = &[
    ("totalVol", "totalVol", DECI),
    ("totalCur", "totalCur", DECI),
    ("soc", "soc", DECI),
    ("soh", "soh", DECI),
];

const RACK_FIELDS: &[(&str, &str, f64)] = &[
    ("totalVol", "totalVol", DECI),
    ("totalCurrent", "totalCurrent", DECI),
    ("soc", "soc", DECI),
    ("soh", "soh", DECI),
    ("maxSingleVoltage", "maxSingleVoltage", MILLI),
    ("minSingleVoltage", "minSingleVoltage", MILLI),
    ("maxSingleTemp", "maxSingleTemp", DECI),
    ("minSingleTemp", "minSingleTemp", DECI),
];

///
/// Bank-level overall summary: `time, totalVol, totalCur, soc, soh` - extra
/// columns are allowed and ignored.
///
pub fn parse_bank<R: Read>(reader: R) -> Result<ColumnTable, PipelineError> {
    parse_frame(reader, |header| select(BANK_FIELDS, header))
}

///
/// Rack-level summary with the per-cell extreme columns scaled to volts/degrees.
///
pub fn parse_rack<R: Read>(reader: R) -> Result<ColumnTable, PipelineError> {
    parse_frame(reader, |header| select(RACK_FIELDS, header))
}

fn select(fields: &[(&str, &str, f64)], header: &str) -> Option<(String, f64)> {
    let tail_is_value = header.len() > 5
        && header.get(header.len() - 5..).map_or(false, |tail| tail.eq_ignore_ascii_case("value"));

    let stripped = match tail_is_value {
        true  => &header[..header.len() - 5],
        false => header,
    };

    fields.iter()
        .find(|(wire, _, _)| wire.eq_ignore_ascii_case(stripped))
        .map(|(_, canonical, scale)| (canonical.to_string(), *scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_summary_scales_deci_units() {
        let csv = "time,totalVol,totalCur,soc,soh,extraneous\n2021/1/1 0:00:00,7012,105,965,990,42\n";
        let table = parse_bank(csv.as_bytes()).unwrap();

        assert!((table.column("totalVol").unwrap()[0] - 701.2).abs() < 1e-9);
        assert!((table.column("totalCur").unwrap()[0] - 10.5).abs() < 1e-9);
        assert!((table.column("soc").unwrap()[0] - 96.5).abs() < 1e-9);
        assert!((table.column("soh").unwrap()[0] - 99.0).abs() < 1e-9);
        assert!(table.column("extraneous").is_none());
    }

    #[test]
    fn rack_summary_strips_the_value_suffix_and_scales_extremes() {
        let csv = "time,totalVol,totalCurrent,soc,soh,maxSingleVoltageValue,minSingleVoltageValue,maxSingleTempValue,minSingleTempValue\n\
                   2021/1/1 0:00:00,7012,105,965,990,3652,3241,253,198\n";
        let table = parse_rack(csv.as_bytes()).unwrap();

        assert!((table.column("maxSingleVoltage").unwrap()[0] - 3.652).abs() < 1e-9);
        assert!((table.column("minSingleVoltage").unwrap()[0] - 3.241).abs() < 1e-9);
        assert!((table.column("maxSingleTemp").unwrap()[0] - 25.3).abs() < 1e-9);
        assert!((table.column("minSingleTemp").unwrap()[0] - 19.8).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_become_nan_not_zero() {
        let csv = "time,totalVol,soc\n2021/1/1 0:00:00,,965\n";
        let table = parse_bank(csv.as_bytes()).unwrap();
        assert!(table.column("totalVol").unwrap()[0].is_nan());
        assert!((table.column("soc").unwrap()[0] - 96.5).abs() < 1e-9);
    }
}
