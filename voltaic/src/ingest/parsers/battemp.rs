use std::io::Read;
use crate::error::PipelineError;
use crate::ingest::parsers::{batvol::prefixed_channel, parse_frame};
use crate::model::table::ColumnTable;

///
/// Per-sensor temperature stream: `time, T1, T2, ... Tm` in tenths of a degree,
/// scaled to degrees Celsius.
///
pub fn parse<R: Read>(reader: R) -> Result<ColumnTable, PipelineError> {
    parse_frame(reader, |header| {
        prefixed_channel(header, 'T').map(|name| (name, 0.1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenths_scale_to_degrees() {
        let csv = "time,T1,T2\n2021/1/1 0:00:00,253,247\n";
        let table = parse(csv.as_bytes()).unwrap();

        assert!((table.column("T1").unwrap()[0] - 25.3).abs() < 1e-9);
        assert!((table.column("T2").unwrap()[0] - 24.7).abs() < 1e-9);
    }

    #[test]
    fn the_time_header_does_not_match_the_t_prefix() {
        let csv = "time,T1\n2021/1/1 0:00:00,253\n";
        let table = parse(csv.as_bytes()).unwrap();

        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!("T1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unparseable_readings_are_nan() {
        let csv = "time,T1,T2\n2021/1/1 0:00:00,bad,247\n";
        let table = parse(csv.as_bytes()).unwrap();
        assert!(table.column("T1").unwrap()[0].is_nan());
    }
}
