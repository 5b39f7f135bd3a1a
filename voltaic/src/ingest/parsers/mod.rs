pub mod battemp;
pub mod batvol;
pub mod summary;

use regex::Regex;
use lazy_static::lazy_static;
use std::io::Read;
use chrono::NaiveDate;
use crate::error::PipelineError;
use crate::ingest::router::{MemberKind, RackRef};
use crate::model::table::ColumnTable;

lazy_static! {
    // The two accepted timestamp layouts. Anchored so nothing is allocated per row
    // beyond the capture walk.
    static ref TIME_FORMATS: Vec<Regex> = vec!(
        Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})[ T](\d{1,2}):(\d{1,2}):(\d{1,2})$").expect("bad regex for slash time"),
        Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})[ T](\d{1,2}):(\d{1,2}):(\d{1,2})$").expect("bad regex for dash time"),
    );
}

///
/// Parse `YYYY/M/D H:M:S` or `YYYY-MM-DD H:M:S` into epoch seconds. Anything else
/// (including calendar-impossible dates) is None and the row will be dropped.
///
pub fn parse_time(raw: &str) -> Option<i64> {
    let raw = raw.trim();

    for pattern in &*TIME_FORMATS {
        if let Some(captures) = pattern.captures(raw) {
            let field = |idx: usize| captures.get(idx).expect("time capture missing").as_str();

            let date = NaiveDate::from_ymd_opt(
                field(1).parse().ok()?,
                field(2).parse().ok()?,
                field(3).parse().ok()?)?;

            let datetime = date.and_hms_opt(
                field(4).parse().ok()?,
                field(5).parse().ok()?,
                field(6).parse().ok()?)?;

            return Some(datetime.timestamp())
        }
    }

    None
}

///
/// Dispatch a classified member's byte stream to the right parser.
///
pub fn parse_member<R: Read>(kind: MemberKind, rack: RackRef, reader: R) -> Result<ColumnTable, PipelineError> {
    match (kind, rack) {
        (MemberKind::Summary, RackRef::Bank) => summary::parse_bank(reader),
        (MemberKind::Summary, _)             => summary::parse_rack(reader),
        (MemberKind::BatVol, _)              => batvol::parse(reader),
        (MemberKind::BatTemp, _)             => battemp::parse(reader),
    }
}

///
/// The shared streaming frame all three parsers run on.
///
/// Reads the CSV row by row (memory stays proportional to retained rows, never to
/// file bytes), locates the `time` column from the header, and keeps the columns
/// the selector recognises - applying its per-column scale on the way in. Rows
/// with an unparseable time are dropped and counted; unparseable numeric cells
/// become NaN, never zero.
///
pub(crate) fn parse_frame<R, S>(reader: R, select: S) -> Result<ColumnTable, PipelineError>
where
    R: Read,
    S: Fn(&str) -> Option<(String, f64)>
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()
        .map_err(csv_io_error)?
        .clone();

    let mut time_idx = None;
    let mut selected: Vec<(usize, f64)> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    for (idx, header) in headers.iter().enumerate() {
        let header = header.trim();
        if header.eq_ignore_ascii_case("time") {
            time_idx = Some(idx);
        } else if let Some((name, scale)) = select(header) {
            selected.push((idx, scale));
            names.push(name);
        }
    }

    let mut table = ColumnTable::new(names);

    let time_idx = match time_idx {
        Some(idx) => idx,
        None => {
            log::warn!("CSV member has no time column - nothing retained");
            return Ok(table)
        },
    };

    let mut values = vec![f64::NAN; selected.len()];
    let mut record = csv::StringRecord::new();

    loop {
        match csv_reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {},
            Err(err) => {
                if err.is_io_error() {
                    return Err(csv_io_error(err))
                }
                table.count_dropped_row(); // Unreadable row - drop it and carry on.
                continue
            },
        }

        let time = match record.get(time_idx).and_then(parse_time) {
            Some(time) => time,
            None => {
                table.count_dropped_row();
                continue
            },
        };

        for (slot, &(idx, scale)) in selected.iter().enumerate() {
            values[slot] = match record.get(idx).map(str::trim) {
                Some(field) if !field.is_empty() => {
                    field.parse::<f64>().map(|value| value * scale).unwrap_or(f64::NAN)
                },
                _ => f64::NAN,
            };
        }

        table.push_row(time, &values);
    }

    table.finish();
    Ok(table)
}

///
/// A csv error backed by the underlying stream means the archive itself is bad,
/// not the row - surface it so the ingest loop can abandon the archive.
///
fn csv_io_error(err: csv::Error) -> PipelineError {
    match err.into_kind() {
        csv::ErrorKind::Io(source) => PipelineError::IOError(source),
        other => PipelineError::IOError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_time_layouts_parse_to_the_same_instant() {
        let slash = parse_time("2021/3/5 4:07:09").unwrap();
        let dash = parse_time("2021-03-05 04:07:09").unwrap();
        assert_eq!(slash, dash);
    }

    #[test]
    fn nonsense_times_are_rejected() {
        assert_eq!(parse_time("yesterday"), None);
        assert_eq!(parse_time("2021/13/40 99:99:99"), None);
        assert_eq!(parse_time(""), None);
        assert_eq!(parse_time("2021/3/5"), None);
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert!(parse_time("  2021/3/5 4:07:09  ").is_some());
    }

    #[test]
    fn frame_drops_rows_with_bad_times_and_nans_bad_cells() {
        let csv = "time,V1,V2\n2021/1/1 0:00:00,1000,2000\nnot-a-time,1,2\n2021/1/1 0:00:05,oops,3000\n";
        let table = parse_frame(csv.as_bytes(), |header| {
            match header.starts_with('V') {
                true  => Some((header.to_string(), 0.001)),
                false => None,
            }
        }).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.dropped_rows(), 1);
        let v1 = table.column("V1").unwrap();
        assert_eq!(v1[0], 1.0);
        assert!(v1[1].is_nan());
        assert_eq!(table.column("V2").unwrap()[1], 3.0);
    }

    #[test]
    fn frame_without_a_time_column_retains_nothing() {
        let table = parse_frame("V1,V2\n1,2\n".as_bytes(), |header| Some((header.to_string(), 1.0))).unwrap();
        assert!(table.is_empty());
    }
}
