use std::io::Read;
use crate::error::PipelineError;
use crate::ingest::parsers::parse_frame;
use crate::model::table::ColumnTable;

///
/// Per-cell voltage stream: `time, V1, V2, ... Vn` in millivolts, scaled to volts.
/// Only V-prefixed columns with a wholly numeric suffix are retained.
///
pub fn parse<R: Read>(reader: R) -> Result<ColumnTable, PipelineError> {
    parse_frame(reader, |header| {
        prefixed_channel(header, 'V').map(|name| (name, 0.001))
    })
}

///
/// Canonicalise `v17`/`V17` to `V17`; reject anything whose suffix is not digits.
///
pub(crate) fn prefixed_channel(header: &str, prefix: char) -> Option<String> {
    let mut chars = header.chars();
    let first = chars.next()?;

    if !first.eq_ignore_ascii_case(&prefix) {
        return None
    }

    let suffix = chars.as_str();
    match !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
        true  => Some(format!("{}{}", prefix, suffix)),
        false => None,
    }
}
