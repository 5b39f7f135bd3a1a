use chrono::NaiveDate;
use uuid::Uuid;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use core_lib::config::Settings;
use voltaic::{JobSnapshot, Pipeline};

/// Every generated day starts here; one-hour spans at 5s cadence give 721 rows.
pub const DAY_START: (i32, u32, u32) = (2021, 6, 1);

///
/// A fresh scratch folder under the cargo test tmpdir.
///
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(format!("{}_{}", tag, Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("cannot create scratch dir");
    dir
}

///
/// Settings for a single-worker pipeline writing into the given output root.
/// Extra YAML lines are appended verbatim.
///
pub fn settings(output_root: &Path, extra: &str) -> Settings {
    let yaml = format!("OUTPUT_ROOT: {}\nMAX_WORKERS: 1\n{}", output_root.to_string_lossy(), extra);
    serde_yaml::from_str(&yaml).expect("test settings failed to parse")
}

///
/// Write a gzip-compressed tar archive holding the given (name, contents) members.
///
pub fn build_archive(path: &Path, members: &[(&str, String)]) {
    let file = File::create(path).expect("cannot create archive");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, contents) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, contents.as_bytes()).expect("cannot append member");
    }

    builder.into_inner().expect("cannot finish tar").finish().expect("cannot finish gzip");
}

///
/// `YYYY/M/D H:MM:SS` for the row at `offset_secs` past the day start.
///
pub fn row_time(offset_secs: i64) -> String {
    let (year, month, day) = DAY_START;
    let base = NaiveDate::from_ymd_opt(year, month, day).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let instant = base + chrono::Duration::seconds(offset_secs);
    format!("{}", instant.format("%Y/%-m/%-d %-H:%M:%S"))
}

///
/// A batVol CSV: `rows` samples at `step`-second cadence over `cells` channels,
/// all cells at 3300 mV except any (row, cell, millivolts) overrides.
///
pub fn batvol_csv(cells: usize, rows: usize, step: i64, overrides: &[(usize, usize, i64)]) -> String {
    let mut csv = String::from("time");
    for c in 1..=cells {
        csv.push_str(&format!(",V{}", c));
    }
    csv.push('\n');

    for row in 0..rows {
        csv.push_str(&row_time(row as i64 * step));
        for cell in 0..cells {
            let mv = overrides.iter()
                .find(|(r, c, _)| *r == row && *c == cell)
                .map_or(3300, |(_, _, mv)| *mv);
            csv.push_str(&format!(",{}", mv));
        }
        csv.push('\n');
    }

    csv
}

///
/// A batTemp CSV: all sensors at 25.0 C (wire value 250).
///
pub fn battemp_csv(sensors: usize, rows: usize, step: i64) -> String {
    let mut csv = String::from("time");
    for s in 1..=sensors {
        csv.push_str(&format!(",T{}", s));
    }
    csv.push('\n');

    for row in 0..rows {
        csv.push_str(&row_time(row as i64 * step));
        for _ in 0..sensors {
            csv.push_str(",250");
        }
        csv.push('\n');
    }

    csv
}

pub fn bank_summary_csv(rows: usize, step: i64) -> String {
    let mut csv = String::from("time,totalVol,totalCur,soc,soh\n");
    for row in 0..rows {
        csv.push_str(&format!("{},7012,105,965,990\n", row_time(row as i64 * step)));
    }
    csv
}

pub fn rack_summary_csv(rows: usize, step: i64) -> String {
    let mut csv = String::from(
        "time,totalVol,totalCurrent,soc,soh,maxSingleVoltageValue,minSingleVoltageValue,maxSingleTempValue,minSingleTempValue\n");
    for row in 0..rows {
        csv.push_str(&format!("{},7012,105,965,990,3340,3260,255,245\n", row_time(row as i64 * step)));
    }
    csv
}

///
/// Poll a job until it reaches a terminal status.
///
pub fn wait_terminal(pipeline: &Pipeline, job_id: &Uuid, timeout: Duration) -> JobSnapshot {
    let deadline = Instant::now() + timeout;

    loop {
        let snapshot = pipeline.status(job_id).expect("job unknown to the pipeline");
        if snapshot.status().is_terminal() {
            return snapshot
        }

        assert!(Instant::now() < deadline, "job {} did not finish within {:?}", job_id, timeout);
        std::thread::sleep(Duration::from_millis(20));
    }
}
