use anyhow::Result;
use clap::{App, Arg};
use ubyte::ToByteUnit;
use std::path::PathBuf;
use core_lib::config::Settings;
use voltaic::ingest::indexer::{self, ArchiveIndex};
use voltaic::JobStatus;

pub fn main() -> Result<()> {

    let options = App::new("voltaic")
        .version("1.0")
        .about("Voltaic ingests daily battery-management archives (gzip-compressed tarballs of CSV streams), aligns every series onto a uniform time grid, runs the cell/anomaly/SOH analyzers and writes the result documents under OUTPUT_ROOT keyed by job id. Refer to the README.md for more details.")
        .arg(Arg::with_name("settings")
            .short("c")
            .long("settings")
            .help("Path to a YAML settings file. Every key can also be set via an environment variable of the same name")
            .takes_value(true))
        .arg(Arg::with_name("list")
            .short("l")
            .long("list")
            .help("List the ingestable archives under DATA_ROOT and exit"))
        .arg(Arg::with_name("archives")
            .help("The archives to process as one job. Bare names are resolved under DATA_ROOT")
            .multiple(true)
            .takes_value(true))
        .get_matches();

    dotenv::dotenv().ok();
    let _ = env_logger::try_init();

    let settings = match options.value_of("settings") {
        Some(path) => Settings::load(path)?,
        None => Settings::from_env()?,
    };

    if options.is_present("list") {
        let index = ArchiveIndex::scan(settings.data_root())?;
        for entry in index.entries() {
            println!("{}\t{}", entry.name(), entry.size_bytes().bytes());
        }
        return Ok(())
    }

    let files: Vec<PathBuf> = match options.values_of("archives") {
        Some(archives) => archives.map(|file| indexer::resolve(settings.data_root(), file)).collect(),
        None => vec!(),
    };

    if files.is_empty() {
        anyhow::bail!("no archives specified - pass one or more, or use --list to see what DATA_ROOT holds");
    }

    let snapshot = voltaic::run_once(settings, files)?;

    match snapshot.status() {
        JobStatus::Success => Ok(()),
        status => anyhow::bail!("job finished {} - {}", status, snapshot.error().unwrap_or("no detail")),
    }
}
