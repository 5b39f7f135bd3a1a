use serde::Serialize;
use std::path::{Path, PathBuf};
use crate::error::PipelineError;

///
/// Listing of the ingestable archives under a data root, with the metadata the
/// surrounding tooling shows when picking days to process.
///
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    entries: Vec<ArchiveMeta>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ArchiveMeta {
    name: String,
    path: PathBuf,
    size_bytes: u64,
    modified_epoch: Option<u64>,
    bank_hint: bool, // 'bank' appears in the archive name.
    rack_hint: bool, // 'rack' appears in the archive name.
}

impl ArchiveMeta {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn bank_hint(&self) -> bool {
        self.bank_hint
    }

    pub fn rack_hint(&self) -> bool {
        self.rack_hint
    }
}

impl ArchiveIndex {
    ///
    /// Scan the data root for `*.tar.gz` files, sorted by name. A missing root is
    /// an empty index, not an error - the folder may simply not have been fed yet.
    ///
    pub fn scan(data_root: &Path) -> Result<Self, PipelineError> {
        let mut entries = Vec::new();

        if !data_root.exists() {
            log::warn!("Data root {} does not exist - nothing to index", data_root.to_string_lossy());
            return Ok(Self { entries })
        }

        for entry in (data_root.read_dir()?).flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if !name.to_lowercase().ends_with(".tar.gz") || !path.is_file() {
                continue
            }

            let metadata = entry.metadata()?;
            let lowered = name.to_lowercase();

            entries.push(ArchiveMeta {
                bank_hint: lowered.contains("bank"),
                rack_hint: lowered.contains("rack"),
                size_bytes: metadata.len(),
                modified_epoch: metadata.modified().ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs()),
                name,
                path,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ArchiveMeta] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

///
/// Turn a submitted file argument into a concrete path: absolute or cwd-relative
/// paths that exist are taken as-is, bare names are looked up under the data root.
///
pub fn resolve(data_root: &Path, file: &str) -> PathBuf {
    let direct = PathBuf::from(file);
    match direct.exists() {
        true  => direct,
        false => data_root.join(file),
    }
}
