use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use crate::error::PipelineError;

///
/// Streaming access to the regular-file members of a gzip-compressed tar archive.
///
/// Nothing is extracted to disk: each member is handed out as a reader over the
/// decompressed tar stream and is only valid until the next member is requested.
///
pub struct TarStream {
    path: String,
    archive: tar::Archive<GzDecoder<BufReader<File>>>,
}

impl TarStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let display = path.as_ref().to_string_lossy().to_string();

        let file = File::open(path.as_ref()).map_err(|source| match source.kind() {
            ErrorKind::NotFound => PipelineError::InputNotFound { path: display.clone() },
            _ => PipelineError::CorruptArchive { path: display.clone(), source },
        })?;

        Ok(Self {
            path: display,
            archive: tar::Archive::new(GzDecoder::new(BufReader::new(file))),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn members(&mut self) -> Result<Members<'_>, PipelineError> {
        let entries = self.archive.entries()
            .map_err(|source| PipelineError::CorruptArchive { path: self.path.clone(), source })?;

        Ok(Members { path: self.path.clone(), entries })
    }
}

pub struct Members<'a> {
    path: String,
    entries: tar::Entries<'a, GzDecoder<BufReader<File>>>,
}

///
/// One regular-file member: its name within the archive plus a byte stream over
/// its decompressed contents.
///
pub struct Member<'a> {
    name: String,
    entry: tar::Entry<'a, GzDecoder<BufReader<File>>>,
}

impl<'a> Member<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<'a> Read for Member<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.entry.read(buf)
    }
}

impl<'a> Iterator for Members<'a> {
    type Item = Result<Member<'a>, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.entries.next() {
                None => return None,
                Some(Err(source)) => {
                    return Some(Err(PipelineError::CorruptArchive { path: self.path.clone(), source }))
                },
                Some(Ok(entry)) => {
                    if !entry.header().entry_type().is_file() {
                        continue
                    }

                    let name = String::from_utf8_lossy(&entry.path_bytes()).to_string();
                    return Some(Ok(Member { name, entry }))
                },
            }
        }
    }
}
