use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::binsearch::binary_search_line;
use crate::error::{IrError, Result};

/// Width internal ids are zero-padded to on disk, so their lexical order
/// (what `binary_search_line` compares on) matches their numeric order.
/// 10 digits covers the full `u32` range.
const ID_WIDTH: usize = 10;

fn pad_id(internal_id: u32) -> String {
    format!("{internal_id:0width$}", width = ID_WIDTH)
}

/// Reader/writer for the document-id mapping file: `INTERNAL SP EXTERNAL\n`,
/// zero-padded and sorted ascending by internal id. Looked up with the same
/// on-disk binary search used for term lookup, since it's sorted the same way.
pub struct DocMapWriter {
    file: File,
}

impl DocMapWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(DocMapWriter { file: File::create(path)? })
    }

    pub fn write(&mut self, internal_id: u32, external_id: &str) -> Result<()> {
        writeln!(self.file, "{} {external_id}", pad_id(internal_id))?;
        Ok(())
    }
}

pub struct DocMapReader {
    file: File,
    end: u64,
}

impl DocMapReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let end = file.metadata()?.len();
        Ok(DocMapReader { file, end })
    }

    pub fn lookup(&mut self, internal_id: u32) -> Result<Option<String>> {
        let target = pad_id(internal_id);
        let line = binary_search_line(&mut self.file, 0, self.end, &target)?;
        Ok(line.and_then(|l| l.split_once(' ').map(|(_, ext)| ext.to_string())))
    }

    pub fn lookup_many(&mut self, internal_ids: &[u32]) -> Result<std::collections::HashMap<u32, String>> {
        let mut out = std::collections::HashMap::new();
        for &id in internal_ids {
            if let Some(ext) = self.lookup(id)? {
                out.insert(id, ext);
            } else {
                return Err(IrError::Format {
                    offset: 0,
                    message: format!("no mapping entry for internal id {id}"),
                });
            }
        }
        Ok(out)
    }

    /// Load the whole mapping into memory, in ascending internal-id order.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<(u32, String)>> {
        let reader = BufReader::new(File::open(path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let (id, ext) = line.split_once(' ').ok_or_else(|| IrError::Format {
                offset: 0,
                message: format!("malformed doc-mapping line: {line}"),
            })?;
            let id: u32 = id.parse().map_err(|_| IrError::Format {
                offset: 0,
                message: format!("expected integer internal id, got {id:?}"),
            })?;
            out.push((id, ext.to_string()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn writes_and_looks_up_mappings() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut writer = DocMapWriter::create(file.path()).unwrap();
            writer.write(0, "doc-a.csv#1").unwrap();
            writer.write(1, "doc-a.csv#2").unwrap();
            writer.write(2, "doc-b.csv#1").unwrap();
        }
        let mut reader = DocMapReader::open(file.path()).unwrap();
        assert_eq!(reader.lookup(1).unwrap().unwrap(), "doc-a.csv#2");
        assert_eq!(reader.lookup(2).unwrap().unwrap(), "doc-b.csv#1");
        assert!(reader.lookup(99).unwrap().is_none());
    }

    #[test]
    fn binary_search_finds_ids_past_single_digit_boundary() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut writer = DocMapWriter::create(file.path()).unwrap();
            for id in 0..20u32 {
                writer.write(id, &format!("doc-{id}.csv#1")).unwrap();
            }
        }
        let mut reader = DocMapReader::open(file.path()).unwrap();
        for id in 0..20u32 {
            assert_eq!(reader.lookup(id).unwrap().unwrap(), format!("doc-{id}.csv#1"));
        }
    }
}
