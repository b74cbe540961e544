use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::binsearch::binary_search_line;
use crate::error::{IrError, Result};
use crate::ranker::{LoadedPosting, Ranker};

/// A final, merged, on-disk index, opened for querying.
///
/// The term dictionary is loaded eagerly (one pass over the body to collect
/// term names; posting lists themselves stay `None` until fetched), the tiny
/// sidecar is loaded eagerly in full, and individual posting lists are loaded
/// lazily on first query that needs them and cached thereafter.
pub struct InvertedIndex {
    path: PathBuf,
    file: File,
    index_start: u64,
    index_end: u64,
    pub metadata: serde_json::Value,
    dictionary: HashMap<String, Option<LoadedPosting>>,
    tiny: HashMap<String, f64>,
}

impl InvertedIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();

        let mut header_reader = BufReader::new(&mut file);
        let mut header_line = String::new();
        header_reader.read_line(&mut header_line)?;
        let index_start = header_line.len() as u64;
        let mut metadata: serde_json::Value = serde_json::from_str(header_line.trim_end())
            .map_err(|e| IrError::Format { offset: 0, message: format!("malformed pre-header: {e}") })?;

        let (trailer_start, trailer_line) = find_last_line(&mut file, len)?;
        let index_end = trailer_start;
        let trailer: serde_json::Value = serde_json::from_str(trailer_line.trim_end())
            .map_err(|e| IrError::Format { offset: trailer_start, message: format!("malformed trailer: {e}") })?;
        if let (Some(base), Some(extra)) = (metadata.as_object_mut(), trailer.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }

        let mut dictionary = HashMap::new();
        {
            let mut body_file = File::open(&path)?;
            body_file.seek(SeekFrom::Start(index_start))?;
            let mut reader = BufReader::new(body_file.take(index_end - index_start));
            let mut line = String::new();
            loop {
                line.clear();
                let n = reader.read_line(&mut line)?;
                if n == 0 {
                    break;
                }
                if let Some(term) = line.trim_end().split_whitespace().next() {
                    dictionary.insert(term.to_string(), None);
                }
            }
        }

        let tiny_path = tiny_sidecar_path(&path);
        let mut tiny = HashMap::new();
        if tiny_path.exists() {
            let reader = BufReader::new(File::open(&tiny_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                let (term, value) = line.split_once(' ').ok_or_else(|| IrError::Format {
                    offset: 0,
                    message: format!("malformed tiny sidecar line: {line}"),
                })?;
                let value: f64 = value.parse().map_err(|_| IrError::Format {
                    offset: 0,
                    message: format!("expected float tiny value, got {value:?}"),
                })?;
                tiny.insert(term.to_string(), value);
            }
        }

        Ok(InvertedIndex {
            path,
            file,
            index_start,
            index_end,
            metadata,
            dictionary,
            tiny,
        })
    }

    pub fn doc_mapping_path(&self) -> Option<PathBuf> {
        self.metadata
            .get("doc_mapping")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
    }

    /// Run a query: load any not-yet-cached posting lists for `query_tokens`
    /// (skipping terms absent from the dictionary — a miss, not an error),
    /// then hand everything to the ranker. Results are truncated to `n`.
    pub fn search(&mut self, query_tokens: &[String], n: usize, ranker: &dyn Ranker) -> Result<Vec<(u32, f64)>> {
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        // Collect terms needing a fetch into a separate list instead of
        // mutating the query/dictionary while iterating over it.
        let mut still_to_fetch = Vec::new();
        for term in query_tokens {
            match self.dictionary.get(term) {
                Some(None) => still_to_fetch.push(term.clone()),
                Some(Some(_)) | None => {}
            }
        }
        still_to_fetch.sort();
        still_to_fetch.dedup();

        for term in &still_to_fetch {
            if let Some(loaded) = self.fetch_term(term, ranker)? {
                self.dictionary.insert(term.clone(), Some(loaded));
            }
        }

        let mut candidates = HashMap::new();
        for term in query_tokens {
            if let Some(Some(loaded)) = self.dictionary.get(term) {
                candidates.entry(term.clone()).or_insert_with(|| loaded.clone());
            }
        }

        let mut scores = ranker.order(query_tokens, &candidates);
        scores.truncate(n);
        Ok(scores)
    }

    fn fetch_term(&mut self, term: &str, ranker: &dyn Ranker) -> Result<Option<LoadedPosting>> {
        let Some(line) = binary_search_line(&mut self.file, self.index_start, self.index_end, term)? else {
            return Ok(None);
        };
        let (_, rest) = line.split_once(' ').ok_or_else(|| IrError::Format {
            offset: 0,
            message: format!("malformed index body line: {line}"),
        })?;
        let mut loaded = ranker.load_posting_list(rest)?;
        if loaded.tiny.is_none() {
            loaded.tiny = self.tiny.get(term).copied();
        }
        Ok(Some(loaded))
    }
}

pub fn tiny_sidecar_path(index_path: &Path) -> PathBuf {
    let mut s = index_path.as_os_str().to_os_string();
    s.push(".tiny");
    PathBuf::from(s)
}

/// Locate the last `\n`-delimited line in `file` without scanning the whole
/// body: read the tail in growing chunks until a newline (other than the
/// file's own trailing one) is found. Returns (start offset of the line,
/// line text without its trailing newline).
fn find_last_line(file: &mut File, len: u64) -> Result<(u64, String)> {
    let mut window = 4096u64;
    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (len - start) as usize];
        file.read_exact(&mut buf)?;

        // Ignore a single trailing newline so it doesn't look like an empty
        // last line.
        let mut effective_len = buf.len();
        if effective_len > 0 && buf[effective_len - 1] == b'\n' {
            effective_len -= 1;
        }

        if let Some(rel_pos) = buf[..effective_len].iter().rposition(|&b| b == b'\n') {
            let line_start = start + rel_pos as u64 + 1;
            let line = String::from_utf8_lossy(&buf[rel_pos + 1..effective_len]).into_owned();
            return Ok((line_start, line));
        }

        if start == 0 {
            let line = String::from_utf8_lossy(&buf[..effective_len]).into_owned();
            return Ok((0, line));
        }
        window *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::NoOpRanker;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_fixture() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"ranker":"NONE"}}"#).unwrap();
        writeln!(file, "apple 1 2").unwrap();
        writeln!(file, "banana 3").unwrap();
        writeln!(file, "cherry 1 4 5").unwrap();
        writeln!(file, r#"{{"total_documents":5}}"#).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn opens_and_parses_header_and_trailer() {
        let file = write_fixture();
        let index = InvertedIndex::open(file.path()).unwrap();
        assert_eq!(index.metadata["ranker"], "NONE");
        assert_eq!(index.metadata["total_documents"], 5);
        assert_eq!(index.dictionary.len(), 3);
    }

    #[test]
    fn search_finds_matching_documents() {
        let file = write_fixture();
        let mut index = InvertedIndex::open(file.path()).unwrap();
        let ranker = NoOpRanker;
        let results = index
            .search(&["apple".to_string(), "banana".to_string()], 10, &ranker)
            .unwrap();
        let docs: Vec<u32> = results.iter().map(|(d, _)| *d).collect();
        assert!(docs.contains(&1));
        assert!(docs.contains(&2));
        assert!(docs.contains(&3));
    }

    #[test]
    fn unknown_query_term_is_a_miss_not_an_error() {
        let file = write_fixture();
        let mut index = InvertedIndex::open(file.path()).unwrap();
        let ranker = NoOpRanker;
        let results = index.search(&["nonexistent".to_string()], 10, &ranker).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn empty_query_is_a_valid_noop() {
        let file = write_fixture();
        let mut index = InvertedIndex::open(file.path()).unwrap();
        let ranker = NoOpRanker;
        let results = index.search(&[], 10, &ranker).unwrap();
        assert!(results.is_empty());
    }
}
