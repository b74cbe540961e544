use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use sysinfo::System;

use crate::error::Result;
use crate::index::tiny_sidecar_path;
use crate::posting::{PostingClass, PostingList};
use crate::ranker::Ranker;

/// Single-pass in-memory indexer: buffers documents, spills sorted blocks to
/// disk under memory or term-count pressure, and merges the blocks into a
/// final sorted index with an external, heap-based k-way merge.
///
/// Grounded on the teacher's `SPIMIIndexer` (struct shape, `add_document`/
/// `finalize`, block numbering) generalized with `original_source`'s
/// heap-based `spimi.py` merge, which scales `O(log(blocks))` per term
/// instead of the teacher's linear scan across all open blocks.
pub struct SpimiIndexer {
    max_block_size: usize,
    max_ram_percent: u8,
    scratch_dir: PathBuf,
    posting_class: PostingClass,
    current: HashMap<String, PostingList>,
    block_paths: Vec<PathBuf>,
    block_count: u32,
    memory_gauge: Arc<AtomicU8>,
    sampler_stop: Arc<AtomicBool>,
    sampler: Option<JoinHandle<()>>,
}

impl SpimiIndexer {
    pub fn new(
        scratch_dir: impl AsRef<Path>,
        max_block_size: usize,
        max_ram_percent: u8,
        posting_class: PostingClass,
    ) -> Result<Self> {
        let scratch_dir = scratch_dir.as_ref().to_path_buf();
        fs::create_dir_all(&scratch_dir)?;

        let memory_gauge = Arc::new(AtomicU8::new(0));
        let sampler_stop = Arc::new(AtomicBool::new(false));
        let sampler = spawn_memory_sampler(Arc::clone(&memory_gauge), Arc::clone(&sampler_stop));

        Ok(SpimiIndexer {
            max_block_size,
            max_ram_percent,
            scratch_dir,
            posting_class,
            current: HashMap::new(),
            block_paths: Vec::new(),
            block_count: 0,
            memory_gauge,
            sampler_stop,
            sampler: Some(sampler),
        })
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn term_count(&self) -> usize {
        self.current.len()
    }

    pub fn add_document(&mut self, ranker: &mut dyn Ranker, doc_id: u32, tokens: &[String]) -> Result<()> {
        ranker.before_add_tokens(doc_id, tokens);
        for (i, token) in tokens.iter().enumerate() {
            let entry = self
                .current
                .entry(token.clone())
                .or_insert_with(|| PostingList::empty(self.posting_class));
            let position = match self.posting_class {
                PostingClass::Positional => Some(i as u32),
                _ => None,
            };
            entry.add(doc_id, position);
        }
        ranker.after_add_tokens(doc_id, tokens);

        if self.should_spill() {
            self.spill(ranker)?;
        }
        Ok(())
    }

    fn should_spill(&self) -> bool {
        if self.current.is_empty() {
            return false;
        }
        self.current.len() >= self.max_block_size
            || self.memory_gauge.load(Ordering::Relaxed) >= self.max_ram_percent
    }

    fn spill(&mut self, ranker: &dyn Ranker) -> Result<()> {
        let path = self.scratch_dir.join(format!("block-{:06}.spimi", self.block_count));
        log::info!(
            "spilling block {} ({} terms) to {}",
            self.block_count,
            self.current.len(),
            path.display()
        );
        let mut writer = BufWriter::new(File::create(&path)?);
        let mut terms: Vec<&String> = self.current.keys().collect();
        terms.sort();
        for term in terms {
            let postings = &self.current[term];
            writeln!(writer, "{term} {}", ranker.document_repr(term, postings))?;
        }
        writer.flush()?;
        self.block_paths.push(path);
        self.block_count += 1;
        self.current.clear();
        Ok(())
    }

    /// Flush any buffered documents, then merge every block into `output_path`
    /// (plus its `.tiny` sidecar), writing `extra_metadata` merged with the
    /// ranker's own metadata as the pre-header.
    pub fn finalize(
        mut self,
        ranker: &mut dyn Ranker,
        output_path: impl AsRef<Path>,
        total_docs: u32,
        mut extra_metadata: serde_json::Value,
    ) -> Result<()> {
        if !self.current.is_empty() {
            self.spill(ranker)?;
        }

        let output_path = output_path.as_ref();
        let tmp_output = output_path.with_extension("index.tmp");
        let tiny_path = tiny_sidecar_path(output_path);
        let tmp_tiny = tiny_path.with_extension("tiny.tmp");

        {
            let mut index_writer = BufWriter::new(File::create(&tmp_output)?);
            let mut tiny_writer = BufWriter::new(File::create(&tmp_tiny)?);

            if let Some(obj) = extra_metadata.as_object_mut() {
                for (k, v) in ranker.metadata().as_object().cloned().unwrap_or_default() {
                    obj.entry(k).or_insert(v);
                }
            }
            writeln!(index_writer, "{}", serde_json::to_string(&extra_metadata)?)?;

            self.merge_blocks(ranker, total_docs, &mut index_writer, &mut tiny_writer)?;

            writeln!(index_writer, "{}", serde_json::to_string(&ranker.pos_processing())?)?;
            index_writer.flush()?;
            tiny_writer.flush()?;
        }

        fs::rename(&tmp_output, output_path)?;
        fs::rename(&tmp_tiny, &tiny_path)?;

        for path in &self.block_paths {
            let _ = fs::remove_file(path);
        }
        self.block_paths.clear();

        Ok(())
    }

    fn merge_blocks(
        &self,
        ranker: &dyn Ranker,
        total_docs: u32,
        index_writer: &mut impl Write,
        tiny_writer: &mut impl Write,
    ) -> Result<()> {
        let mut readers: Vec<BufReader<File>> = self
            .block_paths
            .iter()
            .map(|p| Ok(BufReader::new(File::open(p)?)))
            .collect::<Result<_>>()?;

        let mut heap: BinaryHeap<Reverse<Node>> = BinaryHeap::new();
        for (idx, reader) in readers.iter_mut().enumerate() {
            if let Some((term, repr)) = read_block_line(reader)? {
                heap.push(Reverse(Node { term, repr, block_idx: idx }));
            }
        }

        while let Some(Reverse(min_node)) = heap.pop() {
            let term = min_node.term.clone();
            let mut group = vec![min_node];
            while let Some(Reverse(top)) = heap.peek() {
                if top.term == term {
                    let Reverse(popped) = heap.pop().unwrap();
                    group.push(popped);
                } else {
                    break;
                }
            }

            let mut postings = Vec::with_capacity(group.len());
            let mut block_indices = Vec::with_capacity(group.len());
            for node in &group {
                postings.push(PostingList::parse(self.posting_class, &node.repr)?);
                block_indices.push(node.block_idx);
            }
            let merged = PostingList::merge(postings);
            let tiny = ranker.merge_calculations(&term, &merged, total_docs);

            writeln!(index_writer, "{term} {}", ranker.term_repr(&term, &merged, tiny))?;
            if let Some(v) = tiny {
                if let Some(repr) = ranker.tiny_repr(Some(v)) {
                    writeln!(tiny_writer, "{term} {repr}")?;
                }
            }

            for idx in block_indices {
                if let Some((next_term, next_repr)) = read_block_line(&mut readers[idx])? {
                    heap.push(Reverse(Node { term: next_term, repr: next_repr, block_idx: idx }));
                }
            }
        }

        Ok(())
    }
}

impl Drop for SpimiIndexer {
    fn drop(&mut self) {
        self.sampler_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.sampler.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
struct Node {
    term: String,
    repr: String,
    block_idx: usize,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.term.cmp(&other.term)
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn read_block_line(reader: &mut BufReader<File>) -> Result<Option<(String, String)>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    let line = line.trim_end_matches(['\n', '\r']);
    let (term, repr) = line.split_once(' ').unwrap_or((line, ""));
    Ok(Some((term.to_string(), repr.to_string())))
}

/// Cooperative background sampler publishing system memory usage (as a
/// percentage) into `gauge` every 200ms. A single writer (this thread), a
/// single reader (the ingestion loop via a relaxed load) — no locking needed.
fn spawn_memory_sampler(gauge: Arc<AtomicU8>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut sys = System::new();
        while !stop.load(Ordering::Relaxed) {
            sys.refresh_memory();
            let total = sys.total_memory().max(1);
            let used = sys.used_memory();
            let percent = ((used as f64 / total as f64) * 100.0).min(255.0) as u8;
            gauge.store(percent, Ordering::Relaxed);
            std::thread::sleep(Duration::from_millis(200));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::NoOpRanker;
    use tempfile::TempDir;

    #[test]
    fn spills_every_document_equals_single_block_build() {
        let docs: Vec<(u32, Vec<String>)> = vec![
            (0, vec!["a".to_string(), "b".to_string()]),
            (1, vec!["b".to_string(), "c".to_string()]),
            (2, vec!["a".to_string(), "c".to_string()]),
        ];

        let run = |max_block_size: usize| -> String {
            let dir = TempDir::new().unwrap();
            let mut indexer =
                SpimiIndexer::new(dir.path(), max_block_size, 100, PostingClass::Boolean).unwrap();
            let mut ranker = NoOpRanker;
            for (doc_id, tokens) in &docs {
                indexer.add_document(&mut ranker, *doc_id, tokens).unwrap();
            }
            let output = dir.path().join("out.index");
            indexer
                .finalize(&mut ranker, &output, docs.len() as u32, serde_json::json!({}))
                .unwrap();
            fs::read_to_string(&output).unwrap()
        };

        assert_eq!(run(1), run(100));
    }

    #[test]
    fn merge_produces_one_line_per_distinct_term() {
        let dir = TempDir::new().unwrap();
        let mut indexer = SpimiIndexer::new(dir.path(), 2, 100, PostingClass::Boolean).unwrap();
        let mut ranker = NoOpRanker;
        let docs: Vec<(u32, Vec<String>)> = (0..10)
            .map(|i| (i, vec![format!("term{}", i % 4), "shared".to_string()]))
            .collect();
        for (doc_id, tokens) in &docs {
            indexer.add_document(&mut ranker, *doc_id, tokens).unwrap();
        }
        assert!(indexer.block_count() >= 5 || indexer.term_count() > 0);
        let output = dir.path().join("out.index");
        indexer.finalize(&mut ranker, &output, 10, serde_json::json!({})).unwrap();

        let body = fs::read_to_string(&output).unwrap();
        let body_lines: Vec<&str> = body.lines().skip(1).collect();
        let body_lines = &body_lines[..body_lines.len() - 1];
        assert_eq!(body_lines.len(), 5); // term0..term3 + shared
    }
}
