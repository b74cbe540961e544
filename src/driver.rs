use std::path::{Path, PathBuf};

use crate::docmap::{DocMapReader, DocMapWriter};
use crate::error::{IrError, Result};
use crate::index::InvertedIndex;
use crate::ranker::Ranker;
use crate::record_parser::RecordParser;
use crate::spimi::SpimiIndexer;
use crate::tokenizer::Tokenizer;

/// Indexing driver: reads every input file through `parser`, tokenizes each
/// record's text, assigns dense internal ids in encounter order, writes the
/// doc-mapping file, and feeds the token stream to `indexer`. Grounded on
/// `original_source/src/main.py`'s argument shape and `searcher.py`'s
/// "translate internal id back through the mapping file" pattern.
pub fn build_index(
    inputs: &[PathBuf],
    parser: &RecordParser,
    tokenizer: &Tokenizer,
    mut indexer: SpimiIndexer,
    ranker: &mut dyn Ranker,
    output_path: &Path,
    doc_mapping_path: &Path,
    stop_words_path: Option<&Path>,
) -> Result<u32> {
    let mut doc_map = DocMapWriter::create(doc_mapping_path)?;
    let mut next_id: u32 = 0;

    for input in inputs {
        log::info!("parsing {}", input.display());
        let records = parser.parse_file(input)?;
        for (external_id, text) in records {
            let tokens = tokenizer.tokenize(&text);
            doc_map.write(next_id, &external_id)?;
            indexer.add_document(ranker, next_id, &tokens)?;
            next_id += 1;
        }
    }

    let total_docs = next_id;
    log::info!("merging {} block(s) across {} documents", indexer.block_count(), total_docs);

    let metadata = serde_json::json!({
        "min_token_length": tokenizer.min_token_length(),
        "language": tokenizer.language(),
        "stop_words": stop_words_path.map(|p| p.to_string_lossy().into_owned()),
        "doc_mapping": doc_mapping_path.to_string_lossy(),
        "total_documents": total_docs,
    });
    indexer.finalize(ranker, output_path, total_docs, metadata)?;

    Ok(total_docs)
}

/// Search driver: opens the index, rebuilds a ranker/tokenizer from its
/// metadata (so query-time tokenization matches the one used at index time),
/// tokenizes the query, searches, and translates internal ids back to
/// external ones through the same binary-search mechanism used for terms.
pub fn search_index(
    index_path: &Path,
    query_text: &str,
    n: usize,
    ranker: &mut dyn Ranker,
) -> Result<Vec<(String, f64)>> {
    let mut index = InvertedIndex::open(index_path)?;
    ranker.load_metadata(&index.metadata)?;

    let min_token_length = index.metadata.get("min_token_length").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
    let language = index.metadata.get("language").and_then(|v| v.as_str());
    let stop_words = index.metadata.get("stop_words").and_then(|v| v.as_str());
    let tokenizer = Tokenizer::new(min_token_length, stop_words.map(Path::new), language)?;

    let tokens = tokenizer.tokenize(query_text);
    let results = index.search(&tokens, n, ranker)?;

    let doc_mapping_path = index.doc_mapping_path().ok_or_else(|| {
        IrError::Config("index metadata is missing doc_mapping".to_string())
    })?;
    let mut doc_map = DocMapReader::open(&doc_mapping_path)?;

    let mut out = Vec::with_capacity(results.len());
    for (doc_id, score) in results {
        let external_id = doc_map.lookup(doc_id)?.ok_or_else(|| IrError::Format {
            offset: 0,
            message: format!("no doc-mapping entry for internal id {doc_id}"),
        })?;
        out.push((external_id, score));
    }
    Ok(out)
}
