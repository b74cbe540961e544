mod bm25;
mod noop;
mod positional;
mod proximity;
pub mod schema;
mod tf_idf;

pub use bm25::Bm25Ranker;
pub use noop::NoOpRanker;
pub use positional::{Bm25OptimizedRanker, TfIdfOptimizedRanker};
pub use tf_idf::TfIdfRanker;

use std::collections::HashMap;

use crate::error::{IrError, Result};
use crate::posting::{PostingClass, PostingList};

/// A posting list as loaded from disk, paired with its tiny (per-term) value.
///
/// `doc_weights` carries a ranker-specific per-document weight parsed out of
/// the body line (e.g. TF-IDF's `doc-freq/weight` form); rankers that don't
/// embed one leave it `None` and derive everything from `postings`.
#[derive(Debug, Clone)]
pub struct LoadedPosting {
    pub postings: PostingList,
    pub tiny: Option<f64>,
    pub doc_weights: Option<HashMap<u32, f64>>,
}

/// Scoring strategy, consulted at indexing time, merge time, and query time.
///
/// Default method bodies make this the "no-op" baseline described in the
/// distilled spec: a ranker that implements none of the hooks scores every
/// candidate document 0 and returns them in arbitrary (but still
/// doc-id-ordered) order.
pub trait Ranker {
    fn name(&self) -> &'static str;

    fn posting_class(&self) -> PostingClass {
        PostingClass::Frequency
    }

    /// Serialize ranker configuration into the index pre-header.
    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({ "ranker": self.name() })
    }

    /// Validate and absorb a pre-header's metadata (e.g. k/b, schema) when
    /// opening an existing index for search.
    fn load_metadata(&mut self, metadata: &serde_json::Value) -> Result<()> {
        let ranker = metadata.get("ranker").and_then(|v| v.as_str());
        if ranker != Some(self.name()) {
            return Err(IrError::Config(format!(
                "index was built with ranker {:?}, expected {}",
                ranker,
                self.name()
            )));
        }
        Ok(())
    }

    /// Called once per document before its tokens are added to the in-memory
    /// dictionary.
    fn before_add_tokens(&mut self, _doc_id: u32, _tokens: &[String]) {}

    /// Called once per document after its tokens are added. Typical uses:
    /// record document length, precompute per-document tf weights.
    fn after_add_tokens(&mut self, _doc_id: u32, _tokens: &[String]) {}

    /// Called once per term after all contributing blocks have been merged.
    /// Returns the tiny (per-term) value to persist, e.g. IDF.
    fn merge_calculations(&self, _term: &str, _postings: &PostingList, _total_docs: u32) -> Option<f64> {
        None
    }

    /// Render the final index body line for a term (without the term prefix).
    fn term_repr(&self, _term: &str, postings: &PostingList, tiny: Option<f64>) -> String {
        document_repr_default(postings, tiny)
    }

    /// Render a document-level (block-file) body line for a term.
    fn document_repr(&self, _term: &str, postings: &PostingList) -> String {
        postings.format()
    }

    /// Render the tiny sidecar value for a term, if any.
    fn tiny_repr(&self, tiny: Option<f64>) -> Option<String> {
        tiny.map(|v| format!("{v}"))
    }

    /// Parse a final-index body line (as produced by `term_repr`) back into a
    /// posting list plus its tiny value, if embedded.
    fn load_posting_list(&self, line: &str) -> Result<LoadedPosting> {
        load_posting_list_default(self.posting_class(), line)
    }

    /// Post-processing metadata computed once, after the whole corpus has
    /// been merged (e.g. document length normalization table). Written as the
    /// index trailer.
    fn pos_processing(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Score every candidate document for `query_tokens` given their loaded
    /// posting lists. Returns (doc_id, score) pairs; callers sort by score
    /// descending, doc id ascending as a tiebreak.
    fn order(
        &self,
        _query_tokens: &[String],
        candidates: &HashMap<String, LoadedPosting>,
    ) -> Vec<(u32, f64)> {
        let mut docs = std::collections::BTreeSet::new();
        for loaded in candidates.values() {
            for d in loaded.postings.documents() {
                docs.insert(d);
            }
        }
        docs.into_iter().map(|d| (d, 0.0)).collect()
    }
}

pub(crate) fn document_repr_default(postings: &PostingList, tiny: Option<f64>) -> String {
    match tiny {
        Some(v) => format!("{}#{}", postings.format(), v),
        None => postings.format(),
    }
}

pub(crate) fn load_posting_list_default(class: PostingClass, line: &str) -> Result<LoadedPosting> {
    let (body, tiny) = match line.split_once('#') {
        Some((body, tiny)) => (body, Some(tiny.parse().map_err(|_| IrError::Format {
            offset: 0,
            message: format!("malformed tiny suffix: {tiny}"),
        })?)),
        None => (line, None),
    };
    let postings = PostingList::parse(class, body)?;
    Ok(LoadedPosting { postings, tiny, doc_weights: None })
}

/// Round to 3 decimal places, matching the fixed rounding the on-disk format
/// relies on for byte-identical rebuilds.
pub(crate) fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

pub(crate) fn sort_scores(mut scores: Vec<(u32, f64)>) -> Vec<(u32, f64)> {
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
    scores
}

/// Instantiate a ranker by the name recorded in index metadata.
pub fn ranker_factory(name: &str) -> Box<dyn Ranker> {
    match name {
        "TF_IDF" => Box::new(TfIdfRanker::default()),
        "BM25" => Box::new(Bm25Ranker::default()),
        "TF_IDF_OPTIMIZED" => Box::new(TfIdfOptimizedRanker::default()),
        "BM25_OPTIMIZED" => Box::new(Bm25OptimizedRanker::default()),
        _ => Box::new(NoOpRanker),
    }
}
