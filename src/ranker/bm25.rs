use std::collections::HashMap;

use crate::error::Result;
use crate::posting::{PostingClass, PostingList};

use super::{document_repr_default, load_posting_list_default, round3, sort_scores, LoadedPosting, Ranker};

/// BM25 with the textbook per-document length normalization: `dl_d/avgdl` is
/// computed once, after the whole corpus is merged, and stored in the index
/// trailer keyed by document id (see `pos_processing`).
pub struct Bm25Ranker {
    pub k: f64,
    pub b: f64,
    documents_length: HashMap<u32, u32>,
    doc_length_normalization: HashMap<u32, f64>,
}

impl Default for Bm25Ranker {
    fn default() -> Self {
        Bm25Ranker {
            k: 1.2,
            b: 0.75,
            documents_length: HashMap::new(),
            doc_length_normalization: HashMap::new(),
        }
    }
}

impl Ranker for Bm25Ranker {
    fn name(&self) -> &'static str {
        "BM25"
    }

    fn posting_class(&self) -> PostingClass {
        PostingClass::Frequency
    }

    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "ranker": "BM25",
            "ranker_posting_class": "frequency",
            "k": self.k,
            "b": self.b,
        })
    }

    fn load_metadata(&mut self, metadata: &serde_json::Value) -> Result<()> {
        if let Some(ranker) = metadata.get("ranker").and_then(|v| v.as_str()) {
            if ranker != "BM25" {
                return Err(crate::error::IrError::Config(format!(
                    "index was built with ranker {ranker:?}, expected BM25"
                )));
            }
        }
        if let Some(k) = metadata.get("k").and_then(|v| v.as_f64()) {
            self.k = k;
        }
        if let Some(b) = metadata.get("b").and_then(|v| v.as_f64()) {
            self.b = b;
        }
        if let Some(table) = metadata
            .get("doc_length_normalization")
            .and_then(|v| v.as_object())
        {
            for (doc, v) in table {
                if let (Ok(doc_id), Some(v)) = (doc.parse::<u32>(), v.as_f64()) {
                    self.doc_length_normalization.insert(doc_id, v);
                }
            }
        }
        Ok(())
    }

    fn after_add_tokens(&mut self, doc_id: u32, tokens: &[String]) {
        self.documents_length.entry(doc_id).or_insert(tokens.len() as u32);
    }

    fn merge_calculations(&self, _term: &str, postings: &PostingList, total_docs: u32) -> Option<f64> {
        let df = postings.len().max(1) as f64;
        Some(round3((total_docs as f64 / df).log10()))
    }

    fn term_repr(&self, _term: &str, postings: &PostingList, tiny: Option<f64>) -> String {
        document_repr_default(postings, tiny)
    }

    fn document_repr(&self, _term: &str, postings: &PostingList) -> String {
        postings.format()
    }

    fn load_posting_list(&self, line: &str) -> Result<LoadedPosting> {
        load_posting_list_default(PostingClass::Frequency, line)
    }

    fn pos_processing(&self) -> serde_json::Value {
        if self.documents_length.is_empty() {
            return serde_json::json!({ "doc_length_normalization": {} });
        }
        let nonzero: Vec<f64> = self
            .documents_length
            .values()
            .filter(|&&l| l > 0)
            .map(|&l| l as f64)
            .collect();
        let avgdl = if nonzero.is_empty() {
            1.0
        } else {
            nonzero.iter().sum::<f64>() / nonzero.len() as f64
        };
        let table: serde_json::Map<String, serde_json::Value> = self
            .documents_length
            .iter()
            .map(|(doc, len)| {
                let ratio = if avgdl > 0.0 { *len as f64 / avgdl } else { 0.0 };
                (doc.to_string(), serde_json::json!(round3(ratio)))
            })
            .collect();
        serde_json::json!({ "doc_length_normalization": table })
    }

    fn order(
        &self,
        query_tokens: &[String],
        candidates: &HashMap<String, LoadedPosting>,
    ) -> Vec<(u32, f64)> {
        let mut scores: HashMap<u32, f64> = HashMap::new();
        for term in query_tokens {
            let Some(loaded) = candidates.get(term) else {
                continue;
            };
            let idf = loaded.tiny.unwrap_or(0.0);
            for doc in loaded.postings.documents() {
                let f = loaded.postings.frequency(doc) as f64;
                let dl_div_avgdl = *self.doc_length_normalization.get(&doc).unwrap_or(&1.0);
                let denom = f + self.k * (1.0 - self.b + self.b * dl_div_avgdl);
                let score = idf * (f * (self.k + 1.0)) / denom;
                *scores.entry(doc).or_insert(0.0) += score;
            }
        }
        sort_scores(scores.into_iter().collect())
    }
}

impl Bm25Ranker {
    pub fn with_params(k: f64, b: f64) -> Self {
        Bm25Ranker { k, b, ..Bm25Ranker::default() }
    }

    pub(crate) fn dl_div_avgdl(&self, doc: u32) -> f64 {
        *self.doc_length_normalization.get(&doc).unwrap_or(&1.0)
    }

    pub(crate) fn dl_div_avgdl_values(&self) -> &HashMap<u32, f64> {
        &self.doc_length_normalization
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_formula_matches_spec() {
        let ranker = Bm25Ranker::default();
        let mut postings = PostingList::empty(PostingClass::Frequency);
        postings.add(1, None);
        let idf = ranker.merge_calculations("term", &postings, 10).unwrap();
        assert_eq!(idf, round3((10.0_f64 / 1.0).log10()));
    }

    #[test]
    fn ranks_document_with_more_query_term_overlap_higher() {
        let mut ranker = Bm25Ranker::default();
        ranker.after_add_tokens(1, &vec!["rock".into(), "album".into()]);
        ranker.after_add_tokens(2, &vec!["greatest".into(), "rock".into(), "album".into()]);
        ranker.after_add_tokens(3, &vec!["folk".into(), "cd".into()]);

        let mut rock = PostingList::empty(PostingClass::Frequency);
        rock.add(1, None);
        rock.add(2, None);
        let mut album = PostingList::empty(PostingClass::Frequency);
        album.add(1, None);
        album.add(2, None);
        let mut greatest = PostingList::empty(PostingClass::Frequency);
        greatest.add(2, None);

        let mut candidates = HashMap::new();
        candidates.insert(
            "rock".to_string(),
            LoadedPosting { postings: rock.clone(), tiny: ranker.merge_calculations("rock", &rock, 3), doc_weights: None },
        );
        candidates.insert(
            "album".to_string(),
            LoadedPosting { postings: album.clone(), tiny: ranker.merge_calculations("album", &album, 3), doc_weights: None },
        );
        candidates.insert(
            "greatest".to_string(),
            LoadedPosting { postings: greatest.clone(), tiny: ranker.merge_calculations("greatest", &greatest, 3), doc_weights: None },
        );

        let results = ranker.order(
            &["greatest".to_string(), "rock".to_string(), "album".to_string()],
            &candidates,
        );
        assert_eq!(results[0].0, 2);
    }
}
