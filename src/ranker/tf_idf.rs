use std::collections::HashMap;

use crate::error::{IrError, Result};
use crate::posting::{PostingClass, PostingList};

use super::schema::{idf_transform, normalize, tf_transform, Schema};
use super::{load_posting_list_default, round3, sort_scores, LoadedPosting, Ranker};

/// SMART-schema TF-IDF. Document-side weights (`lnc` by default: log tf,
/// cosine-normalized, no per-document idf) are precomputed as each document is
/// ingested; query-side weights (`ltc` by default) are computed at query time
/// against the schema's query letters.
pub struct TfIdfRanker {
    pub schema: Schema,
    total_docs: u32,
    doc_weights: HashMap<u32, HashMap<String, f64>>,
}

impl Default for TfIdfRanker {
    fn default() -> Self {
        TfIdfRanker {
            schema: Schema::default(),
            total_docs: 0,
            doc_weights: HashMap::new(),
        }
    }
}

impl Ranker for TfIdfRanker {
    fn name(&self) -> &'static str {
        "TF_IDF"
    }

    fn posting_class(&self) -> PostingClass {
        PostingClass::Frequency
    }

    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "ranker": "TF_IDF",
            "ranker_posting_class": "frequency",
            "ranker_schema": self.schema.to_string(),
        })
    }

    fn load_metadata(&mut self, metadata: &serde_json::Value) -> Result<()> {
        if let Some(ranker) = metadata.get("ranker").and_then(|v| v.as_str()) {
            if ranker != "TF_IDF" {
                return Err(IrError::Config(format!(
                    "index was built with ranker {ranker:?}, expected TF_IDF"
                )));
            }
        }
        if let Some(schema) = metadata.get("ranker_schema").and_then(|v| v.as_str()) {
            self.schema = Schema::parse(schema)?;
        }
        if let Some(n) = metadata.get("total_documents").and_then(|v| v.as_u64()) {
            self.total_docs = n as u32;
        }
        Ok(())
    }

    fn after_add_tokens(&mut self, doc_id: u32, tokens: &[String]) {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for t in tokens {
            *counts.entry(t.clone()).or_insert(0.0) += 1.0;
        }
        let mut weights: HashMap<String, f64> = counts
            .into_iter()
            .map(|(term, tf)| (term, tf_transform(self.schema.doc_tf, tf)))
            .collect();
        normalize(self.schema.doc_norm, &mut weights);
        self.doc_weights.insert(doc_id, weights);
    }

    fn merge_calculations(&self, _term: &str, postings: &PostingList, total_docs: u32) -> Option<f64> {
        let df = postings.len().max(1) as f64;
        Some(round3(idf_transform('t', total_docs as f64, df)))
    }

    /// The final index line embeds each document's precomputed weight
    /// alongside its frequency; block files (see `document_repr`) don't carry
    /// this, since it's re-derived from `doc_weights` at merge time anyway.
    fn term_repr(&self, term: &str, postings: &PostingList, tiny: Option<f64>) -> String {
        let body = postings
            .documents()
            .into_iter()
            .map(|doc| {
                let freq = postings.frequency(doc);
                let weight = self
                    .doc_weights
                    .get(&doc)
                    .and_then(|w| w.get(term))
                    .copied()
                    .unwrap_or(0.0);
                format!("{doc}-{freq}/{}", round3(weight))
            })
            .collect::<Vec<_>>()
            .join(" ");
        match tiny {
            Some(v) => format!("{body}#{v}"),
            None => body,
        }
    }

    fn load_posting_list(&self, line: &str) -> Result<LoadedPosting> {
        let (body, tiny) = match line.split_once('#') {
            Some((body, tiny)) => (body, Some(tiny.parse().map_err(|_| IrError::Format {
                offset: 0,
                message: format!("malformed tiny suffix: {tiny}"),
            })?)),
            None => (line, None),
        };
        let mut postings = PostingList::empty(PostingClass::Frequency);
        let mut weights = HashMap::new();
        for tok in body.split_whitespace() {
            let (doc_freq, weight) = tok.split_once('/').ok_or_else(|| IrError::Format {
                offset: 0,
                message: format!("malformed tf-idf posting entry: {tok}"),
            })?;
            let (doc, freq) = doc_freq.split_once('-').ok_or_else(|| IrError::Format {
                offset: 0,
                message: format!("malformed tf-idf posting entry: {tok}"),
            })?;
            let doc_id: u32 = doc.parse().map_err(|_| IrError::Format {
                offset: 0,
                message: format!("expected integer doc id, got {doc:?}"),
            })?;
            let freq: u32 = freq.parse().map_err(|_| IrError::Format {
                offset: 0,
                message: format!("expected integer frequency, got {freq:?}"),
            })?;
            let weight: f64 = weight.parse().map_err(|_| IrError::Format {
                offset: 0,
                message: format!("expected float weight, got {weight:?}"),
            })?;
            if let PostingList::Frequency(map) = &mut postings {
                map.insert(doc_id, freq);
            }
            weights.insert(doc_id, weight);
        }
        let _ = load_posting_list_default; // keep helper linked for sibling rankers
        Ok(LoadedPosting { postings, tiny, doc_weights: Some(weights) })
    }

    fn pos_processing(&self) -> serde_json::Value {
        serde_json::json!({ "total_documents": self.doc_weights.len() as u32 })
    }

    fn order(
        &self,
        query_tokens: &[String],
        candidates: &HashMap<String, LoadedPosting>,
    ) -> Vec<(u32, f64)> {
        let mut query_counts: HashMap<String, f64> = HashMap::new();
        for t in query_tokens {
            *query_counts.entry(t.clone()).or_insert(0.0) += 1.0;
        }
        let mut query_weights: HashMap<String, f64> = HashMap::new();
        for (term, tf) in &query_counts {
            let Some(loaded) = candidates.get(term) else {
                continue;
            };
            let df = loaded.postings.len().max(1) as f64;
            let idf = idf_transform(self.schema.query_idf, self.total_docs.max(1) as f64, df);
            let w = tf_transform(self.schema.query_tf, *tf) * idf;
            query_weights.insert(term.clone(), w);
        }
        normalize(self.schema.query_norm, &mut query_weights);

        let mut scores: HashMap<u32, f64> = HashMap::new();
        for (term, qw) in &query_weights {
            let Some(loaded) = candidates.get(term) else {
                continue;
            };
            for doc in loaded.postings.documents() {
                let lnc = loaded
                    .doc_weights
                    .as_ref()
                    .and_then(|w| w.get(&doc))
                    .copied()
                    .or_else(|| self.doc_weights.get(&doc).and_then(|w| w.get(term)).copied())
                    .unwrap_or(0.0);
                *scores.entry(doc).or_insert(0.0) += qw * lnc;
            }
        }
        sort_scores(scores.into_iter().collect())
    }
}

impl TfIdfRanker {
    pub(crate) fn total_docs(&self) -> u32 {
        self.total_docs
    }

    pub(crate) fn doc_weight(&self, doc: u32, term: &str) -> Option<f64> {
        self.doc_weights.get(&doc).and_then(|w| w.get(term)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_document_with_repeated_query_terms_higher() {
        let mut ranker = TfIdfRanker::default();
        ranker.total_docs = 3;
        ranker.after_add_tokens(1, &vec!["good".into(), "games".into(), "for".into(), "kids".into()]);
        ranker.after_add_tokens(2, &vec!["good".into(), "old".into(), "games".into(), "games".into()]);
        ranker.after_add_tokens(3, &vec!["haha".into(), "lols".into(), "are".into(), "funny".into()]);

        let mut good = PostingList::empty(PostingClass::Frequency);
        good.add(1, None);
        good.add(2, None);
        let mut games = PostingList::empty(PostingClass::Frequency);
        games.add(1, None);
        games.add(2, None);
        games.add(2, None);
        let mut old = PostingList::empty(PostingClass::Frequency);
        old.add(2, None);

        let mut candidates = HashMap::new();
        for (term, postings) in [
            ("good".to_string(), good.clone()),
            ("games".to_string(), games.clone()),
            ("old".to_string(), old.clone()),
        ] {
            let tiny = ranker.merge_calculations(&term, &postings, 3);
            candidates.insert(term, LoadedPosting { postings, tiny, doc_weights: None });
        }

        let results = ranker.order(
            &["good".to_string(), "old".to_string(), "games".to_string(), "games".to_string()],
            &candidates,
        );
        assert_eq!(results[0].0, 2);
    }
}
