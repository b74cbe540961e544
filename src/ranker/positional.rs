use std::collections::HashMap;

use crate::error::Result;
use crate::posting::{PostingClass, PostingList};

use super::bm25::Bm25Ranker;
use super::proximity::compute_boost;
use super::schema::{idf_transform, normalize, tf_transform};
use super::tf_idf::TfIdfRanker;
use super::{round3, sort_scores, LoadedPosting, Ranker};

/// BM25 over positional postings, with a proximity boost added on top of the
/// base BM25 score. Wraps [`Bm25Ranker`] by composition rather than
/// inheritance: the base score, IDF, and length normalization are delegated,
/// only the posting class, representation, and final combination differ.
pub struct Bm25OptimizedRanker {
    base: Bm25Ranker,
    pub boost_weight: f64,
    pub max_distance: u32,
}

impl Default for Bm25OptimizedRanker {
    fn default() -> Self {
        Bm25OptimizedRanker {
            base: Bm25Ranker::default(),
            boost_weight: 0.01,
            max_distance: 10,
        }
    }
}

impl Bm25OptimizedRanker {
    /// Override the wrapped BM25's `k`/`b` parameters, e.g. from CLI flags
    /// supplied before any index metadata exists to load them back from.
    pub fn set_bm25_params(&mut self, k: f64, b: f64) {
        self.base.k = k;
        self.base.b = b;
    }
}

impl Ranker for Bm25OptimizedRanker {
    fn name(&self) -> &'static str {
        "BM25_OPTIMIZED"
    }

    fn posting_class(&self) -> PostingClass {
        PostingClass::Positional
    }

    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "ranker": "BM25_OPTIMIZED",
            "ranker_posting_class": "positional",
            "k": self.base.k,
            "b": self.base.b,
            "boost_weight": self.boost_weight,
            "max_distance": self.max_distance,
        })
    }

    fn load_metadata(&mut self, metadata: &serde_json::Value) -> Result<()> {
        if let Some(w) = metadata.get("boost_weight").and_then(|v| v.as_f64()) {
            self.boost_weight = w;
        }
        if let Some(d) = metadata.get("max_distance").and_then(|v| v.as_u64()) {
            self.max_distance = d as u32;
        }
        self.base.load_metadata(metadata)
    }

    fn before_add_tokens(&mut self, doc_id: u32, tokens: &[String]) {
        self.base.before_add_tokens(doc_id, tokens);
    }

    fn after_add_tokens(&mut self, doc_id: u32, tokens: &[String]) {
        self.base.after_add_tokens(doc_id, tokens);
    }

    fn merge_calculations(&self, term: &str, postings: &PostingList, total_docs: u32) -> Option<f64> {
        self.base.merge_calculations(term, postings, total_docs)
    }

    fn term_repr(&self, _term: &str, postings: &PostingList, tiny: Option<f64>) -> String {
        match tiny {
            Some(v) => format!("{}#{}", postings.format(), v),
            None => postings.format(),
        }
    }

    fn document_repr(&self, _term: &str, postings: &PostingList) -> String {
        postings.format()
    }

    fn load_posting_list(&self, line: &str) -> Result<LoadedPosting> {
        super::load_posting_list_default(PostingClass::Positional, line)
    }

    fn pos_processing(&self) -> serde_json::Value {
        self.base.pos_processing()
    }

    fn order(
        &self,
        query_tokens: &[String],
        candidates: &HashMap<String, LoadedPosting>,
    ) -> Vec<(u32, f64)> {
        let base_scores = self.base.order(query_tokens, candidates);

        let (min_norm, max_norm) = min_max(self.base.dl_div_avgdl_values());

        let mut final_scores = Vec::with_capacity(base_scores.len());
        for (doc, bm25_score) in base_scores {
            let mut doc_positions: HashMap<String, Vec<u32>> = HashMap::new();
            for term in query_tokens {
                if let Some(loaded) = candidates.get(term) {
                    let positions = loaded.postings.positions(doc);
                    if !positions.is_empty() {
                        doc_positions
                            .entry(term.clone())
                            .or_default()
                            .extend_from_slice(positions);
                    }
                }
            }
            let boost = compute_boost(query_tokens, &doc_positions, self.max_distance);
            let ratio = self.base.dl_div_avgdl(doc);
            let length_normalization = if max_norm > min_norm {
                (((ratio - min_norm) / (max_norm - min_norm)) + 1.0).log2()
            } else {
                1.0
            };
            let length_normalization = if length_normalization.abs() < f64::EPSILON {
                1.0
            } else {
                length_normalization
            };
            let score = bm25_score + self.boost_weight * boost / length_normalization;
            final_scores.push((doc, score));
        }
        sort_scores(final_scores)
    }
}

/// TF-IDF over positional postings with the same proximity boost, combined
/// via linear interpolation rather than BM25's additive form.
pub struct TfIdfOptimizedRanker {
    base: TfIdfRanker,
    pub boost_weight: f64,
    pub max_distance: u32,
}

impl Default for TfIdfOptimizedRanker {
    fn default() -> Self {
        TfIdfOptimizedRanker {
            base: TfIdfRanker::default(),
            boost_weight: 0.1,
            max_distance: 10,
        }
    }
}

impl Ranker for TfIdfOptimizedRanker {
    fn name(&self) -> &'static str {
        "TF_IDF_OPTIMIZED"
    }

    fn posting_class(&self) -> PostingClass {
        PostingClass::Positional
    }

    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "ranker": "TF_IDF_OPTIMIZED",
            "ranker_posting_class": "positional",
            "ranker_schema": self.base.schema.to_string(),
            "boost_weight": self.boost_weight,
            "max_distance": self.max_distance,
        })
    }

    fn load_metadata(&mut self, metadata: &serde_json::Value) -> Result<()> {
        if let Some(w) = metadata.get("boost_weight").and_then(|v| v.as_f64()) {
            self.boost_weight = w;
        }
        if let Some(d) = metadata.get("max_distance").and_then(|v| v.as_u64()) {
            self.max_distance = d as u32;
        }
        self.base.load_metadata(metadata)
    }

    fn before_add_tokens(&mut self, doc_id: u32, tokens: &[String]) {
        self.base.before_add_tokens(doc_id, tokens);
    }

    fn after_add_tokens(&mut self, doc_id: u32, tokens: &[String]) {
        self.base.after_add_tokens(doc_id, tokens);
    }

    fn merge_calculations(&self, term: &str, postings: &PostingList, total_docs: u32) -> Option<f64> {
        self.base.merge_calculations(term, postings, total_docs)
    }

    /// The final index line embeds each document's precomputed weight
    /// alongside its positions; block files (see `document_repr`) don't carry
    /// this, since it's re-derived from the base ranker's `doc_weight` at
    /// merge time anyway.
    fn term_repr(&self, term: &str, postings: &PostingList, tiny: Option<f64>) -> String {
        let body = postings
            .documents()
            .into_iter()
            .map(|doc| {
                let positions = postings
                    .positions(doc)
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let weight = self.base.doc_weight(doc, term).unwrap_or(0.0);
                format!("{doc}:{positions}/{}", round3(weight))
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
            Some((body, tiny)) => (
                body,
                Some(tiny.parse().map_err(|_| crate::error::IrError::Format {
                    offset: 0,
                    message: format!("malformed tiny suffix: {tiny}"),
                })?),
            ),
            None => (line, None),
        };
        let mut positions = std::collections::BTreeMap::new();
        let mut weights = HashMap::new();
        for tok in body.split_whitespace() {
            let (doc_positions, weight) =
                tok.split_once('/').ok_or_else(|| crate::error::IrError::Format {
                    offset: 0,
                    message: format!("malformed positional tf-idf entry: {tok}"),
                })?;
            let (doc, ps) =
                doc_positions
                    .split_once(':')
                    .ok_or_else(|| crate::error::IrError::Format {
                        offset: 0,
                        message: format!("malformed positional tf-idf entry: {tok}"),
                    })?;
            let doc_id: u32 = doc.parse().map_err(|_| crate::error::IrError::Format {
                offset: 0,
                message: format!("expected integer doc id, got {doc:?}"),
            })?;
            let mut pv = Vec::new();
            for p in ps.split(',') {
                pv.push(p.parse().map_err(|_| crate::error::IrError::Format {
                    offset: 0,
                    message: format!("expected integer position, got {p:?}"),
                })?);
            }
            positions.insert(doc_id, pv);
            let weight: f64 = weight.parse().map_err(|_| crate::error::IrError::Format {
                offset: 0,
                message: format!("expected float weight, got {weight:?}"),
            })?;
            weights.insert(doc_id, weight);
        }
        Ok(LoadedPosting {
            postings: PostingList::Positional(positions),
            tiny,
            doc_weights: Some(weights),
        })
    }

    fn pos_processing(&self) -> serde_json::Value {
        self.base.pos_processing()
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
            let idf = idf_transform(self.base.schema.query_idf, self.base.total_docs().max(1) as f64, df);
            query_weights.insert(term.clone(), tf_transform(self.base.schema.query_tf, *tf) * idf);
        }
        normalize(self.base.schema.query_norm, &mut query_weights);

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
                    .unwrap_or(0.0);
                *scores.entry(doc).or_insert(0.0) += qw * lnc;
            }
        }

        let mut final_scores = Vec::with_capacity(scores.len());
        for (doc, tfidf) in scores {
            let mut doc_positions: HashMap<String, Vec<u32>> = HashMap::new();
            for term in query_tokens {
                if let Some(loaded) = candidates.get(term) {
                    let positions = loaded.postings.positions(doc);
                    if !positions.is_empty() {
                        doc_positions
                            .entry(term.clone())
                            .or_default()
                            .extend_from_slice(positions);
                    }
                }
            }
            let boost = compute_boost(query_tokens, &doc_positions, self.max_distance);
            let score = (1.0 - self.boost_weight) * tfidf + self.boost_weight * boost;
            final_scores.push((doc, score));
        }
        sort_scores(final_scores)
    }
}

fn min_max(values: &HashMap<u32, f64>) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values.values() {
        min = min.min(v);
        max = max.max(v);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_positions_outrank_distant_ones() {
        let mut ranker = Bm25OptimizedRanker::default();
        ranker.before_add_tokens(1, &[]);
        ranker.after_add_tokens(1, &vec!["abbey".into(), "road".into(), "studios".into()]);
        ranker.after_add_tokens(2, &vec![
            "abbey".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "x".into(),
            "x".into(), "x".into(), "x".into(), "x".into(), "road".into(),
            "studios".into(),
        ]);

        let mut abbey = PostingList::empty(PostingClass::Positional);
        abbey.add(1, Some(0));
        abbey.add(2, Some(0));
        let mut road = PostingList::empty(PostingClass::Positional);
        road.add(1, Some(1));
        road.add(2, Some(50));
        let mut studios = PostingList::empty(PostingClass::Positional);
        studios.add(1, Some(2));
        studios.add(2, Some(51));

        let mut candidates = HashMap::new();
        for (term, postings) in [
            ("abbey".to_string(), abbey.clone()),
            ("road".to_string(), road.clone()),
            ("studios".to_string(), studios.clone()),
        ] {
            let tiny = ranker.merge_calculations(&term, &postings, 2);
            candidates.insert(term, LoadedPosting { postings, tiny, doc_weights: None });
        }

        let results = ranker.order(
            &["abbey".to_string(), "road".to_string(), "studios".to_string()],
            &candidates,
        );
        let doc1_score = results.iter().find(|(d, _)| *d == 1).unwrap().1;
        let doc2_score = results.iter().find(|(d, _)| *d == 2).unwrap().1;
        assert!(doc1_score > doc2_score);
    }
}
