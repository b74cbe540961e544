use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::error::{IrError, Result};
use crate::index::InvertedIndex;
use crate::ranker::Ranker;
use crate::tokenizer::Tokenizer;

/// One labeled query from a relevance query file: `Q: <query text>` followed
/// by `doc_id<TAB>relevance` lines. Grounded on `efficiency.py`'s
/// `Efficiency` class.
pub struct LabeledQuery {
    pub text: String,
    pub relevant: HashMap<u32, f64>,
}

pub fn parse_query_file(path: &Path) -> Result<Vec<LabeledQuery>> {
    let contents = fs::read_to_string(path)?;
    let mut queries = Vec::new();
    let mut current: Option<LabeledQuery> = None;

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(text) = line.strip_prefix("Q:") {
            if let Some(q) = current.take() {
                queries.push(q);
            }
            current = Some(LabeledQuery { text: text.trim().to_string(), relevant: HashMap::new() });
        } else {
            let (doc_id, score) = line.split_once('\t').ok_or_else(|| IrError::Format {
                offset: lineno as u64,
                message: format!("expected 'doc_id<TAB>relevance', got {line:?}"),
            })?;
            let doc_id: u32 = doc_id.trim().parse().map_err(|_| IrError::Format {
                offset: lineno as u64,
                message: format!("expected integer doc id, got {doc_id:?}"),
            })?;
            let score: f64 = score.trim().parse().map_err(|_| IrError::Format {
                offset: lineno as u64,
                message: format!("expected numeric relevance, got {score:?}"),
            })?;
            let q = current.as_mut().ok_or_else(|| IrError::Format {
                offset: lineno as u64,
                message: "relevance line before any 'Q:' header".to_string(),
            })?;
            q.relevant.insert(doc_id, score);
        }
    }
    if let Some(q) = current.take() {
        queries.push(q);
    }
    Ok(queries)
}

#[derive(Debug, Default)]
pub struct QueryStats {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub ndcg: f64,
    pub latency_secs: f64,
}

#[derive(Debug, Default)]
pub struct EvaluationReport {
    pub per_query: Vec<QueryStats>,
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub mean_f1: f64,
    pub mean_ndcg: f64,
    pub throughput_qps: f64,
}

/// Runs every labeled query against `index`, scoring precision/recall/F1/NDCG
/// against its relevance judgements, and reports aggregate throughput.
pub fn evaluate(
    index: &mut InvertedIndex,
    ranker: &dyn Ranker,
    tokenizer: &Tokenizer,
    queries: &[LabeledQuery],
    n: usize,
) -> Result<EvaluationReport> {
    let mut report = EvaluationReport::default();
    let total_start = Instant::now();
    let mut total_results = 0usize;

    for query in queries {
        let tokens = tokenizer.tokenize(&query.text);
        let start = Instant::now();
        let results = index.search(&tokens, n, ranker)?;
        let latency = start.elapsed().as_secs_f64();
        total_results += results.len();

        let retrieved: Vec<u32> = results.iter().map(|(d, _)| *d).collect();
        let relevant_count = retrieved.iter().filter(|d| query.relevant.contains_key(d)).count();

        let precision = if retrieved.is_empty() {
            0.0
        } else {
            relevant_count as f64 / retrieved.len() as f64
        };
        let recall = if query.relevant.is_empty() {
            0.0
        } else {
            relevant_count as f64 / query.relevant.len() as f64
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let ndcg = compute_ndcg(&retrieved, &query.relevant);

        report.per_query.push(QueryStats { precision, recall, f1, ndcg, latency_secs: latency });
    }

    let total_elapsed = total_start.elapsed().as_secs_f64();
    let count = report.per_query.len().max(1) as f64;
    report.mean_precision = report.per_query.iter().map(|q| q.precision).sum::<f64>() / count;
    report.mean_recall = report.per_query.iter().map(|q| q.recall).sum::<f64>() / count;
    report.mean_f1 = report.per_query.iter().map(|q| q.f1).sum::<f64>() / count;
    report.mean_ndcg = report.per_query.iter().map(|q| q.ndcg).sum::<f64>() / count;
    report.throughput_qps = if total_elapsed > 0.0 {
        total_results as f64 / total_elapsed
    } else {
        0.0
    };

    Ok(report)
}

fn compute_ndcg(retrieved: &[u32], relevant: &HashMap<u32, f64>) -> f64 {
    let dcg: f64 = retrieved
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let rel = relevant.get(doc).copied().unwrap_or(0.0);
            rel / ((i as f64 + 2.0).log2())
        })
        .sum();

    let mut ideal_scores: Vec<f64> = relevant.values().copied().collect();
    ideal_scores.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let idcg: f64 = ideal_scores
        .iter()
        .enumerate()
        .map(|(i, rel)| rel / ((i as f64 + 2.0).log2()))
        .sum();

    if idcg > 0.0 {
        dcg / idcg
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_labeled_query_blocks() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Q: rock album").unwrap();
        writeln!(file, "1\t2").unwrap();
        writeln!(file, "2\t1").unwrap();
        writeln!(file, "Q: folk cd").unwrap();
        writeln!(file, "3\t1").unwrap();
        file.flush().unwrap();

        let queries = parse_query_file(file.path()).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].text, "rock album");
        assert_eq!(queries[0].relevant.get(&1), Some(&2.0));
    }

    #[test]
    fn ndcg_is_one_for_perfect_ranking() {
        let mut relevant = HashMap::new();
        relevant.insert(1, 3.0);
        relevant.insert(2, 2.0);
        relevant.insert(3, 1.0);
        let ndcg = compute_ndcg(&[1, 2, 3], &relevant);
        assert!((ndcg - 1.0).abs() < 1e-9);
    }
}
