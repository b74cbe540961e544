/// Shared positional-proximity boost used by both optimized rankers.
///
/// For every ordered pair of distinct query tokens `(q_i, q_j)`, `i<j`, scores
/// how close their occurrences are in `doc_positions`, favoring distances that
/// match the query's own token spacing. Grounded on the distance formula in
/// `bm25_positional.py`/`td_idf_positional.py`.
pub fn compute_boost(
    query_tokens: &[String],
    doc_positions: &std::collections::HashMap<String, Vec<u32>>,
    max_distance: u32,
) -> f64 {
    let c = (max_distance as f64 * 1.5).log10();
    let mut raw = 0.0_f64;

    for i in 0..query_tokens.len() {
        for j in (i + 1)..query_tokens.len() {
            if query_tokens[i] == query_tokens[j] {
                continue;
            }
            let (Some(positions_i), Some(positions_j)) = (
                doc_positions.get(&query_tokens[i]),
                doc_positions.get(&query_tokens[j]),
            ) else {
                continue;
            };
            let query_distance = (j - i) as i64;
            for &p in positions_i {
                let mut best: Option<f64> = None;
                for &p2 in positions_j {
                    let actual = p2 as i64 - p as i64;
                    if actual.unsigned_abs() as u32 > max_distance {
                        continue;
                    }
                    let signed = actual.signum() * (query_distance - actual);
                    let score = if signed >= 0 {
                        -((signed as f64 + 1.0).log10()) + c
                    } else {
                        0.8 * (((-signed) as f64 + 1.0).log10() + c)
                    };
                    best = Some(best.map_or(score, |b: f64| b.max(score)));
                }
                if let Some(b) = best {
                    raw += b;
                }
            }
        }
    }

    if raw > 0.0 {
        raw.log10()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn adjacent_occurrence_scores_higher_than_distant() {
        let query = vec!["abbey".to_string(), "road".to_string(), "studios".to_string()];

        let mut adjacent = HashMap::new();
        adjacent.insert("abbey".to_string(), vec![0]);
        adjacent.insert("road".to_string(), vec![1]);
        adjacent.insert("studios".to_string(), vec![2]);

        let mut distant = HashMap::new();
        distant.insert("abbey".to_string(), vec![0]);
        distant.insert("road".to_string(), vec![50]);
        distant.insert("studios".to_string(), vec![100]);

        let adjacent_boost = compute_boost(&query, &adjacent, 10);
        let distant_boost = compute_boost(&query, &distant, 10);
        assert!(adjacent_boost > distant_boost);
    }

    #[test]
    fn no_overlap_scores_zero() {
        let query = vec!["a".to_string(), "b".to_string()];
        let positions = HashMap::new();
        assert_eq!(compute_boost(&query, &positions, 10), 0.0);
    }
}
