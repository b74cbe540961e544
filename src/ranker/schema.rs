use std::collections::HashMap;

use crate::error::{IrError, Result};

/// A SMART-style `ddd.qqq` weighting schema: three letters for the document
/// side (term-frequency transform, IDF variant, normalization), a `.`
/// separator, then three letters for the query side. Default `lnc.ltc`.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub doc_tf: char,
    pub doc_idf: char,
    pub doc_norm: char,
    pub query_tf: char,
    pub query_idf: char,
    pub query_norm: char,
}

impl Default for Schema {
    fn default() -> Self {
        Schema::parse("lnc.ltc").unwrap()
    }
}

impl Schema {
    pub fn parse(s: &str) -> Result<Schema> {
        let (doc, query) = s.split_once('.').ok_or_else(|| {
            IrError::Config(format!("schema {s:?} must be of the form ddd.qqq"))
        })?;
        let doc: Vec<char> = doc.chars().collect();
        let query: Vec<char> = query.chars().collect();
        if doc.len() != 3 || query.len() != 3 {
            return Err(IrError::Config(format!(
                "schema {s:?} must have exactly 3 letters on each side of the dot"
            )));
        }
        if !"nlb".contains(doc[0]) || !"ntp".contains(doc[1]) || !"nc".contains(doc[2]) {
            return Err(IrError::Config(format!("invalid document-side schema letters in {s:?}")));
        }
        if !"nlb".contains(query[0]) || !"ntp".contains(query[1]) || !"nc".contains(query[2]) {
            return Err(IrError::Config(format!("invalid query-side schema letters in {s:?}")));
        }
        Ok(Schema {
            doc_tf: doc[0],
            doc_idf: doc[1],
            doc_norm: doc[2],
            query_tf: query[0],
            query_idf: query[1],
            query_norm: query[2],
        })
    }

    pub fn to_string(&self) -> String {
        format!(
            "{}{}{}.{}{}{}",
            self.doc_tf, self.doc_idf, self.doc_norm, self.query_tf, self.query_idf, self.query_norm
        )
    }
}

/// TF transform: `n` raw count, `l` `1+log10(tf)` (0 if tf==0), `b` boolean presence.
pub fn tf_transform(letter: char, tf: f64) -> f64 {
    match letter {
        'n' => tf,
        'l' => {
            if tf > 0.0 {
                1.0 + tf.log10()
            } else {
                0.0
            }
        }
        'b' => {
            if tf > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        _ => tf,
    }
}

/// IDF transform: `n` none (1.0), `t` standard `log10(N/df)`, `p` probabilistic
/// `max(0, log10((N-df)/df))`. Base 10 throughout, matching the tiny-value
/// invariant fixed for the whole crate (the original source mixes `log` and
/// `log10` across files; this crate standardizes on `log10`).
pub fn idf_transform(letter: char, total_docs: f64, df: f64) -> f64 {
    match letter {
        'n' => 1.0,
        't' => (total_docs / df).log10(),
        'p' => ((total_docs - df) / df).log10().max(0.0),
        _ => 1.0,
    }
}

/// Normalization: `n` none, `c` cosine (divide every weight by the Euclidean
/// norm of the weight vector).
pub fn normalize(letter: char, weights: &mut HashMap<String, f64>) {
    if letter != 'c' {
        return;
    }
    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in weights.values_mut() {
            *w /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_is_lnc_ltc() {
        let schema = Schema::default();
        assert_eq!(schema.to_string(), "lnc.ltc");
    }

    #[test]
    fn rejects_malformed_schema() {
        assert!(Schema::parse("xyz").is_err());
        assert!(Schema::parse("lnc.lt").is_err());
        assert!(Schema::parse("zzz.ltc").is_err());
    }
}
