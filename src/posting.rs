use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{IrError, Result};

/// Which posting list variant a ranker requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingClass {
    Boolean,
    Frequency,
    Positional,
}

impl fmt::Display for PostingClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PostingClass::Boolean => "boolean",
            PostingClass::Frequency => "frequency",
            PostingClass::Positional => "positional",
        };
        write!(f, "{s}")
    }
}

/// A term's posting list, in one of three shapes. Document ids are kept in a
/// `BTreeMap`/`BTreeSet` so `documents()` is always ascending, which the merge
/// and scoring code relies on for deterministic tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingList {
    Boolean(BTreeSet<u32>),
    Frequency(BTreeMap<u32, u32>),
    Positional(BTreeMap<u32, Vec<u32>>),
}

impl PostingList {
    pub fn empty(class: PostingClass) -> Self {
        match class {
            PostingClass::Boolean => PostingList::Boolean(BTreeSet::new()),
            PostingClass::Frequency => PostingList::Frequency(BTreeMap::new()),
            PostingClass::Positional => PostingList::Positional(BTreeMap::new()),
        }
    }

    pub fn class(&self) -> PostingClass {
        match self {
            PostingList::Boolean(_) => PostingClass::Boolean,
            PostingList::Frequency(_) => PostingClass::Frequency,
            PostingList::Positional(_) => PostingClass::Positional,
        }
    }

    /// Record an occurrence of this term in `doc_id`. `position` is required
    /// for the positional variant and ignored otherwise.
    pub fn add(&mut self, doc_id: u32, position: Option<u32>) {
        match self {
            PostingList::Boolean(docs) => {
                docs.insert(doc_id);
            }
            PostingList::Frequency(freqs) => {
                *freqs.entry(doc_id).or_insert(0) += 1;
            }
            PostingList::Positional(positions) => {
                let pos = position.expect("positional posting list requires a position");
                positions.entry(doc_id).or_default().push(pos);
            }
        }
    }

    pub fn documents(&self) -> Vec<u32> {
        match self {
            PostingList::Boolean(docs) => docs.iter().copied().collect(),
            PostingList::Frequency(freqs) => freqs.keys().copied().collect(),
            PostingList::Positional(positions) => positions.keys().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PostingList::Boolean(docs) => docs.len(),
            PostingList::Frequency(freqs) => freqs.len(),
            PostingList::Positional(positions) => positions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frequency(&self, doc_id: u32) -> u32 {
        match self {
            PostingList::Boolean(docs) => docs.contains(&doc_id) as u32,
            PostingList::Frequency(freqs) => *freqs.get(&doc_id).unwrap_or(&0),
            PostingList::Positional(positions) => {
                positions.get(&doc_id).map_or(0, |p| p.len() as u32)
            }
        }
    }

    pub fn positions(&self, doc_id: u32) -> &[u32] {
        match self {
            PostingList::Positional(positions) => {
                positions.get(&doc_id).map_or(&[], |p| p.as_slice())
            }
            _ => &[],
        }
    }

    /// Fold `others` into the largest list among `lists` (by document count),
    /// returning the fused accumulator. Associative and commutative over the
    /// set of contributing lists.
    pub fn merge(lists: Vec<PostingList>) -> PostingList {
        let mut lists = lists;
        assert!(!lists.is_empty(), "merge requires at least one posting list");
        let biggest = (0..lists.len())
            .max_by_key(|&i| lists[i].len())
            .expect("non-empty");
        let mut acc = lists.swap_remove(biggest);
        for other in lists {
            acc.fold_in(other);
        }
        acc
    }

    fn fold_in(&mut self, other: PostingList) {
        match (self, other) {
            (PostingList::Boolean(acc), PostingList::Boolean(other)) => acc.extend(other),
            (PostingList::Frequency(acc), PostingList::Frequency(other)) => {
                for (doc, freq) in other {
                    *acc.entry(doc).or_insert(0) += freq;
                }
            }
            (PostingList::Positional(acc), PostingList::Positional(other)) => {
                for (doc, mut positions) in other {
                    acc.entry(doc).or_default().append(&mut positions);
                }
            }
            _ => panic!("cannot merge posting lists of different classes"),
        }
    }

    /// Parse the default on-disk representation for `class`. Rankers with a
    /// custom body format implement their own parsing instead of calling this.
    pub fn parse(class: PostingClass, text: &str) -> Result<PostingList> {
        match class {
            PostingClass::Boolean => {
                let mut docs = BTreeSet::new();
                for tok in text.split_whitespace() {
                    docs.insert(parse_doc_id(tok)?);
                }
                Ok(PostingList::Boolean(docs))
            }
            PostingClass::Frequency => {
                let mut freqs = BTreeMap::new();
                for tok in text.split_whitespace() {
                    let (doc, freq) = tok.split_once('-').ok_or_else(|| IrError::Format {
                        offset: 0,
                        message: format!("malformed frequency posting entry: {tok}"),
                    })?;
                    freqs.insert(parse_doc_id(doc)?, parse_u32(freq)?);
                }
                Ok(PostingList::Frequency(freqs))
            }
            PostingClass::Positional => {
                let mut positions = BTreeMap::new();
                for tok in text.split_whitespace() {
                    let (doc, rest) = tok.split_once(':').ok_or_else(|| IrError::Format {
                        offset: 0,
                        message: format!("malformed positional posting entry: {tok}"),
                    })?;
                    let doc_id = parse_doc_id(doc)?;
                    let mut ps = Vec::new();
                    for p in rest.split(',') {
                        ps.push(parse_u32(p)?);
                    }
                    positions.insert(doc_id, ps);
                }
                Ok(PostingList::Positional(positions))
            }
        }
    }

    /// Render the default on-disk representation. Rankers may override this
    /// with their own `document_repr`/`term_repr` formats instead.
    pub fn format(&self) -> String {
        match self {
            PostingList::Boolean(docs) => docs
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            PostingList::Frequency(freqs) => freqs
                .iter()
                .map(|(d, f)| format!("{d}-{f}"))
                .collect::<Vec<_>>()
                .join(" "),
            PostingList::Positional(positions) => positions
                .iter()
                .map(|(d, ps)| {
                    let ps = ps
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    format!("{d}:{ps}")
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn parse_doc_id(s: &str) -> Result<u32> {
    parse_u32(s)
}

fn parse_u32(s: &str) -> Result<u32> {
    s.parse().map_err(|_| IrError::Format {
        offset: 0,
        message: format!("expected integer, got {s:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_add_is_idempotent() {
        let mut p = PostingList::empty(PostingClass::Boolean);
        p.add(3, None);
        p.add(3, None);
        p.add(1, None);
        assert_eq!(p.documents(), vec![1, 3]);
    }

    #[test]
    fn frequency_add_counts() {
        let mut p = PostingList::empty(PostingClass::Frequency);
        p.add(1, None);
        p.add(1, None);
        p.add(2, None);
        assert_eq!(p.frequency(1), 2);
        assert_eq!(p.frequency(2), 1);
    }

    #[test]
    fn positional_add_appends() {
        let mut p = PostingList::empty(PostingClass::Positional);
        p.add(1, Some(0));
        p.add(1, Some(5));
        assert_eq!(p.positions(1), &[0, 5]);
    }

    #[test]
    fn merge_sums_frequencies() {
        let mut a = PostingList::empty(PostingClass::Frequency);
        a.add(1, None);
        a.add(1, None);
        let mut b = PostingList::empty(PostingClass::Frequency);
        b.add(1, None);
        b.add(2, None);
        let merged = PostingList::merge(vec![a, b]);
        assert_eq!(merged.frequency(1), 3);
        assert_eq!(merged.frequency(2), 1);
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let mut a = PostingList::empty(PostingClass::Boolean);
        a.add(1, None);
        let mut b = PostingList::empty(PostingClass::Boolean);
        b.add(2, None);
        let mut c = PostingList::empty(PostingClass::Boolean);
        c.add(3, None);

        let ab_c = PostingList::merge(vec![
            PostingList::merge(vec![a.clone(), b.clone()]),
            c.clone(),
        ]);
        let a_bc = PostingList::merge(vec![a.clone(), PostingList::merge(vec![b, c])]);
        assert_eq!(ab_c.documents(), a_bc.documents());
        assert_eq!(ab_c.documents(), vec![1, 2, 3]);
    }

    #[test]
    fn parse_format_round_trip_boolean() {
        let mut p = PostingList::empty(PostingClass::Boolean);
        p.add(5, None);
        p.add(2, None);
        let text = p.format();
        let parsed = PostingList::parse(PostingClass::Boolean, &text).unwrap();
        assert_eq!(p, parsed);
    }

    #[test]
    fn parse_format_round_trip_frequency() {
        let mut p = PostingList::empty(PostingClass::Frequency);
        p.add(5, None);
        p.add(5, None);
        p.add(2, None);
        let text = p.format();
        let parsed = PostingList::parse(PostingClass::Frequency, &text).unwrap();
        assert_eq!(p, parsed);
    }

    #[test]
    fn parse_format_round_trip_positional() {
        let mut p = PostingList::empty(PostingClass::Positional);
        p.add(5, Some(0));
        p.add(5, Some(9));
        p.add(2, Some(3));
        let text = p.format();
        let parsed = PostingList::parse(PostingClass::Positional, &text).unwrap();
        assert_eq!(p, parsed);
    }
}
