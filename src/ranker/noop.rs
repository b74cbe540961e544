use crate::posting::PostingClass;

use super::Ranker;

/// Scores every candidate document 0; used as the fallback for boolean
/// queries and as the baseline the other rankers are compared against.
pub struct NoOpRanker;

impl Ranker for NoOpRanker {
    fn name(&self) -> &'static str {
        "NONE"
    }

    fn posting_class(&self) -> PostingClass {
        PostingClass::Boolean
    }
}
