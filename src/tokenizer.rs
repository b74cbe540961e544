use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rust_stemmers::{Algorithm, Stemmer};

use crate::error::{IrError, Result};

/// Lowercases, strips non-alphanumeric characters, filters by minimum token
/// length, drops stop words, and optionally stems. Grounded on
/// `tokenizer.py`'s `Tokenizer`, with `rust_stemmers` standing in for
/// `nltk.stem.snowball`.
pub struct Tokenizer {
    min_token_length: usize,
    stop_words: HashSet<String>,
    stemmer: Option<Stemmer>,
    language: String,
}

impl Tokenizer {
    pub fn new(min_token_length: usize, stop_words_path: Option<&Path>, language: Option<&str>) -> Result<Self> {
        let stop_words = match stop_words_path {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                text.lines().map(|l| l.trim().to_lowercase()).filter(|l| !l.is_empty()).collect()
            }
            None => HashSet::new(),
        };
        let language = language.unwrap_or("english").to_string();
        let stemmer = algorithm_for(&language).map(Stemmer::create);
        Ok(Tokenizer { min_token_length, stop_words, stemmer, language })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn min_token_length(&self) -> usize {
        self.min_token_length
    }

    /// Tokenizes `text` into its ordered sequence of terms, duplicates and
    /// all — frequency and positional posting lists need real per-document
    /// counts, so (unlike the reference tokenizer, which dedupes through a
    /// Python `set`) repeated occurrences of a term are preserved in order.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for raw in text.split_whitespace() {
            let cleaned: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
            if cleaned.is_empty() {
                continue;
            }
            let lower = cleaned.to_lowercase();
            if lower.len() < self.min_token_length {
                continue;
            }
            if self.stop_words.contains(&lower) {
                continue;
            }
            let token = match &self.stemmer {
                Some(s) => s.stem(&lower).into_owned(),
                None => lower,
            };
            out.push(token);
        }
        out
    }
}

fn algorithm_for(language: &str) -> Option<Algorithm> {
    match language.to_lowercase().as_str() {
        "english" => Some(Algorithm::English),
        "french" => Some(Algorithm::French),
        "spanish" => Some(Algorithm::Spanish),
        "german" => Some(Algorithm::German),
        "portuguese" => Some(Algorithm::Portuguese),
        "italian" => Some(Algorithm::Italian),
        "russian" => Some(Algorithm::Russian),
        "none" => None,
        other => {
            log::warn!("unknown stemming language {other:?}, disabling stemming");
            None
        }
    }
}

pub fn validate_language(language: &str) -> Result<()> {
    if language.eq_ignore_ascii_case("none") || algorithm_for(language).is_some() {
        Ok(())
    } else {
        Err(IrError::Config(format!("unsupported stemming language: {language}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        let tok = Tokenizer::new(1, None, Some("none")).unwrap();
        assert_eq!(tok.tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn preserves_repeated_terms_for_frequency_counting() {
        let tok = Tokenizer::new(1, None, Some("none")).unwrap();
        assert_eq!(tok.tokenize("cat cat dog"), vec!["cat", "cat", "dog"]);
    }

    #[test]
    fn filters_by_minimum_length() {
        let tok = Tokenizer::new(3, None, Some("none")).unwrap();
        assert_eq!(tok.tokenize("a an the apple"), vec!["the", "apple"]);
    }

    #[test]
    fn stems_when_a_language_is_given() {
        let tok = Tokenizer::new(1, None, Some("english")).unwrap();
        let tokens = tok.tokenize("running runs");
        assert_eq!(tokens.len(), 1);
    }
}
