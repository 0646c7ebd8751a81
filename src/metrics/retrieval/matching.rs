use std::collections::HashSet;

/// Granularity of a matching strategy: whole retrieved chunks, or the
/// sentences inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingLevel {
    Chunk,
    Sentence,
}

/// How a retrieved piece of context counts as relevant against a ground
/// truth piece.
///
/// The overlap variants relax exact equality to unigram recall against the
/// ground truth, thresholded.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchingStrategy {
    ExactChunkMatch,
    ExactSentenceMatch,
    OverlapChunkMatch { threshold: f64 },
    OverlapSentenceMatch { threshold: f64 },
}

pub const DEFAULT_OVERLAP_CHUNK_THRESHOLD: f64 = 0.7;
pub const DEFAULT_OVERLAP_SENTENCE_THRESHOLD: f64 = 0.8;

impl MatchingStrategy {
    pub fn overlap_chunk_match() -> Self {
        MatchingStrategy::OverlapChunkMatch {
            threshold: DEFAULT_OVERLAP_CHUNK_THRESHOLD,
        }
    }

    pub fn overlap_sentence_match() -> Self {
        MatchingStrategy::OverlapSentenceMatch {
            threshold: DEFAULT_OVERLAP_SENTENCE_THRESHOLD,
        }
    }

    pub fn level(&self) -> MatchingLevel {
        match self {
            MatchingStrategy::ExactChunkMatch | MatchingStrategy::OverlapChunkMatch { .. } => {
                MatchingLevel::Chunk
            }
            MatchingStrategy::ExactSentenceMatch
            | MatchingStrategy::OverlapSentenceMatch { .. } => MatchingLevel::Sentence,
        }
    }

    pub fn is_relevant(&self, retrieved: &str, ground_truth: &str) -> bool {
        match self {
            MatchingStrategy::ExactChunkMatch | MatchingStrategy::ExactSentenceMatch => {
                retrieved == ground_truth
            }
            MatchingStrategy::OverlapChunkMatch { threshold } => {
                unigram_recall(retrieved, ground_truth) > *threshold
            }
            MatchingStrategy::OverlapSentenceMatch { threshold } => {
                unigram_recall(retrieved, ground_truth) >= *threshold
            }
        }
    }
}

/// Fraction of ground-truth unigrams present in the retrieved text.
fn unigram_recall(retrieved: &str, ground_truth: &str) -> f64 {
    let retrieved_tokens: HashSet<String> = tokenize(retrieved).collect();
    let truth_tokens: Vec<String> = tokenize(ground_truth).collect();
    if truth_tokens.is_empty() {
        return 0.0;
    }
    let hits = truth_tokens
        .iter()
        .filter(|t| retrieved_tokens.contains(*t))
        .count();
    hits as f64 / truth_tokens.len() as f64
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Naive sentence splitter on terminal punctuation; enough for chunk
/// decomposition in sentence-level strategies.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_strict() {
        let strategy = MatchingStrategy::ExactChunkMatch;
        assert!(strategy.is_relevant("Paris is in France", "Paris is in France"));
        assert!(!strategy.is_relevant("Paris is in France", "paris is in france"));
    }

    #[test]
    fn overlap_match_tolerates_extra_text() {
        let strategy = MatchingStrategy::overlap_chunk_match();
        assert!(strategy.is_relevant(
            "As everyone knows, Paris is the capital of France.",
            "Paris is the capital of France"
        ));
        assert!(!strategy.is_relevant("Unrelated text entirely", "Paris is the capital"));
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_sentences("One. Two! Three?");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
    }
}
