//! Sentence-aware chunking of extracted document text.
//!
//! Chunk boundaries only ever fall between sentences. A sentence longer than
//! the maximum chunk size is kept whole.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::SegmenterConfig;

/// Terminal punctuation followed by whitespace; the punctuation stays with
/// the preceding sentence.
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("invalid sentence boundary regex"));

/// Overlapping, size-bounded chunker.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    max_size: usize,
    min_size: usize,
    overlap_words: usize,
}

impl Segmenter {
    /// `overlap_hint` is divided by ten to get the number of trailing words
    /// carried into the next chunk.
    pub fn new(max_size: usize, min_size: usize, overlap_hint: usize) -> Self {
        Self {
            max_size,
            min_size,
            overlap_words: overlap_hint / 10,
        }
    }

    pub fn segment(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_sentences(text) {
            let current_len = current.chars().count();
            let sentence_len = sentence.chars().count();
            let joined_len = if current.is_empty() {
                sentence_len
            } else {
                current_len + 1 + sentence_len
            };

            if joined_len > self.max_size && current_len > self.min_size {
                let closed = current.trim().to_string();
                current = tail_words(&closed, self.overlap_words);
                chunks.push(closed);
            }

            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }

        let trailing = current.trim();
        if !trailing.is_empty() {
            chunks.push(trailing.to_string());
        }

        chunks.retain(|chunk| chunk.chars().count() > self.min_size);
        debug!(
            chunks = chunks.len(),
            input_chars = text.len(),
            "segmented document text"
        );
        chunks
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        SegmenterConfig::default().into()
    }
}

impl From<SegmenterConfig> for Segmenter {
    fn from(config: SegmenterConfig) -> Self {
        Self::new(
            config.max_chunk_size,
            config.min_chunk_size,
            config.overlap_size,
        )
    }
}

/// Split `text` into overlapping chunks of at most roughly `max_size`
/// characters. Returns an empty vector when nothing is indexable.
pub fn segment(text: &str, max_size: usize, min_size: usize, overlap_hint: usize) -> Vec<String> {
    Segmenter::new(max_size, min_size, overlap_hint).segment(text)
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // Punctuation is a single ASCII byte.
        sentences.push(&text[start..boundary.start() + 1]);
        start = boundary.end();
    }
    sentences.push(&text[start..]);
    sentences
        .into_iter()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
}

fn tail_words(chunk: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = chunk.split_whitespace().collect();
    let skip = words.len().saturating_sub(count);
    words[skip..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENT: &str = "Clause 1. Rent is due monthly. Clause 2. Late payment incurs a 5% penalty.";

    fn sentences(text: &str) -> Vec<String> {
        split_sentences(text).map(str::to_string).collect()
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        assert_eq!(
            sentences("Is rent due? Yes! It is due monthly.\n\nSee clause 4"),
            vec!["Is rent due?", "Yes!", "It is due monthly.", "See clause 4"]
        );
        assert_eq!(sentences("Section 3.2 applies."), vec!["Section 3.2 applies."]);
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        assert!(segment("", 1500, 100, 200).is_empty());
        assert!(segment("   \n\t  ", 1500, 100, 200).is_empty());
    }

    #[test]
    fn text_at_or_below_min_size_yields_nothing() {
        assert!(segment("Short clause.", 1500, 100, 200).is_empty());
        let exactly_min = "a".repeat(99) + ".";
        assert!(segment(&exactly_min, 1500, 100, 200).is_empty());
    }

    #[test]
    fn rent_scenario_produces_two_small_chunks() {
        let chunks = segment(RENT, 40, 10, 20);

        assert!(chunks.len() >= 2, "expected at least two chunks: {chunks:?}");
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() < 60, "chunk too long: {chunk:?}");
        }
        assert_eq!(chunks[0], "Clause 1. Rent is due monthly. Clause 2.");
        assert!(chunks[1].starts_with("Clause 2. Late payment"));
    }

    #[test]
    fn next_chunk_is_seeded_with_tail_words() {
        let chunks = segment(RENT, 40, 10, 30);
        assert_eq!(chunks[1], "monthly. Clause 2. Late payment incurs a 5% penalty.");
    }

    #[test]
    fn chunks_respect_bounds_and_keep_sentence_order() {
        let sentences: Vec<String> = (1..=40)
            .map(|n| format!("Clause {n} obliges the tenant to keep the premises in good repair."))
            .collect();
        let text = sentences.join(" ");
        let (max, min, overlap_hint) = (300, 50, 0);

        let chunks = segment(&text, max, min, overlap_hint);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let len = chunk.chars().count();
            assert!(len > min && len <= max, "chunk length {len} out of bounds");
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn overlap_stays_within_carry_limit() {
        let text = (1..=30)
            .map(|n| format!("Paragraph {n} sets out the landlord's duty of care."))
            .collect::<Vec<_>>()
            .join(" ");
        let (max, min, overlap_hint) = (200, 20, 50);
        let widest_word = text.split_whitespace().map(str::len).max().unwrap_or(0);
        let carry_limit = (overlap_hint / 10) * (widest_word + 1);

        for chunk in segment(&text, max, min, overlap_hint) {
            assert!(chunk.chars().count() <= max + carry_limit);
        }
    }

    #[test]
    fn oversized_sentence_is_kept_whole() {
        let long_sentence = format!("{}.", "indemnity ".repeat(30).trim_end());
        let text = format!("The lease begins today and runs for a year. {long_sentence} It ends.");

        let chunks = segment(&text, 60, 10, 0);

        assert!(chunks.iter().any(|chunk| chunk.contains(&long_sentence)));
        assert!(chunks.iter().all(|chunk| !chunk.ends_with("indemnity")));
    }

    #[test]
    fn config_defaults_map_to_segmenter() {
        let segmenter = Segmenter::from(SegmenterConfig::default());
        assert_eq!(segmenter.max_size, 1500);
        assert_eq!(segmenter.min_size, 100);
        assert_eq!(segmenter.overlap_words, 20);
    }
}
