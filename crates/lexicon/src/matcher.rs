//! Greedy multi-token profanity matching over a word sequence.

use bleep_stt::text::normalize;
use bleep_stt::Word;

use crate::ProfanityLexicon;

/// Longest phrase the matcher will try ("son of a bitch" is four tokens).
const MAX_PHRASE_LEN: usize = 5;

/// Known recognizer token splits, merged before matching. Small models
/// habitually break these words across tokens.
const SPLIT_TABLE: &[(&str, &str)] = &[
    ("nig", "ga"),
    ("nigg", "a"),
    ("b", "itch"),
    ("f", "uck"),
    ("f", "ucking"),
    ("sh", "it"),
];

/// A detected profane span over word indices, with its time extent.
#[derive(Debug, Clone)]
pub struct ProfanitySpan {
    /// Index of the first word in the span.
    pub start_idx: usize,
    /// Index of the last word in the span, inclusive.
    pub end_idx: usize,
    /// Seconds from chunk start.
    pub start: f64,
    pub end: f64,
    /// The matched phrase as spoken.
    pub text: String,
    /// Whether the span covers more than one word.
    pub multi_word: bool,
}

/// Merge adjacent words that the recognizer split mid-profanity.
///
/// The merged word spans both halves' time range and keeps the lower
/// confidence of the two.
pub fn merge_common_splits(words: Vec<Word>) -> Vec<Word> {
    let mut merged: Vec<Word> = Vec::with_capacity(words.len());
    let mut iter = words.into_iter().peekable();

    while let Some(word) = iter.next() {
        let joins = iter.peek().and_then(|next| {
            let a = normalize(&word.text);
            let b = normalize(&next.text);
            SPLIT_TABLE
                .iter()
                .find(|(first, second)| a == *first && b == *second)
                .map(|(first, second)| format!("{first}{second}"))
        });

        match joins {
            Some(joined) => {
                let next = iter.next().expect("peeked word present");
                tracing::debug!(
                    first = %word.text,
                    second = %next.text,
                    merged = %joined,
                    "merged split token"
                );
                merged.push(Word {
                    text: joined,
                    start: word.start,
                    end: next.end,
                    confidence: word.confidence.min(next.confidence),
                });
            }
            None => merged.push(word),
        }
    }

    merged
}

/// Scan a word sequence for profane tokens and phrases.
///
/// Greedy: at each position phrase lengths 5 down to 1 are tried; the first
/// hit emits a span and the scan resumes past its end, so overlapping
/// detections cannot occur and the longest phrase wins.
pub fn find_profanity(lexicon: &ProfanityLexicon, words: &[Word]) -> Vec<ProfanitySpan> {
    let mut spans = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let mut matched = false;

        for len in (1..=MAX_PHRASE_LEN.min(words.len() - i)).rev() {
            let phrase = words[i..i + len]
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            if lexicon.is_profane(&phrase) {
                spans.push(ProfanitySpan {
                    start_idx: i,
                    end_idx: i + len - 1,
                    start: words[i].start,
                    end: words[i + len - 1].end,
                    text: phrase,
                    multi_word: len > 1,
                });
                i += len;
                matched = true;
                break;
            }
        }

        if !matched {
            i += 1;
        }
    }

    spans
}
