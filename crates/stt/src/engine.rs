//! Recognizer seam and segment-to-word expansion.
//!
//! The pipeline never knows which model it is talking to: anything that can
//! turn a mono chunk into timed segments plugs in at construction time.

use crate::text::clean_token;

/// A word with timing relative to the start of its chunk, in seconds.
#[derive(Debug, Clone)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f32,
}

/// A recognizer segment: raw tokens plus segment-level timing.
///
/// Word-level timestamps are synthesized downstream by even time slicing;
/// segment timestamps are the only timing the models report reliably.
#[derive(Debug, Clone)]
pub struct Segment {
    pub tokens: Vec<String>,
    pub start: f64,
    pub end: f64,
}

/// Speech recognition backend.
///
/// Implementations own their model state; the worker thread holds the
/// recognizer exclusively, so `&mut self` is fine.
pub trait Recognizer: Send {
    /// Transcribe a mono chunk at `sample_rate` into timed segments.
    fn transcribe(&mut self, samples: &[f32], sample_rate: u32) -> crate::Result<Vec<Segment>>;

    fn name(&self) -> &str;
}

/// Recognizer that hears nothing. Lets the pipeline run as a pure
/// delay/passthrough without a model on disk.
pub struct NullRecognizer;

impl Recognizer for NullRecognizer {
    fn transcribe(&mut self, _samples: &[f32], _sample_rate: u32) -> crate::Result<Vec<Segment>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Confidence assigned to words expanded from segment-level timestamps.
const SEGMENT_WORD_CONFIDENCE: f32 = 0.9;

/// Floor on a synthesized word duration, in seconds.
const MIN_WORD_SECONDS: f64 = 0.05;

/// Expand segment tokens to per-word entries by even time slicing.
///
/// Tokens are cleaned first; empties (pure punctuation, bracketed
/// annotations) vanish before the split so they do not eat time. All
/// timestamps are clamped into `[0, chunk_seconds]`.
pub fn expand_segments(segments: &[Segment], chunk_seconds: f64) -> Vec<Word> {
    let mut words = Vec::new();

    for segment in segments {
        let tokens: Vec<String> = segment
            .tokens
            .iter()
            .map(|t| clean_token(t))
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            continue;
        }

        let seg_start = segment.start.clamp(0.0, chunk_seconds);
        let seg_end = segment.end.clamp(seg_start, chunk_seconds);
        let per_word = (seg_end - seg_start) / tokens.len() as f64;

        for (i, token) in tokens.into_iter().enumerate() {
            let start = (seg_start + i as f64 * per_word).clamp(0.0, chunk_seconds);
            let end = (start + per_word).clamp(0.0, chunk_seconds).max(
                (start + MIN_WORD_SECONDS).min(chunk_seconds),
            );
            words.push(Word {
                text: token,
                start,
                end,
                confidence: SEGMENT_WORD_CONFIDENCE,
            });
        }
    }

    tracing::debug!(words = words.len(), "expanded segment tokens");
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(tokens: &[&str], start: f64, end: f64) -> Segment {
        Segment {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            start,
            end,
        }
    }

    #[test]
    fn test_even_time_slicing() {
        let segments = vec![segment(&["hello", "damn", "world"], 0.0, 3.0)];
        let words = expand_segments(&segments, 5.0);

        assert_eq!(words.len(), 3);
        assert!((words[0].start - 0.0).abs() < 1e-9);
        assert!((words[1].start - 1.0).abs() < 1e-9);
        assert!((words[2].start - 2.0).abs() < 1e-9);
        assert!((words[2].end - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_annotations_dropped_before_slicing() {
        let segments = vec![segment(&["(upbeat music)", "hey", "(laughs)"], 0.0, 1.0)];
        let words = expand_segments(&segments, 2.0);

        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "hey");
        // The one surviving token owns the whole segment span.
        assert!((words[0].end - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_to_chunk() {
        let segments = vec![segment(&["late"], 1.5, 4.0)];
        let words = expand_segments(&segments, 2.0);

        assert_eq!(words.len(), 1);
        assert!(words[0].end <= 2.0);
        assert!(words[0].start >= 0.0);
    }

    #[test]
    fn test_minimum_duration_enforced() {
        let segments = vec![segment(&["a", "b"], 1.0, 1.0)];
        let words = expand_segments(&segments, 2.0);

        for w in &words {
            assert!(w.end - w.start >= MIN_WORD_SECONDS - 1e-9);
        }
    }

    #[test]
    fn test_null_recognizer_is_silent() {
        let mut rec = NullRecognizer;
        let out = rec.transcribe(&[0.0; 16000], 16000).unwrap();
        assert!(out.is_empty());
    }
}
