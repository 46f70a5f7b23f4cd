//! Sliding-window forced alignment of recognizer output against lyrics.
//!
//! The aligner treats fetched lyrics as ground truth: once the recognizer's
//! words locate the playhead inside the lyric text, corrected words (lyric
//! text, recognizer timing) flow downstream instead of raw output. Two
//! consecutive strong matches lock the aligner into cheap sequential search;
//! a large deviation between elapsed time and cursor position unlocks it.

use bleep_stt::Word;

use crate::text::{normalize, similarity, soundex, split_words};

/// Expected lyric density, words per second. Rap runs 4-6, singing 2-3.
const WORDS_PER_SECOND: f64 = 3.5;

/// Score at or above which a match is trusted enough to lock.
const LOCK_THRESHOLD: f32 = 0.80;

/// Score below which alignment is rejected outright.
const ACCEPT_THRESHOLD: f32 = 0.20;

/// Consecutive strong matches required before locking.
const LOCK_REQUIRED_MATCHES: u32 = 2;

/// Half-width of the time-based search window, in lyric indices.
const TIME_SEARCH_WINDOW: usize = 30;

/// Width of the sequential search window while locked.
const LOCKED_SEARCH_WINDOW: usize = 10;

/// Cursor-vs-time deviation that forces an unlock, in lyric indices.
const UNLOCK_JUMP: usize = 20;

/// Confidence assigned to predicted (unheard) words.
const PREDICTED_CONFIDENCE: f32 = 0.5;

/// Confidence scale applied to corrected words.
const CORRECTION_CONFIDENCE_SCALE: f32 = 0.95;

/// Tokens that mean "not lyrics" when they are all the recognizer heard.
const NON_LYRICAL_TOKENS: &[&str] = &["music", "applause", "laughter", "instrumental"];

/// One preprocessed lyric word.
#[derive(Debug, Clone)]
pub struct LyricsWord {
    pub index: usize,
    pub text: String,
    pub soundex: String,
}

/// What `align_chunk` did with the words it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignDecision {
    /// No lyrics loaded, nothing to align against.
    NotReady,
    /// Only non-lyrical tokens; state held.
    NonLyrical,
    /// Strong match; output corrected from lyrics.
    Matched,
    /// Weak-but-plausible match; corrected, lock dropped.
    Tentative,
    /// No plausible match; raw words returned.
    Rejected,
}

/// Forced aligner state machine.
#[derive(Debug, Default)]
pub struct LyricsAligner {
    lyrics: Vec<LyricsWord>,
    cursor: usize,
    locked: bool,
    consecutive_matches: u32,
    last_decision: Option<AlignDecision>,
}

impl LyricsAligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and preprocess new lyrics, resetting all alignment state.
    pub fn set_lyrics(&mut self, lyrics: &str) {
        self.reset();

        self.lyrics = split_words(lyrics)
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let code = soundex(&text);
                LyricsWord {
                    index,
                    text,
                    soundex: code,
                }
            })
            .collect();

        tracing::info!(words = self.lyrics.len(), "lyrics loaded for alignment");
    }

    /// Drop lyrics and all position state.
    pub fn reset(&mut self) {
        self.lyrics.clear();
        self.cursor = 0;
        self.locked = false;
        self.consecutive_matches = 0;
        self.last_decision = None;
    }

    pub fn is_ready(&self) -> bool {
        !self.lyrics.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn total_words(&self) -> usize {
        self.lyrics.len()
    }

    pub fn last_decision(&self) -> Option<AlignDecision> {
        self.last_decision
    }

    /// Fraction of the lyrics already consumed, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.lyrics.is_empty() {
            0.0
        } else {
            self.cursor as f64 / self.lyrics.len() as f64
        }
    }

    /// Align one chunk of refined words against the lyrics.
    ///
    /// `song_time` is seconds elapsed since the song started, used to bound
    /// the search when unlocked and to detect seeks while locked. Returns
    /// the corrected words, or the input unchanged when alignment is not
    /// possible. Pure in its inputs: identical `(lyrics, words, song_time)`
    /// yields identical output and state transitions.
    pub fn align_chunk(&mut self, words: &[Word], song_time: f64) -> Vec<Word> {
        if !self.is_ready() {
            self.last_decision = Some(AlignDecision::NotReady);
            return words.to_vec();
        }

        if is_non_lyrical(words) {
            tracing::debug!(cursor = self.cursor, "non-lyrical chunk, holding position");
            self.last_decision = Some(AlignDecision::NonLyrical);
            return words.to_vec();
        }

        let estimated = (song_time.max(0.0) * WORDS_PER_SECOND) as usize;

        // A big gap between where time says we are and where the cursor is
        // means the listener seeked; sequential search would never recover.
        if self.locked && estimated.abs_diff(self.cursor) > UNLOCK_JUMP {
            tracing::debug!(
                estimated,
                cursor = self.cursor,
                "time jump detected, unlocking"
            );
            self.locked = false;
            self.consecutive_matches = 0;
        }

        let (search_start, search_end) = if !self.locked || self.cursor == 0 {
            let start = estimated.saturating_sub(TIME_SEARCH_WINDOW);
            let end = (estimated + TIME_SEARCH_WINDOW).min(self.lyrics.len());
            (start.min(self.lyrics.len()), end)
        } else {
            (
                self.cursor.min(self.lyrics.len()),
                (self.cursor + LOCKED_SEARCH_WINDOW).min(self.lyrics.len()),
            )
        };

        let Some((position, score)) = self.best_match(words, search_start, search_end) else {
            self.locked = false;
            self.consecutive_matches = 0;
            self.last_decision = Some(AlignDecision::Rejected);
            return words.to_vec();
        };

        if score >= LOCK_THRESHOLD {
            self.consecutive_matches += 1;
            if self.consecutive_matches >= LOCK_REQUIRED_MATCHES && !self.locked {
                tracing::info!(position, "aligner locked to lyric sequence");
                self.locked = true;
            }

            let aligned = self.map_timestamps(position, words);
            self.cursor = position + aligned.len();
            self.last_decision = Some(AlignDecision::Matched);

            tracing::debug!(
                position,
                score,
                cursor = self.cursor,
                locked = self.locked,
                "chunk aligned"
            );
            aligned
        } else if score >= ACCEPT_THRESHOLD {
            self.locked = false;
            self.consecutive_matches = 0;

            let aligned = self.map_timestamps(position, words);
            self.cursor = position + aligned.len();
            self.last_decision = Some(AlignDecision::Tentative);

            tracing::debug!(position, score, "tentative alignment, not locking");
            aligned
        } else {
            self.locked = false;
            self.consecutive_matches = 0;
            self.last_decision = Some(AlignDecision::Rejected);

            tracing::debug!(score, "alignment rejected, using raw words");
            words.to_vec()
        }
    }

    /// Predict the next lyric words when the recognizer heard nothing but
    /// the sequence is locked.
    ///
    /// Emits `duration * 3.5` words uniformly spread over the chunk at low
    /// confidence and advances the cursor; a wrong guess is corrected by the
    /// next unlocked search.
    pub fn predict_next(&mut self, duration: f64) -> Vec<Word> {
        if !self.is_ready() || self.cursor >= self.lyrics.len() {
            return Vec::new();
        }

        let count = ((duration * WORDS_PER_SECOND) as usize)
            .min(self.lyrics.len() - self.cursor);
        if count == 0 {
            return Vec::new();
        }

        let per_word = duration / count as f64;
        let mut predicted = Vec::with_capacity(count);

        for i in 0..count {
            let lyric = &self.lyrics[self.cursor + i];
            let start = i as f64 * per_word;
            predicted.push(Word {
                text: lyric.text.clone(),
                start,
                end: start + per_word,
                confidence: PREDICTED_CONFIDENCE,
            });
        }

        tracing::debug!(
            count,
            from = self.cursor,
            "predicted lyric words for silent chunk"
        );
        self.cursor += count;

        predicted
    }

    /// Best-scoring start position in `[search_start, search_end)`.
    ///
    /// Each candidate compares the joined transcription against a lyric
    /// window of the same word count via character similarity. Earliest
    /// position wins ties.
    fn best_match(
        &self,
        words: &[Word],
        search_start: usize,
        search_end: usize,
    ) -> Option<(usize, f32)> {
        if words.is_empty() || search_start >= search_end {
            return None;
        }

        let transcribed = normalize(
            &words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );
        if transcribed.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;

        for pos in search_start..search_end {
            let window_end = (pos + words.len()).min(self.lyrics.len());
            let lyric_text = self.lyrics[pos..window_end]
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            let score = similarity(&transcribed, &lyric_text);
            // Strict greater-than keeps the earliest position on equal scores.
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((pos, score));
            }
        }

        best
    }

    /// Pair the matched lyric window with the chunk's time span, uniformly
    /// split, at slightly reduced confidence.
    fn map_timestamps(&self, position: usize, words: &[Word]) -> Vec<Word> {
        let count = words.len().min(self.lyrics.len() - position);
        if count == 0 {
            return Vec::new();
        }

        let span_start = words.first().map(|w| w.start).unwrap_or(0.0);
        let span_end = words.last().map(|w| w.end).unwrap_or(span_start);
        let per_word = (span_end - span_start) / count as f64;

        let mean_confidence =
            words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
        let confidence = CORRECTION_CONFIDENCE_SCALE * mean_confidence;

        (0..count)
            .map(|i| {
                let start = span_start + i as f64 * per_word;
                Word {
                    text: self.lyrics[position + i].text.clone(),
                    start,
                    end: start + per_word,
                    confidence,
                }
            })
            .collect()
    }
}

/// True when the chunk contains nothing worth aligning: no words, or only
/// recognized non-speech annotations.
fn is_non_lyrical(words: &[Word]) -> bool {
    if words.is_empty() {
        return true;
    }

    let combined = normalize(
        &words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    );

    if combined.len() < 2 {
        return true;
    }

    NON_LYRICAL_TOKENS.iter().any(|t| combined.contains(t))
}
