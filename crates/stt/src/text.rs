//! Text cleanup shared across the transcription path.
//!
//! `clean_token` undoes model artifacts on raw tokens; `normalize` is the
//! canonical form used for lexicon lookups and lyric alignment. Both sides
//! must agree on `normalize` or matching silently degrades.

/// Clean a raw recognizer token.
///
/// Removes bracketed annotations ("(laughs)", "(upbeat music)"), maps smart
/// quotes to plain ones, and drops anything outside letters, digits,
/// apostrophes, hyphens, and spaces.
pub fn clean_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut depth = 0usize;

    for c in token.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            c if c.is_alphanumeric() || c == '\'' || c == '-' || c == ' ' => out.push(c),
            _ => {}
        }
    }

    out.trim().to_string()
}

/// Normalize text for matching: lowercase, alphanumerics and single spaces
/// only.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for c in lowered.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else if c.is_whitespace() {
            pending_space = true;
        }
        // Punctuation vanishes without introducing a boundary: "don't" and
        // "dont" normalize identically.
    }

    out
}

/// Split text into normalized words.
pub fn split_words(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(|w| w.to_string())
        .collect()
}
