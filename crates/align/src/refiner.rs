//! Energy-based refinement of recognizer word timestamps.
//!
//! Segment-level timestamps sliced evenly across tokens are only roughly
//! right. The refiner snaps each word to the speech energy actually present
//! in the chunk: classify 10 ms windows by short-time energy and
//! zero-crossing rate, group them into candidate regions, pick the region
//! nearest the recognizer's estimate (biased toward earlier regions, since
//! small models timestamp late), then sharpen the boundaries on the energy
//! gradient.

use bleep_stt::Word;

/// Analysis hop, in seconds.
const WINDOW_SECONDS: f64 = 0.010;

/// Half-width of the search window around the recognizer estimate.
const SEARCH_RADIUS_SECONDS: f64 = 0.8;

/// Short-time energy above this is speech-ish.
const ENERGY_THRESHOLD: f32 = 1e-3;

/// Zero-crossing rate above this is speech-ish.
const ZCR_THRESHOLD: f32 = 0.1;

/// Distance discount applied to regions preceding the estimate.
const EARLIER_REGION_BIAS: f64 = 0.8;

const MIN_WORD_SECONDS: f64 = 0.05;
const MAX_WORD_SECONDS: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Region {
    start: usize,
    end: usize,
}

/// Refines word boundaries against the raw chunk audio.
#[derive(Debug, Default)]
pub struct TimestampRefiner;

impl TimestampRefiner {
    pub fn new() -> Self {
        Self
    }

    /// Refine one word's `start`/`end` in place against the mono chunk.
    ///
    /// On silence (no speech region in the search window) the recognizer's
    /// estimate is kept unchanged.
    pub fn refine(&self, word: &mut Word, audio: &[f32], sample_rate: u32) {
        if audio.is_empty() || sample_rate == 0 {
            return;
        }

        let window = (WINDOW_SECONDS * sample_rate as f64) as usize;
        if window == 0 || audio.len() < window {
            return;
        }

        let radius = (SEARCH_RADIUS_SECONDS * sample_rate as f64) as usize;
        let est_start = ((word.start * sample_rate as f64) as usize).min(audio.len() - 1);
        let est_end = ((word.end * sample_rate as f64) as usize)
            .clamp(est_start, audio.len());

        let search_start = est_start.saturating_sub(radius);
        let search_end = (est_end + radius).min(audio.len());

        let regions = speech_regions(audio, search_start, search_end, window);
        let Some(region) = pick_region(&regions, est_start, est_end) else {
            return;
        };

        let mut start = refine_boundary(audio, region.start, window * 4, window, true);
        let mut end = refine_boundary(audio, region.end, window * 4, window, false);

        let min_samples = (MIN_WORD_SECONDS * sample_rate as f64) as usize;
        let max_samples = (MAX_WORD_SECONDS * sample_rate as f64) as usize;

        if end <= start {
            end = (start + min_samples).min(audio.len());
        }
        if end - start > max_samples {
            end = start + max_samples;
        }

        let refined_start = start as f64 / sample_rate as f64;
        let refined_end = end as f64 / sample_rate as f64;

        let delta = refined_start - word.start;
        if delta.abs() > 0.01 {
            tracing::debug!(
                word = %word.text,
                from = %format!("{:.2}-{:.2}", word.start, word.end),
                to = %format!("{:.2}-{:.2}", refined_start, refined_end),
                delta = %format!("{:+.2}", delta),
                "refined word timestamp"
            );
        }

        word.start = refined_start;
        word.end = refined_end;
    }
}

/// RMS energy of `audio[start .. start + len]`.
fn energy(audio: &[f32], start: usize, len: usize) -> f32 {
    if start + len > audio.len() || len == 0 {
        return 0.0;
    }
    let sum: f32 = audio[start..start + len].iter().map(|s| s * s).sum();
    (sum / len as f32).sqrt()
}

/// Zero-crossing rate of `audio[start .. start + len]`.
fn zero_crossings(audio: &[f32], start: usize, len: usize) -> f32 {
    if start + len > audio.len() || len < 2 {
        return 0.0;
    }
    let mut crossings = 0usize;
    for i in start + 1..start + len {
        if (audio[i] >= 0.0) != (audio[i - 1] >= 0.0) {
            crossings += 1;
        }
    }
    crossings as f32 / len as f32
}

/// Group contiguous speech-classified windows into regions.
fn speech_regions(audio: &[f32], from: usize, to: usize, window: usize) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut in_speech = false;
    let mut region_start = from;

    let mut i = from;
    while i < to {
        let e = energy(audio, i, window);
        let z = zero_crossings(audio, i, window);
        let is_speech = e > ENERGY_THRESHOLD && z > ZCR_THRESHOLD;

        if is_speech && !in_speech {
            region_start = i;
            in_speech = true;
        } else if !is_speech && in_speech {
            regions.push(Region { start: region_start, end: i });
            in_speech = false;
        }
        i += window;
    }

    if in_speech {
        regions.push(Region { start: region_start, end: to });
    }

    regions
}

/// Pick the region whose center lies closest to the estimate's center, with
/// earlier regions 20% "closer" than they are.
fn pick_region(regions: &[Region], est_start: usize, est_end: usize) -> Option<Region> {
    let est_center = (est_start + est_end) / 2;

    regions
        .iter()
        .copied()
        .min_by_key(|r| {
            let center = (r.start + r.end) / 2;
            let dist = center.abs_diff(est_center);
            if center < est_center {
                (dist as f64 * EARLIER_REGION_BIAS) as usize
            } else {
                dist
            }
        })
}

/// Slide around `center` looking for the steepest energy step.
///
/// A word start is a rising edge (quiet before, loud after); a word end is
/// the reverse. Falls back to `center` when no step clears the threshold.
fn refine_boundary(
    audio: &[f32],
    center: usize,
    radius: usize,
    window: usize,
    rising: bool,
) -> usize {
    let from = center.saturating_sub(if rising { radius } else { 0 });
    let to = (center + if rising { 0 } else { radius }).min(audio.len());

    let mut best_score = f32::MIN;
    let mut best = center;
    let step = (window / 4).max(1);

    let mut i = from;
    while i < to {
        if i >= window && i + window < audio.len() {
            let before = energy(audio, i - window, window);
            let after = energy(audio, i, window);
            let score = if rising { after - before } else { before - after };

            if score > best_score && (after - before).abs() > ENERGY_THRESHOLD {
                best_score = score;
                best = i;
            }
        }
        i += step;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16000;

    fn word(start: f64, end: f64) -> Word {
        Word {
            text: "test".to_string(),
            start,
            end,
            confidence: 0.9,
        }
    }

    /// A noisy burst that trips both the energy and ZCR gates.
    fn burst(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect()
    }

    #[test]
    fn test_silence_keeps_estimate() {
        let audio = vec![0.0f32; SR as usize * 2];
        let refiner = TimestampRefiner::new();
        let mut w = word(0.5, 0.8);

        refiner.refine(&mut w, &audio, SR);

        assert!((w.start - 0.5).abs() < 1e-9);
        assert!((w.end - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_snaps_to_isolated_burst() {
        // 2 s of silence with a burst at [0.6, 0.9).
        let mut audio = vec![0.0f32; SR as usize * 2];
        let b = burst((0.3 * SR as f64) as usize);
        let at = (0.6 * SR as f64) as usize;
        audio[at..at + b.len()].copy_from_slice(&b);

        let refiner = TimestampRefiner::new();
        // Recognizer guessed late, as small models do.
        let mut w = word(0.8, 1.1);
        refiner.refine(&mut w, &audio, SR);

        assert!((w.start - 0.6).abs() <= 0.010, "start={}", w.start);
        assert!((w.end - 0.9).abs() <= 0.010, "end={}", w.end);
    }

    #[test]
    fn test_prefers_earlier_region_on_tie() {
        // Two equal bursts straddling the estimate center; the earlier one
        // is slightly farther but the bias should still favor it.
        let mut audio = vec![0.0f32; SR as usize * 3];
        let b = burst((0.2 * SR as f64) as usize);
        let early = (0.50 * SR as f64) as usize;
        let late = (1.45 * SR as f64) as usize;
        audio[early..early + b.len()].copy_from_slice(&b);
        audio[late..late + b.len()].copy_from_slice(&b);

        let refiner = TimestampRefiner::new();
        let mut w = word(1.0, 1.1);
        refiner.refine(&mut w, &audio, SR);

        assert!(w.start < 0.8, "expected early region, start={}", w.start);
    }

    #[test]
    fn test_duration_clamped() {
        let audio = burst(SR as usize * 3);
        let refiner = TimestampRefiner::new();
        let mut w = word(0.0, 3.0);

        refiner.refine(&mut w, &audio, SR);

        assert!(w.end - w.start <= MAX_WORD_SECONDS + 1e-9);
        assert!(w.end - w.start >= MIN_WORD_SECONDS - 1e-9);
    }
}
