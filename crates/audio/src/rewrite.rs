//! In-place rewrite operators applied to the delay line.
//!
//! Both operators fade at the interval boundaries to suppress clicks. They
//! run on the audio callback thread against samples that have not been
//! played yet; the engine guarantees the interval lies inside
//! `[read_pos, write_pos)` before calling in here.

use crate::delay_line::DelayLine;

/// Amplitude applied to reversed audio.
pub const REVERSE_SCALE: f32 = 0.5;

/// Fade window: 10 ms at the stream rate, capped at a quarter of the
/// interval so short hits still get a usable interior.
pub fn fade_len(sample_rate: u32, interval_len: usize) -> usize {
    ((sample_rate / 100) as usize).min(interval_len / 4)
}

/// Mute `[start_pos, end_pos)`: linear fade-out over the leading window,
/// zeros across the interior, linear fade-in over the trailing window.
pub fn apply_mute(delay: &DelayLine, start_pos: u64, end_pos: u64, fade: usize) {
    let len = end_pos.saturating_sub(start_pos) as usize;
    if len == 0 {
        return;
    }

    for ch in 0..delay.channels() {
        for i in 0..len {
            let pos = start_pos + i as u64;
            let gain = if fade > 0 && i < fade {
                (fade - i) as f32 / fade as f32
            } else if fade > 0 && i >= len - fade {
                (i - (len - fade) + 1) as f32 / fade as f32
            } else {
                0.0
            };

            if gain == 0.0 {
                delay.store_at(ch, pos, 0.0);
            } else {
                let sample = delay.read_at(ch, pos);
                delay.store_at(ch, pos, sample * gain);
            }
        }
    }
}

/// Reverse `[start_pos, end_pos)` in place at `scale` amplitude with
/// symmetric linear fades.
///
/// `scratch` must have capacity for the interval; it is reused across calls
/// so the callback never allocates. With `fade == 0` and `scale == 1.0` the
/// operator is an involution: applying it twice restores the original.
pub fn apply_reverse(
    delay: &DelayLine,
    start_pos: u64,
    end_pos: u64,
    fade: usize,
    scale: f32,
    scratch: &mut Vec<f32>,
) {
    let len = end_pos.saturating_sub(start_pos) as usize;
    if len == 0 || len > scratch.capacity() {
        return;
    }

    for ch in 0..delay.channels() {
        scratch.clear();
        for i in 0..len {
            scratch.push(delay.read_at(ch, start_pos + i as u64));
        }
        scratch.reverse();

        for (i, &sample) in scratch.iter().enumerate() {
            let gain = if fade > 0 && i < fade {
                i as f32 / fade as f32
            } else if fade > 0 && i >= len - fade {
                (len - i) as f32 / fade as f32
            } else {
                1.0
            };
            delay.store_at(ch, start_pos + i as u64, sample * gain * scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48000;

    fn filled_line(samples: &[f32]) -> DelayLine {
        let delay = DelayLine::new(1, samples.len().max(16)).unwrap();
        for &s in samples {
            delay.store_frame(&[s]);
            delay.advance_write();
        }
        delay
    }

    fn read_back(delay: &DelayLine, start: u64, n: usize) -> Vec<f32> {
        (0..n).map(|i| delay.read_at(0, start + i as u64)).collect()
    }

    #[test]
    fn test_fade_len_caps_at_quarter() {
        assert_eq!(fade_len(SR, 100_000), 480);
        assert_eq!(fade_len(SR, 1000), 250);
        assert_eq!(fade_len(SR, 0), 0);
    }

    #[test]
    fn test_mute_interior_zero_fades_monotonic() {
        let input = vec![1.0f32; 4800];
        let delay = filled_line(&input);
        let fade = fade_len(SR, input.len());

        apply_mute(&delay, 0, input.len() as u64, fade);
        let out = read_back(&delay, 0, input.len());

        // Interior is exactly zero.
        for &s in &out[fade..input.len() - fade] {
            assert_eq!(s, 0.0);
        }
        // Leading fade decreases monotonically in magnitude.
        for w in out[..fade].windows(2) {
            assert!(w[1].abs() <= w[0].abs());
        }
        // Trailing fade increases monotonically back toward the signal.
        for w in out[input.len() - fade..].windows(2) {
            assert!(w[1].abs() >= w[0].abs());
        }
    }

    #[test]
    fn test_reverse_involution_without_fade() {
        let input: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let delay = filled_line(&input);

        apply_reverse(&delay, 0, 1000, 0, 1.0, &mut Vec::with_capacity(1000));
        apply_reverse(&delay, 0, 1000, 0, 1.0, &mut Vec::with_capacity(1000));

        let out = read_back(&delay, 0, 1000);
        for (a, b) in input.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_reverse_burst_with_fade() {
        // 300 ms cosine burst at 48 kHz, reversed with 10 ms fades.
        let len = (0.3 * SR as f64) as usize;
        let input: Vec<f32> = (0..len)
            .map(|i| (i as f32 / SR as f32 * 440.0 * std::f32::consts::TAU).cos())
            .collect();
        let delay = filled_line(&input);
        let fade = fade_len(SR, len);
        assert_eq!(fade, 480);

        let mut scratch = Vec::with_capacity(len);
        apply_reverse(&delay, 0, len as u64, fade, REVERSE_SCALE, &mut scratch);
        let out = read_back(&delay, 0, len);

        // First fade ramps up from zero.
        assert_eq!(out[0], 0.0);
        for i in 0..fade {
            let expected = input[len - 1 - i] * (i as f32 / fade as f32) * REVERSE_SCALE;
            assert!((out[i] - expected).abs() < 1e-6);
        }
        // Interior is the reversed burst at half amplitude.
        for i in fade..len - fade {
            let expected = input[len - 1 - i] * REVERSE_SCALE;
            assert!((out[i] - expected).abs() < 1e-6);
        }
        // Last fade ramps back down toward zero.
        for i in len - fade..len {
            let expected = input[len - 1 - i] * ((len - i) as f32 / fade as f32) * REVERSE_SCALE;
            assert!((out[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_reverse_skips_oversized_interval() {
        let input = vec![0.5f32; 100];
        let delay = filled_line(&input);
        let mut scratch = Vec::with_capacity(10);

        apply_reverse(&delay, 0, 100, 0, 1.0, &mut scratch);

        // Interval exceeded scratch capacity: nothing changed.
        assert_eq!(read_back(&delay, 0, 100), input);
    }

    #[test]
    fn test_mute_stereo_covers_both_channels() {
        let delay = DelayLine::new(2, 64).unwrap();
        for _ in 0..32 {
            delay.store_frame(&[0.8, -0.8]);
            delay.advance_write();
        }

        apply_mute(&delay, 8, 24, 0);

        for pos in 8..24 {
            assert_eq!(delay.read_at(0, pos), 0.0);
            assert_eq!(delay.read_at(1, pos), 0.0);
        }
        assert_eq!(delay.read_at(0, 7), 0.8);
        assert_eq!(delay.read_at(1, 24), -0.8);
    }
}
