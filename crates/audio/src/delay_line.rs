//! The delay line: a bounded, mutable, wrap-around buffer addressed by
//! absolute sample position.
//!
//! Input is written at `write_pos` and played back from `read_pos` several
//! seconds later; the samples in between are the rewrite window where
//! censorship edits land before playback reaches them.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-capacity audio ring indexed by absolute (never-wrapping) sample
/// positions. Positions wrap into storage by modulo capacity; capacity is
/// rounded up to a power of two so the modulo is a mask.
///
/// # Thread safety
///
/// Safe to share between exactly two parties:
///
/// - The audio callback is the sole mutator: `store_frame`, `store_at`,
///   `advance_write`, `advance_read`, `read_frame`, `read_at`.
/// - The worker only snapshots ranges via `copy_range_mono` after an
///   acquire-load of `write_pos`, and only positions behind it. Samples the
///   callback writes after that load may or may not appear; callers never
///   rely on them.
///
/// The `write_pos` release store is the only publication barrier; slots are
/// plain `UnsafeCell<f32>` behind it.
pub struct DelayLine {
    channels: usize,
    capacity: usize,
    mask: u64,
    data: Box<[UnsafeCell<f32>]>,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
}

unsafe impl Send for DelayLine {}
unsafe impl Sync for DelayLine {}

impl DelayLine {
    /// Allocate a delay line holding `capacity_samples` frames of
    /// `channels` channels. Capacity is rounded up to a power of two.
    pub fn new(channels: usize, capacity_samples: usize) -> crate::Result<Self> {
        if channels == 0 || channels > 2 {
            return Err(crate::AudioError::InvalidConfig(format!(
                "unsupported channel count: {channels}"
            )));
        }
        if capacity_samples == 0 {
            return Err(crate::AudioError::InvalidConfig(
                "delay capacity must be non-zero".to_string(),
            ));
        }

        let capacity = capacity_samples.next_power_of_two();
        let data = (0..capacity * channels)
            .map(|_| UnsafeCell::new(0.0f32))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        tracing::info!(
            channels,
            requested = capacity_samples,
            capacity,
            "delay line allocated"
        );

        Ok(Self {
            channels,
            capacity,
            mask: capacity as u64 - 1,
            data,
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
        })
    }

    #[inline]
    fn index(&self, pos: u64, channel: usize) -> usize {
        ((pos & self.mask) as usize) * self.channels + channel
    }

    /// Store one interleaved frame at the current write position.
    ///
    /// Callback thread only. Does not advance `write_pos`; the engine
    /// advances it once output for the frame is settled.
    #[inline]
    pub fn store_frame(&self, frame: &[f32]) {
        let pos = self.write_pos.load(Ordering::Relaxed);
        for ch in 0..self.channels {
            let sample = frame.get(ch).copied().unwrap_or(0.0);
            // SAFETY: single mutator (the callback); this slot is at
            // write_pos, which no reader touches until the release store in
            // advance_write.
            unsafe { *self.data[self.index(pos, ch)].get() = sample };
        }
    }

    /// Read one interleaved frame at the current read position.
    ///
    /// Callback thread only.
    #[inline]
    pub fn read_frame(&self, out: &mut [f32]) {
        let pos = self.read_pos.load(Ordering::Relaxed);
        for ch in 0..self.channels {
            // SAFETY: positions below write_pos hold published samples and
            // only the callback mutates them.
            let sample = unsafe { *self.data[self.index(pos, ch)].get() };
            if let Some(slot) = out.get_mut(ch) {
                *slot = sample;
            }
        }
    }

    /// Random access within the rewrite window. Callback thread only;
    /// `pos` must lie in `[read_pos, write_pos)`.
    #[inline]
    pub fn read_at(&self, channel: usize, pos: u64) -> f32 {
        debug_assert!(channel < self.channels);
        // SAFETY: see `read_frame`.
        unsafe { *self.data[self.index(pos, channel)].get() }
    }

    /// In-place rewrite within the rewrite window. Callback thread only;
    /// `pos` must lie in `[read_pos, write_pos)`.
    #[inline]
    pub fn store_at(&self, channel: usize, pos: u64, value: f32) {
        debug_assert!(channel < self.channels);
        // SAFETY: single mutator; readers only copy ranges they tolerate
        // racing with (snapshot semantics).
        unsafe { *self.data[self.index(pos, channel)].get() = value };
    }

    /// Advance the write cursor by one frame, publishing the stored frame.
    #[inline]
    pub fn advance_write(&self) {
        let pos = self.write_pos.load(Ordering::Relaxed);
        self.write_pos.store(pos + 1, Ordering::Release);
    }

    /// Advance the read cursor by one frame. Called only while playback is
    /// ungated.
    #[inline]
    pub fn advance_read(&self) {
        let pos = self.read_pos.load(Ordering::Relaxed);
        self.read_pos.store(pos + 1, Ordering::Release);
    }

    pub fn write_pos(&self) -> u64 {
        self.write_pos.load(Ordering::Acquire)
    }

    pub fn read_pos(&self) -> u64 {
        self.read_pos.load(Ordering::Acquire)
    }

    /// Frames buffered but not yet played.
    pub fn current_gap(&self) -> u64 {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.saturating_sub(read)
    }

    /// Snapshot `n` frames starting at `start_pos`, downmixed to mono.
    ///
    /// Worker thread only. The snapshot is consistent up to the `write_pos`
    /// observed at entry; the requested range is clamped to published
    /// positions still inside the ring.
    ///
    /// Returns the number of frames actually copied.
    pub fn copy_range_mono(&self, out: &mut Vec<f32>, start_pos: u64, n: usize) -> usize {
        out.clear();

        let write = self.write_pos.load(Ordering::Acquire);
        let oldest = write.saturating_sub(self.capacity as u64);
        let start = start_pos.max(oldest);
        let end = start_pos
            .saturating_add(n as u64)
            .min(write);

        if end <= start {
            return 0;
        }

        let scale = 1.0 / self.channels as f32;
        for pos in start..end {
            let mut sum = 0.0f32;
            for ch in 0..self.channels {
                // SAFETY: pos < write (acquire-observed) and pos >= oldest,
                // so the slot holds a published sample. The callback may
                // overwrite concurrently once the ring laps; the result is
                // then a torn snapshot of floats, never UB, and callers
                // treat snapshots as best-effort.
                sum += unsafe { *self.data[self.index(pos, ch)].get() };
            }
            out.push(sum * scale);
        }

        (end - start) as usize
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
