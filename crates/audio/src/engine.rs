//! The real-time filtering engine.
//!
//! `FilterEngine::process_block` is the body of the audio callback: a pure
//! function of engine state plus the device's I/O buffers. It is the sole
//! mutator of the delay line, the sole advancer of both cursors, and the
//! sole consumer of the censor-event queue. It never blocks, never
//! allocates, and never logs from the per-frame path; everything observable
//! is published through lock-free atomics in [`EngineShared`].
//!
//! Input and output frame counts may differ: with separate capture and
//! playback devices the two clocks drift, and the short side simply runs
//! out first. That drift is exactly what moves the buffer gap and what the
//! health state machine absorbs.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::delay_line::DelayLine;
use crate::queue::{Consumer, Producer};
use crate::rewrite::{apply_mute, apply_reverse, fade_len, REVERSE_SCALE};
use crate::types::{CensorEvent, CensorMode, ChunkDescriptor};

/// Throttle for the "worker is behind" log: once per this many callbacks.
const DRIFT_LOG_EVERY: u64 = 100;

/// Playback gating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    /// Initial buffering; output is silence until the delay target is met.
    Filling = 0,
    /// Normal delayed passthrough.
    Playing = 1,
    /// Gap underran; silence while the buffer rebuilds.
    Starving = 2,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Starving,
            _ => PlaybackState::Filling,
        }
    }
}

/// Geometry and thresholds derived from the session configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    pub sample_rate: u32,
    pub channels: usize,
    /// Frames per recognition chunk.
    pub chunk_samples: usize,
    /// Gap at which Filling/Starving hand over to Playing.
    pub start_threshold: u64,
    /// Gap below which Playing degrades to Starving.
    pub pause_threshold: u64,
    /// Gap below which rewrites are suppressed entirely.
    pub critical_threshold: u64,
}

impl EngineParams {
    /// Standard thresholds: start at the configured delay, pause 2 s below
    /// it, suppress rewrites below `chunk + 0.5 s`.
    pub fn new(
        sample_rate: u32,
        channels: usize,
        chunk_seconds: f64,
        initial_delay_seconds: f64,
    ) -> Self {
        let sr = sample_rate as f64;
        let start = (initial_delay_seconds * sr) as u64;
        Self {
            sample_rate,
            channels,
            chunk_samples: (chunk_seconds * sr) as usize,
            start_threshold: start,
            pause_threshold: start.saturating_sub((2.0 * sr) as u64),
            critical_threshold: ((chunk_seconds + 0.5) * sr) as u64,
        }
    }
}

/// Lock-free state shared between the callback and everyone else.
///
/// The callback only stores; the worker and UI only load (except for
/// `chunk_in_flight`, which the worker clears when it finishes a chunk).
#[derive(Debug, Default)]
pub struct EngineShared {
    input_level_bits: AtomicU32,
    peak_level_bits: AtomicU32,
    state: AtomicU8,
    pub chunk_in_flight: AtomicBool,
    critical_underrun: AtomicBool,
    pub underrun_count: AtomicU64,
    pub late_events: AtomicU64,
    pub underrun_dropped_events: AtomicU64,
    pub dropped_chunks: AtomicU64,
    pub clipping_events: AtomicU64,
    /// Frames accumulated beyond one chunk while the worker was busy.
    pub accumulator_drift: AtomicU64,
}

impl EngineShared {
    pub fn input_level(&self) -> f32 {
        f32::from_bits(self.input_level_bits.load(Ordering::Relaxed))
    }

    pub fn peak_level(&self) -> f32 {
        f32::from_bits(self.peak_level_bits.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn critical_underrun(&self) -> bool {
        self.critical_underrun.load(Ordering::Acquire)
    }

    /// Raise or clear the critical-underrun flag. Written by the engine;
    /// public so harnesses can drive the worker without one.
    pub fn set_critical_underrun(&self, active: bool) {
        self.critical_underrun.store(active, Ordering::Release);
    }
}

/// Wakes the worker when a chunk descriptor is posted or shutdown starts.
///
/// The callback side only ever calls `notify`, which does not take the
/// mutex; only the worker blocks here.
#[derive(Debug, Default)]
pub struct WorkerSignal {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl WorkerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.condvar.notify_one();
    }

    /// Park the worker for at most `timeout`.
    pub fn wait(&self, timeout: Duration) {
        let guard = self.mutex.lock().expect("worker signal mutex poisoned");
        let _ = self
            .condvar
            .wait_timeout(guard, timeout)
            .expect("worker signal mutex poisoned");
    }
}

/// The ingest/playback engine driven by the audio callback.
pub struct FilterEngine {
    delay: Arc<DelayLine>,
    chunk_tx: Producer<ChunkDescriptor>,
    censor_rx: Consumer<CensorEvent>,
    shared: Arc<EngineShared>,
    signal: Arc<WorkerSignal>,
    params: EngineParams,
    state: PlaybackState,
    /// Frames accumulated toward the next chunk handoff.
    accumulated: usize,
    /// Reverse-rewrite scratch, sized once at construction.
    scratch: Vec<f32>,
    callbacks: u64,
}

impl FilterEngine {
    pub fn new(
        delay: Arc<DelayLine>,
        chunk_tx: Producer<ChunkDescriptor>,
        censor_rx: Consumer<CensorEvent>,
        shared: Arc<EngineShared>,
        signal: Arc<WorkerSignal>,
        params: EngineParams,
    ) -> crate::Result<Self> {
        if params.chunk_samples == 0 {
            return Err(crate::AudioError::InvalidConfig(
                "chunk length must be non-zero".to_string(),
            ));
        }
        if params.channels != delay.channels() {
            return Err(crate::AudioError::InvalidConfig(format!(
                "engine channels {} != delay line channels {}",
                params.channels,
                delay.channels()
            )));
        }

        // Worst case rewrite interval: one chunk plus both pads, rounded up
        // generously. Allocated here so the callback never does.
        let scratch_len = params.chunk_samples + params.sample_rate as usize;

        Ok(Self {
            delay,
            chunk_tx,
            censor_rx,
            shared,
            signal,
            params,
            state: PlaybackState::Filling,
            accumulated: 0,
            scratch: Vec::with_capacity(scratch_len),
            callbacks: 0,
        })
    }

    pub fn shared(&self) -> Arc<EngineShared> {
        Arc::clone(&self.shared)
    }

    pub fn delay_line(&self) -> Arc<DelayLine> {
        Arc::clone(&self.delay)
    }

    pub fn params(&self) -> EngineParams {
        self.params
    }

    /// Process one device period.
    ///
    /// `input` and `output` are interleaved at the engine's channel count.
    /// The counts may differ; input frames beyond the output period are
    /// still ingested, output frames beyond the input are played from the
    /// delay line (or silence while gated).
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let channels = self.params.channels;
        debug_assert_eq!(input.len() % channels, 0);
        debug_assert_eq!(output.len() % channels, 0);

        let n_in = input.len() / channels;
        let n_out = output.len() / channels;
        self.callbacks += 1;

        self.meter_input(input, n_in);

        for i in 0..n_in.max(n_out) {
            // Store first so the frame is part of the gap the gating sees,
            // but advance write only after output is settled.
            if i < n_in {
                self.delay.store_frame(&input[i * channels..(i + 1) * channels]);
            }

            if i < n_out {
                let play = self.update_gating();
                let frame = &mut output[i * channels..(i + 1) * channels];
                if play {
                    self.delay.read_frame(frame);
                    self.delay.advance_read();
                } else {
                    frame.fill(0.0);
                }
            }

            if i < n_in {
                self.delay.advance_write();
                self.accumulate_frame();
            }
        }

        self.drain_censor_events();
    }

    /// Step 1: rolling input level and clipping detection.
    fn meter_input(&mut self, input: &[f32], n_in: usize) {
        if n_in == 0 {
            return;
        }

        let channels = self.params.channels;
        let mut sum_sq = 0.0f32;
        let mut peak = self.shared.peak_level();
        let mut clipped = 0u64;

        for frame in 0..n_in {
            let sample = input[frame * channels];
            sum_sq += sample * sample;
            let magnitude = sample.abs();
            if magnitude > peak {
                peak = magnitude;
            }
            if magnitude > 1.0 {
                clipped += 1;
            }
        }

        let rms = (sum_sq / n_in as f32).sqrt();
        self.shared
            .input_level_bits
            .store(rms.to_bits(), Ordering::Relaxed);
        self.shared
            .peak_level_bits
            .store(peak.to_bits(), Ordering::Relaxed);
        if clipped > 0 {
            self.shared
                .clipping_events
                .fetch_add(clipped, Ordering::Relaxed);
        }
    }

    /// Step 2: advance the chunk accumulator and hand off a descriptor
    /// when one is due and the worker is free.
    fn accumulate_frame(&mut self) {
        self.accumulated += 1;

        if self.accumulated < self.params.chunk_samples {
            return;
        }

        if self.shared.chunk_in_flight.load(Ordering::Acquire) {
            // Worker still busy: keep accumulating, record the drift.
            let drift = (self.accumulated - self.params.chunk_samples) as u64;
            self.shared
                .accumulator_drift
                .store(drift, Ordering::Relaxed);
            if self.callbacks % DRIFT_LOG_EVERY == 0 {
                tracing::warn!(
                    drift_samples = drift,
                    "recognizer behind real time, chunk held back"
                );
            }
            return;
        }

        let descriptor = ChunkDescriptor {
            end_pos: self.delay.write_pos(),
            len: self.params.chunk_samples as u32,
            channels: self.params.channels as u16,
            sample_rate: self.params.sample_rate,
        };

        if self.chunk_tx.push(descriptor) {
            self.shared.chunk_in_flight.store(true, Ordering::Release);
            self.signal.notify();
        } else {
            self.shared.dropped_chunks.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.accumulator_drift.store(0, Ordering::Relaxed);
        self.accumulated = 0;
    }

    /// Steps 4, 5: the three-state buffer-health machine plus the
    /// critical-underrun flag. Returns whether playback is gated on.
    fn update_gating(&mut self) -> bool {
        let gap = self.delay.current_gap();

        let play = match self.state {
            PlaybackState::Filling => {
                if gap >= self.params.start_threshold {
                    self.state = PlaybackState::Playing;
                    true
                } else {
                    false
                }
            }
            PlaybackState::Playing => {
                // The max(1) keeps read from ever overtaking write even
                // with a degenerate zero pause threshold.
                if gap < self.params.pause_threshold.max(1) {
                    self.state = PlaybackState::Starving;
                    self.shared.underrun_count.fetch_add(1, Ordering::Relaxed);
                    false
                } else {
                    true
                }
            }
            PlaybackState::Starving => {
                if gap >= self.params.start_threshold {
                    self.state = PlaybackState::Playing;
                    true
                } else {
                    false
                }
            }
        };

        self.shared.state.store(self.state as u8, Ordering::Release);

        // The critical flag is independent of gating: rewrites stop well
        // before playback does, because a rewrite near read_pos races the
        // playhead. Meaningless until the first fill completes.
        if self.state != PlaybackState::Filling {
            if gap < self.params.critical_threshold {
                self.shared.critical_underrun.store(true, Ordering::Release);
            } else if gap >= self.params.start_threshold {
                self.shared
                    .critical_underrun
                    .store(false, Ordering::Release);
            }
        }

        play
    }

    /// Step 7: apply queued rewrites to not-yet-played samples.
    fn drain_censor_events(&mut self) {
        while let Some(event) = self.censor_rx.pop() {
            if self.shared.critical_underrun() {
                self.shared
                    .underrun_dropped_events
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let read = self.delay.read_pos();
            if event.start_pos < read || event.is_empty() {
                self.shared.late_events.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let end = event.end_pos.min(self.delay.write_pos());
            if end <= event.start_pos {
                self.shared.late_events.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let fade = fade_len(self.params.sample_rate, (end - event.start_pos) as usize);
            match event.mode {
                CensorMode::Mute => apply_mute(&self.delay, event.start_pos, end, fade),
                CensorMode::Reverse => apply_reverse(
                    &self.delay,
                    event.start_pos,
                    end,
                    fade,
                    REVERSE_SCALE,
                    &mut self.scratch,
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::spsc_channel;
    use crate::{AUDIO_CHUNK_QUEUE_CAPACITY, CENSOR_EVENT_QUEUE_CAPACITY};

    const SR: u32 = 1000; // small rate keeps tests readable

    struct Rig {
        engine: FilterEngine,
        chunk_rx: Consumer<ChunkDescriptor>,
        censor_tx: Producer<CensorEvent>,
        shared: Arc<EngineShared>,
        delay: Arc<DelayLine>,
    }

    /// chunk = 100 frames, start delay = 300 frames, pause under 100,
    /// rewrites suppressed under 150. The production thresholds (2 s pause
    /// margin, chunk + 0.5 s critical) don't scale to a 1 kHz test rate,
    /// so the rig states them directly.
    fn rig() -> Rig {
        let params = EngineParams {
            sample_rate: SR,
            channels: 1,
            chunk_samples: 100,
            start_threshold: 300,
            pause_threshold: 100,
            critical_threshold: 150,
        };
        let delay = Arc::new(DelayLine::new(1, SR as usize * 16).unwrap());
        let (chunk_tx, chunk_rx) = spsc_channel(AUDIO_CHUNK_QUEUE_CAPACITY);
        let (censor_tx, censor_rx) = spsc_channel(CENSOR_EVENT_QUEUE_CAPACITY);
        let shared = Arc::new(EngineShared::default());
        let signal = Arc::new(WorkerSignal::new());

        let engine = FilterEngine::new(
            Arc::clone(&delay),
            chunk_tx,
            censor_rx,
            Arc::clone(&shared),
            Arc::clone(&signal),
            params,
        )
        .unwrap();

        Rig {
            engine,
            chunk_rx,
            censor_tx,
            shared,
            delay,
        }
    }

    fn run_frames(rig: &mut Rig, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0f32; input.len()];
        rig.engine.process_block(input, &mut output);
        output
    }

    fn ramp(from: usize, n: usize) -> Vec<f32> {
        (from..from + n).map(|i| (i % 97) as f32 / 97.0).collect()
    }

    #[test]
    fn test_filling_outputs_silence_then_plays_delayed() {
        let mut rig = rig();

        // 300 frames fill the delay; all output silent.
        let out = run_frames(&mut rig, &ramp(0, 300));
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(rig.shared.state(), PlaybackState::Filling);

        // The next block crosses the threshold and plays the earliest
        // input back, delayed by 300.
        let input = ramp(300, 100);
        let out = run_frames(&mut rig, &input);
        assert_eq!(rig.shared.state(), PlaybackState::Playing);
        let expected = ramp(0, 100);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_delay_bound_passthrough() {
        let mut rig = rig();
        let input = ramp(0, 1000);
        let out = run_frames(&mut rig, &input);

        // For every played sample y[k], y[k] = x[k - 300].
        for k in 300..1000 {
            assert_eq!(out[k], input[k - 300], "sample {k}");
        }
    }

    #[test]
    fn test_write_pos_advances_once_per_input_frame() {
        let mut rig = rig();
        run_frames(&mut rig, &ramp(0, 250));
        assert_eq!(rig.delay.write_pos(), 250);
        run_frames(&mut rig, &ramp(250, 50));
        assert_eq!(rig.delay.write_pos(), 300);
    }

    #[test]
    fn test_chunk_handoff_and_in_flight_gate() {
        let mut rig = rig();

        run_frames(&mut rig, &ramp(0, 100));
        let desc = rig.chunk_rx.pop().expect("descriptor posted");
        assert_eq!(desc.end_pos, 100);
        assert_eq!(desc.len, 100);
        assert!(rig.shared.chunk_in_flight.load(Ordering::Acquire));

        // Worker busy: the next full chunk is held back, drift recorded.
        run_frames(&mut rig, &ramp(100, 200));
        assert!(rig.chunk_rx.pop().is_none());
        assert!(rig.shared.accumulator_drift.load(Ordering::Relaxed) > 0);

        // Worker done: the following chunk flows again.
        rig.shared.chunk_in_flight.store(false, Ordering::Release);
        run_frames(&mut rig, &ramp(300, 100));
        assert!(rig.chunk_rx.pop().is_some());
    }

    #[test]
    fn test_dropped_chunk_counter_on_full_queue() {
        let mut rig = rig();

        // Keep clearing in-flight without ever consuming the queue.
        let mut attempts = 0u64;
        while attempts < AUDIO_CHUNK_QUEUE_CAPACITY as u64 + 6 {
            run_frames(&mut rig, &ramp(0, 100));
            rig.shared.chunk_in_flight.store(false, Ordering::Release);
            attempts += 1;
        }

        assert_eq!(rig.shared.dropped_chunks.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_starving_on_clock_drift_and_recovery() {
        let mut rig = rig();
        run_frames(&mut rig, &ramp(0, 300));

        // Input stalls, output keeps draining: playback starts on the
        // first drained frame, then the gap falls to the pause level.
        let mut output = vec![0.0f32; 250];
        rig.engine.process_block(&[], &mut output);
        assert_eq!(rig.shared.state(), PlaybackState::Starving);
        assert_eq!(rig.shared.underrun_count.load(Ordering::Relaxed), 1);
        assert!(rig.shared.critical_underrun());

        // While starving, output is silence.
        let mut output = vec![1.0f32; 50];
        rig.engine.process_block(&[], &mut output);
        assert!(output.iter().all(|&s| s == 0.0));

        // Input catches back up past the start threshold.
        let mut output = vec![0.0f32; 0];
        rig.engine.process_block(&ramp(0, 300), &mut output);
        let mut output = vec![0.0f32; 1];
        rig.engine.process_block(&ramp(0, 1), &mut output);
        assert_eq!(rig.shared.state(), PlaybackState::Playing);
        assert!(!rig.shared.critical_underrun());
    }

    #[test]
    fn test_rewrites_dropped_during_critical_underrun() {
        let mut rig = rig();
        run_frames(&mut rig, &ramp(0, 300));

        // Drain until critical.
        let mut output = vec![0.0f32; 200];
        rig.engine.process_block(&[], &mut output);
        assert!(rig.shared.critical_underrun());

        assert!(rig
            .censor_tx
            .push(CensorEvent::new(350, 360, CensorMode::Mute, "late")));
        let mut output = vec![0.0f32; 0];
        rig.engine.process_block(&[], &mut output);

        assert_eq!(
            rig.shared.underrun_dropped_events.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_late_event_dropped_and_counted() {
        let mut rig = rig();
        run_frames(&mut rig, &ramp(0, 400));

        // read_pos is now 100; an event starting before it is too late.
        let read = rig.delay.read_pos();
        assert!(read > 0);
        assert!(rig.censor_tx.push(CensorEvent::new(
            read - 1,
            read + 50,
            CensorMode::Mute,
            "late"
        )));

        run_frames(&mut rig, &ramp(400, 1));
        assert_eq!(rig.shared.late_events.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_mute_event_applied_to_unplayed_interval() {
        let mut rig = rig();
        run_frames(&mut rig, &[0.5f32; 300]);

        // Mute [350, 380) before those positions are written/played.
        assert!(rig
            .censor_tx
            .push(CensorEvent::new(350, 380, CensorMode::Mute, "damn")));

        run_frames(&mut rig, &[0.5f32; 200]);

        // The event is applied to the delay line: interior forced to 0.
        let fade = fade_len(SR, 30);
        for pos in 350 + fade as u64..380 - fade as u64 {
            assert_eq!(rig.delay.read_at(0, pos), 0.0);
        }
        // Sample just outside is untouched.
        assert_eq!(rig.delay.read_at(0, 349), 0.5);
    }

    #[test]
    fn test_event_end_clamped_to_write_pos() {
        let mut rig = rig();
        run_frames(&mut rig, &[0.5f32; 300]);

        // Event extends past write_pos (300); the tail must not be touched
        // when those samples are eventually written.
        assert!(rig
            .censor_tx
            .push(CensorEvent::new(280, 400, CensorMode::Mute, "damn")));
        let mut output = vec![0.0f32; 0];
        rig.engine.process_block(&[], &mut output);

        // 280..300 muted (modulo fades), rest not yet written.
        assert_eq!(rig.delay.read_at(0, 290), 0.0);

        run_frames(&mut rig, &[0.7f32; 50]);
        assert_eq!(rig.delay.read_at(0, 310), 0.7);
    }

    #[test]
    fn test_censor_events_applied_in_order() {
        let mut rig = rig();
        run_frames(&mut rig, &[1.0f32; 300]);

        // Two overlapping events: mute then reverse. Applied in worker
        // order, the reverse of a muted region stays (scaled) zero in the
        // overlap.
        assert!(rig
            .censor_tx
            .push(CensorEvent::new(310, 340, CensorMode::Mute, "first")));
        assert!(rig
            .censor_tx
            .push(CensorEvent::new(310, 340, CensorMode::Reverse, "second")));

        run_frames(&mut rig, &[1.0f32; 100]);

        let fade = fade_len(SR, 30);
        for pos in 310 + fade as u64..340 - fade as u64 {
            assert_eq!(rig.delay.read_at(0, pos), 0.0);
        }
    }

    #[test]
    fn test_input_level_metering() {
        let mut rig = rig();
        run_frames(&mut rig, &[0.5f32; 100]);

        assert!((rig.shared.input_level() - 0.5).abs() < 1e-6);
        assert!((rig.shared.peak_level() - 0.5).abs() < 1e-6);
        assert_eq!(rig.shared.clipping_events.load(Ordering::Relaxed), 0);

        run_frames(&mut rig, &[1.5f32; 10]);
        assert_eq!(rig.shared.clipping_events.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_rejects_mismatched_channels() {
        let params = EngineParams::new(SR, 2, 0.1, 0.3);
        let delay = Arc::new(DelayLine::new(1, 1024).unwrap());
        let (chunk_tx, _chunk_rx) = spsc_channel::<ChunkDescriptor>(8);
        let (_censor_tx, censor_rx) = spsc_channel::<CensorEvent>(8);

        let result = FilterEngine::new(
            delay,
            chunk_tx,
            censor_rx,
            Arc::new(EngineShared::default()),
            Arc::new(WorkerSignal::new()),
            params,
        );
        assert!(result.is_err());
    }
}
