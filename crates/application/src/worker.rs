//! The recognition worker: consumer side of the pipeline.
//!
//! Loops forever pulling chunk descriptors, turning audio into words, words
//! into profanity spans, and spans into censor events targeting positions
//! the playhead has not reached yet. Everything that can fail in here is
//! contained: a bad chunk is dropped and the loop keeps running. The audio
//! callback must never notice the worker exists, except through the
//! censor-event queue.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bleep_align::{LyricsAligner, TimestampRefiner};
use bleep_audio::{
    CensorEvent, CensorMode, ChunkDescriptor, Consumer, DelayLine, EngineShared, Producer,
    WorkerSignal,
};
use bleep_events::{EventBusRef, UiEvent};
use bleep_lexicon::{find_profanity, merge_common_splits, ProfanityLexicon, ProfanitySpan};
use bleep_media::{LivenessToken, LyricsClient, TrackInfo};
use bleep_metrics::SessionMetrics;
use bleep_stt::{expand_segments, Recognizer, Word};

use crate::report::{write_song_report, Prediction};

/// How long the worker parks when the descriptor queue is empty.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Song-change poll cadence while lyrics are loaded and nearly consumed.
const NEAR_END_CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// Song-change poll cadence with no lyrics loaded.
const NO_LYRICS_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Lyrics progress past which the next queued song is anticipated.
const NEAR_END_PROGRESS: f64 = 0.90;

/// Predictions and identity of the song currently playing.
#[derive(Debug, Default)]
pub struct SongState {
    pub track: Option<TrackInfo>,
    pub predictions: Vec<Prediction>,
}

/// Everything the worker needs, wired up by the pipeline (or a test).
pub struct WorkerDeps {
    pub delay: Arc<DelayLine>,
    pub chunk_rx: Consumer<ChunkDescriptor>,
    pub censor_tx: Producer<CensorEvent>,
    pub shared: Arc<EngineShared>,
    pub signal: Arc<WorkerSignal>,
    pub stop: Arc<AtomicBool>,
    pub recognizer: Box<dyn Recognizer>,
    pub lexicon: Arc<ProfanityLexicon>,
    pub aligner: Arc<Mutex<LyricsAligner>>,
    pub metrics: Arc<SessionMetrics>,
    pub bus: EventBusRef,
    /// Latest track seen by the now-playing poller.
    pub latest_track: Arc<Mutex<Option<TrackInfo>>>,
    pub song: Arc<Mutex<SongState>>,
    pub lyrics_client: Option<Arc<LyricsClient>>,
    pub liveness: LivenessToken,
    pub censor_mode: CensorMode,
    pub pad_before_seconds: f64,
    pub pad_after_seconds: f64,
    pub recognizer_sample_rate: u32,
    pub report_dir: PathBuf,
}

pub struct RecognitionWorker {
    deps: WorkerDeps,
    refiner: TimestampRefiner,
    /// Chunk snapshot at the device rate, mono.
    chunk_buf: Vec<f32>,
    /// Chunk resampled to the recognizer rate.
    resampled: Vec<f32>,
    /// Seconds of heard audio since the current song started; drives the
    /// aligner's time-based search window.
    song_elapsed: f64,
    last_song_check: Option<Instant>,
    last_critical: bool,
    dropped_events: u64,
}

impl RecognitionWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            deps,
            refiner: TimestampRefiner::new(),
            chunk_buf: Vec::new(),
            resampled: Vec::new(),
            song_elapsed: 0.0,
            last_song_check: None,
            last_critical: false,
            dropped_events: 0,
        }
    }

    /// Blocking loop; returns when the stop flag is raised.
    pub fn run(&mut self) {
        tracing::info!(recognizer = self.deps.recognizer.name(), "recognition worker started");

        while !self.deps.stop.load(Ordering::Acquire) {
            if !self.process_one() {
                self.deps.signal.wait(IDLE_WAIT);
                self.maybe_check_song_change();
            }
        }

        tracing::info!("recognition worker exiting");
    }

    /// Process at most one descriptor. Returns whether one was processed.
    /// Public so tests and custom harnesses can drive the worker inline.
    pub fn process_one(&mut self) -> bool {
        let Some(descriptor) = self.deps.chunk_rx.pop() else {
            return false;
        };

        let started = Instant::now();
        self.process_chunk(&descriptor);
        self.deps
            .shared
            .chunk_in_flight
            .store(false, Ordering::Release);

        let chunk_seconds = descriptor.len as f64 / descriptor.sample_rate as f64;
        let rtf = started.elapsed().as_secs_f64() / chunk_seconds.max(f64::EPSILON);
        self.deps.metrics.record_rtf(rtf);
        if rtf > 1.0 {
            tracing::warn!(rtf = %format!("{rtf:.2}"), "chunk processed slower than real time");
        }

        self.publish_health(descriptor.sample_rate);
        self.maybe_check_song_change();
        true
    }

    fn process_chunk(&mut self, descriptor: &ChunkDescriptor) {
        let copied = self.deps.delay.copy_range_mono(
            &mut self.chunk_buf,
            descriptor.start_pos(),
            descriptor.len as usize,
        );
        if copied == 0 {
            tracing::warn!(
                start = descriptor.start_pos(),
                "chunk no longer in the delay line, dropped"
            );
            return;
        }

        let sample_rate = descriptor.sample_rate;
        let chunk_seconds = copied as f64 / sample_rate as f64;

        resample_linear(
            &self.chunk_buf,
            sample_rate,
            self.deps.recognizer_sample_rate,
            &mut self.resampled,
        );

        let segments = match self
            .deps
            .recognizer
            .transcribe(&self.resampled, self.deps.recognizer_sample_rate)
        {
            Ok(segments) => segments,
            Err(error) => {
                tracing::warn!(%error, "recognizer failed, chunk dropped");
                return;
            }
        };

        let mut words = expand_segments(&segments, chunk_seconds);
        words = merge_common_splits(words);
        for word in &mut words {
            self.refiner.refine(word, &self.chunk_buf, sample_rate);
        }

        if !words.is_empty() {
            self.deps.bus.emit(UiEvent::RawTranscript {
                text: join_words(&words),
            });
        }

        let song_base = self.song_elapsed;
        let final_words = self.align_words(&words, chunk_seconds);

        if final_words.is_empty() {
            tracing::debug!("no words for this chunk, nothing to censor");
            return;
        }

        self.deps.bus.emit(UiEvent::AlignedTranscript {
            text: join_words(&final_words),
        });

        let spans = find_profanity(&self.deps.lexicon, &final_words);
        for span in &spans {
            self.handle_span(descriptor, chunk_seconds, song_base, span);
        }
    }

    /// Lyrics correction with its fallback ladder: raw words when no
    /// lyrics, raw words when alignment comes back empty, prediction when
    /// the recognizer heard nothing but the aligner is locked on.
    fn align_words(&mut self, words: &[Word], chunk_seconds: f64) -> Vec<Word> {
        let mut aligner = self.deps.aligner.lock().expect("aligner mutex poisoned");

        if !aligner.is_ready() {
            return words.to_vec();
        }

        let aligned = aligner.align_chunk(words, self.song_elapsed);
        if !words.is_empty() {
            self.song_elapsed += chunk_seconds;
        }

        if aligned.is_empty() && !words.is_empty() {
            tracing::warn!("alignment returned empty, falling back to raw words");
            return words.to_vec();
        }

        if aligned.is_empty() && words.is_empty() && aligner.locked() {
            let predicted = aligner.predict_next(chunk_seconds);
            if !predicted.is_empty() {
                tracing::debug!(
                    count = predicted.len(),
                    cursor = aligner.cursor(),
                    "recognizer heard nothing, predicted lyric words"
                );
            }
            return predicted;
        }

        aligned
    }

    /// Pad, clamp, translate to absolute positions, and enqueue one span.
    fn handle_span(
        &mut self,
        descriptor: &ChunkDescriptor,
        chunk_seconds: f64,
        song_base: f64,
        span: &ProfanitySpan,
    ) {
        let mode = self.deps.censor_mode;
        let song_timestamp = song_base + span.start;

        // A rewrite this close to the playhead would race it; record the
        // miss and leave the audio alone.
        if self.deps.shared.critical_underrun() {
            tracing::warn!(word = %span.text, "buffer critical, censorship skipped");
            self.deps.metrics.record_censorship(
                &span.text,
                song_timestamp,
                false,
                mode.as_str(),
                span.multi_word,
            );
            self.deps.bus.emit(UiEvent::Censorship {
                text: span.text.clone(),
                start_seconds: span.start,
                end_seconds: span.end,
                mode: mode.as_str().to_string(),
                applied: false,
            });
            return;
        }

        let start_s = (span.start - self.deps.pad_before_seconds).max(0.0);
        let end_s = (span.end + self.deps.pad_after_seconds)
            .min(chunk_seconds)
            .max(start_s);

        let sr = descriptor.sample_rate as f64;
        let chunk_start = descriptor.start_pos();
        let start_pos = chunk_start + (start_s * sr).round() as u64;
        let end_pos = chunk_start + (end_s * sr).round() as u64;

        let event = CensorEvent::new(start_pos, end_pos, mode, &span.text);
        if !self.deps.censor_tx.push(event) {
            self.dropped_events += 1;
            tracing::warn!(
                word = %span.text,
                dropped_total = self.dropped_events,
                "censor queue full, event dropped"
            );
            return;
        }

        tracing::info!(
            word = %span.text,
            start_pos,
            end_pos,
            mode = mode.as_str(),
            multi_word = span.multi_word,
            "censor interval queued"
        );

        self.deps.metrics.record_censorship(
            &span.text,
            song_timestamp,
            true,
            mode.as_str(),
            span.multi_word,
        );

        self.deps
            .song
            .lock()
            .expect("song state mutex poisoned")
            .predictions
            .push(Prediction {
                text: span.text.clone(),
                timestamp: song_timestamp,
                mode: mode.as_str().to_string(),
                multi_word: span.multi_word,
            });

        self.deps.bus.emit(UiEvent::Censorship {
            text: span.text.clone(),
            start_seconds: start_s,
            end_seconds: end_s,
            mode: mode.as_str().to_string(),
            applied: true,
        });
    }

    /// Fold the callback's lock-free counters into the metrics sink and
    /// emit UI health events. Runs once per chunk, never on the callback.
    fn publish_health(&mut self, sample_rate: u32) {
        let shared = &self.deps.shared;
        let metrics = &self.deps.metrics;

        let gap_seconds = self.deps.delay.current_gap() as f64 / sample_rate as f64;
        metrics.record_buffer_seconds(gap_seconds);
        metrics.record_underruns(shared.underrun_count.load(Ordering::Relaxed));
        metrics.record_peak_level(shared.peak_level() as f64);
        metrics.record_clipping_events(shared.clipping_events.load(Ordering::Relaxed));
        metrics
            .update_session_seconds(self.deps.delay.write_pos() as f64 / sample_rate as f64);

        self.deps.bus.emit(UiEvent::Level {
            rms: shared.input_level(),
        });
        self.deps.bus.emit(UiEvent::BufferSeconds {
            seconds: gap_seconds,
        });

        let critical = shared.critical_underrun();
        if critical != self.last_critical {
            self.deps.bus.emit(UiEvent::Underrun { active: critical });
            self.last_critical = critical;
        }
    }

    /// Watch the now-playing source for a song change.
    ///
    /// Cheap by design: with lyrics loaded the check only runs in the last
    /// 10% of the song every 3 s (anticipating the queued track); with no
    /// lyrics it runs every 10 s to catch fetch failures and lyric-less
    /// songs.
    fn maybe_check_song_change(&mut self) {
        let (ready, near_end) = {
            let aligner = self.deps.aligner.lock().expect("aligner mutex poisoned");
            (aligner.is_ready(), aligner.progress() >= NEAR_END_PROGRESS)
        };

        let interval = if ready && near_end {
            NEAR_END_CHECK_INTERVAL
        } else if !ready {
            NO_LYRICS_CHECK_INTERVAL
        } else {
            return;
        };

        let due = self
            .last_song_check
            .map(|at| at.elapsed() >= interval)
            .unwrap_or(true);
        if !due {
            return;
        }
        self.last_song_check = Some(Instant::now());

        let Some(track) = self
            .deps
            .latest_track
            .lock()
            .expect("track mutex poisoned")
            .clone()
        else {
            return;
        };

        let changed = {
            let song = self.deps.song.lock().expect("song state mutex poisoned");
            song.track
                .as_ref()
                .map(|current| !current.same_song(&track))
                .unwrap_or(true)
        };

        if changed {
            self.switch_song(track);
        }
    }

    fn switch_song(&mut self, track: TrackInfo) {
        tracing::info!(artist = %track.artist, title = %track.title, "song changed");

        let previous = {
            let mut song = self.deps.song.lock().expect("song state mutex poisoned");
            std::mem::replace(
                &mut *song,
                SongState {
                    track: Some(track.clone()),
                    predictions: Vec::new(),
                },
            )
        };

        if let Some(prev_track) = previous.track {
            if let Err(error) = write_song_report(
                &self.deps.report_dir,
                &prev_track.artist,
                &prev_track.title,
                &previous.predictions,
            ) {
                tracing::warn!(%error, "failed to write song report");
            }
        }

        self.song_elapsed = 0.0;
        self.deps
            .aligner
            .lock()
            .expect("aligner mutex poisoned")
            .reset();

        self.deps.bus.emit(UiEvent::SongMetadata {
            artist: track.artist.clone(),
            title: track.title.clone(),
            is_playing: track.is_playing,
        });

        self.spawn_lyrics_fetch(track);
    }

    /// Fetch lyrics on a detached thread. The liveness generation captured
    /// here is re-checked before publishing so a fetch that loses the race
    /// with teardown (or yet another song change) is discarded.
    fn spawn_lyrics_fetch(&self, track: TrackInfo) {
        let Some(client) = self.deps.lyrics_client.clone() else {
            return;
        };
        let aligner = Arc::clone(&self.deps.aligner);
        let liveness = self.deps.liveness.clone();
        let generation = liveness.current();

        std::thread::spawn(move || {
            let result = client.fetch(&track.artist, &track.title);

            if !liveness.is_live(generation) {
                tracing::debug!(
                    artist = %track.artist,
                    title = %track.title,
                    "lyrics fetch completed after teardown, discarded"
                );
                return;
            }

            match result {
                Ok(Some(lyrics)) => {
                    aligner
                        .lock()
                        .expect("aligner mutex poisoned")
                        .set_lyrics(&lyrics);
                }
                Ok(None) => {
                    tracing::info!(
                        artist = %track.artist,
                        title = %track.title,
                        "no lyrics available, alignment disabled for this song"
                    );
                }
                Err(error) => {
                    tracing::warn!(%error, "lyrics fetch failed, using raw recognition");
                }
            }
        });
    }
}

fn join_words(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resample by linear interpolation.
///
/// Chunks are one-shot snapshots, so a stateless resampler is enough; the
/// recognizer does not care about inter-chunk phase.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32, output: &mut Vec<f32>) {
    output.clear();

    if input.is_empty() || from_rate == 0 || to_rate == 0 {
        return;
    }
    if from_rate == to_rate {
        output.extend_from_slice(input);
        return;
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (input.len() as f64 / ratio) as usize;
    output.reserve(out_len);

    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx = src as usize;
        let frac = (src - idx as f64) as f32;

        let sample = if idx + 1 < input.len() {
            input[idx] * (1.0 - frac) + input[idx + 1] * frac
        } else {
            input[input.len() - 1]
        };
        output.push(sample);
    }
}
