//! Pipeline behavior end to end, without an audio device: the engine is
//! driven block by block the way a callback would, and the worker is
//! stepped inline between blocks.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use bleep_align::LyricsAligner;
use bleep_application::{RecognitionWorker, SongState, WorkerDeps};
use bleep_audio::{
    fade_len, spsc_channel, CensorMode, DelayLine, EngineParams, EngineShared, FilterEngine,
    PlaybackState, WorkerSignal, AUDIO_CHUNK_QUEUE_CAPACITY, CENSOR_EVENT_QUEUE_CAPACITY,
    REVERSE_SCALE,
};
use bleep_events::{EventBusRef, InMemoryBus, UiEvent};
use bleep_lexicon::ProfanityLexicon;
use bleep_media::LivenessToken;
use bleep_metrics::SessionMetrics;
use bleep_stt::{Recognizer, Segment};

const SR: u32 = 1000;
const CHUNK: usize = 100; // 0.1 s
const START: u64 = 300; // 0.3 s delay

struct ScriptedRecognizer {
    responses: VecDeque<Vec<Segment>>,
}

impl Recognizer for ScriptedRecognizer {
    fn transcribe(
        &mut self,
        _samples: &[f32],
        _sample_rate: u32,
    ) -> bleep_stt::Result<Vec<Segment>> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct TestPipeline {
    engine: FilterEngine,
    worker: RecognitionWorker,
    shared: Arc<EngineShared>,
    delay: Arc<DelayLine>,
    metrics: Arc<SessionMetrics>,
    bus: Arc<InMemoryBus>,
}

fn pipeline(mode: CensorMode, script: Vec<Vec<Segment>>) -> TestPipeline {
    let params = EngineParams {
        sample_rate: SR,
        channels: 1,
        chunk_samples: CHUNK,
        start_threshold: START,
        pause_threshold: 100,
        critical_threshold: 150,
    };

    let delay = Arc::new(DelayLine::new(1, 1 << 14).unwrap());
    let (chunk_tx, chunk_rx) = spsc_channel(AUDIO_CHUNK_QUEUE_CAPACITY);
    let (censor_tx, censor_rx) = spsc_channel(CENSOR_EVENT_QUEUE_CAPACITY);
    let shared = Arc::new(EngineShared::default());
    let signal = Arc::new(WorkerSignal::new());
    let metrics = Arc::new(SessionMetrics::new());
    let bus = Arc::new(InMemoryBus::new());

    let engine = FilterEngine::new(
        Arc::clone(&delay),
        chunk_tx,
        censor_rx,
        Arc::clone(&shared),
        Arc::clone(&signal),
        params,
    )
    .unwrap();

    let worker = RecognitionWorker::new(WorkerDeps {
        delay: Arc::clone(&delay),
        chunk_rx,
        censor_tx,
        shared: Arc::clone(&shared),
        signal,
        stop: Arc::new(AtomicBool::new(false)),
        recognizer: Box::new(ScriptedRecognizer {
            responses: script.into(),
        }),
        lexicon: Arc::new(ProfanityLexicon::from_entries(["damn"])),
        aligner: Arc::new(Mutex::new(LyricsAligner::new())),
        metrics: Arc::clone(&metrics),
        bus: Arc::clone(&bus) as EventBusRef,
        latest_track: Arc::new(Mutex::new(None)),
        song: Arc::new(Mutex::new(SongState::default())),
        lyrics_client: None,
        liveness: LivenessToken::new(),
        censor_mode: mode,
        pad_before_seconds: 0.04,
        pad_after_seconds: 0.01,
        recognizer_sample_rate: SR,
        report_dir: std::env::temp_dir().join("bleep-e2e-tests"),
    });

    TestPipeline {
        engine,
        worker,
        shared,
        delay,
        metrics,
        bus,
    }
}

fn run_block(p: &mut TestPipeline, input: &[f32]) -> Vec<f32> {
    let mut output = vec![0.0f32; input.len()];
    p.engine.process_block(input, &mut output);
    output
}

fn segment(tokens: &[&str], start: f64, end: f64) -> Segment {
    Segment {
        tokens: tokens.iter().map(|t| t.to_string()).collect(),
        start,
        end,
    }
}

#[test]
fn test_happy_path_detected_word_is_muted_in_output() {
    // "hello damn world" over the first chunk; "damn" spans [0.0333, 0.0667)
    // and the pads widen the rewrite to [0, 0.0767) -> positions [0, 76).
    let script = vec![vec![segment(&["hello", "damn", "world"], 0.0, 0.1)]];
    let mut p = pipeline(CensorMode::Mute, script);

    // Block 1 fills the first chunk and posts its descriptor.
    run_block(&mut p, &[0.5f32; CHUNK]);
    assert!(p.worker.process_one());

    // Blocks 2 and 3: the engine drains the censor event (applying the
    // mute to still-unplayed samples) while the delay keeps filling.
    run_block(&mut p, &[0.5f32; CHUNK]);
    run_block(&mut p, &[0.5f32; CHUNK]);
    assert_eq!(p.shared.state(), PlaybackState::Filling);

    // Block 4 crosses the fill threshold and plays positions 0..100.
    let out = run_block(&mut p, &[0.5f32; CHUNK]);
    assert_eq!(p.shared.state(), PlaybackState::Playing);

    let fade = fade_len(SR, 76);
    // Interior of the rewrite is silent in the actual output.
    for (i, &sample) in out.iter().enumerate().take(76 - fade).skip(fade) {
        assert_eq!(sample, 0.0, "output sample {i} should be muted");
    }
    // Samples past the rewrite play through untouched.
    for (i, &sample) in out.iter().enumerate().take(100).skip(77) {
        assert_eq!(sample, 0.5, "output sample {i} should pass through");
    }

    // Exactly one censorship event, recorded and published.
    let metrics = p.metrics.snapshot();
    assert_eq!(metrics.words_detected, 1);
    assert_eq!(metrics.words_censored, 1);
    assert_eq!(metrics.words_skipped, 0);
    assert_eq!(
        p.bus
            .count_where(|e| matches!(e, UiEvent::Censorship { applied: true, .. })),
        1
    );
    assert_eq!(p.shared.late_events.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[test]
fn test_reverse_mode_writes_reversed_scaled_audio() {
    // "damn" at [0.02, 0.06); pads widen to [0, 0.07) -> positions [0, 70).
    let script = vec![vec![segment(&["damn"], 0.02, 0.06)]];
    let mut p = pipeline(CensorMode::Reverse, script);

    // A ramp makes reversal observable.
    let input: Vec<f32> = (0..CHUNK).map(|i| i as f32 / 1000.0).collect();
    run_block(&mut p, &input);
    assert!(p.worker.process_one());

    // Next block applies the rewrite.
    run_block(&mut p, &[0.0f32; CHUNK]);

    let len = 70usize;
    let fade = fade_len(SR, len);
    for i in fade..len - fade {
        let expected = input[len - 1 - i] * REVERSE_SCALE;
        let actual = p.delay.read_at(0, i as u64);
        assert!(
            (actual - expected).abs() < 1e-6,
            "position {i}: {actual} != {expected}"
        );
    }
    // Boundary fades start and end at zero-ish amplitude.
    assert_eq!(p.delay.read_at(0, 0), 0.0);
}

#[test]
fn test_critical_underrun_skips_rewrite_and_recovers() {
    let script = vec![
        vec![segment(&["damn"], 0.02, 0.06)],
        vec![segment(&["damn"], 0.02, 0.06)],
    ];
    let mut p = pipeline(CensorMode::Mute, script);

    // Fill to the playback threshold; the first chunk descriptor is
    // already waiting for the worker.
    for _ in 0..3 {
        run_block(&mut p, &[0.5f32; CHUNK]);
    }

    // Input stalls while output keeps draining: the gap shrinks under the
    // critical threshold but playback continues.
    let mut output = vec![0.0f32; 160];
    p.engine.process_block(&[], &mut output);
    assert_eq!(p.shared.state(), PlaybackState::Playing);
    assert!(p.shared.critical_underrun());

    // The worker sees the critical flag and records a skip instead of
    // queueing a rewrite.
    assert!(p.worker.process_one());
    let metrics = p.metrics.snapshot();
    assert_eq!(metrics.words_detected, 1);
    assert_eq!(metrics.words_skipped, 1);
    assert_eq!(metrics.words_censored, 0);

    // Nothing was muted.
    assert_eq!(p.delay.read_at(0, 30), 0.5);

    // Input catches up while the output side stalls: the gap recovers
    // past the start threshold and the critical flag clears on the next
    // played frame.
    let mut no_output: Vec<f32> = Vec::new();
    p.engine.process_block(&[0.5f32; 200], &mut no_output);
    let mut output = vec![0.0f32; 1];
    p.engine.process_block(&[0.5f32; 1], &mut output);
    assert!(!p.shared.critical_underrun());

    // The descriptor posted while catching up is processed normally now.
    assert!(p.worker.process_one());
    assert_eq!(p.metrics.snapshot().words_censored, 1);
}
