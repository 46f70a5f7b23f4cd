//! Pipeline assembly and lifecycle.
//!
//! `PipelineHandle::start` is the only fallible surface of the system:
//! lexicon load, delay allocation, and device open all fail here with a
//! readable message, and partial state is torn down on the way out. After
//! that, everything recoverable turns into counters and log lines.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bleep_align::LyricsAligner;
use bleep_audio::{
    find_device, run_duplex, spsc_channel, DelayLine, DeviceDirection, DuplexStream, EngineShared,
    FilterEngine, PlaybackState, WorkerSignal, AUDIO_CHUNK_QUEUE_CAPACITY,
    CENSOR_EVENT_QUEUE_CAPACITY,
};
use bleep_events::EventBusRef;
use bleep_lexicon::ProfanityLexicon;
use bleep_media::{LivenessToken, LyricsClient, NowPlayingPoller, NowPlayingProvider, TrackInfo};
use bleep_metrics::SessionMetrics;
use bleep_stt::Recognizer;

use crate::config::FilterConfig;
use crate::report::write_song_report;
use crate::worker::{RecognitionWorker, SongState, WorkerDeps};

/// A running filter pipeline. Dropping the handle stops it.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    signal: Arc<WorkerSignal>,
    worker: Option<JoinHandle<()>>,
    streams: Option<DuplexStream>,
    poller: NowPlayingPoller,
    liveness: LivenessToken,
    shared: Arc<EngineShared>,
    delay: Arc<DelayLine>,
    metrics: Arc<SessionMetrics>,
    song: Arc<Mutex<SongState>>,
    report_dir: PathBuf,
    sample_rate: u32,
}

impl PipelineHandle {
    /// Build and start the whole pipeline: delay line, engine, duplex
    /// streams, recognition worker, and now-playing poller.
    pub fn start(
        config: &FilterConfig,
        recognizer: Box<dyn Recognizer>,
        provider: Arc<dyn NowPlayingProvider>,
        bus: EventBusRef,
    ) -> crate::Result<Self> {
        config.validate()?;

        let lexicon = Arc::new(ProfanityLexicon::load(&config.lexicon_path)?);

        let delay = Arc::new(DelayLine::new(
            config.channels,
            config.delay_capacity_samples(),
        )?);
        let (chunk_tx, chunk_rx) = spsc_channel(AUDIO_CHUNK_QUEUE_CAPACITY);
        let (censor_tx, censor_rx) = spsc_channel(CENSOR_EVENT_QUEUE_CAPACITY);
        let shared = Arc::new(EngineShared::default());
        let signal = Arc::new(WorkerSignal::new());
        let stop = Arc::new(AtomicBool::new(false));

        let engine = FilterEngine::new(
            Arc::clone(&delay),
            chunk_tx,
            censor_rx,
            Arc::clone(&shared),
            Arc::clone(&signal),
            config.engine_params(),
        )?;

        let metrics = Arc::new(SessionMetrics::new());
        let aligner = Arc::new(Mutex::new(LyricsAligner::new()));
        let song = Arc::new(Mutex::new(SongState::default()));
        let latest_track: Arc<Mutex<Option<TrackInfo>>> = Arc::new(Mutex::new(None));
        let liveness = LivenessToken::new();

        let lyrics_client = match &config.lyrics_api_url {
            Some(url) => Some(Arc::new(LyricsClient::with_base_url(url)?)),
            None => Some(Arc::new(LyricsClient::new()?)),
        };

        let mut worker = RecognitionWorker::new(WorkerDeps {
            delay: Arc::clone(&delay),
            chunk_rx,
            censor_tx,
            shared: Arc::clone(&shared),
            signal: Arc::clone(&signal),
            stop: Arc::clone(&stop),
            recognizer,
            lexicon,
            aligner,
            metrics: Arc::clone(&metrics),
            bus,
            latest_track: Arc::clone(&latest_track),
            song: Arc::clone(&song),
            lyrics_client,
            liveness: liveness.clone(),
            censor_mode: config.censor_mode,
            pad_before_seconds: config.pad_before_seconds,
            pad_after_seconds: config.pad_after_seconds,
            recognizer_sample_rate: config.recognizer_sample_rate,
            report_dir: config.report_dir.clone(),
        });

        let worker_handle = std::thread::Builder::new()
            .name("bleep-recognition".to_string())
            .spawn(move || worker.run())
            .map_err(crate::PipelineError::Io)?;

        // Device open comes after the worker so a failure here can still
        // tear the worker down cleanly.
        let streams = (|| {
            let input = find_device(DeviceDirection::Input, config.input_device.as_deref())?;
            let output = find_device(DeviceDirection::Output, config.output_device.as_deref())?;
            run_duplex(engine, &input, &output)
        })();

        let streams = match streams {
            Ok(streams) => streams,
            Err(error) => {
                stop.store(true, Ordering::Release);
                signal.notify();
                let _ = worker_handle.join();
                return Err(error.into());
            }
        };

        let mut poller = NowPlayingPoller::new();
        poller.start(provider, {
            let latest_track = Arc::clone(&latest_track);
            Arc::new(move |track: TrackInfo| {
                *latest_track.lock().expect("track mutex poisoned") = Some(track);
            })
        });

        tracing::info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            delay_seconds = config.initial_delay_seconds,
            chunk_seconds = config.chunk_seconds,
            mode = config.censor_mode.as_str(),
            "filter pipeline started"
        );

        Ok(Self {
            stop,
            signal,
            worker: Some(worker_handle),
            streams: Some(streams),
            poller,
            liveness,
            shared,
            delay,
            metrics,
            song,
            report_dir: config.report_dir.clone(),
            sample_rate: config.sample_rate,
        })
    }

    /// Current playback gating state.
    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Delay buffer fill, in seconds.
    pub fn buffer_seconds(&self) -> f64 {
        self.delay.current_gap() as f64 / self.sample_rate as f64
    }

    /// Rolling input level (linear RMS).
    pub fn input_level(&self) -> f32 {
        self.shared.input_level()
    }

    pub fn is_underrun(&self) -> bool {
        self.shared.critical_underrun()
    }

    pub fn metrics(&self) -> Arc<SessionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Stop the pipeline and return the session report.
    ///
    /// Order matters: raise the stop flag and wake the worker, close the
    /// audio device (which quiesces the callback), join the worker, then
    /// flush the final song report. Detached lyric fetches may outlive us;
    /// the invalidated liveness token makes their results fall on the
    /// floor.
    pub fn stop(mut self) -> String {
        self.shutdown();
        self.metrics.report()
    }

    fn shutdown(&mut self) {
        if self.worker.is_none() {
            return;
        }

        tracing::info!("stopping filter pipeline");

        self.stop.store(true, Ordering::Release);
        self.signal.notify();

        // Dropping the streams stops the device callbacks.
        self.streams.take();

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        let final_song = {
            let mut song = self.song.lock().expect("song state mutex poisoned");
            std::mem::take(&mut *song)
        };
        if let Some(track) = final_song.track {
            if let Err(error) = write_song_report(
                &self.report_dir,
                &track.artist,
                &track.title,
                &final_song.predictions,
            ) {
                tracing::warn!(%error, "failed to write final song report");
            }
        }

        self.liveness.invalidate();
        self.poller.stop();

        tracing::info!("filter pipeline stopped");
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
