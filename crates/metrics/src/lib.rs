//! Session quality metrics for the filtering pipeline.
//!
//! One mutex-guarded accumulator, written by the worker and read by
//! whoever wants a report. The audio callback never touches this; it
//! publishes lock-free atomics that the worker folds in once per chunk.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

/// Bounded history of censorship events.
const MAX_EVENT_HISTORY: usize = 1000;

/// Outcome of one detected word or phrase.
#[derive(Debug, Clone)]
pub struct CensorshipEvent {
    pub text: String,
    /// Seconds into the song/stream at detection.
    pub timestamp: f64,
    /// Seconds into the session when the detection happened.
    pub detection_time: f64,
    pub censored: bool,
    pub mode: String,
    pub multi_word: bool,
}

/// Aggregated session counters.
#[derive(Debug, Clone)]
pub struct QualityMetrics {
    pub words_detected: u64,
    pub words_censored: u64,
    pub words_skipped: u64,
    pub multi_word_detections: u64,
    pub rtf_samples: u64,
    pub average_rtf: f64,
    pub min_rtf: f64,
    pub max_rtf: f64,
    pub buffer_samples: u64,
    pub average_buffer_seconds: f64,
    pub min_buffer_seconds: f64,
    pub max_buffer_seconds: f64,
    pub underrun_count: u64,
    pub peak_level: f64,
    pub clipping_events: u64,
    pub session_seconds: f64,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            words_detected: 0,
            words_censored: 0,
            words_skipped: 0,
            multi_word_detections: 0,
            rtf_samples: 0,
            average_rtf: 0.0,
            min_rtf: f64::INFINITY,
            max_rtf: 0.0,
            buffer_samples: 0,
            average_buffer_seconds: 0.0,
            min_buffer_seconds: f64::INFINITY,
            max_buffer_seconds: 0.0,
            underrun_count: 0,
            peak_level: 0.0,
            clipping_events: 0,
            session_seconds: 0.0,
        }
    }
}

struct Inner {
    metrics: QualityMetrics,
    history: VecDeque<CensorshipEvent>,
    session_start: Instant,
}

/// Thread-safe metrics sink.
pub struct SessionMetrics {
    inner: Mutex<Inner>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                metrics: QualityMetrics::default(),
                history: VecDeque::with_capacity(MAX_EVENT_HISTORY),
                session_start: Instant::now(),
            }),
        }
    }

    /// Reset everything and restart the session clock.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.metrics = QualityMetrics::default();
        inner.history.clear();
        inner.session_start = Instant::now();
    }

    /// Record one detection outcome (censored or skipped).
    pub fn record_censorship(
        &self,
        text: &str,
        timestamp: f64,
        censored: bool,
        mode: &str,
        multi_word: bool,
    ) {
        let mut inner = self.lock();
        let detection_time = inner.session_start.elapsed().as_secs_f64();

        if inner.history.len() >= MAX_EVENT_HISTORY {
            inner.history.pop_front();
        }
        inner.history.push_back(CensorshipEvent {
            text: text.to_string(),
            timestamp,
            detection_time,
            censored,
            mode: mode.to_string(),
            multi_word,
        });

        inner.metrics.words_detected += 1;
        if censored {
            inner.metrics.words_censored += 1;
        } else {
            inner.metrics.words_skipped += 1;
        }
        if multi_word {
            inner.metrics.multi_word_detections += 1;
        }
    }

    /// Record one chunk's real-time factor.
    pub fn record_rtf(&self, rtf: f64) {
        let mut inner = self.lock();
        let m = &mut inner.metrics;
        m.rtf_samples += 1;
        m.average_rtf = (m.average_rtf * (m.rtf_samples - 1) as f64 + rtf) / m.rtf_samples as f64;
        m.min_rtf = m.min_rtf.min(rtf);
        m.max_rtf = m.max_rtf.max(rtf);
    }

    /// Record an observation of the delay buffer fill, in seconds.
    pub fn record_buffer_seconds(&self, seconds: f64) {
        let mut inner = self.lock();
        let m = &mut inner.metrics;
        m.buffer_samples += 1;
        m.average_buffer_seconds = (m.average_buffer_seconds * (m.buffer_samples - 1) as f64
            + seconds)
            / m.buffer_samples as f64;
        m.min_buffer_seconds = m.min_buffer_seconds.min(seconds);
        m.max_buffer_seconds = m.max_buffer_seconds.max(seconds);
    }

    pub fn record_underruns(&self, count: u64) {
        self.lock().metrics.underrun_count = count;
    }

    pub fn record_peak_level(&self, level: f64) {
        let mut inner = self.lock();
        inner.metrics.peak_level = inner.metrics.peak_level.max(level.abs());
    }

    pub fn record_clipping_events(&self, count: u64) {
        self.lock().metrics.clipping_events = count;
    }

    pub fn update_session_seconds(&self, seconds: f64) {
        self.lock().metrics.session_seconds = seconds;
    }

    pub fn snapshot(&self) -> QualityMetrics {
        self.lock().metrics.clone()
    }

    /// Most recent events, newest last, at most `max`.
    pub fn recent_events(&self, max: usize) -> Vec<CensorshipEvent> {
        let inner = self.lock();
        let skip = inner.history.len().saturating_sub(max);
        inner.history.iter().skip(skip).cloned().collect()
    }

    /// Derived quality score in [0, 100].
    ///
    /// Penalties: skip rate up to 30, RTF over 1.0 up to 20, underruns up
    /// to 20, clipping up to 15. Bonus: multi-word detection rate up to 5.
    pub fn quality_score(&self) -> f64 {
        score(&self.lock().metrics)
    }

    /// Formatted end-of-session report.
    pub fn report(&self) -> String {
        let inner = self.lock();
        let m = &inner.metrics;
        let mut out = String::new();

        out.push_str("========================================\n");
        out.push_str("  SESSION QUALITY REPORT\n");
        out.push_str("========================================\n\n");
        out.push_str(&format!("Generated: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("Duration: {:.2} s\n", m.session_seconds));
        out.push_str(&format!("Quality score: {:.1}/100\n\n", score(m)));

        out.push_str("CENSORSHIP:\n");
        out.push_str(&format!("  Words detected: {}\n", m.words_detected));
        out.push_str(&format!("  Words censored: {}\n", m.words_censored));
        out.push_str(&format!("  Words skipped (underrun): {}\n", m.words_skipped));
        out.push_str(&format!("  Multi-word detections: {}\n", m.multi_word_detections));
        if m.words_detected > 0 {
            out.push_str(&format!(
                "  Censor success rate: {:.1}%\n",
                m.words_censored as f64 / m.words_detected as f64 * 100.0
            ));
        }
        out.push('\n');

        out.push_str("PERFORMANCE:\n");
        out.push_str(&format!("  Average RTF: {:.2}x\n", m.average_rtf));
        if m.rtf_samples > 0 {
            out.push_str(&format!("  Min RTF: {:.2}x\n", m.min_rtf));
            out.push_str(&format!("  Max RTF: {:.2}x\n", m.max_rtf));
        }
        out.push_str(&format!("  Buffer underruns: {}\n\n", m.underrun_count));

        out.push_str("BUFFER HEALTH:\n");
        out.push_str(&format!("  Average: {:.2} s\n", m.average_buffer_seconds));
        if m.buffer_samples > 0 {
            out.push_str(&format!("  Min: {:.2} s\n", m.min_buffer_seconds));
            out.push_str(&format!("  Max: {:.2} s\n", m.max_buffer_seconds));
        }
        out.push('\n');

        out.push_str("AUDIO:\n");
        out.push_str(&format!("  Peak level: {:.1}%\n", m.peak_level * 100.0));
        out.push_str(&format!("  Clipping events: {}\n\n", m.clipping_events));

        out.push_str("RECENT EVENTS:\n");
        let recent = inner.history.len().saturating_sub(10);
        for event in inner.history.iter().skip(recent) {
            out.push_str(&format!(
                "  [{:.2}s] \"{}\" - {}\n",
                event.timestamp,
                event.text,
                if event.censored { event.mode.as_str() } else { "SKIPPED" }
            ));
        }

        out.push_str("\n========================================\n");
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("metrics mutex poisoned")
    }
}

fn score(m: &QualityMetrics) -> f64 {
    let mut score = 100.0;

    if m.words_detected > 0 {
        let skip_rate = m.words_skipped as f64 / m.words_detected as f64;
        score -= skip_rate * 30.0;
    }

    if m.average_rtf > 1.0 {
        score -= ((m.average_rtf - 1.0) * 20.0).min(20.0);
    }

    if m.underrun_count > 0 {
        score -= (m.underrun_count as f64 * 5.0).min(20.0);
    }

    if m.clipping_events > 0 {
        score -= (m.clipping_events as f64 * 2.0).min(15.0);
    }

    if m.words_detected > 0 {
        let multi_rate = m.multi_word_detections as f64 / m.words_detected as f64;
        score += multi_rate * 5.0;
    }

    score.clamp(0.0, 100.0)
}
