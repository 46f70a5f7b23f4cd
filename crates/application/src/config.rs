//! Session configuration.

use std::path::{Path, PathBuf};

use bleep_audio::{CensorMode, EngineParams};

/// Everything tunable about a filtering session. All fields have working
/// defaults; a JSON file can override any subset.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Recognition window per worker call, seconds.
    pub chunk_seconds: f64,
    /// Playback delay (and initial fill target), seconds.
    pub initial_delay_seconds: f64,
    /// Delay ring capacity, seconds. Defaults to the delay plus a 10 s
    /// safety margin.
    pub delay_capacity_seconds: Option<f64>,
    pub censor_mode: CensorMode,
    /// Rewrite padding ahead of a detected word, seconds. Larger than the
    /// trailing pad because recognizers timestamp late.
    pub pad_before_seconds: f64,
    /// Rewrite padding after a detected word, seconds.
    pub pad_after_seconds: f64,
    /// Rate chunks are resampled to before recognition.
    pub recognizer_sample_rate: u32,
    /// Buffer level below which rewrites are suppressed, seconds.
    /// Defaults to `chunk_seconds + 0.5`.
    pub min_buffer_before_strip_censor: Option<f64>,
    pub lexicon_path: PathBuf,
    /// Directory for per-song prediction reports.
    pub report_dir: PathBuf,
    /// Capture device name; `None` uses the system default.
    pub input_device: Option<String>,
    /// Playback device name; `None` uses the system default.
    pub output_device: Option<String>,
    pub sample_rate: u32,
    pub channels: usize,
    /// Override for the lyrics API endpoint.
    pub lyrics_api_url: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 2.0,
            initial_delay_seconds: 3.0,
            delay_capacity_seconds: None,
            censor_mode: CensorMode::Reverse,
            pad_before_seconds: 0.4,
            pad_after_seconds: 0.1,
            recognizer_sample_rate: bleep_stt::RECOGNIZER_SAMPLE_RATE,
            min_buffer_before_strip_censor: None,
            lexicon_path: PathBuf::from("lexicons/profanity_en.txt"),
            report_dir: PathBuf::from("TestLogs"),
            input_device: None,
            output_device: None,
            sample_rate: 48000,
            channels: 2,
            lyrics_api_url: None,
        }
    }
}

impl FilterConfig {
    /// Load a config from a JSON file, falling back to defaults for any
    /// field the file omits.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.chunk_seconds <= 0.0 {
            return Err(crate::PipelineError::Config(
                "chunk_seconds must be positive".to_string(),
            ));
        }
        if self.initial_delay_seconds < self.critical_seconds() {
            return Err(crate::PipelineError::Config(format!(
                "initial_delay_seconds ({}) must be at least chunk_seconds + 0.5 ({})",
                self.initial_delay_seconds,
                self.critical_seconds()
            )));
        }
        if self.delay_capacity() < self.initial_delay_seconds {
            return Err(crate::PipelineError::Config(
                "delay_capacity_seconds is smaller than the playback delay".to_string(),
            ));
        }
        if self.pad_before_seconds < 0.0 || self.pad_after_seconds < 0.0 {
            return Err(crate::PipelineError::Config(
                "padding must be non-negative".to_string(),
            ));
        }
        if self.sample_rate == 0 || self.recognizer_sample_rate == 0 {
            return Err(crate::PipelineError::Config(
                "sample rates must be non-zero".to_string(),
            ));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(crate::PipelineError::Config(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        Ok(())
    }

    /// Ring capacity in seconds, including the safety margin.
    pub fn delay_capacity(&self) -> f64 {
        self.delay_capacity_seconds
            .unwrap_or(self.initial_delay_seconds + 10.0)
    }

    /// Buffer level below which rewrites are suppressed.
    pub fn critical_seconds(&self) -> f64 {
        self.min_buffer_before_strip_censor
            .unwrap_or(self.chunk_seconds + 0.5)
    }

    /// Engine geometry for this configuration.
    pub fn engine_params(&self) -> EngineParams {
        let sr = self.sample_rate as f64;
        let start = (self.initial_delay_seconds * sr) as u64;
        EngineParams {
            sample_rate: self.sample_rate,
            channels: self.channels,
            chunk_samples: (self.chunk_seconds * sr) as usize,
            start_threshold: start,
            pause_threshold: start.saturating_sub((2.0 * sr) as u64),
            critical_threshold: (self.critical_seconds() * sr) as u64,
        }
    }

    pub fn chunk_samples(&self) -> usize {
        (self.chunk_seconds * self.sample_rate as f64) as usize
    }

    pub fn delay_capacity_samples(&self) -> usize {
        (self.delay_capacity() * self.sample_rate as f64) as usize
    }
}
