mod config;
mod pipeline;
mod report;
mod worker;

pub use config::FilterConfig;
pub use pipeline::PipelineHandle;
pub use report::{write_song_report, Prediction};
pub use worker::{resample_linear, RecognitionWorker, SongState, WorkerDeps};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Audio(#[from] bleep_audio::AudioError),
    #[error(transparent)]
    Lexicon(#[from] bleep_lexicon::LexiconError),
    #[error(transparent)]
    Media(#[from] bleep_media::MediaError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
