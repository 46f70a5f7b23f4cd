mod engine;
pub mod text;

pub use engine::{expand_segments, NullRecognizer, Recognizer, Segment, Word};

/// Default rate recognizers expect chunks at.
pub const RECOGNIZER_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("model not loaded")]
    ModelNotLoaded,
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("invalid audio format")]
    InvalidAudioFormat,
}

pub type Result<T> = std::result::Result<T, SttError>;
