mod delay_line;
mod device;
mod engine;
mod queue;
mod rewrite;
mod stream;
mod types;

pub use delay_line::DelayLine;
pub use device::{
    find_device, find_virtual_device, list_devices, AudioDevice, DeviceDirection, DeviceType,
};
pub use engine::{EngineParams, EngineShared, FilterEngine, PlaybackState, WorkerSignal};
pub use queue::{spsc_channel, Consumer, Producer};
pub use rewrite::{apply_mute, apply_reverse, fade_len, REVERSE_SCALE};
pub use stream::{run_duplex, DuplexStream};
pub use types::{CensorEvent, CensorMode, ChunkDescriptor, LABEL_CAPACITY};

/// Capacity of the chunk-descriptor queue (callback -> worker).
pub const AUDIO_CHUNK_QUEUE_CAPACITY: usize = 64;

/// Capacity of the censor-event queue (worker -> callback).
pub const CENSOR_EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
    #[error("stream error: {0}")]
    StreamError(String),
    #[error("device error: {0}")]
    DeviceError(#[from] cpal::DevicesError),
    #[error("build stream error: {0}")]
    BuildStreamError(#[from] cpal::BuildStreamError),
}

pub type Result<T> = std::result::Result<T, AudioError>;
