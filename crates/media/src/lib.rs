mod liveness;
mod lyrics;
mod poller;
mod provider;

pub use liveness::LivenessToken;
pub use lyrics::{LyricsClient, DEFAULT_LYRICS_API};
pub use poller::{NowPlayingPoller, TrackCallback, DEFAULT_POLL_INTERVAL};
pub use provider::{NowPlayingProvider, NullProvider, StaticProvider, TrackInfo};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("lyrics request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed lyrics response")]
    MalformedResponse,
}

pub type Result<T> = std::result::Result<T, MediaError>;
