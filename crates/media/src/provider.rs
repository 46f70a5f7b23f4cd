//! Provider trait for "now playing" metadata.
//!
//! Platform media integrations (system media controls, player APIs) live
//! behind this trait; the core contains no platform-specific code.

/// Current track as reported by the source application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub artist: String,
    pub title: String,
    pub is_playing: bool,
}

impl TrackInfo {
    /// Tracks are compared by artist+title; play state alone is not a
    /// song change.
    pub fn same_song(&self, other: &TrackInfo) -> bool {
        self.artist == other.artist && self.title == other.title
    }
}

/// Source of now-playing metadata.
pub trait NowPlayingProvider: Send + Sync {
    /// The currently playing track, if any is known.
    fn current_track(&self) -> Option<TrackInfo>;
}

/// Reports nothing. For headless runs and platforms without integration.
pub struct NullProvider;

impl NowPlayingProvider for NullProvider {
    fn current_track(&self) -> Option<TrackInfo> {
        None
    }
}

/// Always reports the same track. Useful in tests and for manual override.
pub struct StaticProvider {
    track: std::sync::Mutex<Option<TrackInfo>>,
}

impl StaticProvider {
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            track: std::sync::Mutex::new(Some(TrackInfo {
                artist: artist.to_string(),
                title: title.to_string(),
                is_playing: true,
            })),
        }
    }

    pub fn set_track(&self, track: Option<TrackInfo>) {
        *self.track.lock().unwrap() = track;
    }
}

impl NowPlayingProvider for StaticProvider {
    fn current_track(&self) -> Option<TrackInfo> {
        self.track.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_song_ignores_play_state() {
        let a = TrackInfo {
            artist: "A".into(),
            title: "T".into(),
            is_playing: true,
        };
        let b = TrackInfo {
            artist: "A".into(),
            title: "T".into(),
            is_playing: false,
        };
        assert!(a.same_song(&b));
    }

    #[test]
    fn test_static_provider_updates() {
        let provider = StaticProvider::new("Artist", "Song");
        assert_eq!(provider.current_track().unwrap().title, "Song");

        provider.set_track(None);
        assert!(provider.current_track().is_none());
    }
}
