//! Background poller that watches the now-playing source for song changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::provider::{NowPlayingProvider, TrackInfo};

/// How often the source is polled when no interval is given.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Invoked on every observed track change (including the first track seen).
pub type TrackCallback = Arc<dyn Fn(TrackInfo) + Send + Sync + 'static>;

/// Polls a [`NowPlayingProvider`] on a background thread and fires a
/// callback when the song changes.
pub struct NowPlayingPoller {
    running: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Default for NowPlayingPoller {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl NowPlayingPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<P>(&mut self, provider: Arc<P>, callback: TrackCallback)
    where
        P: NowPlayingProvider + ?Sized + 'static,
    {
        self.start_with_interval(provider, callback, DEFAULT_POLL_INTERVAL);
    }

    pub fn start_with_interval<P>(
        &mut self,
        provider: Arc<P>,
        callback: TrackCallback,
        interval: Duration,
    ) where
        P: NowPlayingProvider + ?Sized + 'static,
    {
        if self.running.load(Ordering::SeqCst) {
            tracing::warn!("now-playing poller already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        let handle = std::thread::spawn(move || {
            tracing::info!(?interval, "now-playing poller started");

            let mut last: Option<TrackInfo> = None;

            while running.load(Ordering::SeqCst) {
                if let Some(track) = provider.current_track() {
                    let changed = last
                        .as_ref()
                        .map(|prev| !prev.same_song(&track))
                        .unwrap_or(true);

                    if changed {
                        tracing::info!(
                            artist = %track.artist,
                            title = %track.title,
                            "track changed"
                        );
                        callback(track.clone());
                        last = Some(track);
                    }
                }

                std::thread::sleep(interval);
            }

            tracing::info!("now-playing poller stopped");
        });

        self.handle = Some(handle);
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for NowPlayingPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
