//! Event seam between the pipeline and whatever UI is attached.
//!
//! The worker emits typed events through an `EventBus`; the UI layer binds
//! to the receiving end at construction. Core logic stays testable without
//! any UI runtime attached.

use std::sync::{Arc, Mutex};

/// Everything the pipeline reports outward.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Raw recognizer output for a chunk.
    RawTranscript { text: String },
    /// Lyric-corrected output for a chunk.
    AlignedTranscript { text: String },
    /// Now-playing changed.
    SongMetadata {
        artist: String,
        title: String,
        is_playing: bool,
    },
    /// Rolling input level, linear RMS.
    Level { rms: f32 },
    /// Current delay buffer fill.
    BufferSeconds { seconds: f64 },
    /// Buffer entered or left critical underrun.
    Underrun { active: bool },
    /// A word or phrase was censored (or skipped).
    Censorship {
        text: String,
        start_seconds: f64,
        end_seconds: f64,
        mode: String,
        applied: bool,
    },
}

/// Sink for pipeline events.
pub trait EventBus: Send + Sync {
    fn emit(&self, event: UiEvent);
}

pub type EventBusRef = Arc<dyn EventBus>;

/// Bus backed by a crossbeam channel; the UI holds the receiver.
pub struct ChannelBus {
    tx: crossbeam_channel::Sender<UiEvent>,
}

impl ChannelBus {
    /// Create a bus and its receiving end.
    pub fn new() -> (Self, crossbeam_channel::Receiver<UiEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl EventBus for ChannelBus {
    fn emit(&self, event: UiEvent) {
        // A dropped receiver just means no UI is listening.
        let _ = self.tx.send(event);
    }
}

/// Captures events for inspection in tests.
#[derive(Default)]
pub struct InMemoryBus {
    events: Mutex<Vec<UiEvent>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    /// Count events matching a predicate.
    pub fn count_where<F: Fn(&UiEvent) -> bool>(&self, pred: F) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventBus for InMemoryBus {
    fn emit(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Discards everything.
pub struct NullBus;

impl EventBus for NullBus {
    fn emit(&self, _event: UiEvent) {}
}
