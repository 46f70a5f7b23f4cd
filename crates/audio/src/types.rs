//! Plain records crossing the audio/worker boundary.
//!
//! Both queue payloads are fixed-size and `Copy` so SPSC push/pop stays a
//! memcpy with no ownership transfer to reason about in the callback.

/// Bytes reserved for a censor event's label.
pub const LABEL_CAPACITY: usize = 64;

/// Metadata describing one chunk of audio handed to the worker.
///
/// The samples themselves stay in the delay line; the chunk spans positions
/// `[end_pos - len, end_pos)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Absolute input-sample position one past the chunk's last frame.
    pub end_pos: u64,
    /// Frames in the chunk.
    pub len: u32,
    /// Channels in the delay line at capture time.
    pub channels: u16,
    /// Device sample rate the chunk was captured at.
    pub sample_rate: u32,
}

impl ChunkDescriptor {
    /// Absolute position of the chunk's first frame.
    pub fn start_pos(&self) -> u64 {
        self.end_pos.saturating_sub(self.len as u64)
    }
}

/// How an offending interval is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CensorMode {
    Reverse,
    Mute,
}

impl CensorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CensorMode::Reverse => "REVERSE",
            CensorMode::Mute => "MUTE",
        }
    }
}

/// A rewrite order from the worker, in absolute sample positions.
#[derive(Debug, Clone, Copy)]
pub struct CensorEvent {
    pub start_pos: u64,
    pub end_pos: u64,
    pub mode: CensorMode,
    label_len: u8,
    label: [u8; LABEL_CAPACITY],
}

impl CensorEvent {
    /// Build an event; the label is truncated to [`LABEL_CAPACITY`] bytes
    /// on a character boundary.
    pub fn new(start_pos: u64, end_pos: u64, mode: CensorMode, label: &str) -> Self {
        let mut buf = [0u8; LABEL_CAPACITY];
        let mut len = label.len().min(LABEL_CAPACITY);
        while len > 0 && !label.is_char_boundary(len) {
            len -= 1;
        }
        buf[..len].copy_from_slice(&label.as_bytes()[..len]);

        Self {
            start_pos,
            end_pos,
            mode,
            label_len: len as u8,
            label: buf,
        }
    }

    /// The detected word or phrase this rewrite belongs to.
    pub fn label(&self) -> &str {
        std::str::from_utf8(&self.label[..self.label_len as usize]).unwrap_or("")
    }

    /// Interval length in samples.
    pub fn len(&self) -> u64 {
        self.end_pos.saturating_sub(self.start_pos)
    }

    pub fn is_empty(&self) -> bool {
        self.end_pos <= self.start_pos
    }
}
