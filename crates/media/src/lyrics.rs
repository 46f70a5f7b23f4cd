//! Lyrics fetch over HTTP.
//!
//! Blocking on purpose: the fetch runs on a detached thread, never on the
//! worker or the audio callback.

use std::time::Duration;

/// lyrics.ovh-compatible endpoint: `GET {base}/{artist}/{title}` returns
/// `{"lyrics": "..."}`.
pub const DEFAULT_LYRICS_API: &str = "https://api.lyrics.ovh/v1";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LyricsClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl LyricsClient {
    pub fn new() -> crate::Result<Self> {
        Self::with_base_url(DEFAULT_LYRICS_API)
    }

    pub fn with_base_url(base_url: &str) -> crate::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Fetch lyrics for a track. `Ok(None)` means the service answered but
    /// has no lyrics; transport failures are errors.
    pub fn fetch(&self, artist: &str, title: &str) -> crate::Result<Option<String>> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            urlencode(artist),
            urlencode(title)
        );
        tracing::debug!(%url, "fetching lyrics");

        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            tracing::info!(status = %response.status(), artist, title, "no lyrics found");
            return Ok(None);
        }

        let body: serde_json::Value = response.json()?;
        let lyrics = body
            .get("lyrics")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match &lyrics {
            Some(text) => {
                tracing::info!(artist, title, chars = text.len(), "lyrics fetched")
            }
            None => tracing::info!(artist, title, "lyrics field empty"),
        }

        Ok(lyrics)
    }
}

/// Percent-encode a path segment.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("Daft Punk"), "Daft%20Punk");
        assert_eq!(urlencode("AC/DC"), "AC%2FDC");
        assert_eq!(urlencode("plain-name_1.0~x"), "plain-name_1.0~x");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = LyricsClient::with_base_url("http://localhost:9/api/").unwrap();
        assert_eq!(client.base_url, "http://localhost:9/api");
    }
}
