//! Per-song prediction reports.
//!
//! At the end of every song (track change or session stop) the predictions
//! made for it are written to `{report_dir}/{artist} - {title} - {ts}.txt`
//! so a listening test can be checked against what the filter thought.

use std::io::Write;
use std::path::{Path, PathBuf};

/// One profanity prediction made during a song.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub text: String,
    /// Seconds into the song.
    pub timestamp: f64,
    pub mode: String,
    pub multi_word: bool,
}

/// Write the report file and return its path. The directory is created on
/// demand; artist and title are sanitized for the filesystem.
pub fn write_song_report(
    dir: &Path,
    artist: &str,
    title: &str,
    predictions: &[Prediction],
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let artist = sanitize_component(artist, "Unknown_Artist");
    let title = sanitize_component(title, "Unknown_Title");
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let path = dir.join(format!("{artist} - {title} - {timestamp}.txt"));

    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "=================================================")?;
    writeln!(file, "Profanity Detection Log")?;
    writeln!(file, "=================================================")?;
    writeln!(file, "Artist: {artist}")?;
    writeln!(file, "Title: {title}")?;
    writeln!(file, "Date: {timestamp}")?;
    writeln!(file, "Total Predictions: {}", predictions.len())?;
    writeln!(file, "=================================================")?;
    writeln!(file)?;

    for (i, prediction) in predictions.iter().enumerate() {
        write!(
            file,
            "[{}] \"{}\" at {:.2}s ({})",
            i + 1,
            prediction.text,
            prediction.timestamp,
            prediction.mode
        )?;
        if prediction.multi_word {
            write!(file, " [MULTI-WORD]")?;
        }
        writeln!(file)?;
    }

    writeln!(file)?;
    writeln!(file, "=================================================")?;
    writeln!(file, "End of Log")?;
    writeln!(file, "=================================================")?;

    tracing::info!(path = %path.display(), predictions = predictions.len(), "song report written");
    Ok(path)
}

fn sanitize_component(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }

    trimmed
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}
