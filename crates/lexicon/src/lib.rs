//! Profanity lexicon and multi-token matcher.

mod matcher;

pub use matcher::{find_profanity, merge_common_splits, ProfanitySpan};

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use bleep_stt::text::normalize;

#[derive(Debug, thiserror::Error)]
pub enum LexiconError {
    #[error("failed to read lexicon {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("lexicon {0} contains no entries")]
    Empty(String),
}

pub type Result<T> = std::result::Result<T, LexiconError>;

/// Set of normalized profane tokens and phrases.
///
/// Loaded from a UTF-8 text file, one entry per line. Lines starting with
/// `#` are comments; entries are trimmed and case-folded. Lookup is by
/// normalized form only, so `is_profane` cannot be fooled by case or
/// punctuation.
#[derive(Debug, Default)]
pub struct ProfanityLexicon {
    entries: HashSet<String>,
}

impl ProfanityLexicon {
    /// Load a lexicon from disk. Fails if the file is unreadable or holds
    /// no usable entries.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| LexiconError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut entries = HashSet::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line.map_err(|source| LexiconError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let entry = normalize(trimmed);
            if !entry.is_empty() {
                entries.insert(entry);
            }
        }

        if entries.is_empty() {
            return Err(LexiconError::Empty(path.display().to_string()));
        }

        tracing::info!(entries = entries.len(), path = %path.display(), "lexicon loaded");
        Ok(Self { entries })
    }

    /// Build a lexicon from entries directly. Used by tests and callers
    /// that source their list elsewhere.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| normalize(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Whether the normalized form of `text` is in the lexicon.
    pub fn is_profane(&self, text: &str) -> bool {
        self.entries.contains(&normalize(text))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# profanity list").unwrap();
        writeln!(file, "damn").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  HELL  ").unwrap();
        writeln!(file, "son of a bitch").unwrap();

        let lexicon = ProfanityLexicon::load(file.path()).unwrap();

        assert_eq!(lexicon.len(), 3);
        assert!(lexicon.is_profane("damn"));
        assert!(lexicon.is_profane("hell"));
        assert!(lexicon.is_profane("son of a bitch"));
        assert!(!lexicon.is_profane("# profanity list"));
    }

    #[test]
    fn test_load_empty_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# only comments").unwrap();

        assert!(matches!(
            ProfanityLexicon::load(file.path()),
            Err(LexiconError::Empty(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = ProfanityLexicon::load(Path::new("/nonexistent/lexicon.txt"));
        assert!(matches!(err, Err(LexiconError::Io { .. })));
    }

    #[test]
    fn test_lookup_depends_only_on_normalized_form() {
        let lexicon = ProfanityLexicon::from_entries(["Damn"]);

        assert!(lexicon.is_profane("damn"));
        assert!(lexicon.is_profane("DAMN"));
        assert!(lexicon.is_profane("Damn!"));
        assert!(lexicon.is_profane("d.a.m.n") == lexicon.is_profane("damn"));
        assert!(!lexicon.is_profane("dam"));
    }
}
