//! Local output layout
//!
//! ```text
//! <out_dir>/clips.tsv
//! <out_dir>/stats.json
//! <out_dir>/<locale>/clips/common_voice_<locale>_<id>.mp3
//! <out_dir>/<locale>/<bucket>.tsv        (written by the corpus splitter)
//! ```
//!
//! Path computation is pure and stable across runs so a rerun resolves the
//! same file for the same row. Directory creation is separate.

use cvb_common::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Generated filename for a clip
pub fn clip_filename(locale: &str, id: &str) -> String {
    format!("common_voice_{}_{}.mp3", locale, id)
}

/// Paths under the output directory
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tsv_path(&self) -> PathBuf {
        self.root.join("clips.tsv")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.root.join("stats.json")
    }

    pub fn locale_dir(&self, locale: &str) -> PathBuf {
        self.root.join(locale)
    }

    pub fn clips_dir(&self, locale: &str) -> PathBuf {
        self.locale_dir(locale).join("clips")
    }

    /// Local path for one clip; no I/O
    pub fn clip_path(&self, locale: &str, id: &str) -> PathBuf {
        self.clips_dir(locale).join(clip_filename(locale, id))
    }

    /// Locale directories present under the output root, sorted
    pub fn locales(&self) -> Result<Vec<String>> {
        let mut locales = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                match entry.file_name().to_str() {
                    Some(name) if !name.starts_with('.') => locales.push(name.to_string()),
                    _ => {}
                }
            }
        }
        locales.sort();
        Ok(locales)
    }
}

/// Create `path` and any missing ancestors
///
/// A directory that already exists (including one created concurrently by
/// another fetch) is success. A non-directory occupying the leaf, or a
/// permission failure, is `Error::Directory`.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => {
            // create_dir_all can lose a race on an intermediate segment
            if path.is_dir() {
                return Ok(());
            }
            Err(Error::Directory {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}
