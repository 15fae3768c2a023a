//! Recording manifests: the hand-off from whatever catalogues the songs.
//!
//! ```toml
//! [[recordings]]
//! source = "downloads/y240131.webm"
//! platform = "youtube"
//! live_title = "Sunday Jam | Live"
//! date_id = "y240131"
//!
//! [[recordings.songs]]
//! position = 1
//! name = "Intro"
//! duration_seconds = 180
//! reference = "https://www.youtube.com/watch?v=abc&t=95s"
//! genre = "Funk"
//! ```
//!
//! The same structure is accepted as JSON when the file ends in `.json`.
//! Relative paths are resolved against the manifest's directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::segmenter::Recording;
use crate::song::{date_for_tags, SongEntry};
use crate::timestamp::Platform;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML manifest {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON manifest {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported manifest format {} (expected .toml or .json)", .0.display())]
    UnknownFormat(PathBuf),

    #[error("recording '{live_title}' has invalid date id '{date_id}'")]
    InvalidDateId { live_title: String, date_id: String },
}

/// One song row. Platform and stream title default to the recording's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSong {
    pub position: u32,
    pub name: String,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_title: Option<String>,
    #[serde(default)]
    pub genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecording {
    pub source: PathBuf,
    pub platform: Platform,
    pub live_title: String,
    pub date_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<PathBuf>,
    #[serde(default)]
    pub songs: Vec<ManifestSong>,
}

impl ManifestRecording {
    /// Split into the recording and its song rows, resolving relative paths
    /// against `base_dir`.
    pub fn into_parts(self, base_dir: &Path) -> (Recording, Vec<SongEntry>) {
        let recording = Recording {
            source: resolve(base_dir, self.source),
            platform: self.platform,
            live_title: self.live_title.clone(),
            date_id: self.date_id,
            cover_image: self.cover_image.map(|p| resolve(base_dir, p)),
        };

        let songs = self
            .songs
            .into_iter()
            .map(|s| SongEntry {
                position: s.position,
                name: s.name,
                duration_seconds: s.duration_seconds,
                reference: s.reference,
                platform: s.platform.unwrap_or(self.platform),
                live_title: s.live_title.unwrap_or_else(|| self.live_title.clone()),
                genre: s.genre,
                comment: s.comment,
            })
            .collect();

        (recording, songs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub recordings: Vec<ManifestRecording>,
}

impl Manifest {
    /// Load a manifest, picking the format from the extension.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest: Manifest = match ext.as_deref() {
            Some("toml") => toml::from_str(&content).map_err(|source| ManifestError::Toml {
                path: path.to_path_buf(),
                source,
            })?,
            Some("json") => serde_json::from_str(&content).map_err(|source| ManifestError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            _ => return Err(ManifestError::UnknownFormat(path.to_path_buf())),
        };

        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        for recording in &self.recordings {
            if date_for_tags(&recording.date_id).is_none() {
                return Err(ManifestError::InvalidDateId {
                    live_title: recording.live_title.clone(),
                    date_id: recording.date_id.clone(),
                });
            }
        }
        Ok(())
    }
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
