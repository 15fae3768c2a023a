use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::extract::DEFAULT_MP3_QUALITY;
use crate::window::{WindowConfig, DEFAULT_PAD_SECONDS};

/// Failure loading or saving the defaults file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("HOME environment variable not set")]
    NoHome,

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Which backend cuts the segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    /// pcm where symphonia reads the source, ffmpeg otherwise
    Auto,
    /// symphonia decode, 16-bit WAV out
    Pcm,
    /// ffmpeg, MP3 out
    Ffmpeg,
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoder::Auto => write!(f, "auto"),
            Encoder::Pcm => write!(f, "pcm"),
            Encoder::Ffmpeg => write!(f, "ffmpeg"),
        }
    }
}

impl FromStr for Encoder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Encoder::Auto),
            "pcm" | "wav" => Ok(Encoder::Pcm),
            "ffmpeg" | "mp3" => Ok(Encoder::Ffmpeg),
            other => Err(format!("unknown encoder '{}' (expected auto, pcm or ffmpeg)", other)),
        }
    }
}

/// Configuration defaults that can be saved to a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad_seconds: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_titles: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<Encoder>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp3_quality: Option<u8>,
}

impl Config {
    /// Create a new empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the config file path (~/.state/livecut/defaults.toml)
    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        Ok(Path::new(&home).join(".state").join("livecut").join("defaults.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load config from `path`. A missing file is an empty config.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::new());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::get_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).map_err(io_err)
    }

    /// Merge this config with another, preferring values from other
    pub fn merge(&mut self, other: &Config) {
        if other.artist.is_some() {
            self.artist = other.artist.clone();
        }
        if other.pad_seconds.is_some() {
            self.pad_seconds = other.pad_seconds;
        }
        if other.skip_titles.is_some() {
            self.skip_titles = other.skip_titles.clone();
        }
        if other.output_dir.is_some() {
            self.output_dir = other.output_dir.clone();
        }
        if other.encoder.is_some() {
            self.encoder = other.encoder;
        }
        if other.ffmpeg_path.is_some() {
            self.ffmpeg_path = other.ffmpeg_path.clone();
        }
        if other.workers.is_some() {
            self.workers = other.workers;
        }
        if other.mp3_quality.is_some() {
            self.mp3_quality = other.mp3_quality;
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            pad_seconds: self.pad_seconds.unwrap_or(DEFAULT_PAD_SECONDS),
        }
    }

    pub fn encoder(&self) -> Encoder {
        self.encoder.unwrap_or(Encoder::Auto)
    }

    pub fn mp3_quality(&self) -> u8 {
        self.mp3_quality.unwrap_or(DEFAULT_MP3_QUALITY)
    }

    pub fn skip_titles(&self) -> &[String] {
        self.skip_titles.as_deref().unwrap_or(&[])
    }

    /// Worker count, falling back to the number of available cores.
    pub fn workers(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }

    /// Print the config in a human-readable format
    pub fn print(&self, title: &str) {
        println!("{}:", title);

        if let Some(artist) = &self.artist {
            println!("  Artist:             {}", artist);
        }
        if let Some(pad) = self.pad_seconds {
            println!("  Segment pad:        {} seconds", pad);
        }
        if let Some(skip) = &self.skip_titles {
            println!("  Skipped streams:    {}", skip.len());
            for title in skip {
                println!("    - {}", title);
            }
        }
        if let Some(dir) = &self.output_dir {
            println!("  Output directory:   {}", dir.display());
        }
        if let Some(encoder) = self.encoder {
            println!("  Encoder:            {}", encoder);
        }
        if let Some(path) = &self.ffmpeg_path {
            println!("  ffmpeg:             {}", path.display());
        }
        if let Some(workers) = self.workers {
            println!("  Workers:            {}", workers);
        }
        if let Some(quality) = self.mp3_quality {
            println!("  MP3 quality:        {}", quality);
        }
    }
}
