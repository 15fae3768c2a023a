//! Error types for stream segmentation.
//!
//! Failures fall into two groups. Recording-level failures ([`SegmentError`])
//! abort the whole recording because later windows may depend on earlier ones.
//! Song-level failures ([`ExtractError`], [`TagError`]) only cost the song that
//! produced them.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;

use crate::timestamp::Platform;
use crate::window::Window;

/// Machine-readable failure classification, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedTimestamp,
    MalformedSequence,
    TimingInconsistency,
    ExtractionFailure,
    TagWriteFailure,
    /// Processing of the recording panicked.
    Internal,
}

/// Why a raw time reference could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampIssue {
    /// The reference is empty or whitespace.
    Empty,
    /// No `t=` parameter and no bare structured offset.
    MissingMarker,
    /// The marker is present but carries nothing (`...&t=` or `t=&v=...`).
    EmptyValue,
    /// The value is present but not in the expected shape.
    InvalidValue(String),
    /// A structured offset lacks its `h`, `m` or `s` field.
    MissingField(char),
    /// The offset does not fit in 64 bits.
    Overflow,
}

impl TimestampIssue {
    /// True when the reference carries no usable value at all, as opposed to
    /// carrying a garbled one.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            TimestampIssue::Empty | TimestampIssue::MissingMarker | TimestampIssue::EmptyValue
        )
    }
}

impl fmt::Display for TimestampIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampIssue::Empty => write!(f, "reference is empty"),
            TimestampIssue::MissingMarker => write!(f, "no time marker found"),
            TimestampIssue::EmptyValue => write!(f, "time marker has no value"),
            TimestampIssue::InvalidValue(value) => write!(f, "unrecognised time value '{}'", value),
            TimestampIssue::MissingField(unit) => write!(f, "missing '{}' field", unit),
            TimestampIssue::Overflow => write!(f, "offset is too large"),
        }
    }
}

/// A raw time reference that neither sub-format could decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {platform} timestamp '{raw}': {issue}")]
pub struct TimestampError {
    pub raw: String,
    pub platform: Platform,
    pub issue: TimestampIssue,
}

impl TimestampError {
    pub fn new(raw: impl Into<String>, platform: Platform, issue: TimestampIssue) -> Self {
        Self {
            raw: raw.into(),
            platform,
            issue,
        }
    }
}

/// Which ordering rule a window broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyReason {
    /// `end <= start`.
    NonPositiveDuration,
    /// An earlier song nominally starts after this one.
    StartsBeforeEarlier,
    /// The window begins inside its predecessor and runs past its end.
    OverlapsPrevious,
}

impl fmt::Display for InconsistencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InconsistencyReason::NonPositiveDuration => write!(f, "window has no positive duration"),
            InconsistencyReason::StartsBeforeEarlier => write!(f, "an earlier song starts after this one"),
            InconsistencyReason::OverlapsPrevious => write!(f, "window overlaps the previous song"),
        }
    }
}

/// A song together with the window computed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowedSong {
    pub index: usize,
    pub name: String,
    pub window: Window,
}

impl fmt::Display for WindowedSong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "song {} '{}' {}", self.index, self.name, self.window)
    }
}

/// Diagnostic payload of a fatal timing violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inconsistency {
    pub reason: InconsistencyReason,
    pub current: WindowedSong,
    /// The earlier song involved, absent for a non-positive window.
    pub earlier: Option<WindowedSong>,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.earlier {
            Some(earlier) => write!(f, "{}: {} vs {}", self.reason, earlier, self.current),
            None => write!(f, "{}: {}", self.reason, self.current),
        }
    }
}

/// Recording-level failure. Any of these aborts segmentation of the whole
/// recording before a single segment is cut.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    #[error("song {index} '{name}': {source}")]
    MalformedTimestamp {
        index: usize,
        name: String,
        #[source]
        source: TimestampError,
    },

    #[error("song {index} '{name}': {reason}")]
    MalformedSequence {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("timing inconsistency, {0}")]
    TimingInconsistency(Inconsistency),
}

impl SegmentError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SegmentError::MalformedTimestamp { .. } => FailureKind::MalformedTimestamp,
            SegmentError::MalformedSequence { .. } => FailureKind::MalformedSequence,
            SegmentError::TimingInconsistency(_) => FailureKind::TimingInconsistency,
        }
    }

    /// Indices of the songs implicated, earliest first.
    pub fn songs(&self) -> Vec<usize> {
        match self {
            SegmentError::MalformedTimestamp { index, .. } => vec![*index],
            SegmentError::MalformedSequence { index, .. } => vec![*index],
            SegmentError::TimingInconsistency(inconsistency) => match &inconsistency.earlier {
                Some(earlier) => vec![earlier.index, inconsistency.current.index],
                None => vec![inconsistency.current.index],
            },
        }
    }
}

/// Failure while cutting one segment out of the source recording.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("source recording not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("no decodable audio track in {}", .0.display())]
    NoAudioTrack(PathBuf),

    #[error("audio track does not advertise a sample rate")]
    MissingSampleRate,

    #[error("window {window} starts beyond the end of the recording ({available_seconds}s)")]
    WindowOutOfRange {
        window: Window,
        available_seconds: u64,
    },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },
}

/// Failure while stamping metadata onto a finished segment.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("ID3 error: {0}")]
    Id3(#[from] id3::Error),

    #[error("failed to read cover image {}: {source}", path.display())]
    CoverImage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::TimeOffset;

    fn song(index: usize, start: u64, end: u64) -> WindowedSong {
        WindowedSong {
            index,
            name: format!("Song {}", index),
            window: Window::new(TimeOffset::from_secs(start), TimeOffset::from_secs(end), index),
        }
    }

    #[test]
    fn test_absent_issues() {
        assert!(TimestampIssue::Empty.is_absent());
        assert!(TimestampIssue::MissingMarker.is_absent());
        assert!(TimestampIssue::EmptyValue.is_absent());
        assert!(!TimestampIssue::InvalidValue("x".into()).is_absent());
        assert!(!TimestampIssue::MissingField('m').is_absent());
        assert!(!TimestampIssue::Overflow.is_absent());
    }

    #[test]
    fn test_inconsistency_reports_both_songs() {
        let err = SegmentError::TimingInconsistency(Inconsistency {
            reason: InconsistencyReason::OverlapsPrevious,
            current: song(1, 60, 200),
            earlier: Some(song(0, 0, 120)),
        });
        assert_eq!(err.kind(), FailureKind::TimingInconsistency);
        assert_eq!(err.songs(), vec![0, 1]);

        let message = err.to_string();
        assert!(message.contains("Song 0"));
        assert!(message.contains("Song 1"));
        assert!(message.contains("[60, 200)"));
    }

    #[test]
    fn test_non_positive_reports_single_song() {
        let err = SegmentError::TimingInconsistency(Inconsistency {
            reason: InconsistencyReason::NonPositiveDuration,
            current: song(3, 50, 50),
            earlier: None,
        });
        assert_eq!(err.songs(), vec![3]);
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::TimingInconsistency).unwrap();
        assert_eq!(json, "\"timing_inconsistency\"");
    }
}
