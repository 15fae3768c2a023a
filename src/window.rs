//! Turning a song list into per-song time windows.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consistency::{ConsistencyChecker, TimingAnomaly};
use crate::error::SegmentError;
use crate::song::{SongEntry, SongList};
use crate::timestamp::{parse_offset, TimeOffset};

/// Seconds added after a song's nominal length.
pub const DEFAULT_PAD_SECONDS: u64 = 3;

/// The `[start, end)` range of one song inside its recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: TimeOffset,
    pub end: TimeOffset,
    /// Index of the owning entry in the song list.
    pub song: usize,
}

impl Window {
    pub fn new(start: TimeOffset, end: TimeOffset, song: usize) -> Self {
        Self { start, end, song }
    }

    pub fn duration_secs(&self) -> u64 {
        self.end.as_secs().saturating_sub(self.start.as_secs())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Window builder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub pad_seconds: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            pad_seconds: DEFAULT_PAD_SECONDS,
        }
    }
}

/// Accepted windows of one recording, plus any anomalies seen on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowPlan {
    windows: Vec<Window>,
    anomalies: Vec<TimingAnomaly>,
}

impl WindowPlan {
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn anomalies(&self) -> &[TimingAnomaly] {
        &self.anomalies
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Window>, Vec<TimingAnomaly>) {
        (self.windows, self.anomalies)
    }
}

/// Compute one window per song.
///
/// A song starts at its own reference. It ends where the following entry
/// says if that entry is a continuation marker, otherwise after its nominal
/// length plus the pad. Continuation markers produce no window.
///
/// Every window is handed to the [`ConsistencyChecker`] as soon as it is
/// built, so the first violation aborts the plan.
///
/// # Errors
/// * [`SegmentError::MalformedTimestamp`] for an undecodable reference. A
///   song whose own reference carries no value at all starts at 0 instead.
/// * [`SegmentError::MalformedSequence`] for two continuation markers in a row.
/// * [`SegmentError::TimingInconsistency`] from the checker.
pub fn build_windows(songs: &SongList, config: &WindowConfig) -> Result<WindowPlan, SegmentError> {
    let entries = songs.entries();
    let mut checker = ConsistencyChecker::new();
    let mut plan = WindowPlan::default();

    for (index, song) in entries.iter().enumerate() {
        if song.is_continuation() {
            if let Some(next) = entries.get(index + 1).filter(|next| next.is_continuation()) {
                return Err(SegmentError::MalformedSequence {
                    index: index + 1,
                    name: next.name.clone(),
                    reason: format!("continuation marker follows continuation marker '{}'", song.name),
                });
            }
            continue;
        }

        let start = song_start(index, song)?;
        let end = match entries.get(index + 1) {
            Some(next) if next.is_continuation() => {
                parse_offset(&next.reference, next.platform).map_err(|source| {
                    SegmentError::MalformedTimestamp {
                        index: index + 1,
                        name: next.name.clone(),
                        source,
                    }
                })?
            }
            _ => TimeOffset::from_secs(
                start
                    .as_secs()
                    .saturating_add(song.duration_seconds)
                    .saturating_add(config.pad_seconds),
            ),
        };

        let window = Window::new(start, end, index);
        info!("{}. {} - [{} : {}]", plan.len() + 1, song.name, start, end);

        let anomalies = checker.push(window, &song.name)?;
        plan.anomalies.extend(anomalies);
        plan.windows.push(window);
    }

    Ok(plan)
}

fn song_start(index: usize, song: &SongEntry) -> Result<TimeOffset, SegmentError> {
    match parse_offset(&song.reference, song.platform) {
        Ok(offset) => Ok(offset),
        Err(err) if err.issue.is_absent() => {
            debug!("Song {} '{}' has no start reference ({}), starting at 0", index, song.name, err.issue);
            Ok(TimeOffset::ZERO)
        }
        Err(source) => Err(SegmentError::MalformedTimestamp {
            index,
            name: song.name.clone(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, TimestampIssue};
    use crate::timestamp::Platform;

    fn yt(position: u32, name: &str, reference: &str, duration_seconds: u64) -> SongEntry {
        SongEntry {
            position,
            name: name.to_string(),
            duration_seconds,
            reference: reference.to_string(),
            platform: Platform::YouTube,
            live_title: "Sunday Jam".to_string(),
            genre: "Funk".to_string(),
            comment: None,
        }
    }

    fn plan(entries: Vec<SongEntry>) -> Result<WindowPlan, SegmentError> {
        build_windows(&SongList::new(entries).unwrap(), &WindowConfig::default())
    }

    fn bounds(plan: &WindowPlan) -> Vec<(u64, u64, usize)> {
        plan.windows()
            .iter()
            .map(|w| (w.start.as_secs(), w.end.as_secs(), w.song))
            .collect()
    }

    #[test]
    fn test_declared_duration_plus_pad() {
        let plan = plan(vec![
            yt(1, "Intro", "https://youtu.be/abc?t=100", 180),
            yt(2, "Groove", "https://youtu.be/abc?t=400s", 200),
        ])
        .unwrap();
        assert_eq!(bounds(&plan), vec![(100, 283, 0), (400, 603, 1)]);
        assert!(plan.anomalies().is_empty());
    }

    #[test]
    fn test_continuation_marker_sets_end() {
        let plan = plan(vec![
            yt(1, "Intro", "https://youtu.be/abc?t=100", 180),
            yt(2, "-end of intro", "https://youtu.be/abc?t=500", 0),
            yt(3, "Groove", "https://youtu.be/abc?t=600", 60),
        ])
        .unwrap();
        assert_eq!(bounds(&plan), vec![(100, 500, 0), (600, 663, 2)]);
    }

    #[test]
    fn test_missing_start_falls_back_to_zero() {
        let plan = plan(vec![
            yt(1, "Opener", "https://www.youtube.com/watch?v=abc", 120),
            yt(2, "Second", "https://www.youtube.com/watch?v=abc&t=130", 60),
        ])
        .unwrap();
        assert_eq!(bounds(&plan), vec![(0, 123, 0), (130, 193, 1)]);
    }

    #[test]
    fn test_garbled_start_is_fatal() {
        let err = plan(vec![
            yt(1, "Opener", "https://youtu.be/abc?t=0", 120),
            yt(2, "Broken", "https://youtu.be/abc?t=1x0", 60),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedTimestamp);
        assert_eq!(err.songs(), vec![1]);
    }

    #[test]
    fn test_continuation_end_is_never_defaulted() {
        let err = plan(vec![
            yt(1, "Opener", "https://youtu.be/abc?t=0", 120),
            yt(2, "-end", "https://youtu.be/abc", 0),
        ])
        .unwrap_err();
        match err {
            SegmentError::MalformedTimestamp { index, source, .. } => {
                assert_eq!(index, 1);
                assert_eq!(source.issue, TimestampIssue::MissingMarker);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_chained_continuations_are_rejected() {
        let err = plan(vec![
            yt(1, "Opener", "https://youtu.be/abc?t=0", 120),
            yt(2, "-pause", "https://youtu.be/abc?t=100", 0),
            yt(3, "-end", "https://youtu.be/abc?t=110", 0),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedSequence);
        assert_eq!(err.songs(), vec![2]);
    }

    #[test]
    fn test_overlap_aborts_with_pair() {
        let err = plan(vec![
            yt(1, "Long", "https://youtu.be/abc?t=0", 117),
            yt(2, "Early", "https://youtu.be/abc?t=60", 137),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::TimingInconsistency);
        assert_eq!(err.songs(), vec![0, 1]);
    }

    #[test]
    fn test_twitch_structured_references() {
        let mut first = yt(1, "Opener", "https://www.twitch.tv/videos/1?t=0h01m00s", 100);
        first.platform = Platform::Twitch;
        let mut marker = yt(2, "-cut", "https://www.twitch.tv/videos/1?t=0h03m00s", 0);
        marker.platform = Platform::Twitch;

        let plan = plan(vec![first, marker]).unwrap();
        assert_eq!(bounds(&plan), vec![(60, 180, 0)]);
    }

    #[test]
    fn test_configurable_pad() {
        let songs = SongList::new(vec![yt(1, "Only", "t=10", 50)]).unwrap();
        let plan = build_windows(&songs, &WindowConfig { pad_seconds: 0 }).unwrap();
        assert_eq!(bounds(&plan), vec![(10, 60, 0)]);
    }

    #[test]
    fn test_anomalies_are_collected() {
        let plan = plan(vec![
            yt(1, "Jam", "t=0", 497),
            yt(2, "Reprise", "t=100", 197),
            yt(3, "Outro", "t=300", 297),
        ])
        .unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.anomalies().len(), 1);
        assert_eq!(plan.anomalies()[0].earlier.index, 0);
    }

    #[test]
    fn test_empty_list_yields_empty_plan() {
        assert!(plan(Vec::new()).unwrap().is_empty());
    }
}
