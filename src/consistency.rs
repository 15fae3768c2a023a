//! Incremental validation of a recording's window sequence.
//!
//! Each window is checked the moment it is produced so the offending pair of
//! songs is known exactly. Violations come in two severities:
//!
//! * fatal ([`SegmentError::TimingInconsistency`]): a window with no positive
//!   duration, a window starting before an earlier song, or a window that
//!   begins inside its predecessor and runs past its end;
//! * non-fatal ([`TimingAnomaly`]): an earlier, non-adjacent window that alone
//!   holds the furthest end seen so far and still covers the new window's
//!   start. Song sheets contain these (medleys, reprises noted inside a longer
//!   jam) and they are reported, not rejected.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::error::{Inconsistency, InconsistencyReason, SegmentError, WindowedSong};
use crate::timestamp::TimeOffset;
use crate::window::Window;

/// Non-fatal monotonicity warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimingAnomaly {
    /// The earlier song whose window sticks out.
    pub earlier: WindowedSong,
    /// Furthest end among the other earlier windows.
    pub running_max_end: TimeOffset,
    /// The song being appended when the anomaly was seen.
    pub current: WindowedSong,
}

impl fmt::Display for TimingAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ends after every other earlier song (max {}) and overlaps {}",
            self.earlier, self.running_max_end, self.current
        )
    }
}

/// Accumulates accepted windows and validates each new one against them.
#[derive(Debug, Default)]
pub struct ConsistencyChecker {
    accepted: Vec<WindowedSong>,
}

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `window` against everything accepted before it and, if it
    /// passes, accept it.
    ///
    /// # Returns
    /// The anomalies raised by this window (usually none), or the fatal
    /// inconsistency. A rejected window is not accepted.
    pub fn push(&mut self, window: Window, name: &str) -> Result<Vec<TimingAnomaly>, SegmentError> {
        let current = WindowedSong {
            index: window.song,
            name: name.to_string(),
            window,
        };

        if window.end <= window.start {
            return Err(inconsistency(InconsistencyReason::NonPositiveDuration, current, None));
        }

        if let Some(earlier) = self.accepted.iter().find(|w| w.window.start > window.start) {
            return Err(inconsistency(
                InconsistencyReason::StartsBeforeEarlier,
                current,
                Some(earlier.clone()),
            ));
        }

        if let Some(previous) = self.accepted.last() {
            let prev_end = previous.window.end;
            if window.start < prev_end && prev_end < window.end {
                return Err(inconsistency(
                    InconsistencyReason::OverlapsPrevious,
                    current,
                    Some(previous.clone()),
                ));
            }
        }

        let anomalies = self.find_anomaly(&current).into_iter().collect::<Vec<_>>();
        for anomaly in &anomalies {
            warn!("Timing anomaly: {}", anomaly);
        }

        self.accepted.push(current);
        Ok(anomalies)
    }

    /// An earlier window `j` is anomalous when its end exceeds the running
    /// maximum of the other earlier windows. Only the unique holder of the
    /// overall maximum can satisfy that, so it is enough to look at the top
    /// two ends. The predecessor is exempt since its relation to the new
    /// window was settled above.
    fn find_anomaly(&self, current: &WindowedSong) -> Option<TimingAnomaly> {
        if self.accepted.len() < 2 {
            return None;
        }

        let mut top: Option<(usize, TimeOffset)> = None;
        let mut second = TimeOffset::ZERO;
        for (j, w) in self.accepted.iter().enumerate() {
            match top {
                Some((_, best)) if w.window.end <= best => {
                    second = second.max(w.window.end);
                }
                Some((_, best)) => {
                    second = best;
                    top = Some((j, w.window.end));
                }
                None => top = Some((j, w.window.end)),
            }
        }

        let (holder, end) = top?;
        let predecessor = self.accepted.len() - 1;
        if holder == predecessor || end <= second || end <= current.window.start {
            return None;
        }

        Some(TimingAnomaly {
            earlier: self.accepted[holder].clone(),
            running_max_end: second,
            current: current.clone(),
        })
    }
}

fn inconsistency(
    reason: InconsistencyReason,
    current: WindowedSong,
    earlier: Option<WindowedSong>,
) -> SegmentError {
    SegmentError::TimingInconsistency(Inconsistency {
        reason,
        current,
        earlier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: u64, end: u64, song: usize) -> Window {
        Window::new(TimeOffset::from_secs(start), TimeOffset::from_secs(end), song)
    }

    /// Push windows in order, returning all anomalies or the first error.
    fn run(windows: &[(u64, u64)]) -> Result<Vec<TimingAnomaly>, SegmentError> {
        let mut checker = ConsistencyChecker::new();
        let mut anomalies = Vec::new();
        for (i, &(start, end)) in windows.iter().enumerate() {
            anomalies.extend(checker.push(window(start, end, i), &format!("Song {}", i))?);
        }
        Ok(anomalies)
    }

    #[test]
    fn test_increasing_windows_pass_cleanly() {
        let anomalies = run(&[(0, 183), (183, 400), (400, 600), (650, 800)]).unwrap();
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_touching_windows_pass() {
        assert!(run(&[(0, 100), (100, 200)]).unwrap().is_empty());
    }

    #[test]
    fn test_non_positive_window_fails() {
        let err = run(&[(0, 100), (300, 300)]).unwrap_err();
        match err {
            SegmentError::TimingInconsistency(inc) => {
                assert_eq!(inc.reason, InconsistencyReason::NonPositiveDuration);
                assert_eq!(inc.current.index, 1);
                assert!(inc.earlier.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // The first window is held to the same rule
        assert!(run(&[(50, 10)]).is_err());
    }

    #[test]
    fn test_adjacent_overlap_fails_with_both_songs() {
        let err = run(&[(0, 120), (60, 200)]).unwrap_err();
        assert_eq!(err.songs(), vec![0, 1]);
        match err {
            SegmentError::TimingInconsistency(inc) => {
                assert_eq!(inc.reason, InconsistencyReason::OverlapsPrevious);
                assert_eq!(inc.earlier.unwrap().window, window(0, 120, 0));
                assert_eq!(inc.current.window, window(60, 200, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_straddling_long_window_fails() {
        let err = run(&[(0, 100), (50, 900), (900, 950)]).unwrap_err();
        assert_eq!(err.songs(), vec![0, 1]);
    }

    #[test]
    fn test_ordering_violation_fails() {
        let err = run(&[(0, 100), (500, 600), (300, 400)]).unwrap_err();
        assert_eq!(err.songs(), vec![1, 2]);
        match err {
            SegmentError::TimingInconsistency(inc) => {
                assert_eq!(inc.reason, InconsistencyReason::StartsBeforeEarlier)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nested_window_is_accepted_silently() {
        let anomalies = run(&[(0, 500), (100, 300)]).unwrap();
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_window_past_nested_one_is_flagged_not_rejected() {
        let anomalies = run(&[(0, 500), (100, 300), (300, 600)]).unwrap();
        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.earlier.index, 0);
        assert_eq!(anomaly.running_max_end, TimeOffset::from_secs(300));
        assert_eq!(anomaly.current.index, 2);
    }

    #[test]
    fn test_anomaly_boundary() {
        // Earlier end exactly at the new start no longer covers it
        assert!(run(&[(0, 500), (100, 300), (500, 600)]).unwrap().is_empty());
        // One second of cover is enough
        assert_eq!(run(&[(0, 500), (100, 300), (499, 600)]).unwrap().len(), 1);
        // Once a later window reaches past it, the old one is no longer the outlier
        let anomalies = run(&[(0, 500), (100, 300), (300, 600), (600, 700)]).unwrap();
        assert_eq!(anomalies.len(), 1);
    }

    #[test]
    fn test_tied_maximum_is_not_an_anomaly() {
        // Two earlier windows share the furthest end
        assert!(run(&[(0, 500), (100, 500), (200, 300)]).unwrap().is_empty());
        assert!(run(&[(0, 500), (100, 500), (200, 300), (300, 400)]).unwrap().is_empty());
    }

    #[test]
    fn test_rejected_window_is_not_accepted() {
        let mut checker = ConsistencyChecker::new();
        checker.push(window(0, 120, 0), "A").unwrap();
        assert!(checker.push(window(60, 200, 1), "B").is_err());
        // Would straddle [60, 200) had it been kept
        assert!(checker.push(window(130, 250, 2), "C").unwrap().is_empty());
    }
}
