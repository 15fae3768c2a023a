//! Song length helper for filling in a song sheet.
//!
//! Given the link (or offset) where a song starts and where it stops, work out
//! the length to enter as its declared duration, rounded to ten seconds.

use crate::error::{TimestampError, TimestampIssue};
use crate::timestamp::{parse_offset, Platform, TimeOffset};

/// Inputs that end an interactive session.
pub const QUIT_WORDS: [&str; 4] = ["q", "quit", "stop", "a"];

/// Input that reuses the previous end as the next start.
pub const REUSE_LAST: &str = "o";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error("end {end} is before start {start}")]
    EndBeforeStart { start: TimeOffset, end: TimeOffset },
}

pub fn is_quit(input: &str) -> bool {
    QUIT_WORDS.contains(&input.trim())
}

/// Read one offset typed at the prompt.
///
/// YouTube and Live accept plain seconds (`732`, `732s`) or a link with `t=`.
/// Twitch accepts `MMSS`, `HMMSS` or a link with a structured `t=`.
pub fn parse_timer_input(input: &str, platform: Platform) -> Result<TimeOffset, TimestampError> {
    let trimmed = input.trim();
    let all_digits = !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit());

    match platform {
        Platform::Twitch if all_digits => {
            let digits = trimmed.as_bytes();
            let field = |range: std::ops::Range<usize>| -> u64 {
                trimmed[range].parse().unwrap_or(0)
            };
            match digits.len() {
                4 => Ok(TimeOffset::from_secs(field(0..2) * 60 + field(2..4))),
                5 => Ok(TimeOffset::from_secs(field(0..1) * 3600 + field(1..3) * 60 + field(3..5))),
                _ => Err(TimestampError::new(
                    input,
                    platform,
                    TimestampIssue::InvalidValue(trimmed.to_string()),
                )),
            }
        }
        Platform::Twitch => parse_offset(trimmed, platform),
        Platform::YouTube | Platform::Live => {
            let bare = trimmed.strip_suffix('s').unwrap_or(trimmed);
            if !bare.is_empty() && bare.bytes().all(|b| b.is_ascii_digit()) {
                return bare.parse().map(TimeOffset::from_secs).map_err(|_| {
                    TimestampError::new(input, platform, TimestampIssue::Overflow)
                });
            }
            parse_offset(trimmed, platform)
        }
    }
}

/// Round to ten seconds: a last digit above 5 rounds up, anything else down.
pub fn round_to_ten(secs: u64) -> u64 {
    let rest = secs % 10;
    if rest > 5 {
        secs - rest + 10
    } else {
        secs - rest
    }
}

/// Rounded length of the song between `start` and `end`.
pub fn song_length(start: TimeOffset, end: TimeOffset) -> Result<u64, TimerError> {
    if start > end {
        return Err(TimerError::EndBeforeStart { start, end });
    }
    Ok(round_to_ten(end.as_secs() - start.as_secs()))
}

/// `MM:SS`, or `H:MM:SS` from one hour on.
pub fn format_length(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
