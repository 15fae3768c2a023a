//! Decoding of the time references embedded in song links.
//!
//! YouTube and "Live" links carry the offset as integer seconds in a `t=`
//! query parameter (`?t=732s`, `&t=732`). Twitch VOD links pack it as
//! `t=1h07m32s`. The platform decides which of the two encodings applies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TimestampError, TimestampIssue};

/// The streaming platform a recording was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "YouTube", alias = "Youtube")]
    YouTube,
    #[serde(alias = "Twitch")]
    Twitch,
    #[serde(alias = "Live")]
    Live,
}

/// How a platform encodes offsets in its links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// `t=<seconds>[s]`
    Seconds,
    /// `t=<H>h<MM>m<SS>s`
    Structured,
}

impl Platform {
    pub fn timestamp_style(self) -> TimestampStyle {
        match self {
            Platform::YouTube | Platform::Live => TimestampStyle::Seconds,
            Platform::Twitch => TimestampStyle::Structured,
        }
    }

    /// Container the platform's audio-only downloads arrive in.
    pub fn container_extension(self) -> &'static str {
        match self {
            Platform::YouTube | Platform::Live => "webm",
            Platform::Twitch => "mkv",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::YouTube => write!(f, "YouTube"),
            Platform::Twitch => write!(f, "Twitch"),
            Platform::Live => write!(f, "Live"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" | "yt" => Ok(Platform::YouTube),
            "twitch" | "tw" => Ok(Platform::Twitch),
            "live" => Ok(Platform::Live),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// A whole number of seconds into a recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeOffset(u64);

impl TimeOffset {
    pub const ZERO: TimeOffset = TimeOffset(0);

    pub const fn from_secs(secs: u64) -> Self {
        TimeOffset(secs)
    }

    pub const fn as_secs(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decode a raw time reference into an offset.
///
/// # Arguments
/// * `raw` - The link or bare reference as it appears in the song list
/// * `platform` - Platform of the recording, selects the encoding
///
/// # Returns
/// The offset in seconds, or a [`TimestampError`] describing why the
/// reference could not be read. Callers that tolerate a missing reference
/// check [`TimestampIssue::is_absent`].
pub fn parse_offset(raw: &str, platform: Platform) -> Result<TimeOffset, TimestampError> {
    let fail = |issue| TimestampError::new(raw, platform, issue);

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(fail(TimestampIssue::Empty));
    }

    let style = platform.timestamp_style();
    let value = match find_time_param(trimmed) {
        Some(value) => value,
        // A Twitch offset may be given bare, without the surrounding link
        None if style == TimestampStyle::Structured
            && trimmed.starts_with(|c: char| c.is_ascii_digit()) =>
        {
            trimmed
        }
        None => return Err(fail(TimestampIssue::MissingMarker)),
    };

    let seconds = match style {
        TimestampStyle::Seconds => parse_seconds(value),
        TimestampStyle::Structured => parse_structured(value),
    }
    .map_err(fail)?;

    Ok(TimeOffset(seconds))
}

/// Locate the value of a `t=` query parameter.
///
/// Only occurrences at a parameter boundary count, so `list=` or `start=`
/// elsewhere in the link are not mistaken for the offset.
fn find_time_param(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut search = 0;
    while let Some(found) = s[search..].find("t=") {
        let at = search + found;
        if at == 0 || matches!(bytes[at - 1], b'?' | b'&' | b'#') {
            return Some(&s[at + 2..]);
        }
        search = at + 2;
    }
    None
}

fn is_param_end(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with(|c: char| c == '&' || c == '#')
}

/// Anything may follow the final field except more of the same token.
fn is_clean_tail(rest: &str) -> bool {
    !rest.starts_with(|c: char| c.is_ascii_alphanumeric())
}

fn parse_seconds(value: &str) -> Result<u64, TimestampIssue> {
    if is_param_end(value) || value.strip_prefix('s').is_some_and(is_param_end) {
        return Err(TimestampIssue::EmptyValue);
    }

    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    if digits_end == 0 {
        return Err(TimestampIssue::InvalidValue(value.to_string()));
    }

    let seconds = value[..digits_end]
        .parse::<u64>()
        .map_err(|_| TimestampIssue::Overflow)?;

    let rest = &value[digits_end..];
    let rest = rest.strip_prefix('s').unwrap_or(rest);
    if !is_clean_tail(rest) {
        return Err(TimestampIssue::InvalidValue(value.to_string()));
    }

    Ok(seconds)
}

fn parse_structured(value: &str) -> Result<u64, TimestampIssue> {
    if is_param_end(value) {
        return Err(TimestampIssue::EmptyValue);
    }

    let (hours, rest) = take_field(value, 'h')?;
    let (minutes, rest) = take_field(rest, 'm')?;
    let (seconds, rest) = take_field(rest, 's')?;
    if !is_clean_tail(rest) {
        return Err(TimestampIssue::InvalidValue(value.to_string()));
    }

    hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(seconds))
        .ok_or(TimestampIssue::Overflow)
}

/// Split `<digits><unit>` off the front of `input`.
fn take_field(input: &str, unit: char) -> Result<(u64, &str), TimestampIssue> {
    let pos = input.find(unit).ok_or(TimestampIssue::MissingField(unit))?;
    let field = &input[..pos];
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampIssue::InvalidValue(input.to_string()));
    }
    let number = field.parse::<u64>().map_err(|_| TimestampIssue::Overflow)?;
    Ok((number, &input[pos + unit.len_utf8()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(raw: &str, platform: Platform) -> u64 {
        parse_offset(raw, platform).unwrap().as_secs()
    }

    fn issue(raw: &str, platform: Platform) -> TimestampIssue {
        parse_offset(raw, platform).unwrap_err().issue
    }

    #[test]
    fn test_seconds_with_and_without_suffix() {
        assert_eq!(secs("https://www.youtube.com/watch?v=abc&t=732s", Platform::YouTube), 732);
        assert_eq!(secs("https://www.youtube.com/watch?v=abc&t=732", Platform::YouTube), 732);
        assert_eq!(secs("https://youtu.be/O4Ko7NW2yQo?t=7", Platform::Live), 7);
        assert_eq!(secs("t=0", Platform::YouTube), 0);
    }

    #[test]
    fn test_seconds_ignores_trailing_parameters() {
        assert_eq!(secs("https://youtu.be/abc?t=404s&feature=share", Platform::YouTube), 404);
        assert_eq!(secs("https://youtu.be/abc?t=404#comments", Platform::YouTube), 404);
    }

    #[test]
    fn test_seconds_skips_lookalike_parameters() {
        // "list=" ends in "t=" but is not the offset
        assert_eq!(
            secs("https://www.youtube.com/watch?v=abc&list=PL12&t=90s", Platform::YouTube),
            90
        );
        assert_eq!(
            issue("https://www.youtube.com/watch?v=abc&list=PL12", Platform::YouTube),
            TimestampIssue::MissingMarker
        );
    }

    #[test]
    fn test_structured_offsets() {
        assert_eq!(secs("1h07m32s", Platform::Twitch), 3600 + 420 + 32);
        assert_eq!(secs("https://www.twitch.tv/videos/123456?t=0h05m30s", Platform::Twitch), 330);
        assert_eq!(secs("https://www.twitch.tv/videos/123456?t=2h00m00s&foo=bar", Platform::Twitch), 7200);
    }

    #[test]
    fn test_structured_requires_all_fields() {
        assert_eq!(issue("https://www.twitch.tv/videos/1?t=5m30s", Platform::Twitch),
                   TimestampIssue::MissingField('h'));
        assert_eq!(issue("1h30s", Platform::Twitch), TimestampIssue::MissingField('m'));
        assert_eq!(issue("1h07m32", Platform::Twitch), TimestampIssue::MissingField('s'));
    }

    #[test]
    fn test_absent_references() {
        assert_eq!(issue("", Platform::YouTube), TimestampIssue::Empty);
        assert_eq!(issue("   ", Platform::Twitch), TimestampIssue::Empty);
        assert_eq!(issue("https://youtu.be/abc", Platform::YouTube), TimestampIssue::MissingMarker);
        assert_eq!(issue("https://www.twitch.tv/videos/123456", Platform::Twitch),
                   TimestampIssue::MissingMarker);
        assert_eq!(issue("https://youtu.be/abc?t=", Platform::YouTube), TimestampIssue::EmptyValue);
        assert_eq!(issue("https://youtu.be/abc?t=s&x=1", Platform::YouTube), TimestampIssue::EmptyValue);
        assert_eq!(issue("https://www.twitch.tv/videos/1?t=&a=b", Platform::Twitch),
                   TimestampIssue::EmptyValue);
    }

    #[test]
    fn test_garbled_values_are_not_absent() {
        let err = parse_offset("https://youtu.be/abc?t=12x4", Platform::YouTube).unwrap_err();
        assert!(!err.issue.is_absent());
        assert_eq!(err.platform, Platform::YouTube);

        // A structured value on a seconds platform is rejected, not truncated
        assert!(matches!(
            issue("https://youtu.be/abc?t=1h2m3s", Platform::YouTube),
            TimestampIssue::InvalidValue(_)
        ));
        assert!(matches!(issue("?t=abc", Platform::YouTube), TimestampIssue::InvalidValue(_)));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(issue("t=99999999999999999999999", Platform::YouTube), TimestampIssue::Overflow);
        assert_eq!(issue("9999999999999999999h00m00s", Platform::Twitch), TimestampIssue::Overflow);
    }

    #[test]
    fn test_platform_lookup() {
        assert_eq!("YouTube".parse::<Platform>().unwrap(), Platform::YouTube);
        assert_eq!("twitch".parse::<Platform>().unwrap(), Platform::Twitch);
        assert_eq!(" Live ".parse::<Platform>().unwrap(), Platform::Live);
        assert!("vimeo".parse::<Platform>().is_err());

        assert_eq!(Platform::Twitch.container_extension(), "mkv");
        assert_eq!(Platform::YouTube.container_extension(), "webm");
        assert_eq!(Platform::Live.container_extension(), "webm");
    }
}
