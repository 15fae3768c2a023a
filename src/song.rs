//! Song entries of one recording, and the names derived from them.

use serde::{Deserialize, Serialize};

use crate::error::SegmentError;
use crate::timestamp::Platform;

/// Leading character of an entry that only marks where the previous song ends.
pub const CONTINUATION_MARKER: char = '-';

/// One catalogued song of a recording, as handed over by the song sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongEntry {
    /// Position of the entry in the sheet, strictly increasing within a recording.
    pub position: u32,
    pub name: String,
    /// Nominal length of the song in seconds.
    pub duration_seconds: u64,
    /// Link (or bare offset) pointing at the song inside the recording.
    pub reference: String,
    pub platform: Platform,
    pub live_title: String,
    pub genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SongEntry {
    /// Whether this entry is a boundary marker rather than a song.
    pub fn is_continuation(&self) -> bool {
        self.name.starts_with(CONTINUATION_MARKER)
    }
}

/// The ordered song entries of one recording.
///
/// Construction checks the two sequence invariants the window builder
/// relies on: positions strictly increase and the list never opens with a
/// continuation marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongList {
    entries: Vec<SongEntry>,
}

impl SongList {
    pub fn new(entries: Vec<SongEntry>) -> Result<Self, SegmentError> {
        if let Some(first) = entries.first() {
            if first.is_continuation() {
                return Err(SegmentError::MalformedSequence {
                    index: 0,
                    name: first.name.clone(),
                    reason: "recording opens with a continuation marker".to_string(),
                });
            }
        }

        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].position <= pair[0].position {
                return Err(SegmentError::MalformedSequence {
                    index: index + 1,
                    name: pair[1].name.clone(),
                    reason: format!(
                        "position {} does not follow position {}",
                        pair[1].position, pair[0].position
                    ),
                });
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SongEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[SongEntry] {
        &self.entries
    }

    /// Number of entries that are real songs (and so get a segment).
    pub fn track_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_continuation()).count()
    }
}

/// Strip the characters that break directory names or tag display from a
/// stream title.
pub fn format_stream_title(live_title: &str) -> String {
    live_title
        .chars()
        .filter(|c| !matches!(c, '|' | '.' | '\'' | '/'))
        .collect()
}

/// Directory name of a recording: its date id without the platform prefix,
/// then the cleaned title (`y240131` + `Sunday Jam | Live` → `240131 Sunday Jam  Live`).
pub fn stream_dir_name(date_id: &str, live_title: &str) -> String {
    let date = date_id.get(1..).unwrap_or("");
    format!("{} {}", date, format_stream_title(live_title))
}

/// File stem of a segment: `<track>. <name>` with path separators removed.
pub fn segment_file_stem(track_number: usize, name: &str) -> String {
    let clean: String = name.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    format!("{}. {}", track_number, clean)
}

/// Track number frame text, `"3/12"`.
pub fn track_label(track_number: usize, track_count: usize) -> String {
    format!("{}/{}", track_number, track_count)
}

/// Recording date for the tags, derived from a date id.
///
/// Ids are a platform letter followed by `YYMMDD`, optionally followed by a
/// suffix telling apart streams of the same day (`y240131`, `t240131l` and
/// `y240131pm` all give `2024-01-31`).
///
/// # Returns
/// `None` when the id does not contain a six digit date.
pub fn date_for_tags(date_id: &str) -> Option<String> {
    let digits = date_id.get(1..7)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("20{}-{}-{}", &digits[..2], &digits[2..4], &digits[4..]))
}
