//! CUE sheet generation for a segmented recording.
//!
//! The sheet indexes the accepted windows inside the untouched source file, so
//! players that understand CUE can navigate the full stream by song.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::window::Window;

fn cue_file_type(source: &Path) -> &'static str {
    match source.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "mp3" => "MP3",
        Some(ext) if ext == "aif" || ext == "aiff" => "AIFF",
        _ => "WAVE",
    }
}

/// CUE strings are double-quoted and cannot escape quotes.
fn quoted(text: &str) -> String {
    text.replace('"', "'")
}

fn cue_time(secs: u64) -> String {
    // MM:SS:FF, whole seconds so frames are always 00
    format!("{:02}:{:02}:00", secs / 60, secs % 60)
}

/// Generate CUE file content from the window plan.
///
/// Each track's `INDEX 01` is its window start. Where the audio between the
/// furthest window end so far and the next start belongs to no song, that
/// track gets an `INDEX 00` at the gap start, so players treat the gap as
/// pregap instead of as the end of the previous song. Audio after the last
/// window still plays as part of the last track; CUE has no way to end one.
///
/// # Arguments
/// * `source` - Path of the recording the windows index into
/// * `artist` - Performer for the sheet and every track
/// * `title` - Stream title
/// * `tracks` - Song names with their windows, in playback order
///
/// # Returns
/// Complete CUE file content as a string
pub fn generate_cue_file(source: &Path, artist: &str, title: &str, tracks: &[(String, Window)]) -> String {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.wav");

    let mut cue = String::new();
    cue.push_str("REM GENERATOR \"livecut\"\n");
    cue.push_str(&format!("PERFORMER \"{}\"\n", quoted(artist)));
    cue.push_str(&format!("TITLE \"{}\"\n", quoted(title)));
    cue.push_str(&format!("FILE \"{}\" {}\n", quoted(file_name), cue_file_type(source)));

    let mut furthest_end: Option<u64> = None;
    for (i, (name, window)) in tracks.iter().enumerate() {
        let start = window.start.as_secs();
        cue.push_str(&format!("  TRACK {:02} AUDIO\n", i + 1));
        cue.push_str(&format!("    TITLE \"{}\"\n", quoted(name)));
        cue.push_str(&format!("    PERFORMER \"{}\"\n", quoted(artist)));
        if let Some(gap_start) = furthest_end.filter(|&end| end < start) {
            cue.push_str(&format!("    INDEX 00 {}\n", cue_time(gap_start)));
        }
        cue.push_str(&format!("    INDEX 01 {}\n", cue_time(start)));
        furthest_end = Some(furthest_end.map_or(window.end.as_secs(), |end| end.max(window.end.as_secs())));
    }

    cue
}

/// Write CUE file content as `<dir>/<stem>.cue`.
///
/// # Returns
/// Path to the created CUE file, or an error
pub fn write_cue_file(dir: &Path, stem: &str, cue_content: &str) -> Result<PathBuf, std::io::Error> {
    let cue_path = dir.join(format!("{}.cue", stem));
    let mut file = File::create(&cue_path)?;
    file.write_all(cue_content.as_bytes())?;
    Ok(cue_path)
}
