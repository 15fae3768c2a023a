//! One recording, end to end: plan windows, cut segments, tag them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::consistency::TimingAnomaly;
use crate::cuefile::{generate_cue_file, write_cue_file};
use crate::error::{FailureKind, SegmentError};
use crate::extract::SegmentExtractor;
use crate::song::{date_for_tags, segment_file_stem, stream_dir_name, track_label, SongEntry, SongList};
use crate::tags::{write_tags, TrackTags};
use crate::timestamp::Platform;
use crate::window::{build_windows, Window, WindowConfig};

/// A source recording. Never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub source: PathBuf,
    pub platform: Platform,
    pub live_title: String,
    /// Platform letter plus `YYMMDD`, e.g. `y240131`.
    pub date_id: String,
    pub cover_image: Option<PathBuf>,
}

impl Recording {
    /// Directory name the recording's segments go into.
    pub fn dir_name(&self) -> String {
        stream_dir_name(&self.date_id, &self.live_title)
    }

    /// Container of the source as a lowercase extension. A source without
    /// one is taken to be in the container its platform delivers.
    pub fn container(&self) -> String {
        self.source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| self.platform.container_extension().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOptions {
    pub window: WindowConfig,
    pub artist: String,
    /// Parent of the per-recording directories.
    pub output_root: PathBuf,
    /// Plan only, touch nothing on disk.
    pub dry_run: bool,
    /// Also write a CUE sheet of the plan.
    pub write_cue: bool,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            artist: String::new(),
            output_root: PathBuf::from("."),
            dry_run: false,
            write_cue: false,
        }
    }
}

/// A segment the plan calls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedSegment {
    pub index: usize,
    pub name: String,
    pub track: String,
    pub window: Window,
    pub output: PathBuf,
}

/// A song whose segment could not be produced. Its siblings are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongFailure {
    pub index: usize,
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Result of segmenting one consistent recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordingReport {
    pub output_dir: PathBuf,
    pub planned: Vec<PlannedSegment>,
    pub written: Vec<PathBuf>,
    /// Segments left alone because they already existed.
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<SongFailure>,
    pub anomalies: Vec<TimingAnomaly>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cue_file: Option<PathBuf>,
}

impl RecordingReport {
    pub fn segments_written(&self) -> usize {
        self.written.len()
    }

    pub fn segments_skipped(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.anomalies.is_empty()
    }
}

/// Segment one recording.
///
/// Windows for every song are computed and checked before any audio is
/// touched, so an inconsistent song list leaves the output directory as it
/// was. Past that point failures are per song: the failure is recorded and
/// the next song is cut. Segments are staged under a hidden temporary name
/// and only renamed into place once cut and tagged, so an interrupted run
/// never leaves a file that a later run would skip as done.
///
/// # Arguments
/// * `recording` - The source recording
/// * `songs` - Its song list, in order
/// * `options` - Pad, output location and artist
/// * `extractor` - Backend that cuts the audio
///
/// # Returns
/// The report, or the [`SegmentError`] that stopped the recording
pub fn segment_recording(
    recording: &Recording,
    songs: SongList,
    options: &SegmentOptions,
    extractor: &dyn SegmentExtractor,
) -> Result<RecordingReport, SegmentError> {
    let (windows, anomalies) = build_windows(&songs, &options.window)?.into_parts();

    let output_dir = options.output_root.join(recording.dir_name());
    let track_count = windows.len();

    let mut report = RecordingReport {
        output_dir: output_dir.clone(),
        anomalies,
        ..RecordingReport::default()
    };

    let mut jobs: Vec<(&SongEntry, PlannedSegment)> = Vec::with_capacity(track_count);
    for (k, window) in windows.iter().enumerate() {
        let Some(song) = songs.get(window.song) else {
            continue;
        };
        let stem = segment_file_stem(k + 1, &song.name);
        let planned = PlannedSegment {
            index: window.song,
            name: song.name.clone(),
            track: track_label(k + 1, track_count),
            window: *window,
            output: output_dir.join(format!("{}.{}", stem, extractor.extension())),
        };
        report.planned.push(planned.clone());
        jobs.push((song, planned));
    }

    if options.dry_run {
        return Ok(report);
    }

    if let Err(e) = fs::create_dir_all(&output_dir) {
        warn!("Cannot create {}: {}", output_dir.display(), e);
        for (_, planned) in &jobs {
            report.failures.push(SongFailure {
                index: planned.index,
                name: planned.name.clone(),
                kind: FailureKind::ExtractionFailure,
                message: format!("cannot create {}: {}", output_dir.display(), e),
            });
        }
        return Ok(report);
    }

    let date = date_for_tags(&recording.date_id);
    if date.is_none() {
        warn!("Date id '{}' has no YYMMDD date, segments get no recording date", recording.date_id);
    }

    for (song, planned) in &jobs {
        if planned.output.exists() {
            info!("Skipping {}, already extracted", planned.output.display());
            report.skipped.push(planned.output.clone());
            continue;
        }

        let tags = TrackTags {
            title: song.name.clone(),
            artist: options.artist.clone(),
            album: recording.live_title.clone(),
            track: planned.track.clone(),
            date: date.clone(),
            genre: song.genre.clone(),
            comment: song.comment.clone(),
            cover: recording.cover_image.clone(),
        };

        match cut_and_tag(recording, planned, &tags, extractor) {
            Ok(()) => {
                info!("Wrote {}", planned.output.display());
                report.written.push(planned.output.clone());
            }
            Err(failure) => {
                warn!("Song {} '{}' failed: {}", failure.index, failure.name, failure.message);
                report.failures.push(failure);
            }
        }
    }

    if options.write_cue {
        let tracks: Vec<(String, Window)> = jobs.iter().map(|(_, p)| (p.name.clone(), p.window)).collect();
        let cue = generate_cue_file(&recording.source, &options.artist, &recording.live_title, &tracks);
        match write_cue_file(&output_dir, &recording.dir_name(), &cue) {
            Ok(path) => report.cue_file = Some(path),
            Err(e) => warn!("Failed to write CUE sheet for {}: {}", recording.dir_name(), e),
        }
    }

    Ok(report)
}

fn cut_and_tag(
    recording: &Recording,
    planned: &PlannedSegment,
    tags: &TrackTags,
    extractor: &dyn SegmentExtractor,
) -> Result<(), SongFailure> {
    let failure = |kind, message: String| SongFailure {
        index: planned.index,
        name: planned.name.clone(),
        kind,
        message,
    };

    let dir = planned.output.parent().unwrap_or(Path::new("."));
    let suffix = format!(".{}", extractor.extension());
    let mut builder = tempfile::Builder::new();
    builder.prefix(".livecut-").suffix(&suffix);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    let staged = builder
        .tempfile_in(dir)
        .map_err(|e| failure(FailureKind::ExtractionFailure, format!("cannot stage segment: {}", e)))?;

    extractor
        .extract(&recording.source, &planned.window, staged.path())
        .map_err(|e| failure(FailureKind::ExtractionFailure, e.to_string()))?;
    write_tags(staged.path(), tags).map_err(|e| failure(FailureKind::TagWriteFailure, e.to_string()))?;
    staged
        .persist(&planned.output)
        .map_err(|e| failure(FailureKind::ExtractionFailure, format!("cannot move segment into place: {}", e.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::extract::PcmExtractor;
    use crate::wavfile::{read_wav_pcm16, WavWriter};
    use id3::{Tag, TagLike};
    use tempfile::{tempdir, TempDir};

    const RATE: u32 = 4000;

    fn song(position: u32, name: &str, at: u64, duration_seconds: u64) -> SongEntry {
        SongEntry {
            position,
            name: name.to_string(),
            duration_seconds,
            reference: format!("https://youtu.be/abc?t={}", at),
            platform: Platform::YouTube,
            live_title: "Sunday Jam | Live".to_string(),
            genre: "Funk".to_string(),
            comment: None,
        }
    }

    /// 30 second mono recording plus options writing below the same tempdir.
    fn setup() -> (TempDir, Recording, SegmentOptions) {
        let dir = tempdir().unwrap();
        let source = dir.path().join("y240131.wav");
        let mut writer = WavWriter::create(&source, RATE, 1).unwrap();
        let samples: Vec<i16> = (0..30 * RATE).map(|i| (i % 3000) as i16).collect();
        writer.write_samples(&samples).unwrap();
        writer.finalize().unwrap();

        let recording = Recording {
            source,
            platform: Platform::YouTube,
            live_title: "Sunday Jam | Live".to_string(),
            date_id: "y240131".to_string(),
            cover_image: None,
        };
        let options = SegmentOptions {
            artist: "The Streamer".to_string(),
            output_root: dir.path().join("out"),
            ..SegmentOptions::default()
        };
        (dir, recording, options)
    }

    fn songs() -> SongList {
        SongList::new(vec![
            song(1, "Intro", 0, 5),
            song(2, "Funk/Soul Jam", 10, 5),
            song(3, "-applause", 18, 0),
            song(4, "Outro", 20, 4),
        ])
        .unwrap()
    }

    #[test]
    fn test_segments_are_cut_named_and_tagged() {
        let (_dir, recording, options) = setup();
        let report = segment_recording(&recording, songs(), &options, &PcmExtractor::new()).unwrap();

        let out = options.output_root.join("240131 Sunday Jam  Live");
        assert_eq!(report.output_dir, out);
        assert_eq!(report.segments_written(), 3);
        assert!(report.is_clean());
        assert_eq!(
            report.written,
            vec![out.join("1. Intro.wav"), out.join("2. FunkSoul Jam.wav"), out.join("3. Outro.wav")]
        );

        // Continuation marker sets the second song's end to 18s
        let (header, _) = read_wav_pcm16(&out.join("2. FunkSoul Jam.wav")).unwrap();
        assert_eq!(header.frame_count(), 8 * RATE as u64);
        // Declared length plus the default pad
        let (header, _) = read_wav_pcm16(&out.join("1. Intro.wav")).unwrap();
        assert_eq!(header.frame_count(), 8 * RATE as u64);

        let tag = Tag::read_from_wav_path(out.join("3. Outro.wav")).unwrap();
        assert_eq!(tag.title(), Some("Outro"));
        assert_eq!(tag.artist(), Some("The Streamer"));
        assert_eq!(tag.album(), Some("Sunday Jam | Live"));
        assert_eq!(tag.get("TRCK").and_then(|f| f.content().text()), Some("3/3"));
        assert_eq!(tag.get("TDRC").and_then(|f| f.content().text()), Some("2024-01-31"));
    }

    #[test]
    fn test_rerun_skips_existing_segments() {
        let (_dir, recording, options) = setup();
        let extractor = PcmExtractor::new();
        segment_recording(&recording, songs(), &options, &extractor).unwrap();
        let first = fs::read(options.output_root.join("240131 Sunday Jam  Live").join("1. Intro.wav")).unwrap();

        let report = segment_recording(&recording, songs(), &options, &extractor).unwrap();
        assert_eq!(report.segments_written(), 0);
        assert_eq!(report.segments_skipped(), 3);

        let second = fs::read(options.output_root.join("240131 Sunday Jam  Live").join("1. Intro.wav")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_inconsistent_recording_writes_nothing() {
        let (_dir, recording, options) = setup();
        let list = SongList::new(vec![song(1, "Long", 0, 117), song(2, "Early", 60, 137)]).unwrap();

        let err = segment_recording(&recording, list, &options, &PcmExtractor::new()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::TimingInconsistency);
        assert_eq!(err.songs(), vec![0, 1]);
        assert!(!options.output_root.exists());
    }

    #[test]
    fn test_dry_run_only_plans() {
        let (_dir, recording, mut options) = setup();
        options.dry_run = true;

        let report = segment_recording(&recording, songs(), &options, &PcmExtractor::new()).unwrap();
        assert_eq!(report.planned.len(), 3);
        assert_eq!(report.planned[2].index, 3);
        assert_eq!(report.planned[2].track, "3/3");
        assert_eq!(report.segments_written(), 0);
        assert!(!options.output_root.exists());
    }

    /// Writes a stub file, then fails for one song.
    struct FlakyExtractor {
        fail_at: u64,
    }

    impl SegmentExtractor for FlakyExtractor {
        fn extension(&self) -> &'static str {
            "mp3"
        }

        fn extract(&self, _source: &Path, window: &Window, output: &Path) -> Result<(), ExtractError> {
            fs::write(output, b"partial")?;
            if window.start.as_secs() == self.fail_at {
                return Err(ExtractError::WindowOutOfRange {
                    window: *window,
                    available_seconds: 0,
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_song_failure_does_not_stop_siblings() {
        let (_dir, recording, options) = setup();
        let extractor = FlakyExtractor { fail_at: 10 };

        let report = segment_recording(&recording, songs(), &options, &extractor).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].kind, FailureKind::ExtractionFailure);
        assert_eq!(report.segments_written(), 2);
        assert!(report.output_dir.join("1. Intro.mp3").exists());
        assert!(!report.output_dir.join("2. FunkSoul Jam.mp3").exists());
    }

    #[test]
    fn test_failed_song_leaves_no_staged_file() {
        let (_dir, recording, options) = setup();
        let report = segment_recording(&recording, songs(), &options, &FlakyExtractor { fail_at: 10 }).unwrap();

        let mut names: Vec<String> = fs::read_dir(&report.output_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["1. Intro.mp3".to_string(), "3. Outro.mp3".to_string()]);
    }

    /// Checks it is never handed the final output path.
    struct StagingExtractor;

    impl SegmentExtractor for StagingExtractor {
        fn extension(&self) -> &'static str {
            "mp3"
        }

        fn extract(&self, _source: &Path, _window: &Window, output: &Path) -> Result<(), ExtractError> {
            let name = output.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with(".livecut-"), "extracting straight to {}", name);
            assert!(name.ends_with(".mp3"));
            fs::write(output, b"audio")?;
            Ok(())
        }
    }

    #[test]
    fn test_segments_are_staged_then_moved_into_place() {
        let (_dir, recording, options) = setup();
        let report = segment_recording(&recording, songs(), &options, &StagingExtractor).unwrap();
        assert_eq!(report.segments_written(), 3);
        assert!(report.written.iter().all(|path| path.exists()));
    }

    #[test]
    fn test_container_falls_back_to_platform() {
        let (_dir, mut recording, _options) = setup();
        assert_eq!(recording.container(), "wav");
        recording.source = PathBuf::from("/data/Stream.WEBM");
        assert_eq!(recording.container(), "webm");
        recording.source = PathBuf::from("/data/t240131");
        recording.platform = Platform::Twitch;
        assert_eq!(recording.container(), "mkv");
    }

    #[test]
    fn test_missing_cover_is_a_tag_failure() {
        let (dir, mut recording, options) = setup();
        recording.cover_image = Some(dir.path().join("missing.jpg"));

        let report = segment_recording(&recording, songs(), &options, &PcmExtractor::new()).unwrap();
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().all(|f| f.kind == FailureKind::TagWriteFailure));
        assert!(!report.output_dir.join("1. Intro.wav").exists());
    }

    #[test]
    fn test_cue_sheet_is_written() {
        let (_dir, recording, mut options) = setup();
        options.write_cue = true;

        let report = segment_recording(&recording, songs(), &options, &PcmExtractor::new()).unwrap();
        let cue_path = report.cue_file.unwrap();
        let cue = fs::read_to_string(cue_path).unwrap();
        assert!(cue.contains("FILE \"y240131.wav\" WAVE"));
        assert!(cue.contains("INDEX 01 00:20:00"));
    }
}
