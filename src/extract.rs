//! Cutting one window out of a source recording.
//!
//! Two backends share the [`SegmentExtractor`] trait. [`PcmExtractor`] decodes
//! with symphonia and writes 16-bit WAV, which makes re-runs byte-identical.
//! [`FfmpegExtractor`] hands the cut to the `ffmpeg` binary and produces MP3,
//! for sources symphonia cannot decode (webm/opus downloads).

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::Command;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::wavfile::WavWriter;
use crate::window::Window;

/// Default LAME VBR quality (`-q:a`), 0 best to 9 smallest.
pub const DEFAULT_MP3_QUALITY: u8 = 2;

/// Containers the enabled symphonia demuxers and decoders can read end to end.
/// webm and ogg are missing: their audio is usually Opus.
pub const PCM_CONTAINERS: &[&str] = &["wav", "wave", "flac", "mp3", "mkv", "mka", "mp4", "m4a", "aac"];

/// Cuts `[window.start, window.end)` of `source` into `output`.
///
/// Implementations always overwrite `output`. Deciding whether a segment
/// needs cutting at all is up to the caller.
pub trait SegmentExtractor: Send + Sync {
    /// File extension of the produced segments, without the dot.
    fn extension(&self) -> &'static str;

    /// Whether sources in `container` (lowercase extension) can be cut.
    fn supports(&self, _container: &str) -> bool {
        true
    }

    fn extract(&self, source: &Path, window: &Window, output: &Path) -> Result<(), ExtractError>;
}

/// Decodes the source with symphonia and writes the window as 16-bit PCM WAV.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmExtractor;

impl PcmExtractor {
    pub fn new() -> Self {
        PcmExtractor
    }
}

/// Frame index of a packet timestamp.
fn frame_at(ts: u64, time_base: Option<TimeBase>, rate: u32) -> u64 {
    match time_base {
        Some(tb) if !(tb.numer == 1 && tb.denom == rate) => {
            let time = tb.calc_time(ts);
            time.seconds.saturating_mul(rate as u64) + (time.frac * rate as f64).round() as u64
        }
        _ => ts,
    }
}

fn write_silence<W: io::Write + io::Seek>(writer: &mut WavWriter<W>, samples: usize) -> io::Result<()> {
    const CHUNK: usize = 4096;
    let zeros = [0i16; CHUNK];
    let mut left = samples;
    while left > 0 {
        let n = left.min(CHUNK);
        writer.write_samples(&zeros[..n])?;
        left -= n;
    }
    Ok(())
}

impl SegmentExtractor for PcmExtractor {
    fn extension(&self) -> &'static str {
        "wav"
    }

    fn supports(&self, container: &str) -> bool {
        PCM_CONTAINERS.contains(&container)
    }

    fn extract(&self, source: &Path, window: &Window, output: &Path) -> Result<(), ExtractError> {
        if !source.exists() {
            return Err(ExtractError::SourceNotFound(source.to_path_buf()));
        }

        let file = File::open(source)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| ExtractError::NoAudioTrack(source.to_path_buf()))?;
        let track_id = track.id;
        let rate = track.codec_params.sample_rate.ok_or(ExtractError::MissingSampleRate)?;
        let time_base = track.codec_params.time_base;
        let total_frames = track.codec_params.n_frames;

        let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let first_frame = window.start.as_secs().saturating_mul(rate as u64);
        let last_frame = window.end.as_secs().saturating_mul(rate as u64);

        if let Some(total) = total_frames {
            if first_frame >= total {
                return Err(ExtractError::WindowOutOfRange {
                    window: *window,
                    available_seconds: total / rate as u64,
                });
            }
        }

        if first_frame > 0 {
            let to = SeekTo::Time {
                time: Time::new(window.start.as_secs(), 0.0),
                track_id: Some(track_id),
            };
            match format_reader.seek(SeekMode::Accurate, to) {
                Ok(seeked) => {
                    debug!("Seeked {} to ts {} for {}", source.display(), seeked.actual_ts, window);
                    decoder.reset();
                }
                Err(e @ (SymphoniaError::SeekError(_) | SymphoniaError::Unsupported(_))) => {
                    debug!("Cannot seek in {} ({}), decoding from the start", source.display(), e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Next frame owed to the output. Packets are placed by timestamp, so a
        // packet that fails to decode leaves silence instead of shifting the cut.
        let mut cursor = first_frame;
        let mut frames_available: u64 = 0;
        let mut sample_buf: Option<SampleBuffer<i16>> = None;
        let mut buf_frames = 0usize;
        let mut writer: Option<WavWriter<BufWriter<File>>> = None;

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let packet_start = frame_at(packet.ts(), time_base, rate);
            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    debug!("Skipping undecodable packet at ts {} in {}: {}", packet.ts(), source.display(), msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let packet_end = packet_start + decoded.frames() as u64;
            frames_available = frames_available.max(packet_end);

            let lo = cursor.max(packet_start);
            let hi = last_frame.min(packet_end);
            if hi > lo {
                let spec = *decoded.spec();
                let channels = spec.channels.count();
                if buf_frames < decoded.capacity() {
                    buf_frames = decoded.capacity();
                    sample_buf = Some(SampleBuffer::<i16>::new(buf_frames as u64, spec));
                }
                let Some(buf) = sample_buf.as_mut() else {
                    continue;
                };
                buf.copy_interleaved_ref(decoded);

                if writer.is_none() {
                    let channel_count = u16::try_from(channels).map_err(|_| {
                        io::Error::new(ErrorKind::InvalidData, format!("{} channels do not fit a WAV header", channels))
                    })?;
                    writer = Some(WavWriter::create(output, rate, channel_count)?);
                }
                if let Some(w) = writer.as_mut() {
                    if lo > cursor {
                        warn!(
                            "{} frames missing before ts {} in {}, filled with silence",
                            lo - cursor,
                            packet.ts(),
                            source.display()
                        );
                        write_silence(w, (lo - cursor) as usize * channels)?;
                    }
                    let from = (lo - packet_start) as usize * channels;
                    let to = (hi - packet_start) as usize * channels;
                    w.write_samples(&buf.samples()[from..to])?;
                }
                cursor = hi;
            }

            if packet_end >= last_frame {
                break;
            }
        }

        let available_seconds = total_frames.unwrap_or(frames_available) / rate as u64;
        match writer {
            Some(w) => {
                if cursor < last_frame {
                    warn!(
                        "Recording {} ends at {}s, segment {} is truncated",
                        source.display(),
                        available_seconds,
                        window
                    );
                }
                w.finalize()?;
                Ok(())
            }
            None => Err(ExtractError::WindowOutOfRange {
                window: *window,
                available_seconds,
            }),
        }
    }
}

/// Cuts and encodes to MP3 by running `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    tool: PathBuf,
    quality: u8,
}

impl FfmpegExtractor {
    /// Resolve the ffmpeg binary: the configured path when it exists,
    /// otherwise whatever `ffmpeg` is on `PATH`.
    pub fn locate(configured: Option<&Path>, quality: u8) -> Result<Self, ExtractError> {
        if let Some(path) = configured {
            if path.exists() {
                return Ok(Self::with_tool(path, quality));
            }
            warn!("Configured ffmpeg {} does not exist, searching PATH", path.display());
        }

        let tool = which::which("ffmpeg").map_err(|_| ExtractError::ToolNotFound("ffmpeg".to_string()))?;
        Ok(Self::with_tool(&tool, quality))
    }

    pub fn with_tool(tool: &Path, quality: u8) -> Self {
        FfmpegExtractor {
            tool: tool.to_path_buf(),
            quality: quality.min(9),
        }
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Arguments for one cut, seeking on the input side.
    fn command_args(&self, source: &Path, window: &Window, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-ss"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(window.start.as_secs().to_string().into());
        args.push("-i".into());
        args.push(source.as_os_str().to_owned());
        args.push("-t".into());
        args.push(window.duration_secs().to_string().into());
        for arg in ["-vn", "-map_metadata", "-1", "-codec:a", "libmp3lame", "-q:a"] {
            args.push(arg.into());
        }
        args.push(self.quality.to_string().into());
        for arg in ["-fflags", "+bitexact", "-flags:a", "+bitexact"] {
            args.push(arg.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl SegmentExtractor for FfmpegExtractor {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    fn extract(&self, source: &Path, window: &Window, output: &Path) -> Result<(), ExtractError> {
        if !source.exists() {
            return Err(ExtractError::SourceNotFound(source.to_path_buf()));
        }

        debug!("Running ffmpeg for {} {}", output.display(), window);
        let result = Command::new(&self.tool)
            .args(self.command_args(source, window, output))
            .output()?;

        if !result.status.success() {
            return Err(ExtractError::ToolFailed {
                tool: "ffmpeg".to_string(),
                message: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.exists() {
            return Err(ExtractError::ToolFailed {
                tool: "ffmpeg".to_string(),
                message: format!("no output written for {}", window),
            });
        }
        Ok(())
    }
}
