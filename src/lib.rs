pub mod batch;
pub mod config;
pub mod consistency;
pub mod cuefile;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod segmenter;
pub mod song;
pub mod tags;
pub mod timer;
pub mod timestamp;
pub mod wavfile;
pub mod window;

pub use batch::{BatchJob, BatchResult, BatchRunner, BatchTotals, FailureSummary, RecordingOutcome};
pub use config::{Config, ConfigError, Encoder};
pub use consistency::{ConsistencyChecker, TimingAnomaly};
pub use error::{ExtractError, FailureKind, SegmentError, TagError, TimestampError, TimestampIssue};
pub use extract::{FfmpegExtractor, PcmExtractor, SegmentExtractor};
pub use manifest::{Manifest, ManifestError};
pub use segmenter::{segment_recording, Recording, RecordingReport, SegmentOptions, SongFailure};
pub use song::{SongEntry, SongList};
pub use tags::{write_tags, TrackTags};
pub use timestamp::{parse_offset, Platform, TimeOffset};
pub use window::{build_windows, Window, WindowConfig, WindowPlan};
