//! Segmenting many recordings on a pool of worker threads.
//!
//! Recordings share nothing, so each worker takes a whole recording off the
//! queue and runs it to completion. A failed recording never rolls back or
//! blocks any other.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::thread;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{FailureKind, SegmentError};
use crate::extract::SegmentExtractor;
use crate::segmenter::{segment_recording, Recording, RecordingReport, SegmentOptions};
use crate::song::{format_stream_title, SongEntry, SongList};

/// One recording and its raw song rows.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub recording: Recording,
    pub songs: Vec<SongEntry>,
}

/// Machine-readable form of a recording-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub kind: FailureKind,
    pub songs: Vec<usize>,
    pub message: String,
}

impl From<&SegmentError> for FailureSummary {
    fn from(err: &SegmentError) -> Self {
        FailureSummary {
            kind: err.kind(),
            songs: err.songs(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordingOutcome {
    Completed(RecordingReport),
    Skipped { reason: String },
    Failed(FailureSummary),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub recording: String,
    pub source: PathBuf,
    #[serde(flatten)]
    pub outcome: RecordingOutcome,
}

/// Totals over a batch, for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTotals {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub segments_written: usize,
    pub segments_skipped: usize,
    pub song_failures: usize,
    pub anomalies: usize,
}

impl BatchTotals {
    pub fn from_results(results: &[BatchResult]) -> Self {
        let mut totals = BatchTotals::default();
        for result in results {
            match &result.outcome {
                RecordingOutcome::Completed(report) => {
                    totals.completed += 1;
                    totals.segments_written += report.segments_written();
                    totals.segments_skipped += report.segments_skipped();
                    totals.song_failures += report.failures.len();
                    totals.anomalies += report.anomalies.len();
                }
                RecordingOutcome::Skipped { .. } => totals.skipped += 1,
                RecordingOutcome::Failed(_) => totals.failed += 1,
            }
        }
        totals
    }

    /// True when nothing failed, at recording or song level.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.song_failures == 0
    }
}

pub struct BatchRunner {
    options: SegmentOptions,
    extractor: Arc<dyn SegmentExtractor>,
    fallback: Option<Arc<dyn SegmentExtractor>>,
    workers: usize,
    skip_titles: Vec<String>,
}

impl BatchRunner {
    pub fn new(options: SegmentOptions, extractor: Arc<dyn SegmentExtractor>, workers: usize) -> Self {
        BatchRunner {
            options,
            extractor,
            fallback: None,
            workers: workers.max(1),
            skip_titles: Vec::new(),
        }
    }

    /// Stream titles to leave alone. Compared after title formatting.
    pub fn with_skip_titles(mut self, titles: &[String]) -> Self {
        self.skip_titles = titles.iter().map(|t| format_stream_title(t)).collect();
        self
    }

    /// Extractor for recordings whose container the main one cannot read.
    pub fn with_fallback(mut self, extractor: Arc<dyn SegmentExtractor>) -> Self {
        self.fallback = Some(extractor);
        self
    }

    /// Process every job, returning exactly one result per job, in job order.
    pub fn run(&self, jobs: Vec<BatchJob>) -> Vec<BatchResult> {
        let total = jobs.len();
        let workers = self.workers.min(total.max(1));
        info!("Segmenting {} recording(s) on {} worker(s)", total, workers);

        let (job_tx, job_rx) = channel::<(usize, BatchJob)>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = channel::<(usize, BatchResult)>();

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let extractor = Arc::clone(&self.extractor);
            let fallback = self.fallback.clone();
            let options = self.options.clone();
            let skip_titles = self.skip_titles.clone();

            handles.push(thread::spawn(move || {
                loop {
                    let next = match job_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok((index, job)) = next else {
                        break;
                    };
                    let name = job.recording.dir_name();
                    let source = job.recording.source.clone();
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        process_job(job, &options, extractor.as_ref(), fallback.as_deref(), &skip_titles)
                    }))
                    .unwrap_or_else(|payload| {
                        let detail = panic_message(payload.as_ref());
                        error!("{}: segmentation panicked: {}", name, detail);
                        failed(name, source, FailureKind::Internal, format!("segmentation panicked: {}", detail))
                    });
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
                debug!("Worker {} finished", id);
            }));
        }
        drop(result_tx);

        let labels: Vec<(String, PathBuf)> = jobs
            .iter()
            .map(|job| (job.recording.dir_name(), job.recording.source.clone()))
            .collect();

        for (index, job) in jobs.into_iter().enumerate() {
            if job_tx.send((index, job)).is_err() {
                warn!("All workers exited early");
                break;
            }
        }
        drop(job_tx);

        let mut results: Vec<Option<BatchResult>> = (0..total).map(|_| None).collect();
        for (index, result) in result_rx {
            results[index] = Some(result);
        }

        for handle in handles {
            if handle.join().is_err() {
                error!("A segmentation worker panicked");
            }
        }

        results
            .into_iter()
            .zip(labels)
            .map(|(result, (name, source))| {
                result.unwrap_or_else(|| {
                    error!("{}: no result from the worker pool", name);
                    failed(name, source, FailureKind::Internal, "no result from the worker pool".to_string())
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn failed(recording: String, source: PathBuf, kind: FailureKind, message: String) -> BatchResult {
    BatchResult {
        recording,
        source,
        outcome: RecordingOutcome::Failed(FailureSummary {
            kind,
            songs: Vec::new(),
            message,
        }),
    }
}

fn process_job(
    job: BatchJob,
    options: &SegmentOptions,
    extractor: &dyn SegmentExtractor,
    fallback: Option<&dyn SegmentExtractor>,
    skip_titles: &[String],
) -> BatchResult {
    let BatchJob { recording, songs } = job;
    let name = recording.dir_name();
    let source = recording.source.clone();

    let title = format_stream_title(&recording.live_title);
    if skip_titles.contains(&title) {
        info!("Skipping {}, title is on the skip list", name);
        return BatchResult {
            recording: name,
            source,
            outcome: RecordingOutcome::Skipped {
                reason: "title is on the skip list".to_string(),
            },
        };
    }

    let container = recording.container();
    let extractor = if extractor.supports(&container) {
        extractor
    } else {
        match fallback.filter(|f| f.supports(&container)) {
            Some(fallback) => {
                debug!("{}: .{} source, using the fallback extractor", name, container);
                fallback
            }
            None => {
                error!("{}: no configured extractor can read .{} sources", name, container);
                return failed(
                    name,
                    source,
                    FailureKind::ExtractionFailure,
                    format!("no configured extractor can read .{} sources", container),
                );
            }
        }
    };

    info!("Segmenting {}", name);
    let outcome = match SongList::new(songs).and_then(|songs| segment_recording(&recording, songs, options, extractor)) {
        Ok(report) => {
            info!(
                "{}: {} written, {} already present, {} failed, {} anomalies",
                name,
                report.segments_written(),
                report.segments_skipped(),
                report.failures.len(),
                report.anomalies.len()
            );
            RecordingOutcome::Completed(report)
        }
        Err(e) => {
            error!("{}: {}", name, e);
            RecordingOutcome::Failed(FailureSummary::from(&e))
        }
    };

    BatchResult {
        recording: name,
        source,
        outcome,
    }
}
