//! Frame by frame orchestration of the detection stages.
//!
//! Everything runs on the calling thread: one frame is read, pushed through
//! every stage, and any plate accepted by the debounce gate is sent down the
//! detection channel. The loop drains that channel into the publisher before
//! reading the next frame.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use chrono::Local;
use crossbeam::channel::unbounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use opencv::prelude::Mat;

use crate::error::Result;
use crate::metrics;
use crate::plate_detection::color_segmenter::ColorSegmenter;
use crate::plate_detection::debounce::DebounceGate;
use crate::plate_detection::overlay::draw_detection;
use crate::plate_detection::overlay::PreviewWindow;
use crate::plate_detection::plate_localizer::PlateLocalizer;
use crate::plate_detection::plate_normalizer::crop_plate;
use crate::plate_detection::plate_normalizer::PlateNormalizer;
use crate::plate_detection::text_recognizer::TextEngine;
use crate::plate_detection::text_recognizer::TextRecognizer;
use crate::plate_detection::video_reader::FrameSource;
use crate::plate_detection::PlateCandidate;
use crate::plate_detection::PlateText;
use crate::publisher::PlateEvent;
use crate::publisher::Publisher;
use crate::publisher::Transport;
use crate::utils::FpsLimiter;

pub fn detection_channel() -> (Sender<PlateEvent>, Receiver<PlateEvent>) {
    unbounded()
}

/// What happened to a single frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub candidate: Option<PlateCandidate>,
    pub plate: Option<PlateText>,
    pub accepted: bool,
}

pub struct PlateReader<E: TextEngine> {
    segmenter: ColorSegmenter,
    localizer: PlateLocalizer,
    normalizer: PlateNormalizer,
    recognizer: TextRecognizer<E>,
    gate: DebounceGate,
    events: Sender<PlateEvent>,
}

impl<E: TextEngine> PlateReader<E> {
    pub fn new(engine: E, debounce: Duration, events: Sender<PlateEvent>) -> Self {
        Self {
            segmenter: ColorSegmenter::default(),
            localizer: PlateLocalizer::default(),
            normalizer: PlateNormalizer::default(),
            recognizer: TextRecognizer::new(engine),
            gate: DebounceGate::new(debounce),
            events,
        }
    }

    pub fn engine(&self) -> &E {
        self.recognizer.engine()
    }

    /// Runs segmentation through debounce on one frame. Stage failures come
    /// back as errors; an OCR failure only means nothing was read.
    pub fn process_frame(&mut self, frame: &Mat, now: Instant) -> Result<FrameReport> {
        let mask = self.segmenter.segment(frame)?;

        let Some(candidate) = self.localizer.locate(&mask)? else {
            return Ok(FrameReport::default());
        };
        metrics::CANDIDATES_TOTAL.inc();

        let crop = crop_plate(frame, candidate.bbox)?;
        let normalized = self.normalizer.normalize(&crop)?;

        let plate = match self.recognizer.recognize(&normalized) {
            Ok(plate) => plate,
            Err(e) => {
                log::warn!("OCR failed, treating frame as unreadable: {}", e);
                metrics::OCR_FAILURES.inc();
                None
            }
        };

        let mut accepted = false;
        if let Some(plate) = &plate {
            metrics::PLATES_RECOGNIZED.inc();
            if self.gate.should_publish(plate, now) {
                accepted = true;
                metrics::PLATES_ACCEPTED.inc();
                log::info!("Detected license plate: {}", plate);
                let event = PlateEvent {
                    plate: plate.clone(),
                    detected_at: Local::now(),
                };
                if self.events.send(event).is_err() {
                    log::warn!("detection channel closed, dropping {}", plate);
                }
            }
        }

        Ok(FrameReport {
            candidate: Some(candidate),
            plate,
            accepted,
        })
    }
}

pub struct RunOptions<'a> {
    pub max_fps: Option<u32>,
    pub preview: Option<&'a PreviewWindow>,
    pub shutdown: &'a AtomicBool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    EndOfStream,
    CaptureFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub skipped: u64,
    pub accepted: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub stop: StopReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            frames: 0,
            skipped: 0,
            accepted: 0,
            published: 0,
            publish_failures: 0,
            stop: StopReason::Shutdown,
        }
    }
}

/// Blocking capture loop. Returns once shutdown is requested, the source
/// ends, or a frame cannot be read.
pub fn run<S, E, T>(
    source: &mut S,
    reader: &mut PlateReader<E>,
    publisher: &Publisher<T>,
    events: &Receiver<PlateEvent>,
    options: RunOptions<'_>,
) -> Result<RunSummary>
where
    S: FrameSource,
    E: TextEngine,
    T: Transport,
{
    let mut summary = RunSummary::new();
    let mut limiter = options.max_fps.map(FpsLimiter::new);

    while !options.shutdown.load(Ordering::SeqCst) {
        let mut frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("end of stream after {} frames", summary.frames);
                summary.stop = StopReason::EndOfStream;
                break;
            }
            Err(e) => {
                log::error!("Could not read frame: {}", e);
                summary.stop = StopReason::CaptureFailed(e.to_string());
                break;
            }
        };
        summary.frames += 1;
        metrics::FRAMES_TOTAL.inc();

        let report = match reader.process_frame(&frame, Instant::now()) {
            Ok(report) => report,
            Err(e) if e.is_recoverable() => {
                log::debug!("skipping frame {}: {}", summary.frames, e);
                metrics::FRAMES_SKIPPED.with_label_values(&[e.kind()]).inc();
                summary.skipped += 1;
                FrameReport::default()
            }
            Err(e) => return Err(e),
        };
        if report.accepted {
            summary.accepted += 1;
        }

        let tally = publisher.publish_pending(events);
        summary.published += tally.published as u64;
        summary.publish_failures += tally.failed as u64;

        if let Some(window) = options.preview {
            if let Some(candidate) = &report.candidate {
                if let Err(e) = draw_detection(&mut frame, candidate, report.plate.as_ref()) {
                    log::warn!("cannot draw detection: {}", e);
                }
            }
            match window.show(&frame) {
                Ok(true) => {
                    log::info!("quit requested from preview window");
                    summary.stop = StopReason::Shutdown;
                    break;
                }
                Ok(false) => {}
                Err(e) => log::warn!("cannot update preview: {}", e),
            }
        }

        if let Some(limiter) = limiter.as_mut() {
            limiter.wait();
        }
    }

    Ok(summary)
}
