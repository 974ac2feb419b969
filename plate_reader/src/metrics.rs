//! Process wide counters for the reader loop, kept in a private registry and
//! rendered in the Prometheus text format on shutdown.

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

lazy_static! {
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("plate_reader".to_string()), None)
            .unwrap_or_else(|_| Registry::new());
    pub static ref FRAMES_TOTAL: IntCounter =
        IntCounter::new("frames_total", "Frames read from the source").unwrap();
    pub static ref FRAMES_SKIPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("frames_skipped_total", "Frames dropped by a stage error"),
        &["reason"]
    )
    .unwrap();
    pub static ref CANDIDATES_TOTAL: IntCounter =
        IntCounter::new("plate_candidates_total", "Frames with a plate shaped region").unwrap();
    pub static ref OCR_FAILURES: IntCounter =
        IntCounter::new("ocr_failures_total", "Candidates the OCR engine failed on").unwrap();
    pub static ref PLATES_RECOGNIZED: IntCounter =
        IntCounter::new("plates_recognized_total", "Candidates whose text passed sanitization")
            .unwrap();
    pub static ref PLATES_ACCEPTED: IntCounter =
        IntCounter::new("plates_accepted_total", "Plates let through by the debounce gate")
            .unwrap();
    pub static ref PUBLISHED_TOTAL: IntCounter =
        IntCounter::new("published_total", "Plate events handed to the transport").unwrap();
    pub static ref PUBLISH_FAILURES: IntCounter =
        IntCounter::new("publish_failures_total", "Plate events the transport refused").unwrap();
    pub static ref OCR_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("ocr_seconds", "Time spent inside the OCR engine")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5])
    )
    .unwrap();
}

/// Registers every collector once. Safe to call repeatedly.
pub fn register() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(FRAMES_TOTAL.clone()),
        Box::new(FRAMES_SKIPPED.clone()),
        Box::new(CANDIDATES_TOTAL.clone()),
        Box::new(OCR_FAILURES.clone()),
        Box::new(PLATES_RECOGNIZED.clone()),
        Box::new(PLATES_ACCEPTED.clone()),
        Box::new(PUBLISHED_TOTAL.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        Box::new(OCR_SECONDS.clone()),
    ];
    for collector in collectors {
        // AlreadyReg is the only expected failure here.
        let _ = REGISTRY.register(collector);
    }
}

pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        log::warn!("cannot encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
