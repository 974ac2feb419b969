use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;

use plate_reader::config::ReaderConfig;
use plate_reader::metrics;
use plate_reader::mqtt::MqttTransport;
use plate_reader::pipeline::detection_channel;
use plate_reader::pipeline::run;
use plate_reader::pipeline::PlateReader;
use plate_reader::pipeline::RunOptions;
use plate_reader::pipeline::StopReason;
use plate_reader::plate_detection::overlay::PreviewWindow;
use plate_reader::plate_detection::text_recognizer::TesseractEngine;
use plate_reader::plate_detection::video_reader::SourceSpec;
use plate_reader::plate_detection::video_reader::VideoReader;
use plate_reader::publisher::Publisher;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Read yellow license plates from a camera and publish them over MQTT"
)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "PLATE_READER_CONFIG")]
    config: Option<PathBuf>,

    /// Capture device index or video file path.
    #[arg(long, env = "PLATE_READER_SOURCE")]
    source: Option<String>,

    /// Upper bound on processed frames per second.
    #[arg(long, env = "PLATE_READER_MAX_FPS")]
    max_fps: Option<u32>,

    /// Show the annotated frames in a window ('q' quits).
    #[arg(long, env = "PLATE_READER_PREVIEW")]
    preview: bool,

    /// MQTT broker host.
    #[arg(long, env = "MQTT_BROKER_HOST")]
    broker: Option<String>,

    /// MQTT broker port.
    #[arg(long, env = "MQTT_BROKER_PORT")]
    port: Option<u16>,

    /// Topic the plates are published on.
    #[arg(long, env = "MQTT_TOPIC")]
    topic: Option<String>,

    /// MQTT client identifier.
    #[arg(long, env = "MQTT_CLIENT_ID")]
    client_id: Option<String>,

    /// Directory holding the tesseract traineddata files.
    #[arg(long, env = "TESSDATA_PREFIX")]
    tessdata: Option<String>,

    /// Tesseract language.
    #[arg(long, env = "PLATE_READER_OCR_LANG")]
    lang: Option<String>,

    /// Seconds before the same plate is reported again.
    #[arg(long, env = "PLATE_READER_DEBOUNCE_SECS")]
    debounce_secs: Option<f64>,
}

impl Args {
    fn apply(&self, cfg: &mut ReaderConfig) {
        if let Some(source) = &self.source {
            cfg.camera.source = SourceSpec::parse(source);
        }
        if self.max_fps.is_some() {
            cfg.camera.max_fps = self.max_fps;
        }
        if self.preview {
            cfg.camera.preview = true;
        }
        if let Some(broker) = &self.broker {
            cfg.mqtt.host = broker.clone();
        }
        if let Some(port) = self.port {
            cfg.mqtt.port = port;
        }
        if let Some(topic) = &self.topic {
            cfg.mqtt.topic = topic.clone();
        }
        if let Some(client_id) = &self.client_id {
            cfg.mqtt.client_id = client_id.clone();
        }
        if self.tessdata.is_some() {
            cfg.ocr.data_path = self.tessdata.clone();
        }
        if let Some(lang) = &self.lang {
            cfg.ocr.language = lang.clone();
        }
        if let Some(secs) = self.debounce_secs {
            cfg.debounce_secs = secs;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ReaderConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut cfg);
    cfg.validate().context("validating configuration")?;
    metrics::register();

    let transport = MqttTransport::connect(&cfg.mqtt);

    let mut source = match VideoReader::open(&cfg.camera.source) {
        Ok(source) => source,
        Err(e) => {
            log::error!("Could not open camera: {}", e);
            transport.disconnect();
            return Err(e).context("opening frame source");
        }
    };

    let engine = TesseractEngine::new(cfg.ocr.data_path.as_deref(), &cfg.ocr.language)
        .context("initialising OCR")?;

    let (sender, receiver) = detection_channel();
    let mut reader = PlateReader::new(engine, cfg.debounce()?, sender);
    let publisher = Publisher::new(transport, cfg.mqtt.topic.clone());

    let preview = if cfg.camera.preview {
        Some(PreviewWindow::open().context("opening preview window")?)
    } else {
        None
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    log::info!("Yellow license plate detection started, Ctrl-C to quit");
    let summary = run(
        &mut source,
        &mut reader,
        &publisher,
        &receiver,
        RunOptions {
            max_fps: cfg.camera.max_fps,
            preview: preview.as_ref(),
            shutdown: &shutdown,
        },
    )?;

    drop(preview);
    drop(source);
    publisher.into_transport().disconnect();

    log::info!(
        "processed {} frames ({} skipped), {} plates accepted, {} published, {} failed",
        summary.frames,
        summary.skipped,
        summary.accepted,
        summary.published,
        summary.publish_failures
    );
    log::debug!("final metrics:\n{}", metrics::render());

    if let StopReason::CaptureFailed(reason) = summary.stop {
        anyhow::bail!("capture failed: {reason}");
    }
    Ok(())
}
