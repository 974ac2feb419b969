use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::PlateError;
use crate::error::Result;
use crate::plate_detection::video_reader::SourceSpec;

pub const DEFAULT_BROKER_HOST: &str = "test.mosquitto.org";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "plates/detected";
pub const DEFAULT_CLIENT_ID: &str = "plate_reader";
const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
const DEFAULT_OCR_LANGUAGE: &str = "eng";
const DEFAULT_DEBOUNCE_SECS: f64 = 3.0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ReaderConfigFile {
    camera: Option<CameraConfigFile>,
    mqtt: Option<MqttConfigFile>,
    ocr: Option<OcrConfigFile>,
    debounce_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    source: Option<String>,
    max_fps: Option<u32>,
    preview: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MqttConfigFile {
    host: Option<String>,
    port: Option<u16>,
    topic: Option<String>,
    client_id: Option<String>,
    keep_alive_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OcrConfigFile {
    data_path: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub camera: CameraSettings,
    pub mqtt: MqttSettings,
    pub ocr: OcrSettings,
    pub debounce_secs: f64,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub source: SourceSpec,
    pub max_fps: Option<u32>,
    pub preview: bool,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub data_path: Option<String>,
    pub language: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        // An empty file table falls back to every default.
        Self::from_file(ReaderConfigFile::default())
    }
}

impl ReaderConfig {
    /// Reads the optional TOML file and validates the result. Command line
    /// and environment overrides are applied by the caller before
    /// `validate` runs again.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ReaderConfigFile::default(),
        };
        let cfg = Self::from_file(file_cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file_cfg: ReaderConfigFile = toml::from_str(raw)
            .map_err(|e| PlateError::Configuration(format!("invalid config: {e}")))?;
        let cfg = Self::from_file(file_cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ReaderConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let mqtt = file.mqtt.unwrap_or_default();
        let ocr = file.ocr.unwrap_or_default();

        Self {
            camera: CameraSettings {
                source: camera
                    .source
                    .as_deref()
                    .map(SourceSpec::parse)
                    .unwrap_or_default(),
                max_fps: camera.max_fps,
                preview: camera.preview.unwrap_or(false),
            },
            mqtt: MqttSettings {
                host: mqtt
                    .host
                    .unwrap_or_else(|| DEFAULT_BROKER_HOST.to_string()),
                port: mqtt.port.unwrap_or(DEFAULT_BROKER_PORT),
                topic: mqtt.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                keep_alive_secs: mqtt.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
            },
            ocr: OcrSettings {
                data_path: ocr.data_path,
                language: ocr
                    .language
                    .unwrap_or_else(|| DEFAULT_OCR_LANGUAGE.to_string()),
            },
            debounce_secs: file.debounce_secs.unwrap_or(DEFAULT_DEBOUNCE_SECS),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            return Err(PlateError::Configuration("mqtt host must not be empty".into()));
        }
        if self.mqtt.port == 0 {
            return Err(PlateError::Configuration("mqtt port must not be zero".into()));
        }
        let topic = &self.mqtt.topic;
        if topic.is_empty() || topic.contains('#') || topic.contains('+') {
            return Err(PlateError::Configuration(format!(
                "mqtt topic '{topic}' must be a non empty topic name without wildcards"
            )));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(PlateError::Configuration("mqtt client id must not be empty".into()));
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err(PlateError::Configuration("mqtt keep alive must be positive".into()));
        }
        if self.camera.max_fps == Some(0) {
            return Err(PlateError::Configuration("max_fps must be positive".into()));
        }
        if self.ocr.language.trim().is_empty() {
            return Err(PlateError::Configuration("ocr language must not be empty".into()));
        }
        self.debounce()?;
        Ok(())
    }

    /// Window during which a repeated plate is suppressed.
    pub fn debounce(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.debounce_secs).map_err(|e| {
            PlateError::Configuration(format!(
                "debounce_secs {} is not a usable duration: {e}",
                self.debounce_secs
            ))
        })
    }
}

fn read_config_file(path: &Path) -> Result<ReaderConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PlateError::Configuration(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&raw).map_err(|e| {
        PlateError::Configuration(format!("invalid config file {}: {}", path.display(), e))
    })
}
