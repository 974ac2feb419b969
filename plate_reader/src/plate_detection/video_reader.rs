use std::fmt;

use opencv::prelude::*;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;

use crate::error::PlateError;
use crate::error::Result;

/// Where frames come from: a capture device index or a video file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Device(i32),
    File(String),
}

impl SourceSpec {
    /// Plain integers name a device, anything else is a file path.
    pub fn parse(value: &str) -> Self {
        match value.trim().parse::<i32>() {
            Ok(index) => SourceSpec::Device(index),
            Err(_) => SourceSpec::File(value.to_string()),
        }
    }
}

impl Default for SourceSpec {
    fn default() -> Self {
        SourceSpec::Device(0)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Device(index) => write!(f, "camera {index}"),
            SourceSpec::File(path) => write!(f, "file {path}"),
        }
    }
}

/// Supplies one BGR frame per call. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

pub struct VideoReader {
    capture: VideoCapture,
    spec: SourceSpec,
}

impl VideoReader {
    pub fn open(spec: &SourceSpec) -> Result<Self> {
        let capture = match spec {
            SourceSpec::Device(index) => VideoCapture::new(*index, CAP_ANY),
            SourceSpec::File(path) => VideoCapture::from_file(path, CAP_ANY),
        }
        .map_err(|e| PlateError::Configuration(format!("cannot open {spec}: {}", e.message)))?;

        let opened = capture
            .is_opened()
            .map_err(|e| PlateError::Configuration(format!("cannot open {spec}: {}", e.message)))?;
        if !opened {
            return Err(PlateError::Configuration(format!("could not open {spec}")));
        }

        log::info!("opened {}", spec);
        Ok(Self {
            capture,
            spec: spec.clone(),
        })
    }
}

impl FrameSource for VideoReader {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut image = Mat::default();
        let grabbed = self
            .capture
            .read(&mut image)
            .map_err(|e| PlateError::Capture(e.message))?;

        if !grabbed || image.empty() {
            return match self.spec {
                SourceSpec::File(_) => Ok(None),
                SourceSpec::Device(_) => {
                    Err(PlateError::Capture(format!("could not read frame from {}", self.spec)))
                }
            };
        }
        Ok(Some(image))
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        log::debug!("releasing {}", self.spec);
        if let Err(e) = self.capture.release() {
            log::warn!("cannot release {}: {}", self.spec, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_devices() {
        assert_eq!(SourceSpec::parse("0"), SourceSpec::Device(0));
        assert_eq!(SourceSpec::parse(" 2 "), SourceSpec::Device(2));
    }

    #[test]
    fn everything_else_is_a_file() {
        assert_eq!(
            SourceSpec::parse("data/street.mp4"),
            SourceSpec::File("data/street.mp4".to_string())
        );
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let spec = SourceSpec::File("/nonexistent/plates.mp4".to_string());
        match VideoReader::open(&spec) {
            Err(PlateError::Configuration(_)) => {}
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("opening a missing file must fail"),
        }
    }
}
