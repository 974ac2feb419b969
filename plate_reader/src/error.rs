use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlateError>;

/// Failures raised by the reader. Every recoverable kind is resolved inside
/// the iteration that produced it; the others end the run.
#[derive(Debug, Error)]
pub enum PlateError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("invalid region: {0}")]
    InvalidRegion(String),
    #[error("recognition error: {0}")]
    Recognition(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

impl PlateError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlateError::InvalidFrame(_)
                | PlateError::InvalidRegion(_)
                | PlateError::Recognition(_)
                | PlateError::Transport(_)
        )
    }

    /// Short label used for the skipped-frame metric.
    pub fn kind(&self) -> &'static str {
        match self {
            PlateError::Configuration(_) => "configuration",
            PlateError::Capture(_) => "capture",
            PlateError::InvalidFrame(_) => "invalid_frame",
            PlateError::InvalidRegion(_) => "invalid_region",
            PlateError::Recognition(_) => "recognition",
            PlateError::Transport(_) => "transport",
            PlateError::OpenCv(_) => "opencv",
        }
    }

    pub(crate) fn invalid_frame(err: opencv::Error) -> Self {
        PlateError::InvalidFrame(err.message)
    }

    pub(crate) fn invalid_region(err: opencv::Error) -> Self {
        PlateError::InvalidRegion(err.message)
    }

    pub(crate) fn recognition(err: opencv::Error) -> Self {
        PlateError::Recognition(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_are_recoverable() {
        assert!(PlateError::InvalidFrame("x".into()).is_recoverable());
        assert!(PlateError::InvalidRegion("x".into()).is_recoverable());
        assert!(PlateError::Recognition("x".into()).is_recoverable());
        assert!(PlateError::Transport("x".into()).is_recoverable());
    }

    #[test]
    fn startup_and_capture_errors_are_fatal() {
        assert!(!PlateError::Configuration("camera".into()).is_recoverable());
        assert!(!PlateError::Capture("read".into()).is_recoverable());
    }

    #[test]
    fn display_includes_kind() {
        let err = PlateError::InvalidRegion("zero width".into());
        assert_eq!(err.to_string(), "invalid region: zero width");
        assert_eq!(err.kind(), "invalid_region");
    }
}
