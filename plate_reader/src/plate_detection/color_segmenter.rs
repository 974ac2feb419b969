use opencv::core::bitwise_and;
use opencv::core::in_range;
use opencv::core::Scalar;
use opencv::imgproc::cvt_color;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::COLOR_BGR2HSV;
use opencv::prelude::*;

use crate::error::PlateError;
use crate::error::Result;

/// Isolates yellow plate pixels. Bounds are on OpenCV's 8-bit HSV scale
/// (hue 0..180) and inclusive on both ends.
#[derive(Clone, Debug)]
pub struct ColorSegmenter {
    lower: Scalar,
    upper: Scalar,
}

impl Default for ColorSegmenter {
    fn default() -> Self {
        Self::new((20.0, 100.0, 100.0), (30.0, 255.0, 255.0))
    }
}

impl ColorSegmenter {
    pub fn new(lower: (f64, f64, f64), upper: (f64, f64, f64)) -> Self {
        Self {
            lower: Scalar::new(lower.0, lower.1, lower.2, 0.0),
            upper: Scalar::new(upper.0, upper.1, upper.2, 0.0),
        }
    }

    /// Returns a single channel image holding the grayscale value of every
    /// plate-colored pixel of `frame` and zero everywhere else.
    pub fn segment(&self, frame: &Mat) -> Result<Mat> {
        if frame.empty() {
            return Err(PlateError::InvalidFrame("empty frame".to_string()));
        }
        if frame.channels() != 3 {
            return Err(PlateError::InvalidFrame(format!(
                "expected 3 channels, got {}",
                frame.channels()
            )));
        }

        let mut hsv = Mat::default();
        cvt_color(frame, &mut hsv, COLOR_BGR2HSV, 0).map_err(PlateError::invalid_frame)?;

        let mut mask = Mat::default();
        in_range(&hsv, &self.lower, &self.upper, &mut mask).map_err(PlateError::invalid_frame)?;

        let mut yellow_region = Mat::default();
        bitwise_and(frame, frame, &mut yellow_region, &mask).map_err(PlateError::invalid_frame)?;

        let mut gray = Mat::default();
        cvt_color(&yellow_region, &mut gray, COLOR_BGR2GRAY, 0)
            .map_err(PlateError::invalid_frame)?;

        Ok(gray)
    }
}
