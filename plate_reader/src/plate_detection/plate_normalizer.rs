use opencv::core::convert_scale_abs;
use opencv::core::Point;
use opencv::core::Rect;
use opencv::core::Size;
use opencv::core::BORDER_CONSTANT;
use opencv::imgproc::adaptive_threshold;
use opencv::imgproc::cvt_color;
use opencv::imgproc::get_structuring_element;
use opencv::imgproc::morphology_default_border_value;
use opencv::imgproc::morphology_ex;
use opencv::imgproc::ADAPTIVE_THRESH_GAUSSIAN_C;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::MORPH_CLOSE;
use opencv::imgproc::MORPH_RECT;
use opencv::imgproc::THRESH_BINARY;
use opencv::prelude::*;

use crate::error::PlateError;
use crate::error::Result;

/// Turns a grayscale plate crop into a clean black and white image.
#[derive(Clone, Debug)]
pub struct PlateNormalizer {
    pub contrast_gain: f64,
    pub block_size: i32,
    pub threshold_offset: f64,
    pub kernel_size: i32,
}

impl Default for PlateNormalizer {
    fn default() -> Self {
        Self {
            contrast_gain: 1.5,
            block_size: 11,
            threshold_offset: 2.0,
            kernel_size: 3,
        }
    }
}

impl PlateNormalizer {
    pub fn normalize(&self, plate: &Mat) -> Result<Mat> {
        if plate.rows() == 0 || plate.cols() == 0 {
            return Err(PlateError::InvalidRegion(format!(
                "empty plate region {}x{}",
                plate.cols(),
                plate.rows()
            )));
        }
        if plate.channels() != 1 {
            return Err(PlateError::InvalidRegion(format!(
                "expected a grayscale region, got {} channels",
                plate.channels()
            )));
        }

        let mut contrasted = Mat::default();
        convert_scale_abs(plate, &mut contrasted, self.contrast_gain, 0.0)
            .map_err(PlateError::invalid_region)?;

        let mut binary = Mat::default();
        adaptive_threshold(
            &contrasted,
            &mut binary,
            255.0,
            ADAPTIVE_THRESH_GAUSSIAN_C,
            THRESH_BINARY,
            self.block_size,
            self.threshold_offset,
        )
        .map_err(PlateError::invalid_region)?;

        let kernel = get_structuring_element(
            MORPH_RECT,
            Size::new(self.kernel_size, self.kernel_size),
            Point::new(-1, -1),
        )
        .map_err(PlateError::invalid_region)?;
        let border_value = morphology_default_border_value().map_err(PlateError::invalid_region)?;

        let mut closed = Mat::default();
        morphology_ex(
            &binary,
            &mut closed,
            MORPH_CLOSE,
            &kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            border_value,
        )
        .map_err(PlateError::invalid_region)?;

        Ok(closed)
    }
}

/// Cuts the plate out of the original color frame as a contiguous grayscale
/// image. The rectangle is clamped to the frame first.
pub fn crop_plate(frame: &Mat, bbox: Rect) -> Result<Mat> {
    let x0 = bbox.x.max(0);
    let y0 = bbox.y.max(0);
    let x1 = (bbox.x + bbox.width).min(frame.cols());
    let y1 = (bbox.y + bbox.height).min(frame.rows());
    if x1 <= x0 || y1 <= y0 {
        return Err(PlateError::InvalidRegion(format!(
            "plate region {:?} lies outside the {}x{} frame",
            bbox,
            frame.cols(),
            frame.rows()
        )));
    }

    let region = frame
        .apply_1(Rect::new(x0, y0, x1 - x0, y1 - y0))
        .map_err(PlateError::invalid_region)?;

    if region.channels() == 1 {
        // Make it contiguous
        return region.try_clone().map_err(PlateError::invalid_region);
    }

    let mut gray = Mat::default();
    cvt_color(&region, &mut gray, COLOR_BGR2GRAY, 0).map_err(PlateError::invalid_region)?;
    Ok(gray)
}
