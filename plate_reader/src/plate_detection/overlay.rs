use opencv::core::Point;
use opencv::core::Scalar;
use opencv::core::Vector;
use opencv::highgui;
use opencv::imgproc::polylines;
use opencv::imgproc::put_text;
use opencv::imgproc::FONT_HERSHEY_SIMPLEX;
use opencv::imgproc::LINE_8;
use opencv::prelude::Mat;

use super::PlateCandidate;
use super::PlateText;
use crate::error::Result;

pub const WINDOW_NAME: &str = "Yellow License Plate Detection";

/// Draws the detected plate outline and its text on top of the frame.
pub fn draw_detection(
    image: &mut Mat,
    candidate: &PlateCandidate,
    plate: Option<&PlateText>,
) -> Result<()> {
    let color = Scalar::from((0.0, 255.0, 0.0));

    let mut outlines = Vector::<Vector<Point>>::new();
    outlines.push(candidate.polygon.clone());
    polylines(image, &outlines, true, color, 3, LINE_8, 0)?;

    if let Some(plate) = plate {
        put_text(
            image,
            plate.as_str(),
            Point::new(candidate.bbox.x, (candidate.bbox.y - 10).max(0)),
            FONT_HERSHEY_SIMPLEX,
            0.9,
            color,
            2,
            LINE_8,
            false,
        )?;
    }
    Ok(())
}

/// Local preview window. Pressing 'q' asks the loop to stop.
pub struct PreviewWindow {
    name: String,
}

impl PreviewWindow {
    pub fn open() -> Result<Self> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: WINDOW_NAME.to_string(),
        })
    }

    /// Shows the frame and returns true when the operator asked to quit.
    pub fn show(&self, image: &Mat) -> Result<bool> {
        highgui::imshow(&self.name, image)?;
        let key = highgui::wait_key(1)?;
        Ok(key & 0xFF == 'q' as i32)
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            log::warn!("cannot close preview window: {}", e);
        }
    }
}
