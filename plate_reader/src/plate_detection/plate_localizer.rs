use std::cmp::Ordering;

use opencv::core::Point;
use opencv::core::Vector;
use opencv::imgproc::approx_poly_dp;
use opencv::imgproc::arc_length;
use opencv::imgproc::bounding_rect;
use opencv::imgproc::contour_area;
use opencv::imgproc::find_contours;
use opencv::imgproc::CHAIN_APPROX_SIMPLE;
use opencv::imgproc::RETR_TREE;
use opencv::prelude::*;

use super::PlateCandidate;
use crate::error::PlateError;
use crate::error::Result;

/// Greedy search for a plate shaped contour.
///
/// Contours are ranked by area and only the largest `max_contours` are
/// examined. The first one that simplifies to exactly four vertices with an
/// aspect ratio strictly inside `(min_aspect, max_aspect)` wins, even if a
/// smaller contour would fit a plate better.
#[derive(Clone, Debug)]
pub struct PlateLocalizer {
    pub max_contours: usize,
    pub epsilon_ratio: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
}

impl Default for PlateLocalizer {
    fn default() -> Self {
        Self {
            max_contours: 10,
            epsilon_ratio: 0.02,
            min_aspect: 2.0,
            max_aspect: 5.0,
        }
    }
}

impl PlateLocalizer {
    pub fn locate(&self, mask: &Mat) -> Result<Option<PlateCandidate>> {
        if mask.empty() || mask.channels() != 1 {
            return Err(PlateError::InvalidFrame(format!(
                "expected a non empty single channel mask, got {} channels",
                mask.channels()
            )));
        }

        let mut contours = Vector::<Vector<Point>>::new();
        find_contours(
            mask,
            &mut contours,
            RETR_TREE,
            CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )
        .map_err(PlateError::invalid_frame)?;

        let mut ranked = Vec::with_capacity(contours.len());
        for contour in contours {
            let area = contour_area(&contour, false).map_err(PlateError::invalid_frame)?;
            ranked.push((area, contour));
        }
        // Stable, so equal areas keep the order find_contours produced them in.
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        for (area, contour) in ranked.into_iter().take(self.max_contours) {
            let perimeter = arc_length(&contour, true).map_err(PlateError::invalid_frame)?;

            let mut approx = Vector::<Point>::new();
            approx_poly_dp(&contour, &mut approx, self.epsilon_ratio * perimeter, true)
                .map_err(PlateError::invalid_frame)?;

            if approx.len() != 4 {
                continue;
            }

            let rect = bounding_rect(&contour).map_err(PlateError::invalid_frame)?;
            if rect.height == 0 {
                continue;
            }
            let aspect_ratio = rect.width as f64 / rect.height as f64;
            if aspect_ratio > self.min_aspect && aspect_ratio < self.max_aspect {
                let bbox = bounding_rect(&approx).map_err(PlateError::invalid_frame)?;
                log::debug!(
                    "plate candidate at {:?}, area {}, aspect {:.2}",
                    bbox,
                    area,
                    aspect_ratio
                );
                return Ok(Some(PlateCandidate::new(approx, bbox, area, aspect_ratio)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Rect;
    use opencv::core::Scalar;
    use opencv::core::CV_8UC1;
    use opencv::core::CV_8UC3;
    use opencv::imgproc::circle;
    use opencv::imgproc::rectangle;
    use opencv::imgproc::FILLED;
    use opencv::imgproc::LINE_8;

    fn black_mask() -> Mat {
        Mat::new_rows_cols_with_default(480, 640, CV_8UC1, Scalar::all(0.0)).unwrap()
    }

    fn fill(mask: &mut Mat, rect: Rect) {
        rectangle(mask, rect, Scalar::all(255.0), FILLED, LINE_8, 0).unwrap();
    }

    #[test]
    fn all_black_mask_has_no_plate() {
        let found = PlateLocalizer::default().locate(&black_mask()).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn finds_plate_shaped_rectangle() {
        let mut mask = black_mask();
        fill(&mut mask, Rect::new(100, 100, 300, 100));

        let candidate = PlateLocalizer::default().locate(&mask).unwrap().unwrap();
        assert_eq!(candidate.polygon.len(), 4);
        assert_eq!(candidate.bbox, Rect::new(100, 100, 300, 100));
        assert!((candidate.aspect_ratio - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_square_and_overly_wide_shapes() {
        let mut mask = black_mask();
        fill(&mut mask, Rect::new(20, 20, 100, 100));
        fill(&mut mask, Rect::new(20, 200, 360, 60));

        assert!(PlateLocalizer::default().locate(&mask).unwrap().is_none());
    }

    #[test]
    fn aspect_bounds_are_exclusive() {
        let mut mask = black_mask();
        fill(&mut mask, Rect::new(20, 20, 200, 100));
        fill(&mut mask, Rect::new(20, 200, 250, 50));

        assert!(PlateLocalizer::default().locate(&mask).unwrap().is_none());
    }

    #[test]
    fn rejects_round_blobs() {
        let mut mask = black_mask();
        circle(&mut mask, Point::new(320, 240), 80, Scalar::all(255.0), FILLED, LINE_8, 0)
            .unwrap();

        assert!(PlateLocalizer::default().locate(&mask).unwrap().is_none());
    }

    #[test]
    fn largest_qualifying_contour_wins() {
        let mut mask = black_mask();
        fill(&mut mask, Rect::new(10, 10, 120, 40));
        fill(&mut mask, Rect::new(10, 200, 360, 120));

        let candidate = PlateLocalizer::default().locate(&mask).unwrap().unwrap();
        assert_eq!(candidate.bbox, Rect::new(10, 200, 360, 120));
    }

    #[test]
    fn larger_non_plate_shape_does_not_hide_smaller_plate() {
        let mut mask = black_mask();
        fill(&mut mask, Rect::new(300, 100, 250, 250));
        fill(&mut mask, Rect::new(10, 10, 150, 50));

        let candidate = PlateLocalizer::default().locate(&mask).unwrap().unwrap();
        assert_eq!(candidate.bbox, Rect::new(10, 10, 150, 50));
    }

    #[test]
    fn only_the_ten_largest_contours_are_considered() {
        let mut mask = black_mask();
        // Ten large squares that never qualify, laid out on a grid.
        for i in 0..10 {
            let x = 10 + (i % 5) * 120;
            let y = 10 + (i / 5) * 120;
            fill(&mut mask, Rect::new(x, y, 100, 100));
        }
        // A small but perfectly plate shaped rectangle ranked eleventh.
        fill(&mut mask, Rect::new(10, 400, 90, 30));

        assert!(PlateLocalizer::default().locate(&mask).unwrap().is_none());

        let wider_search = PlateLocalizer {
            max_contours: 11,
            ..PlateLocalizer::default()
        };
        let candidate = wider_search.locate(&mask).unwrap().unwrap();
        assert_eq!(candidate.bbox, Rect::new(10, 400, 90, 30));
    }

    #[test]
    fn rejects_color_input() {
        let frame = Mat::new_rows_cols_with_default(10, 10, CV_8UC3, Scalar::all(0.0)).unwrap();
        let err = PlateLocalizer::default().locate(&frame).unwrap_err();
        assert!(matches!(err, PlateError::InvalidFrame(_)));
    }
}
