pub mod color_segmenter;
pub mod debounce;
pub mod overlay;
pub mod plate_localizer;
pub mod plate_normalizer;
pub mod text_recognizer;
pub mod video_reader;

use std::fmt;

use opencv::core::Point;
use opencv::core::Rect;
use opencv::core::Vector;
use serde::Serialize;

/// Shortest sanitized OCR output accepted as a plate.
pub const MIN_PLATE_LENGTH: usize = 4;

/// Characters the OCR engine is allowed to emit.
pub const PLATE_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A four sided region of the mask that looks like a plate.
#[derive(Clone, Debug)]
pub struct PlateCandidate {
    pub polygon: Vector<Point>,
    pub bbox: Rect,
    pub area: f64,
    pub aspect_ratio: f64,
}

impl PlateCandidate {
    fn new(polygon: Vector<Point>, bbox: Rect, area: f64, aspect_ratio: f64) -> Self {
        return Self {
            polygon,
            bbox,
            area,
            aspect_ratio,
        };
    }
}

/// Uppercase alphanumeric plate text of at least `MIN_PLATE_LENGTH` characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PlateText(String);

impl PlateText {
    /// Keeps ASCII letters and digits, uppercases them and enforces the
    /// minimum length. Anything shorter is not a plate.
    pub fn sanitize(raw: &str) -> Option<Self> {
        let text: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if text.len() >= MIN_PLATE_LENGTH {
            Some(Self(text))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for PlateText {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PlateText {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_noise_and_uppercases() {
        let plate = PlateText::sanitize(" ka-01 ab\n1234 ").unwrap();
        assert_eq!(plate.as_str(), "KA01AB1234");
    }

    #[test]
    fn sanitize_rejects_short_text() {
        assert!(PlateText::sanitize("a-b c").is_none());
        assert!(PlateText::sanitize("").is_none());
        assert!(PlateText::sanitize("!!!???").is_none());
    }

    #[test]
    fn sanitize_accepts_exactly_minimum_length() {
        assert_eq!(PlateText::sanitize("ab.12").unwrap(), "AB12");
    }

    #[test]
    fn sanitize_drops_non_ascii_letters() {
        assert_eq!(PlateText::sanitize("ÄB12CD").unwrap(), "B12CD");
        assert!(PlateText::sanitize("ÄÖÜ1").is_none());
    }

    #[test]
    fn serializes_as_plain_string() {
        let plate = PlateText::sanitize("KA01AB1234").unwrap();
        assert_eq!(serde_json::to_string(&plate).unwrap(), "\"KA01AB1234\"");
    }
}
