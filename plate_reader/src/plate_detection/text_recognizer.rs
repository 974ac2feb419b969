use std::ffi::CString;
use std::time::Instant;

use leptess::tesseract;
use leptess::tesseract::TessApi;
use opencv::core::CV_8UC1;
use opencv::imgproc::median_blur;
use opencv::imgproc::threshold;
use opencv::imgproc::THRESH_BINARY;
use opencv::imgproc::THRESH_OTSU;
use opencv::prelude::*;

use super::PlateText;
use super::PLATE_CHARSET;
use crate::error::PlateError;
use crate::error::Result;
use crate::metrics;

/// Page segmentation modes understood by tesseract.
const PSM_SINGLE_LINE: &str = "7";
const PSM_SINGLE_WORD: &str = "8";

/// Anything that can turn a binary 8-bit image into raw text.
pub trait TextEngine {
    fn recognize_text(&mut self, image: &Mat, whitelist: &str, single_line: bool)
        -> Result<String>;
}

/// Tesseract backed engine.
pub struct TesseractEngine {
    ocr: TessApi,
}

impl TesseractEngine {
    pub fn new(data_path: Option<&str>, language: &str) -> Result<Self> {
        let api = tesseract::TessApi::new(data_path, language).map_err(|e| {
            PlateError::Configuration(format!(
                "cannot load tesseract language '{language}' from {data_path:?}: {e:?}"
            ))
        })?;
        log::info!("tesseract loaded language '{}'", language);
        Ok(Self { ocr: api })
    }

    fn set_variable(&mut self, name: &str, value: &str) -> Result<()> {
        let name_c = CString::new(name).map_err(|e| PlateError::Recognition(e.to_string()))?;
        let value_c = CString::new(value).map_err(|e| PlateError::Recognition(e.to_string()))?;
        self.ocr
            .raw
            .set_variable(&name_c, &value_c)
            .map_err(|e| PlateError::Recognition(format!("cannot set {name}: {e:?}")))
    }
}

impl TextEngine for TesseractEngine {
    fn recognize_text(
        &mut self,
        image: &Mat,
        whitelist: &str,
        single_line: bool,
    ) -> Result<String> {
        if image.typ() != CV_8UC1 {
            return Err(PlateError::Recognition(
                "tesseract expects an 8-bit single channel image".to_string(),
            ));
        }

        self.set_variable("tessedit_char_whitelist", whitelist)?;
        let mode = if single_line {
            PSM_SINGLE_LINE
        } else {
            PSM_SINGLE_WORD
        };
        self.set_variable("tessedit_pageseg_mode", mode)?;

        // Tesseract reads the buffer row by row without a stride gap.
        let contiguous = if image.is_continuous() {
            None
        } else {
            Some(image.try_clone().map_err(PlateError::recognition)?)
        };
        let image = contiguous.as_ref().unwrap_or(image);

        let cols = image.cols();
        let rows = image.rows();
        let bytes = image.data_bytes().map_err(PlateError::recognition)?;
        self.ocr
            .raw
            .set_image(bytes, cols, rows, 1, cols)
            .map_err(|e| PlateError::Recognition(format!("cannot hand image to tesseract: {e:?}")))?;

        self.ocr
            .get_utf8_text()
            .map_err(|e| PlateError::Recognition(e.to_string()))
    }
}

/// Last cleanup pass plus OCR.
pub struct TextRecognizer<E: TextEngine> {
    engine: E,
    median_kernel: i32,
}

impl<E: TextEngine> TextRecognizer<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            median_kernel: 3,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// `Ok(None)` means the engine read nothing that looks like a plate.
    pub fn recognize(&mut self, plate: &Mat) -> Result<Option<PlateText>> {
        let mut blurred = Mat::default();
        median_blur(plate, &mut blurred, self.median_kernel).map_err(PlateError::recognition)?;

        let mut binary = Mat::default();
        threshold(
            &blurred,
            &mut binary,
            0.0,
            255.0,
            THRESH_BINARY | THRESH_OTSU,
        )
        .map_err(PlateError::recognition)?;

        let started = Instant::now();
        let raw = self.engine.recognize_text(&binary, PLATE_CHARSET, true);
        metrics::OCR_SECONDS.observe(started.elapsed().as_secs_f64());

        let raw = raw?;
        let plate = PlateText::sanitize(&raw);
        log::debug!("OCR read {:?}, sanitized {:?}", raw.trim(), plate);
        Ok(plate)
    }
}
