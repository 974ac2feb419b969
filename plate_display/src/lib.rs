//! Remote side of the plate reader: turns plate messages into text on a small
//! character display.

pub mod lcd;

use std::io;
use std::io::Write;

use serde::Deserialize;
use thiserror::Error;

pub const DISPLAY_COLUMNS: usize = 16;
pub const DISPLAY_ROWS: usize = 2;
pub const PLATE_HEADER: &str = "License Plate:";

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed plate message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("cursor position {col},{row} is outside the display")]
    Position { col: u8, row: u8 },
}

/// Minimal surface of a character display.
pub trait CharacterDisplay {
    fn clear(&mut self) -> Result<(), DisplayError>;
    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), DisplayError>;
    fn write_str(&mut self, text: &str) -> Result<(), DisplayError>;
    fn columns(&self) -> usize;

    /// Called once a full screen has been written.
    fn flush(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// Renders the display contents as a framed text block on a terminal.
pub struct ConsoleDisplay<W: Write> {
    out: W,
    rows: Vec<Vec<char>>,
    col: usize,
    row: usize,
}

impl ConsoleDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            rows: vec![vec![' '; DISPLAY_COLUMNS]; DISPLAY_ROWS],
            col: 0,
            row: 0,
        }
    }

    pub fn line(&self, row: usize) -> String {
        self.rows
            .get(row)
            .map(|chars| chars.iter().collect::<String>().trim_end().to_string())
            .unwrap_or_default()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> CharacterDisplay for ConsoleDisplay<W> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        for row in self.rows.iter_mut() {
            row.iter_mut().for_each(|c| *c = ' ');
        }
        self.col = 0;
        self.row = 0;
        Ok(())
    }

    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), DisplayError> {
        if col as usize >= DISPLAY_COLUMNS || row as usize >= DISPLAY_ROWS {
            return Err(DisplayError::Position { col, row });
        }
        self.col = col as usize;
        self.row = row as usize;
        Ok(())
    }

    fn write_str(&mut self, text: &str) -> Result<(), DisplayError> {
        for c in text.chars() {
            if self.col >= DISPLAY_COLUMNS {
                break;
            }
            self.rows[self.row][self.col] = c;
            self.col += 1;
        }
        Ok(())
    }

    fn columns(&self) -> usize {
        DISPLAY_COLUMNS
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        let border = format!("+{}+", "-".repeat(DISPLAY_COLUMNS));
        writeln!(self.out, "{border}")?;
        for row in &self.rows {
            writeln!(self.out, "|{}|", row.iter().collect::<String>())?;
        }
        writeln!(self.out, "{border}")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Body published by the reader. Only the plate matters here.
#[derive(Debug, Deserialize)]
struct PlateMessage {
    #[serde(default)]
    plate: Option<String>,
}

/// Everything the message handler needs, passed in explicitly.
pub struct DisplayContext {
    display: Box<dyn CharacterDisplay>,
}

impl DisplayContext {
    pub fn new(display: Box<dyn CharacterDisplay>) -> Self {
        Self { display }
    }

    /// Clears the screen and writes up to two status lines.
    pub fn show_status(&mut self, lines: &[&str]) -> Result<(), DisplayError> {
        self.display.clear()?;
        for (row, line) in lines.iter().take(DISPLAY_ROWS).enumerate() {
            self.display.set_cursor(0, row as u8)?;
            self.display.write_str(line)?;
        }
        self.display.flush()
    }

    /// Renders the plate carried by a `{"plate": ..., "timestamp": ...}`
    /// message. Returns the text actually shown, or `None` when the message
    /// has no usable plate.
    pub fn handle_message(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<String>, DisplayError> {
        let message: PlateMessage = serde_json::from_slice(payload)?;
        let plate = match message.plate.as_deref() {
            Some(plate) if !plate.is_empty() => plate,
            _ => {
                log::warn!("message on {} carries no plate, ignoring", topic);
                return Ok(None);
            }
        };
        log::info!("Received license plate: {}", plate);

        let shown: String = plate.chars().take(self.display.columns()).collect();
        self.display.clear()?;
        self.display.set_cursor(0, 0)?;
        self.display.write_str(PLATE_HEADER)?;
        self.display.set_cursor(0, 1)?;
        self.display.write_str(&shown)?;
        self.display.flush()?;
        Ok(Some(shown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Keeps the rendered lines reachable after the context took the display.
    #[derive(Clone, Default)]
    struct SharedDisplay {
        lines: Rc<RefCell<[String; DISPLAY_ROWS]>>,
        row: usize,
        flushes: Rc<RefCell<usize>>,
    }

    impl CharacterDisplay for SharedDisplay {
        fn clear(&mut self) -> Result<(), DisplayError> {
            *self.lines.borrow_mut() = Default::default();
            self.row = 0;
            Ok(())
        }

        fn set_cursor(&mut self, _col: u8, row: u8) -> Result<(), DisplayError> {
            self.row = row as usize;
            Ok(())
        }

        fn write_str(&mut self, text: &str) -> Result<(), DisplayError> {
            self.lines.borrow_mut()[self.row].push_str(text);
            Ok(())
        }

        fn columns(&self) -> usize {
            DISPLAY_COLUMNS
        }

        fn flush(&mut self) -> Result<(), DisplayError> {
            *self.flushes.borrow_mut() += 1;
            Ok(())
        }
    }

    fn context() -> (DisplayContext, SharedDisplay) {
        let display = SharedDisplay::default();
        (DisplayContext::new(Box::new(display.clone())), display)
    }

    #[test]
    fn renders_plate_under_header() {
        let (mut ctx, display) = context();
        let shown = ctx
            .handle_message(
                "plates/detected",
                br#"{"plate": "KA01AB1234", "timestamp": "2024-03-09 07:05:09"}"#,
            )
            .unwrap();

        assert_eq!(shown.as_deref(), Some("KA01AB1234"));
        let lines = display.lines.borrow();
        assert_eq!(lines[0], PLATE_HEADER);
        assert_eq!(lines[1], "KA01AB1234");
        assert_eq!(*display.flushes.borrow(), 1);
    }

    #[test]
    fn truncates_to_display_width() {
        let (mut ctx, display) = context();
        let shown = ctx
            .handle_message("t", br#"{"plate": "ABCDEFGHIJKLMNOPQRSTUV"}"#)
            .unwrap()
            .unwrap();

        assert_eq!(shown, "ABCDEFGHIJKLMNOP");
        assert_eq!(display.lines.borrow()[1].chars().count(), 16);
    }

    #[test]
    fn malformed_json_is_an_error_and_leaves_screen_alone() {
        let (mut ctx, display) = context();
        ctx.show_status(&["Waiting for", "License Plate"]).unwrap();

        let err = ctx.handle_message("t", b"{plate: nope").unwrap_err();
        assert!(matches!(err, DisplayError::Malformed(_)));
        assert_eq!(display.lines.borrow()[0], "Waiting for");
        assert_eq!(*display.flushes.borrow(), 1);
    }

    #[test]
    fn missing_or_empty_plate_is_ignored() {
        let (mut ctx, display) = context();
        ctx.show_status(&["Waiting for", "License Plate"]).unwrap();

        assert!(ctx.handle_message("t", br#"{"timestamp": "x"}"#).unwrap().is_none());
        assert!(ctx.handle_message("t", br#"{"plate": ""}"#).unwrap().is_none());
        assert!(ctx.handle_message("t", br#"{"plate": null}"#).unwrap().is_none());
        assert!(matches!(
            ctx.handle_message("t", br#"{"plate": 42}"#),
            Err(DisplayError::Malformed(_))
        ));
        assert_eq!(display.lines.borrow()[1], "License Plate");
    }

    #[test]
    fn console_display_clips_and_frames_output() {
        let mut console = ConsoleDisplay::new(Vec::new());
        console.write_str("0123456789ABCDEFXYZ").unwrap();
        console.set_cursor(2, 1).unwrap();
        console.write_str("hi").unwrap();
        console.flush().unwrap();

        assert_eq!(console.line(0), "0123456789ABCDEF");
        assert_eq!(console.line(1), "  hi");

        let rendered = String::from_utf8(console.into_inner()).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "+----------------+");
        assert_eq!(lines[1], "|0123456789ABCDEF|");
        assert_eq!(lines[2], "|  hi            |");
    }

    #[test]
    fn console_display_rejects_positions_off_screen() {
        let mut console = ConsoleDisplay::new(Vec::new());
        assert!(matches!(
            console.set_cursor(0, 2),
            Err(DisplayError::Position { col: 0, row: 2 })
        ));
        assert!(console.set_cursor(16, 0).is_err());
    }
}
