use std::cell::RefCell;
use std::io;
use std::io::Write;
use std::rc::Rc;

use plate_display::lcd::I2cBus;
use plate_display::lcd::Lcd1602;
use plate_display::lcd::DEFAULT_ADDRESS;
use plate_display::ConsoleDisplay;
use plate_display::DisplayContext;
use plate_display::DisplayError;

#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Emulates just enough of the HD44780 to read back the DDRAM contents.
#[derive(Clone, Default)]
struct EmulatedLcd {
    state: Rc<RefCell<LcdState>>,
}

struct LcdState {
    pending: Option<u8>,
    address: usize,
    ddram: [u8; 0x80],
}

impl Default for LcdState {
    fn default() -> Self {
        Self {
            pending: None,
            address: 0,
            ddram: [b' '; 0x80],
        }
    }
}

impl EmulatedLcd {
    fn row(&self, row: usize) -> String {
        let state = self.state.borrow();
        let start = if row == 0 { 0x00 } else { 0x40 };
        String::from_utf8_lossy(&state.ddram[start..start + 16])
            .trim_end()
            .to_string()
    }
}

impl I2cBus for EmulatedLcd {
    fn write(&mut self, _address: u8, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        for &b in bytes {
            // Latch on the enable pulse only.
            if b & 0x04 == 0 {
                continue;
            }
            let nibble = b & 0xF0;
            let Some(high) = state.pending.take() else {
                state.pending = Some(nibble);
                continue;
            };
            let value = high | (nibble >> 4);
            if b & 0x01 != 0 {
                let addr = state.address;
                state.ddram[addr % 0x80] = value;
                state.address += 1;
            } else if value == 0x01 {
                state.ddram = [b' '; 0x80];
                state.address = 0;
            } else if value & 0x80 != 0 {
                state.address = (value & 0x7F) as usize;
            }
        }
        Ok(())
    }
}

#[test]
fn console_shows_status_then_plate() {
    let out = SharedBuffer::default();
    let mut ctx = DisplayContext::new(Box::new(ConsoleDisplay::new(out.clone())));

    ctx.show_status(&["Waiting for", "License Plate"]).unwrap();
    ctx.handle_message(
        "plates/detected",
        br#"{"plate": "KA01AB1234", "timestamp": "2024-03-09 07:05:09"}"#,
    )
    .unwrap();

    let text = out.text();
    let screens: Vec<&str> = text.lines().collect();
    assert_eq!(screens.len(), 8);
    assert_eq!(screens[1], "|Waiting for     |");
    assert_eq!(screens[2], "|License Plate   |");
    assert_eq!(screens[5], "|License Plate:  |");
    assert_eq!(screens[6], "|KA01AB1234      |");
}

#[test]
fn lcd_receives_header_and_truncated_plate() {
    let lcd = EmulatedLcd::default();
    let display = Lcd1602::without_delays(lcd.clone(), DEFAULT_ADDRESS).unwrap();
    let mut ctx = DisplayContext::new(Box::new(display));

    let shown = ctx
        .handle_message("plates/detected", br#"{"plate": "MH12DE1433XYZ98765"}"#)
        .unwrap();

    assert_eq!(shown.as_deref(), Some("MH12DE1433XYZ987"));
    assert_eq!(lcd.row(0), "License Plate:");
    assert_eq!(lcd.row(1), "MH12DE1433XYZ987");
}

#[test]
fn bad_payload_keeps_previous_plate_on_lcd() {
    let lcd = EmulatedLcd::default();
    let display = Lcd1602::without_delays(lcd.clone(), DEFAULT_ADDRESS).unwrap();
    let mut ctx = DisplayContext::new(Box::new(display));

    ctx.handle_message("plates/detected", br#"{"plate": "KA01AB1234"}"#)
        .unwrap();
    let err = ctx.handle_message("plates/detected", b"not json").unwrap_err();
    assert!(matches!(err, DisplayError::Malformed(_)));
    assert!(ctx
        .handle_message("plates/detected", br#"{"plate": ""}"#)
        .unwrap()
        .is_none());

    assert_eq!(lcd.row(1), "KA01AB1234");
}
