//! HD44780 16x2 character LCD behind a PCF8574 I2C backpack, driven in
//! 4-bit mode.

use std::io;
use std::thread::sleep;
use std::time::Duration;

use crate::CharacterDisplay;
use crate::DisplayError;
use crate::DISPLAY_COLUMNS;
use crate::DISPLAY_ROWS;

pub const DEFAULT_ADDRESS: u8 = 0x27;

const BACKLIGHT: u8 = 0x08;
const ENABLE: u8 = 0x04;
const REGISTER_SELECT: u8 = 0x01;

const CMD_CLEAR: u8 = 0x01;
const CMD_SET_DDRAM: u8 = 0x80;
const INIT_SEQUENCE: [u8; 6] = [0x33, 0x32, 0x28, 0x0C, 0x06, CMD_CLEAR];
const ROW_OFFSETS: [u8; DISPLAY_ROWS] = [0x00, 0x40];

/// Raw byte sink addressed by a 7-bit I2C slave address.
pub trait I2cBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> io::Result<()>;
}

pub struct Lcd1602<B: I2cBus> {
    bus: B,
    address: u8,
    pause: bool,
}

impl<B: I2cBus> Lcd1602<B> {
    /// Runs the power-on sequence that switches the controller to 4-bit mode,
    /// two lines, display on with hidden cursor, left-to-right entry.
    pub fn new(bus: B, address: u8) -> Result<Self, DisplayError> {
        let mut lcd = Self {
            bus,
            address,
            pause: true,
        };
        lcd.init()?;
        Ok(lcd)
    }

    /// Same as `new` but never sleeps between transfers.
    pub fn without_delays(bus: B, address: u8) -> Result<Self, DisplayError> {
        let mut lcd = Self {
            bus,
            address,
            pause: false,
        };
        lcd.init()?;
        Ok(lcd)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.delay(Duration::from_millis(50));
        for cmd in INIT_SEQUENCE {
            self.command(cmd)?;
            self.delay(Duration::from_millis(5));
        }
        Ok(())
    }

    fn delay(&self, duration: Duration) {
        if self.pause {
            sleep(duration);
        }
    }

    fn command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.send(cmd, 0)
    }

    fn data(&mut self, value: u8) -> Result<(), DisplayError> {
        self.send(value, REGISTER_SELECT)
    }

    /// High nibble first, each latched by pulsing the enable line.
    fn send(&mut self, value: u8, mode: u8) -> Result<(), DisplayError> {
        for nibble in [value & 0xF0, (value << 4) & 0xF0] {
            let bits = nibble | BACKLIGHT | mode;
            self.bus.write(self.address, &[bits | ENABLE])?;
            self.delay(Duration::from_micros(1));
            self.bus.write(self.address, &[bits])?;
            self.delay(Duration::from_micros(50));
        }
        Ok(())
    }
}

impl<B: I2cBus> CharacterDisplay for Lcd1602<B> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.command(CMD_CLEAR)?;
        self.delay(Duration::from_millis(2));
        Ok(())
    }

    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), DisplayError> {
        if col as usize >= DISPLAY_COLUMNS || row as usize >= DISPLAY_ROWS {
            return Err(DisplayError::Position { col, row });
        }
        self.command(CMD_SET_DDRAM | (ROW_OFFSETS[row as usize] + col))
    }

    fn write_str(&mut self, text: &str) -> Result<(), DisplayError> {
        for c in text.chars() {
            // The character ROM only agrees with ASCII on the printable range.
            let code = if c.is_ascii() && !c.is_ascii_control() {
                c as u8
            } else {
                b'?'
            };
            self.data(code)?;
        }
        Ok(())
    }

    fn columns(&self) -> usize {
        DISPLAY_COLUMNS
    }
}

#[cfg(target_os = "linux")]
pub use linux::LinuxI2cBus;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs::File;
    use std::fs::OpenOptions;
    use std::io;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    use super::I2cBus;

    const I2C_SLAVE: libc::c_ulong = 0x0703;

    /// `/dev/i2c-N` character device.
    pub struct LinuxI2cBus {
        file: File,
        selected: Option<u8>,
    }

    impl LinuxI2cBus {
        pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            Ok(Self {
                file,
                selected: None,
            })
        }

        fn select(&mut self, address: u8) -> io::Result<()> {
            if self.selected == Some(address) {
                return Ok(());
            }
            // SAFETY: the descriptor stays open for the lifetime of `self.file`
            // and I2C_SLAVE takes the address by value.
            let rc = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    I2C_SLAVE as _,
                    libc::c_ulong::from(address),
                )
            };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            self.selected = Some(address);
            Ok(())
        }
    }

    impl I2cBus for LinuxI2cBus {
        fn write(&mut self, address: u8, bytes: &[u8]) -> io::Result<()> {
            self.select(address)?;
            self.file.write_all(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl RecordingBus {
        fn bytes(&self) -> Vec<u8> {
            self.writes.iter().flat_map(|(_, b)| b.clone()).collect()
        }
    }

    impl I2cBus for RecordingBus {
        fn write(&mut self, address: u8, bytes: &[u8]) -> io::Result<()> {
            self.writes.push((address, bytes.to_vec()));
            Ok(())
        }
    }

    struct BrokenBus;

    impl I2cBus for BrokenBus {
        fn write(&mut self, _address: u8, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "no ack"))
        }
    }

    /// Rebuilds the bytes the controller latched on each enable pulse.
    fn latched(bytes: &[u8]) -> Vec<(u8, u8)> {
        let nibbles: Vec<u8> = bytes
            .iter()
            .filter(|b| *b & ENABLE != 0)
            .copied()
            .collect();
        nibbles
            .chunks(2)
            .map(|pair| ((pair[0] & 0xF0) | (pair[1] >> 4), pair[0] & REGISTER_SELECT))
            .collect()
    }

    fn fresh_lcd() -> Lcd1602<RecordingBus> {
        Lcd1602::without_delays(RecordingBus::default(), DEFAULT_ADDRESS).unwrap()
    }

    #[test]
    fn init_sends_four_bit_sequence() {
        let lcd = fresh_lcd();
        let sent = latched(&lcd.bus().bytes());
        let commands: Vec<u8> = sent.iter().map(|(byte, _)| *byte).collect();
        assert_eq!(commands, INIT_SEQUENCE.to_vec());
        assert!(sent.iter().all(|(_, rs)| *rs == 0));
        assert!(lcd.bus().writes.iter().all(|(addr, _)| *addr == 0x27));
    }

    #[test]
    fn every_transfer_keeps_backlight_on() {
        let lcd = fresh_lcd();
        assert!(lcd.bus().bytes().iter().all(|b| b & BACKLIGHT != 0));
    }

    #[test]
    fn enable_is_pulsed_high_then_low() {
        let mut lcd = fresh_lcd();
        let start = lcd.bus().writes.len();
        lcd.write_str("A").unwrap();
        let bytes: Vec<u8> = lcd.bus().writes[start..]
            .iter()
            .flat_map(|(_, b)| b.clone())
            .collect();
        // 'A' = 0x41: high nibble 0x40, low nibble 0x10, RS set.
        assert_eq!(bytes, vec![0x4D, 0x49, 0x1D, 0x19]);
    }

    #[test]
    fn cursor_addresses_second_row() {
        let mut lcd = fresh_lcd();
        let start = lcd.bus().writes.len();
        lcd.set_cursor(3, 1).unwrap();
        let bytes: Vec<u8> = lcd.bus().writes[start..]
            .iter()
            .flat_map(|(_, b)| b.clone())
            .collect();
        assert_eq!(latched(&bytes), vec![(0x80 | 0x43, 0)]);
    }

    #[test]
    fn cursor_outside_display_is_rejected() {
        let mut lcd = fresh_lcd();
        assert!(matches!(
            lcd.set_cursor(0, 2),
            Err(DisplayError::Position { col: 0, row: 2 })
        ));
        assert!(lcd.set_cursor(16, 0).is_err());
    }

    #[test]
    fn non_ascii_is_replaced() {
        let mut lcd = fresh_lcd();
        let start = lcd.bus().writes.len();
        lcd.write_str("Ä1").unwrap();
        let bytes: Vec<u8> = lcd.bus().writes[start..]
            .iter()
            .flat_map(|(_, b)| b.clone())
            .collect();
        assert_eq!(latched(&bytes), vec![(b'?', 1), (b'1', 1)]);
    }

    #[test]
    fn bus_failure_surfaces_as_io_error() {
        let err = Lcd1602::without_delays(BrokenBus, DEFAULT_ADDRESS)
            .err()
            .expect("init must fail");
        assert!(matches!(err, DisplayError::Io(_)));
    }
}
