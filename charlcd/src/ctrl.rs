//! High-level controller operations.
//!
//! Everything here rides on the two-nibble write path in
//! [`device`](crate::device); the command set itself matches the HD44780
//! instruction table.

use crate::device::LcdDevice;
use crate::{LcdError, LcdResult};
use log::debug;

/// Clear display command.
pub const CMD_CLEAR_DISPLAY: u8 = 0x01;
/// Cursor home command.
pub const CMD_CURSOR_HOME: u8 = 0x02;
/// Display control: display on, cursor on, blink on.
pub const CMD_CURSOR_MODE: u8 = 0x0F;
/// 8-bit function set, used to resynchronize from an unknown starting mode.
pub const CMD_FUNCTION_SET_8BIT: u8 = 0x38;
/// 4-bit function set: 4-bit interface, 2-line display, 5x8 font.
pub const CMD_FUNCTION_SET_4BIT: u8 = 0x28;
/// Set DDRAM address command base.
pub const CMD_SET_DDRAM_ADDRESS: u8 = 0x80;
/// The bare nibble selecting the 4-bit interface during initialization.
pub const MODE_4BIT_NIBBLE: u8 = 0b0010;
/// Visible width of one display line, in characters.
pub const LINE_WIDTH: usize = 16;
/// DDRAM address of the first character of line 2.
pub const LINE2_OFFSET: u8 = 0x40;

/// Controller command set.
///
/// The provided methods build the fixed command bytes; implementors supply
/// the transfer primitives and the transport-coupled operations.
pub trait LcdCtrl {
    /// Puts the controller into 4-bit mode and sets up the display.
    fn init(&mut self) -> LcdResult<()>;

    /// Writes `text` into the line region starting at DDRAM `offset`,
    /// padded with spaces to the full line width.
    fn display_line(&mut self, offset: u8, text: &str) -> LcdResult<()>;

    /// Clears the display.
    fn clear_display(&mut self) -> LcdResult<()> {
        self.send_command(CMD_CLEAR_DISPLAY)
    }

    /// Moves the cursor to the home position.
    fn cursor_home(&mut self) -> LcdResult<()> {
        self.send_command(CMD_CURSOR_HOME)
    }

    /// Turns the display on with a visible, blinking cursor.
    fn cursor_mode(&mut self) -> LcdResult<()> {
        self.send_command(CMD_CURSOR_MODE)
    }

    /// Sets the DDRAM write address.
    fn set_ddram_address(&mut self, address: u8) -> LcdResult<()> {
        if address > 0x7F {
            return Err(LcdError::InvalidArgument);
        }
        self.send_command(CMD_SET_DDRAM_ADDRESS | address)
    }

    /// Writes a byte to the instruction register.
    fn send_command(&mut self, command: u8) -> LcdResult<()>;

    /// Writes a byte to the data register.
    fn send_data(&mut self, data: u8) -> LcdResult<()>;
}

impl LcdCtrl for LcdDevice {
    fn init(&mut self) -> LcdResult<()> {
        debug!("Initializing LCD controller");
        self.open()?;
        let result = self.set_4bit_mode().and_then(|()| {
            self.clear_display()?;
            self.cursor_home()?;
            self.cursor_mode()
        });
        let closed = self.close();
        result.and(closed)
    }

    fn display_line(&mut self, offset: u8, text: &str) -> LcdResult<()> {
        self.open()?;
        let mut result = self.set_ddram_address(offset);
        if result.is_ok() {
            let mut line = [b' '; LINE_WIDTH];
            for (slot, &b) in line.iter_mut().zip(text.as_bytes()) {
                // embedded NULs become blanks, like short input
                if b != 0 {
                    *slot = b;
                }
            }
            for &b in &line {
                // keep writing through the full line; the last failure wins
                if let Err(err) = self.send_data(b) {
                    result = Err(err);
                }
            }
            if result.is_ok() {
                self.record_line(offset, &line);
            }
        }
        let closed = self.close();
        result.and(closed)
    }

    fn send_command(&mut self, command: u8) -> LcdResult<()> {
        self.write_byte(false, command)
    }

    fn send_data(&mut self, data: u8) -> LcdResult<()> {
        self.write_byte(true, data)
    }
}

impl LcdDevice {
    /// Resynchronizes the controller and selects the 4-bit interface.
    ///
    /// The 8-bit function set lands in either starting mode; the bare
    /// nibble then switches the interface width, and the 4-bit function set
    /// completes the configuration. The resync outcome is folded into the
    /// result without short-circuiting the remaining steps.
    fn set_4bit_mode(&mut self) -> LcdResult<()> {
        let resync = self.send_command(CMD_FUNCTION_SET_8BIT);
        self.write_raw_nibble(MODE_4BIT_NIBBLE)?;
        let function_set = self.send_command(CMD_FUNCTION_SET_4BIT);
        resync.and(function_set)
    }
}

/// Diagnostic snapshot of the device state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LcdSnapshot {
    pub bus_path: Option<String>,
    pub address: u8,
    pub exclusive: bool,
    pub backlight: bool,
    pub line1: String,
    pub line2: String,
    pub cursor_x: u8,
    pub cursor_y: u8,
}

impl LcdDevice {
    /// Captures the current device state for status reporting.
    ///
    /// Cursor fields reflect the last status read; line contents reflect the
    /// last successful line writes.
    pub fn snapshot(&self) -> LcdSnapshot {
        LcdSnapshot {
            bus_path: self.bus_path().map(str::to_owned),
            address: self.address(),
            exclusive: self.exclusive(),
            backlight: self.backlight(),
            line1: self.line_text(0),
            line2: self.line_text(1),
            cursor_x: self.cursor_x(),
            cursor_y: self.cursor_y(),
        }
    }
}
