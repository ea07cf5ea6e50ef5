//! PCF8574 output register model.
//!
//! The expander's eight outputs drive the LCD control lines and the 4-bit
//! data bus. The byte layout is fixed by the backpack wiring, LSb first:
//! bit 0 = RS, bit 1 = R/W, bit 2 = EN, bit 3 = backlight LED,
//! bits 4..=7 = D4..D7.

/// Register select line.
pub const RS_BIT: u8 = 1 << 0;
/// Read/write direction line.
pub const RW_BIT: u8 = 1 << 1;
/// Enable line.
pub const EN_BIT: u8 = 1 << 2;
/// Backlight LED line.
pub const LED_BIT: u8 = 1 << 3;
/// Position of the data nibble within the output byte.
pub const DATA_SHIFT: u8 = 4;
/// Mask applied to the data nibble before shifting.
pub const DATA_MASK: u8 = 0x0F;

/// Mirror of the last byte driven onto the PCF8574 outputs.
///
/// The whole byte image is recomputed from these fields on every bus write,
/// so the expander never sees a partially-updated register.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CtrlReg {
    /// Register select: `false` = instruction register, `true` = data register.
    pub rs: bool,
    /// Transfer direction: `false` = write, `true` = read.
    pub rw: bool,
    /// Enable line; the controller samples the data lines on its falling edge.
    pub en: bool,
    /// Backlight LED; persists independently of command traffic.
    pub led: bool,
    /// 4-bit data nibble (D4..D7). Only the low four bits are used.
    pub d4: u8,
}

impl CtrlReg {
    /// Encodes the field values into the PCF8574 output byte.
    pub fn encode(&self) -> u8 {
        let mut byte = (self.d4 & DATA_MASK) << DATA_SHIFT;
        if self.rs {
            byte |= RS_BIT;
        }
        if self.rw {
            byte |= RW_BIT;
        }
        if self.en {
            byte |= EN_BIT;
        }
        if self.led {
            byte |= LED_BIT;
        }
        byte
    }

    /// Decodes an output byte back into field values.
    pub fn decode(byte: u8) -> Self {
        CtrlReg {
            rs: byte & RS_BIT != 0,
            rw: byte & RW_BIT != 0,
            en: byte & EN_BIT != 0,
            led: byte & LED_BIT != 0,
            d4: (byte >> DATA_SHIFT) & DATA_MASK,
        }
    }
}
