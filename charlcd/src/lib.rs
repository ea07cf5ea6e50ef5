//! Driver for HD44780-class character LCDs behind a PCF8574 I2C port expander.
//!
//! The expander exposes eight outputs over the I2C bus; four of them form the
//! LCD's 4-bit data bus and the rest drive the control lines and the
//! backlight LED. Every command or data byte is transferred as two latched
//! nibbles, and completion is tracked by reading the controller's busy flag
//! and address counter back through the same expander.
//!
//! The [`device::LcdDevice`] context owns the bus handle and the register
//! image; the [`ctrl::LcdCtrl`] trait layers the named controller operations
//! (initialize, clear, home, address, line writes) on top of it.

pub mod bus;
pub mod ctrl;
pub mod device;
pub mod poll;
pub mod reg;

use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LcdError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("no I2C bus device configured")]
    NoDevice,
    #[error("binding the I2C slave address failed")]
    BusBind,
    #[error("no open bus handle")]
    BadHandle,
    #[error("controller still busy at the poll limit")]
    Busy,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for LcdError {
    fn from(err: std::io::Error) -> Self {
        LcdError::Io(err.kind())
    }
}

pub type LcdResult<T> = Result<T, LcdError>;
