//! I2C transport seam and the Linux character-device backend.

use crate::{LcdError, LcdResult};
use log::trace;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;

/// ioctl request binding an open I2C character device to a slave address.
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// Single-byte transfers against a bound I2C slave.
pub trait I2cBus: Debug {
    /// Writes one byte to the slave.
    fn write_byte(&mut self, byte: u8) -> LcdResult<()>;
    /// Reads one byte from the slave.
    fn read_byte(&mut self) -> LcdResult<u8>;
}

/// Backend factory producing bound bus handles.
pub trait I2cOpener: Debug {
    /// Opens `path` and binds `address` as the target slave.
    fn open(&self, path: &str, address: u8) -> LcdResult<Box<dyn I2cBus>>;
}

/// Linux `/dev/i2c-N` backend.
#[derive(Debug, Default)]
pub struct LinuxI2c;

impl I2cOpener for LinuxI2c {
    fn open(&self, path: &str, address: u8) -> LcdResult<Box<dyn I2cBus>> {
        Ok(Box::new(LinuxI2cBus::open(path, address)?))
    }
}

/// An open I2C character device bound to one slave address.
#[derive(Debug)]
pub struct LinuxI2cBus {
    file: File,
}

impl LinuxI2cBus {
    /// Opens the bus device and binds the slave address.
    ///
    /// A failed bind closes the file before the error returns, so no
    /// half-bound handle escapes.
    pub fn open(path: &str, address: u8) -> LcdResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, address as libc::c_ulong) };
        if rc < 0 {
            return Err(LcdError::BusBind);
        }
        trace!("Opened {} @ {:#04x}", path, address);
        Ok(LinuxI2cBus { file })
    }
}

impl I2cBus for LinuxI2cBus {
    fn write_byte(&mut self, byte: u8) -> LcdResult<()> {
        self.file.write_all(&[byte])?;
        Ok(())
    }

    fn read_byte(&mut self) -> LcdResult<u8> {
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}
