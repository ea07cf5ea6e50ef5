//! Device context, transport lifecycle, and the 4-bit transfer protocol.

use crate::bus::{I2cBus, I2cOpener, LinuxI2c};
use crate::ctrl::{LINE2_OFFSET, LINE_WIDTH};
use crate::poll::{PollStrategy, SpinPoll};
use crate::reg::CtrlReg;
use crate::{LcdError, LcdResult};
use log::{debug, trace};

/// Default PCF8574 slave address.
pub const DEFAULT_ADDRESS: u8 = 0x27;
/// Default I2C bus character device.
pub const DEFAULT_BUS_PATH: &str = "/dev/i2c-1";
/// Busy flag bit of the status byte.
pub const STATUS_BUSY: u8 = 0x80;
/// Address-counter bits of the status byte.
pub const STATUS_ADDRESS: u8 = 0x7F;

/// Mutable state of one physical display.
///
/// The context owns the bus handle and the register image all operations act
/// on. It is meant to be driven by a single thread; nothing here locks.
#[derive(Debug)]
pub struct LcdDevice {
    bus_path: Option<String>,
    address: u8,
    opener: Box<dyn I2cOpener>,
    handle: Option<Box<dyn I2cBus>>,
    exclusive: bool,
    pub(crate) reg: CtrlReg,
    poll: Box<dyn PollStrategy>,
    busy: bool,
    address_counter: u8,
    cx: u8,
    cy: u8,
    lines: [[u8; LINE_WIDTH]; 2],
}

impl Default for LcdDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl LcdDevice {
    /// Creates a context against the Linux I2C backend with the default bus
    /// path and slave address, backlight on, bus closed.
    pub fn new() -> Self {
        Self::with_opener(Box::new(LinuxI2c))
    }

    /// Creates a context against a custom transport backend.
    pub fn with_opener(opener: Box<dyn I2cOpener>) -> Self {
        LcdDevice {
            bus_path: Some(DEFAULT_BUS_PATH.to_string()),
            address: DEFAULT_ADDRESS,
            opener,
            handle: None,
            exclusive: false,
            reg: CtrlReg { led: true, ..CtrlReg::default() },
            poll: Box::new(SpinPoll),
            busy: false,
            address_counter: 0,
            cx: 1,
            cy: 1,
            lines: [[b' '; LINE_WIDTH]; 2],
        }
    }

    /// Replaces the busy-poll strategy.
    pub fn set_poll_strategy(&mut self, poll: Box<dyn PollStrategy>) {
        self.poll = poll;
    }

    pub fn bus_path(&self) -> Option<&str> {
        self.bus_path.as_deref()
    }

    /// Sets the bus device path; takes effect on the next open.
    pub fn set_bus_path(&mut self, path: impl Into<String>) {
        self.bus_path = Some(path.into());
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Sets the 7-bit slave address; takes effect on the next open.
    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    /// In exclusive mode the handle persists across operations and
    /// [`close`](Self::close) becomes a no-op until the flag is cleared.
    pub fn set_exclusive(&mut self, exclusive: bool) {
        self.exclusive = exclusive;
    }

    pub fn backlight(&self) -> bool {
        self.reg.led
    }

    /// Sets the backlight LED and commits the register byte immediately, so
    /// the change does not wait for the next command.
    pub fn set_backlight(&mut self, on: bool) -> LcdResult<()> {
        self.reg.led = on;
        self.write_reg()
    }

    /// Busy flag from the last status read.
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// Address counter from the last status read; stale until then.
    pub fn address_counter(&self) -> u8 {
        self.address_counter
    }

    /// Cursor column, 1-based, derived from the last status read.
    pub fn cursor_x(&self) -> u8 {
        self.cx
    }

    /// Cursor row (1 or 2), derived from the last status read.
    pub fn cursor_y(&self) -> u8 {
        self.cy
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Opens the bus, primes the expander with the current register image,
    /// and caches the handle. No-op success when already open.
    pub fn open(&mut self) -> LcdResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.handle = Some(self.open_bus()?);
        match self.commit() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.handle = None;
                Err(err)
            }
        }
    }

    /// Closes the bus handle. No-op while exclusive mode is active or the
    /// bus is already closed.
    pub fn close(&mut self) -> LcdResult<()> {
        if self.handle.is_some() && !self.exclusive {
            self.handle = None;
            debug!("Closed LCD bus");
        }
        Ok(())
    }

    /// Shared teardown for normal and abnormal exit paths: clears
    /// exclusivity, then closes the bus.
    pub fn shutdown(&mut self) -> LcdResult<()> {
        self.exclusive = false;
        self.close()
    }

    fn open_bus(&self) -> LcdResult<Box<dyn I2cBus>> {
        let path = self.bus_path.as_deref().ok_or(LcdError::NoDevice)?;
        let bus = self.opener.open(path, self.address)?;
        debug!("Opened LCD bus {} @ {:#04x}", path, self.address);
        Ok(bus)
    }

    /// Runs `f` with an open handle: the cached one when present, otherwise
    /// a transient handle released on every exit path.
    fn with_handle<T>(&mut self, f: impl FnOnce(&mut Self) -> LcdResult<T>) -> LcdResult<T> {
        if self.handle.is_some() {
            return f(self);
        }
        self.handle = Some(self.open_bus()?);
        let result = f(self);
        self.handle = None;
        result
    }

    /// Commits the current register image through the cached handle.
    fn commit(&mut self) -> LcdResult<()> {
        let byte = self.reg.encode();
        trace!("reg <- {byte:#010b}");
        match self.handle.as_mut() {
            Some(bus) => bus.write_byte(byte),
            None => Err(LcdError::BadHandle),
        }
    }

    fn bus_read(&mut self) -> LcdResult<u8> {
        match self.handle.as_mut() {
            Some(bus) => bus.read_byte(),
            None => Err(LcdError::BadHandle),
        }
    }

    /// Writes the current register byte image, opening a transient handle
    /// when none is cached.
    pub fn write_reg(&mut self) -> LcdResult<()> {
        self.with_handle(Self::commit)
    }

    /// Toggles EN high then low, committing both edges; the controller
    /// samples the data lines on the falling edge.
    fn latch(&mut self) -> LcdResult<()> {
        self.reg.en = true;
        self.write_reg()?;
        self.reg.en = false;
        self.write_reg()
    }

    /// Commits a single raw nibble with RS = RW = 0 and latches it.
    ///
    /// Used only by the 4-bit mode transition, where the controller accepts
    /// one meaningful nibble instead of a full two-nibble transfer.
    pub(crate) fn write_raw_nibble(&mut self, nibble: u8) -> LcdResult<()> {
        self.reg.rs = false;
        self.reg.rw = false;
        self.reg.d4 = nibble & 0x0F;
        self.write_reg()?;
        self.latch()
    }

    /// Writes one command (`rs` = false) or data (`rs` = true) byte as two
    /// latched nibble transfers, then polls status until the controller
    /// reports ready.
    ///
    /// Completion is controller-paced: the default poll strategy has no
    /// bound. Any transport error aborts the poll immediately.
    pub fn write_byte(&mut self, rs: bool, value: u8) -> LcdResult<()> {
        trace!("write rs={rs} value={value:#04x}");
        self.reg.rs = rs;
        self.reg.rw = false;

        self.reg.d4 = (value & 0xF0) >> 4;
        self.write_reg()?;
        self.latch()?;

        self.reg.d4 = value & 0x0F;
        self.write_reg()?;
        self.latch()?;

        let mut polls = 0;
        loop {
            self.poll.check(polls)?;
            self.read_status()?;
            if !self.busy {
                return Ok(());
            }
            polls += 1;
        }
    }

    /// Performs the full status read-back and refreshes the busy flag,
    /// address counter and cursor position. Opens a transient handle when
    /// none is cached.
    pub fn read_status(&mut self) -> LcdResult<u8> {
        self.with_handle(Self::read_status_raw)
    }

    fn read_status_raw(&mut self) -> LcdResult<u8> {
        let value = self.read_raw_byte()?;
        self.busy = value & STATUS_BUSY != 0;
        self.address_counter = value & STATUS_ADDRESS;
        self.cx = (self.address_counter & 0x3F) + 1;
        self.cy = if self.address_counter >= LINE2_OFFSET { 2 } else { 1 };
        trace!(
            "status {:#04x} busy={} ac={:#04x}",
            value, self.busy, self.address_counter
        );
        Ok(value)
    }

    /// Assembles a status byte from two latched nibble reads.
    ///
    /// The expander has no input mode, so the data lines are driven high and
    /// the controller pulls them while EN is raised. The first read carries
    /// status bits 7..4 in its high nibble, the second bits 3..0.
    fn read_raw_byte(&mut self) -> LcdResult<u8> {
        if self.handle.is_none() {
            return Err(LcdError::BadHandle);
        }
        self.reg.rs = false;
        self.reg.rw = true;
        self.reg.d4 = 0x0F;
        self.commit()?;

        self.reg.en = true;
        self.commit()?;
        let hi = self.bus_read()?;
        self.reg.en = false;
        self.commit()?;

        self.reg.en = true;
        self.commit()?;
        let lo = self.bus_read()?;
        self.reg.en = false;
        self.commit()?;

        Ok((hi & 0xF0) | ((lo & 0xF0) >> 4))
    }

    /// Records the text last written to a line region, for status reporting.
    pub(crate) fn record_line(&mut self, offset: u8, bytes: &[u8; LINE_WIDTH]) {
        match offset {
            0 => self.lines[0] = *bytes,
            LINE2_OFFSET => self.lines[1] = *bytes,
            _ => {}
        }
    }

    pub(crate) fn line_text(&self, index: usize) -> String {
        String::from_utf8_lossy(&self.lines[index]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::{mock_device, push_status};
    use crate::poll::BoundedPoll;
    use crate::reg::{LED_BIT, RW_BIT};

    #[test]
    fn cursor_tracks_the_address_counter() {
        let (mut dev, log) = mock_device();
        dev.set_exclusive(true);
        dev.open().unwrap();
        for ac in 0u8..=0x7F {
            push_status(&log, ac);
            dev.read_status().unwrap();
            if ac < 0x40 {
                assert_eq!(dev.cursor_y(), 1, "ac {ac:#04x}");
                assert_eq!(dev.cursor_x(), ac + 1, "ac {ac:#04x}");
            } else {
                assert_eq!(dev.cursor_y(), 2, "ac {ac:#04x}");
                assert_eq!(dev.cursor_x(), (ac - 0x40) + 1, "ac {ac:#04x}");
            }
        }
    }

    #[test]
    fn status_decode_assembles_both_nibbles() {
        let (mut dev, log) = mock_device();
        dev.set_exclusive(true);
        dev.open().unwrap();
        {
            let mut log = log.borrow_mut();
            log.reads.push_back(0xA0);
            log.reads.push_back(0x50);
        }
        let status = dev.read_status().unwrap();
        assert_eq!(status, 0xA5);
        assert!(dev.busy());
        assert_eq!(dev.address_counter(), 0x25);
    }

    #[test]
    fn write_byte_issues_two_latched_commits_before_polling() {
        let (mut dev, log) = mock_device();
        dev.set_exclusive(true);
        dev.open().unwrap();
        log.borrow_mut().writes.clear(); // drop the priming write
        dev.write_byte(false, 0x53).unwrap();
        let writes = log.borrow().writes.clone();
        // backlight on: high nibble commit and EN toggle, then the low
        // nibble, then only status read-back traffic
        assert_eq!(&writes[..6], &[0x58, 0x5C, 0x58, 0x38, 0x3C, 0x38]);
        assert!(writes[6..].iter().all(|b| b & RW_BIT != 0));
    }

    #[test]
    fn data_writes_use_the_same_nibble_framing() {
        let (mut dev, log) = mock_device();
        dev.set_exclusive(true);
        dev.open().unwrap();
        log.borrow_mut().writes.clear();
        dev.write_byte(true, 0x48).unwrap();
        let writes = log.borrow().writes.clone();
        assert_eq!(&writes[..6], &[0x49, 0x4D, 0x49, 0x89, 0x8D, 0x89]);
    }

    #[test]
    fn backlight_survives_command_traffic() {
        let (mut dev, log) = mock_device();
        dev.set_backlight(true).unwrap();
        dev.write_byte(false, 0x01).unwrap();
        assert!(dev.backlight());
        assert!(log.borrow().writes.iter().all(|b| b & LED_BIT != 0));
    }

    #[test]
    fn backlight_off_clears_the_led_bit_at_once() {
        let (mut dev, log) = mock_device();
        dev.set_backlight(false).unwrap();
        assert!(!dev.backlight());
        assert_eq!(log.borrow().writes.last().copied(), Some(0x00));
    }

    #[test]
    fn transient_writes_balance_opens_and_closes() {
        let (mut dev, log) = mock_device();
        dev.write_byte(false, 0x02).unwrap();
        assert!(!dev.is_open());
        let log = log.borrow();
        assert!(log.opens > 0);
        assert_eq!(log.opens, log.closes);
    }

    #[test]
    fn open_is_idempotent_and_primes_the_bus() {
        let (mut dev, log) = mock_device();
        dev.set_exclusive(true);
        dev.open().unwrap();
        dev.open().unwrap();
        let log = log.borrow();
        assert_eq!(log.opens, 1);
        // the priming write carries the initial image: backlight only
        assert_eq!(log.writes, vec![0x08]);
    }

    #[test]
    fn operations_without_a_configured_path_fail() {
        let (mut dev, _log) = mock_device();
        dev.bus_path = None;
        assert_eq!(dev.open().unwrap_err(), LcdError::NoDevice);
        assert_eq!(dev.write_reg().unwrap_err(), LcdError::NoDevice);
        assert_eq!(dev.read_status().unwrap_err(), LcdError::NoDevice);
    }

    #[test]
    fn open_surfaces_bind_failures() {
        let (mut dev, log) = mock_device();
        log.borrow_mut().fail_open = Some(LcdError::BusBind);
        assert_eq!(dev.open().unwrap_err(), LcdError::BusBind);
        assert!(!dev.is_open());
    }

    #[test]
    fn bounded_poll_surfaces_a_stuck_controller() {
        let (mut dev, log) = mock_device();
        dev.set_exclusive(true);
        dev.open().unwrap();
        dev.set_poll_strategy(Box::new(BoundedPoll::new(1)));
        push_status(&log, 0x80);
        assert_eq!(dev.write_byte(false, 0x01).unwrap_err(), LcdError::Busy);
    }

    #[test]
    fn shutdown_clears_exclusivity_and_closes() {
        let (mut dev, log) = mock_device();
        dev.set_exclusive(true);
        dev.open().unwrap();
        dev.close().unwrap(); // no-op while exclusive
        assert!(dev.is_open());
        dev.shutdown().unwrap();
        assert!(!dev.is_open());
        assert!(!dev.exclusive());
        assert_eq!(log.borrow().closes, 1);
    }
}
