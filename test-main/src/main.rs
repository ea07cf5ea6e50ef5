//! Hardware smoke test for the charlcd driver.
//!
//! Wiring is configured through the environment (or a `.env` file):
//! `CHARLCD_BUS` (default `/dev/i2c-1`), `CHARLCD_ADDR` (hex, default 27),
//! `CHARLCD_EXCLUSIVE` (hold the bus open across calls when set).

use charlcd::ctrl::{LINE2_OFFSET, LcdCtrl};
use charlcd::device::LcdDevice;
use dotenv::dotenv;
use log::{debug, info};
use std::env::var;

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    let mut dev = LcdDevice::new();

    if let Ok(path) = var("CHARLCD_BUS") {
        dev.set_bus_path(path);
    }
    if let Ok(addr) = var("CHARLCD_ADDR") {
        let addr = addr.strip_prefix("0x").unwrap_or(&addr);
        dev.set_address(u8::from_str_radix(addr, 16)?);
    }
    if var("CHARLCD_EXCLUSIVE").is_ok() {
        dev.set_exclusive(true);
        dev.open()?;
    }

    info!(
        "LCD on {} @ {:#04x}, exclusive: {}",
        dev.bus_path().unwrap_or("?"),
        dev.address(),
        dev.exclusive()
    );

    dev.init()?;
    dev.set_backlight(true)?;

    dev.display_line(0, "charlcd")?;
    dev.display_line(LINE2_OFFSET, "hello, world!")?;

    dev.read_status()?;
    info!(
        "cursor at ({}, {}), address counter {:#04x}",
        dev.cursor_x(),
        dev.cursor_y(),
        dev.address_counter()
    );
    debug!("{:?}", dev.snapshot());

    dev.shutdown()?;
    Ok(())
}
