//! dev — collaborator interfaces and the device registry
//!
//! Terminals and devices are drivers outside the process core; the core
//! only sees these traits.
//!
//!   rtc — periodic real-time clock interrupts

pub mod rtc;

use crate::sys::config::MAX_DEVICES;
use crate::sys::error::Error;
use crate::sys::proc::Pid;

/// A named character device reachable through `open`
pub trait Device: Sync {
    fn open(&self) -> Result<(), Error> {
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Error>;

    fn write(&self, buf: &[u8]) -> Result<usize, Error>;

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// The terminal driver: line input, screen output and video pages
pub trait Terminals: Sync {
    /// Terminal currently shown on screen
    fn active_terminal(&self) -> usize;

    /// Blocks until a line is available
    fn read(&self, terminal: usize, buf: &mut [u8]) -> Result<usize, Error>;

    fn write(&self, terminal: usize, buf: &[u8]) -> Result<usize, Error>;

    /// Physical page holding `terminal`'s screen
    fn video_frame(&self, terminal: usize) -> u32;

    /// Told whenever the process running in `terminal` changes
    fn set_active_process(&self, terminal: usize, pid: Option<Pid>);
}

#[derive(Clone, Copy)]
struct Entry {
    name:   &'static str,
    device: &'static dyn Device,
}

pub struct DeviceTable {
    entries: [Option<Entry>; MAX_DEVICES],
}

impl DeviceTable {
    pub const fn new() -> Self {
        Self { entries: [None; MAX_DEVICES] }
    }

    /// Add a device; a second registration under the same name replaces it
    pub fn register(&mut self, name: &'static str, device: &'static dyn Device) -> Result<(), Error> {
        let entry = Some(Entry { name, device });
        if let Some(slot) = self.entries.iter_mut().find(|e| matches!(e, Some(e) if e.name == name)) {
            *slot = entry;
            return Ok(());
        }
        let slot = self.entries.iter_mut().find(|e| e.is_none()).ok_or(Error::DeviceTableFull)?;
        *slot = entry;
        Ok(())
    }

    pub fn lookup(&self, name: &[u8]) -> Option<&'static dyn Device> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.name.as_bytes() == name)
            .map(|e| e.device)
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}
