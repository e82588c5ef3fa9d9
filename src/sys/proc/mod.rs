//! proc — process management
//!
//!   table   — slot bitmap, terminal → process map
//!   pcb     — per-slot process records and descriptors
//!   exec    — command lines and executable headers
//!   process — execute, halt, faults, terminal start-up
//!   switch  — context switch between two slots
//!   sched   — timer-driven round robin over terminals

pub mod exec;
pub mod pcb;
pub mod process;
pub mod sched;
pub mod switch;
pub mod table;

use crate::sys::config::MAX_PROCESSES;
use core::fmt;

/// Process slot id, `1..=MAX_PROCESSES`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u8);

impl Pid {
    pub const fn new(id: usize) -> Option<Pid> {
        if id >= 1 && id <= MAX_PROCESSES {
            Some(Pid(id as u8))
        } else {
            None
        }
    }

    pub(crate) const fn from_index(index: usize) -> Option<Pid> {
        Pid::new(index + 1)
    }

    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Zero-based position in the slot arenas
    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_ids_are_one_based() {
        assert!(Pid::new(0).is_none());
        assert!(Pid::new(MAX_PROCESSES + 1).is_none());
        assert_eq!(Pid::new(1).unwrap().index(), 0);
        assert_eq!(Pid::from_index(5).unwrap().get(), 6);
    }
}
