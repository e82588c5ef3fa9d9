//! Process table — which slots are live and who runs in each terminal

use super::Pid;
use crate::sys::config::{MAX_PROCESSES, TERMINALS};
use bit_field::BitField;

pub struct ProcessTable {
    /// Bit `i` set: slot `i + 1` is live
    used:   u8,
    active: [Option<Pid>; TERMINALS],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self { used: 0, active: [None; TERMINALS] }
    }

    /// First free slot, marked used
    pub fn allocate(&mut self) -> Option<Pid> {
        let index = (0..MAX_PROCESSES).find(|&i| !self.used.get_bit(i))?;
        self.used.set_bit(index, true);
        Pid::from_index(index)
    }

    pub fn free(&mut self, pid: Pid) {
        self.used.set_bit(pid.index(), false);
    }

    pub fn is_live(&self, pid: Pid) -> bool {
        self.used.get_bit(pid.index())
    }

    pub fn count(&self) -> usize {
        self.used.count_ones() as usize
    }

    pub fn active_process(&self, terminal: usize) -> Option<Pid> {
        self.active.get(terminal).copied().flatten()
    }

    pub fn set_active_process(&mut self, terminal: usize, pid: Option<Pid>) {
        if let Some(slot) = self.active.get_mut(terminal) {
            *slot = pid;
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
