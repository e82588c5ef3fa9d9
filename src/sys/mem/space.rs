//! Address spaces — one page directory per process slot
//!
//! Every directory shares the kernel large page and its terminal's low
//! table. The program window is one 4 MB page picked by slot id.

use super::paging::{flags, PageTable};
use super::{
    backing_frame, program_frame, Translation, KERNEL_BASE, PROGRAM_WINDOW, PROG_VIDMEM_ADDR, VIDEO,
};
use crate::sys::arch::Cpu;
use crate::sys::config::{MAX_PROCESSES, TERMINALS};
use crate::sys::proc::Pid;

const KERNEL_FLAGS:  u32 = flags::PRESENT | flags::WRITABLE | flags::LARGE;
const LOW_FLAGS:     u32 = flags::PRESENT | flags::WRITABLE;
const PROGRAM_FLAGS: u32 = flags::PRESENT | flags::WRITABLE | flags::USER | flags::LARGE;
/// Alias entry as seeded: everything but `PRESENT`
const ALIAS_FLAGS:   u32 = flags::WRITABLE | flags::USER;

const EMPTY: PageTable = PageTable::new();

/// Physical addresses of the arena's tables, filled in by `init`
#[derive(Debug, Clone, Copy)]
struct Frames {
    kernel:      u32,
    screen:      u32,
    directories: [u32; MAX_PROCESSES],
    low:         [u32; TERMINALS],
    video:       [u32; TERMINALS],
}

pub struct AddressSpaces {
    /// Used when no process is running
    kernel:       PageTable,
    screen:       PageTable,
    directories:  [PageTable; MAX_PROCESSES],
    low_tables:   [PageTable; TERMINALS],
    video_tables: [PageTable; TERMINALS],
    frames:       Frames,
}

impl AddressSpaces {
    pub const fn new() -> Self {
        Self {
            kernel:       EMPTY,
            screen:       EMPTY,
            directories:  [EMPTY; MAX_PROCESSES],
            low_tables:   [EMPTY; TERMINALS],
            video_tables: [EMPTY; TERMINALS],
            frames: Frames {
                kernel:      0,
                screen:      0,
                directories: [0; MAX_PROCESSES],
                low:         [0; TERMINALS],
                video:       [0; TERMINALS],
            },
        }
    }

    /// Record where the tables live and seed the shared ones.
    /// `video_frame` gives each terminal's current video page.
    pub fn init<C: Cpu>(&mut self, cpu: &C, video_frame: impl Fn(usize) -> u32) {
        self.frames.kernel = cpu.physical_address(&self.kernel);
        self.frames.screen = cpu.physical_address(&self.screen);
        for (slot, dir) in self.directories.iter().enumerate() {
            self.frames.directories[slot] = cpu.physical_address(dir);
        }
        for terminal in 0..TERMINALS {
            self.frames.low[terminal] = cpu.physical_address(&self.low_tables[terminal]);
            self.frames.video[terminal] = cpu.physical_address(&self.video_tables[terminal]);
            self.low_tables[terminal].clear();
            self.video_tables[terminal].clear();
            self.remap_video(terminal, video_frame(terminal));
        }

        self.screen.clear();
        self.screen.map_page(VIDEO, VIDEO, LOW_FLAGS);
        for terminal in 0..TERMINALS {
            let frame = backing_frame(terminal);
            self.screen.map_page(frame, frame, LOW_FLAGS);
        }

        self.kernel.clear();
        self.kernel.set_entry(0, self.frames.screen, LOW_FLAGS);
        self.kernel.set_entry(KERNEL_BASE, KERNEL_BASE, KERNEL_FLAGS);
    }

    /// Zero `pid`'s directory and re-seed the kernel, video and alias entries
    pub fn init_directory(&mut self, pid: Pid, terminal: usize) {
        let frames = self.frames;
        seed(&mut self.directories[pid.index()], &frames, terminal);
    }

    /// Give `pid` its private 4 MB frame at the program window
    pub fn map_program(&mut self, pid: Pid) {
        self.directories[pid.index()].set_entry(PROGRAM_WINDOW, program_frame(pid), PROGRAM_FLAGS);
    }

    pub fn directory(&self, pid: Pid) -> &PageTable {
        &self.directories[pid.index()]
    }

    pub fn directory_frame(&self, pid: Option<Pid>) -> u32 {
        match pid {
            Some(pid) => self.frames.directories[pid.index()],
            None => self.frames.kernel,
        }
    }

    /// Make `pid`'s directory current; `None` selects the kernel directory
    pub fn activate<C: Cpu>(&self, cpu: &C, pid: Option<Pid>) {
        cpu.load_directory(self.directory_frame(pid));
    }

    /// Mark the video alias present; the caller flushes the translation
    pub fn reveal_video(&mut self, pid: Pid) {
        self.directories[pid.index()].set_flags(PROG_VIDMEM_ADDR, flags::PRESENT);
    }

    /// Point `terminal`'s kernel and user video pages at `frame`
    pub fn remap_video(&mut self, terminal: usize, frame: u32) {
        self.low_tables[terminal].map_page(VIDEO, frame, LOW_FLAGS);
        self.video_tables[terminal].map_page(PROG_VIDMEM_ADDR, frame, LOW_FLAGS | flags::USER);
    }

    /// Walk `pid`'s directory the way the MMU would
    pub fn translate(&self, pid: Option<Pid>, vaddr: u32) -> Option<Translation> {
        self.walk(pid, vaddr).map(|(translation, _)| translation)
    }

    /// Like `translate`, but only for pages ring 3 may touch
    pub fn translate_user(&self, pid: Pid, vaddr: u32) -> Option<Translation> {
        match self.walk(Some(pid), vaddr) {
            Some((translation, true)) => Some(translation),
            _ => None,
        }
    }

    fn walk(&self, pid: Option<Pid>, vaddr: u32) -> Option<(Translation, bool)> {
        let dir = match pid {
            Some(pid) => &self.directories[pid.index()],
            None => &self.kernel,
        };
        let pde = dir.directory_entry(vaddr);
        if !pde.is_present() {
            return None;
        }
        if pde.is_large() {
            let phys = pde.address() | (vaddr & 0x003F_FFFF);
            return Some((Translation { virt: vaddr, phys }, pde.is_user()));
        }

        let table = self.table_at(pde.address())?;
        let pte = table.page_entry(vaddr);
        if !pte.is_present() {
            return None;
        }
        let phys = pte.address() | (vaddr & 0xFFF);
        Some((Translation { virt: vaddr, phys }, pde.is_user() && pte.is_user()))
    }

    fn table_at(&self, phys: u32) -> Option<&PageTable> {
        if phys == self.frames.screen {
            return Some(&self.screen);
        }
        let low = self.frames.low.iter().position(|&frame| frame == phys);
        if let Some(terminal) = low {
            return Some(&self.low_tables[terminal]);
        }
        let video = self.frames.video.iter().position(|&frame| frame == phys)?;
        Some(&self.video_tables[video])
    }
}

impl Default for AddressSpaces {
    fn default() -> Self {
        Self::new()
    }
}

fn seed(dir: &mut PageTable, frames: &Frames, terminal: usize) {
    dir.clear();
    dir.set_entry(0, frames.low[terminal], LOW_FLAGS);
    dir.set_entry(KERNEL_BASE, KERNEL_BASE, KERNEL_FLAGS);
    dir.set_entry(PROG_VIDMEM_ADDR, frames.video[terminal], ALIAS_FLAGS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mem::{PROGRAM_IMAGE, PROGRAM_WINDOW_END};
    use crate::testing::SimCpu;

    fn spaces(cpu: &SimCpu) -> Box<AddressSpaces> {
        let mut spaces = Box::new(AddressSpaces::new());
        spaces.init(cpu, |terminal| 0xB9000 + terminal as u32 * 0x1000);
        spaces
    }

    fn pid(n: usize) -> Pid {
        Pid::new(n).unwrap()
    }

    #[test]
    fn every_directory_shares_the_kernel_page() {
        let cpu = SimCpu::new();
        let mut spaces = spaces(&cpu);
        spaces.init_directory(pid(1), 0);
        spaces.init_directory(pid(2), 2);

        let a = spaces.directory(pid(1)).directory_entry(KERNEL_BASE);
        let b = spaces.directory(pid(2)).directory_entry(KERNEL_BASE);
        assert_eq!(a, b);
        assert!(a.is_large() && a.is_writable() && !a.is_user());
        assert_eq!(spaces.translate(Some(pid(2)), KERNEL_BASE + 0x123).unwrap().phys, KERNEL_BASE + 0x123);
    }

    #[test]
    fn low_table_maps_the_terminal_video_page() {
        let cpu = SimCpu::new();
        let mut spaces = spaces(&cpu);
        spaces.init_directory(pid(3), 1);
        let t = spaces.translate(Some(pid(3)), VIDEO + 8).unwrap();
        assert_eq!(t.phys, 0xBA008);
        assert!(spaces.translate_user(pid(3), VIDEO).is_none());
    }

    #[test]
    fn video_alias_is_hidden_until_revealed() {
        let cpu = SimCpu::new();
        let mut spaces = spaces(&cpu);
        spaces.init_directory(pid(1), 0);
        assert!(spaces.translate(Some(pid(1)), PROG_VIDMEM_ADDR).is_none());

        spaces.reveal_video(pid(1));
        let t = spaces.translate_user(pid(1), PROG_VIDMEM_ADDR + 4).unwrap();
        assert_eq!(t.phys, 0xB9004);
    }

    #[test]
    fn reinit_hides_a_previously_revealed_alias() {
        let cpu = SimCpu::new();
        let mut spaces = spaces(&cpu);
        spaces.init_directory(pid(1), 0);
        spaces.map_program(pid(1));
        spaces.reveal_video(pid(1));

        spaces.init_directory(pid(1), 0);
        assert!(spaces.translate(Some(pid(1)), PROG_VIDMEM_ADDR).is_none());
        assert!(spaces.translate(Some(pid(1)), PROGRAM_IMAGE).is_none());
    }

    #[test]
    fn program_windows_never_overlap() {
        let cpu = SimCpu::new();
        let mut spaces = spaces(&cpu);
        for n in 1..=MAX_PROCESSES {
            spaces.init_directory(pid(n), 0);
            spaces.map_program(pid(n));
        }
        for a in 1..=MAX_PROCESSES {
            for b in (a + 1)..=MAX_PROCESSES {
                for vaddr in [PROGRAM_WINDOW, PROGRAM_IMAGE, PROGRAM_WINDOW_END - 1] {
                    let pa = spaces.translate_user(pid(a), vaddr).unwrap().phys;
                    let pb = spaces.translate_user(pid(b), vaddr).unwrap().phys;
                    assert_ne!(pa, pb);
                }
            }
        }
    }

    #[test]
    fn activate_falls_back_to_the_kernel_directory() {
        let cpu = SimCpu::new();
        let mut spaces = spaces(&cpu);
        spaces.init_directory(pid(4), 0);
        spaces.activate(&cpu, Some(pid(4)));
        assert_eq!(cpu.cr3(), spaces.directory_frame(Some(pid(4))));
        spaces.activate(&cpu, None);
        assert_eq!(cpu.cr3(), spaces.directory_frame(None));
        assert!(spaces.translate(None, PROGRAM_IMAGE).is_none());
    }

    #[test]
    fn kernel_directory_sees_every_screen_page() {
        let cpu = SimCpu::new();
        let spaces = spaces(&cpu);
        assert_eq!(spaces.translate(None, VIDEO + 2).unwrap().phys, VIDEO + 2);
        for terminal in 0..TERMINALS {
            let frame = backing_frame(terminal);
            assert_eq!(spaces.translate(None, frame).unwrap().phys, frame);
        }
        assert!(spaces.translate(None, PROG_VIDMEM_ADDR).is_none());
    }

    #[test]
    fn remap_moves_both_views_of_the_video_page() {
        let cpu = SimCpu::new();
        let mut spaces = spaces(&cpu);
        spaces.init_directory(pid(1), 2);
        spaces.reveal_video(pid(1));
        spaces.remap_video(2, VIDEO);
        assert_eq!(spaces.translate(Some(pid(1)), VIDEO).unwrap().phys, VIDEO);
        assert_eq!(spaces.translate(Some(pid(1)), PROG_VIDMEM_ADDR).unwrap().phys, VIDEO);
    }
}
