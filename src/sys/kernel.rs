//! Kernel — the process core and its collaborators
//!
//! All mutable process state sits behind one spin lock that is only taken
//! with interrupts masked (`with_state`). `State::current` is the running
//! slot; it changes in `execute`, `halt` and the context switch only.
//! `None` with live processes means the idle path is running.

use crate::sys::arch::{Cpu, KernelContext};
use crate::sys::config::{BootConfig, ShellName, TERMINALS};
use crate::sys::debug;
use crate::sys::dev::{Device, DeviceTable, Terminals};
use crate::sys::error::Error;
use crate::sys::fs::FileSystem;
use crate::sys::mem::paging::PageTable;
use crate::sys::mem::space::AddressSpaces;
use crate::sys::mem::{in_program_window, VIDEO, PROG_VIDMEM_ADDR};
use crate::sys::proc::pcb::PcbStore;
use crate::sys::proc::table::ProcessTable;
use crate::sys::proc::Pid;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, RwLock};

pub struct State {
    pub table:   ProcessTable,
    pub pcbs:    PcbStore,
    pub spaces:  AddressSpaces,
    pub current: Option<Pid>,
    /// Where the idle path is parked when something preempts it
    pub idle_context: KernelContext,
}

impl State {
    pub const fn new() -> Self {
        Self {
            table:   ProcessTable::new(),
            pcbs:    PcbStore::new(),
            spaces:  AddressSpaces::new(),
            current: None,
            idle_context: KernelContext::empty(),
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Kernel<C: Cpu> {
    pub(crate) cpu:       C,
    pub(crate) fs:        &'static dyn FileSystem,
    pub(crate) terminals: &'static dyn Terminals,
    pub(crate) devices:   Mutex<DeviceTable>,
    pub(crate) config:    RwLock<BootConfig>,
    pub(crate) ticks:     AtomicU32,
    pub(crate) state:     Mutex<State>,
}

impl<C: Cpu> Kernel<C> {
    pub const fn new(cpu: C, fs: &'static dyn FileSystem, terminals: &'static dyn Terminals) -> Self {
        Self {
            cpu,
            fs,
            terminals,
            devices: Mutex::new(DeviceTable::new()),
            config:  RwLock::new(BootConfig::new()),
            ticks:   AtomicU32::new(0),
            state:   Mutex::new(State::new()),
        }
    }

    pub fn configure(&self, config: BootConfig) {
        debug::set_level(config.log_level);
        *self.config.write() = config;
    }

    /// Seed the kernel directory and the per-terminal video tables, then
    /// switch to the kernel directory.
    pub fn init(&self) {
        self.with_state(|state| {
            state.spaces.init(&self.cpu, |terminal| self.terminals.video_frame(terminal));
            state.spaces.activate(&self.cpu, None);
        });
        klog!("kernel: {} terminals, shell '{}'", TERMINALS,
            core::str::from_utf8(self.shell().as_bytes()).unwrap_or("?"));
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn shell(&self) -> ShellName {
        self.config.read().shell
    }

    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn register_device(&self, name: &'static str, device: &'static dyn Device) -> Result<(), Error> {
        self.devices.lock().register(name, device)
    }

    /// Run `f` on the process state with interrupts masked
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        self.cpu.without_interrupts(|| f(&mut self.state.lock()))
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.with_state(|state| state.current)
    }

    pub fn active_process(&self, terminal: usize) -> Option<Pid> {
        self.with_state(|state| state.table.active_process(terminal))
    }

    pub fn process_count(&self) -> usize {
        self.with_state(|state| state.table.count())
    }

    /// Terminal `pid` belongs to, if it is live
    pub fn terminal_of(&self, pid: Pid) -> Option<usize> {
        self.with_state(|state| {
            state.table.is_live(pid).then(|| state.pcbs.get(pid).terminal)
        })
    }

    pub fn directory_frame(&self, pid: Option<Pid>) -> u32 {
        self.with_state(|state| state.spaces.directory_frame(pid))
    }

    /// Inspect `pid`'s page directory
    pub fn with_directory<R>(&self, pid: Pid, f: impl FnOnce(&PageTable) -> R) -> R {
        self.with_state(|state| f(state.spaces.directory(pid)))
    }

    pub(crate) fn set_active(&self, state: &mut State, terminal: usize, pid: Option<Pid>) {
        state.table.set_active_process(terminal, pid);
        self.terminals.set_active_process(terminal, pid);
    }

    /// Retarget `terminal`'s video page, e.g. when it becomes visible
    pub fn remap_video(&self, terminal: usize, frame: u32) -> Result<(), Error> {
        if terminal >= TERMINALS {
            return Err(Error::BadTerminal);
        }
        self.with_state(|state| {
            state.spaces.remap_video(terminal, frame);
            let running_here = state.current.map(|pid| state.pcbs.get(pid).terminal) == Some(terminal);
            if running_here {
                self.cpu.invalidate_page(VIDEO);
                self.cpu.invalidate_page(PROG_VIDMEM_ADDR);
            }
        });
        Ok(())
    }

    /// Run `f` under the kernel directory, where the screen and every
    /// backing page are identity-mapped. `f` must not call back into the
    /// kernel.
    pub fn with_kernel_view<R>(&self, f: impl FnOnce() -> R) -> R {
        self.with_state(|state| {
            state.spaces.activate(&self.cpu, None);
            let result = f();
            state.spaces.activate(&self.cpu, state.current);
            result
        })
    }

    /// The running process's memory at `[addr, addr + len)`. The range must
    /// lie in the program window.
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn user_bytes(&self, addr: u32, len: usize) -> Result<&mut [u8], Error> {
        if !in_program_window(addr, len) {
            return Err(Error::BadAddress);
        }
        let translation = self.with_state(|state| {
            let pid = state.current.ok_or(Error::NoProcess)?;
            state.spaces.translate_user(pid, addr).ok_or(Error::BadAddress)
        })?;
        // The window is one large page, so the range is contiguous.
        Ok(unsafe { self.cpu.user_memory(translation, len) })
    }
}
