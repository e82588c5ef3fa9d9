//! Process lifecycle — execute, halt, faults and terminal start-up
//!
//! `execute` returns when the child chain under it halts: `halt` resumes
//! the kernel context saved in the child's PCB with its status. A root
//! shell has no parent; its slot goes straight to a fresh shell.

use super::exec::{Command, ExecImage};
use super::pcb::{OpenFile, Resource};
use super::Pid;
use crate::sys::arch::{exception_name, Cpu, KernelContext};
use crate::sys::config::{COMMAND_MAX, TERMINALS};
use crate::sys::error::{Error, ExitStatus};
use crate::sys::kernel::{Kernel, State};
use crate::sys::mem::{kernel_stack_top, PROGRAM_IMAGE, USER_STACK_TOP};

impl<C: Cpu> Kernel<C> {
    /// Run `command` in the caller's terminal and wait for it to halt
    pub fn execute(&self, command: &[u8]) -> Result<ExitStatus, Error> {
        let terminal = self
            .with_state(|state| state.current.map(|pid| state.pcbs.get(pid).terminal))
            .unwrap_or_else(|| self.terminals.active_terminal());
        self.spawn(terminal, command)
    }

    pub(crate) fn spawn(&self, terminal: usize, command: &[u8]) -> Result<ExitStatus, Error> {
        let (cmd, image) = self.resolve_command(command)?;

        let (pid, previous, save) = self.with_state(|state| -> Result<_, Error> {
            let pid = state.table.allocate().ok_or(Error::NoFreeProcess)?;
            let previous = state.current;
            let parent = state.table.active_process(terminal);
            let save = self.install(state, pid, parent, terminal, cmd.args());
            Ok((pid, previous, save))
        }).map_err(|err| {
            kwarn!("execute: '{}': {}", printable(cmd.name()), err);
            err
        })?;

        self.start(pid, cmd.name(), &image, save, |state| self.abandon(state, pid, previous))
    }

    fn resolve_command<'a>(&self, command: &'a [u8]) -> Result<(Command<'a>, ExecImage), Error> {
        let cmd = Command::parse(command)?;
        let image = ExecImage::inspect(self.fs, cmd.name()).map_err(|err| {
            kwarn!("execute: '{}': {}", printable(cmd.name()), err);
            err
        })?;
        Ok((cmd, image))
    }

    /// Seed `pid`'s directory and PCB and make it the running process of
    /// `terminal`. Returns where `execute`'s context goes.
    fn install(&self, state: &mut State, pid: Pid, parent: Option<Pid>, terminal: usize, args: &[u8]) -> *mut KernelContext {
        state.spaces.init_directory(pid, terminal);
        state.spaces.map_program(pid);
        state.spaces.activate(&self.cpu, Some(pid));

        let pcb = state.pcbs.get_mut(pid);
        pcb.reset(parent, terminal, args);
        let save: *mut KernelContext = &mut pcb.exec_context;

        self.set_active(state, terminal, Some(pid));
        state.current = Some(pid);
        self.cpu.set_kernel_stack(kernel_stack_top(pid));
        save
    }

    /// Load the image of an installed process and drop to user mode
    fn start(
        &self,
        pid: Pid,
        name: &[u8],
        image: &ExecImage,
        save: *mut KernelContext,
        rollback: impl FnOnce(&mut State),
    ) -> Result<ExitStatus, Error> {
        if let Err(err) = self.load_image(image) {
            kerror!("execute: loading '{}' failed: {}", printable(name), err);
            self.with_state(rollback);
            return Err(err);
        }

        let terminal = self.with_state(|state| state.pcbs.get(pid).terminal);
        klog!("execute: pid {} '{}' on terminal {}", pid, printable(name), terminal);
        let status = unsafe { self.cpu.enter_user_mode(save, image.entry, USER_STACK_TOP) };
        Ok(ExitStatus::from_code(status))
    }

    fn load_image(&self, image: &ExecImage) -> Result<(), Error> {
        let dest = self.user_bytes(PROGRAM_IMAGE, image.length as usize)?;
        let copied = self.fs.read_data(image.inode, 0, dest)?;
        if copied != image.length as usize {
            return Err(Error::Io);
        }
        Ok(())
    }

    /// Undo a spawn that never reached user mode
    fn abandon(&self, state: &mut State, pid: Pid, previous: Option<Pid>) {
        let pcb = state.pcbs.get_mut(pid);
        let (terminal, parent) = (pcb.terminal, pcb.parent);
        pcb.clear();
        state.table.free(pid);
        self.set_active(state, terminal, parent);

        state.current = previous;
        state.spaces.activate(&self.cpu, previous);
        if let Some(previous) = previous {
            self.cpu.set_kernel_stack(kernel_stack_top(previous));
        }
    }

    /// End the running process. Its `execute` caller gets `status`.
    pub fn halt(&self, status: ExitStatus) -> ! {
        let Some(pid) = self.current_pid() else {
            kerror!("halt: no running process");
            self.cpu.idle();
        };

        let files = self.with_state(|state| state.pcbs.get_mut(pid).take_files());
        for file in files.into_iter().flatten() {
            if let Err(err) = self.release(file) {
                kwarn!("halt: pid {}: close failed: {}", pid, err);
            }
        }

        let (terminal, parent) = self.with_state(|state| {
            let pcb = state.pcbs.get(pid);
            (pcb.terminal, pcb.parent)
        });
        if parent.is_some() {
            self.cpu.without_interrupts(|| {
                let ctx = self.with_state(|state| {
                    let ctx = state.pcbs.get(pid).exec_context;
                    self.reap(state, pid);
                    ctx
                });
                klog!("halt: pid {} exited with {}", pid, status.code());
                // Still masked: nothing can reuse this slot's stack before
                // the parent is back on its own.
                unsafe { self.cpu.resume_kernel_caller(ctx, status.code()) }
            });
        }

        // A root shell's replacement is looked up while its slot is still
        // live, then takes the slot over in one step.
        let shell = self.shell();
        let replacement = self.resolve_command(shell.as_bytes());
        let respawn = self.with_state(|state| match replacement {
            Ok((cmd, image)) => {
                let save = self.install(state, pid, None, terminal, cmd.args());
                Ok((cmd.name(), image, save))
            }
            Err(err) => {
                self.reap(state, pid);
                Err(err)
            }
        });

        match respawn {
            Ok((name, image, save)) => {
                klog!("halt: root shell of terminal {} exited, restarting", terminal);
                if let Err(err) = self.start(pid, name, &image, save, |state| self.reap(state, pid)) {
                    kerror!("halt: terminal {} lost its shell: {}", terminal, err);
                }
            }
            Err(err) => kerror!("halt: terminal {} has no shell: {}", terminal, err),
        }
        self.cpu.idle()
    }

    /// Free `pid`'s slot and hand its terminal back to the parent, if any
    fn reap(&self, state: &mut State, pid: Pid) {
        let pcb = state.pcbs.get_mut(pid);
        let (terminal, parent) = (pcb.terminal, pcb.parent);
        pcb.clear();
        state.table.free(pid);

        self.set_active(state, terminal, parent);
        state.current = parent;
        state.spaces.activate(&self.cpu, parent);
        if let Some(parent) = parent {
            self.cpu.set_kernel_stack(kernel_stack_top(parent));
        }
    }

    pub(crate) fn release(&self, file: OpenFile) -> Result<(), Error> {
        match file.resource {
            Resource::Device(device) => device.close(),
            Resource::Terminal(_) | Resource::File { .. } | Resource::Directory => Ok(()),
        }
    }

    /// Unhandled exception in user mode: kill the running process
    pub fn fault(&self, vector: u8) -> ! {
        match self.current_pid() {
            Some(pid) => {
                kerror!("fault: {} in pid {}, killing it", exception_name(vector), pid);
                self.halt(ExitStatus::Killed)
            }
            None => panic!("{} with no process running", exception_name(vector)),
        }
    }

    /// Start the shell of an idle terminal. Whatever runs now (a process,
    /// or the idle path once processes exist) is suspended like a
    /// scheduler switch; only the very first shell is entered directly.
    pub fn launch_terminal(&self, terminal: usize) -> Result<(), Error> {
        if terminal >= TERMINALS {
            return Err(Error::BadTerminal);
        }
        let save = self.with_state(|state| {
            if state.table.active_process(terminal).is_some() {
                return Err(Error::TerminalBusy);
            }
            let save: Option<*mut KernelContext> = match state.current {
                Some(pid) => Some(&mut state.pcbs.get_mut(pid).switch_context),
                None if state.table.count() > 0 => Some(&mut state.idle_context),
                None => None,
            };
            Ok(save)
        })?;

        klog!("terminal {}: starting shell", terminal);
        let shell = self.shell();
        match save {
            None => self.spawn(terminal, shell.as_bytes()).map(drop),
            Some(save) => {
                let mut result = Ok(());
                unsafe {
                    self.cpu.run_detached(save, &mut || {
                        result = self.spawn(terminal, shell.as_bytes()).map(drop);
                    });
                }
                result
            }
        }
    }
}

/// Best-effort text for log lines
fn printable(bytes: &[u8]) -> &str {
    let bytes = &bytes[..bytes.len().min(COMMAND_MAX)];
    core::str::from_utf8(bytes).unwrap_or("<binary>")
}
