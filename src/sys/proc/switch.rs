//! Context switch — hand the processor from one slot to another
//!
//! Bookkeeping (directory, stack-switch register, current slot) changes
//! under the state lock; the stack swap itself happens after it is dropped.
//! The call returns once some later switch resumes `from`. With no `from`
//! the idle path is parked in its own context.

use super::Pid;
use crate::sys::arch::{Cpu, KernelContext};
use crate::sys::kernel::Kernel;
use crate::sys::mem::kernel_stack_top;

impl<C: Cpu> Kernel<C> {
    pub(crate) fn switch_to(&self, from: Option<Pid>, to: Pid) {
        let (save, load) = self.with_state(|state| {
            state.spaces.activate(&self.cpu, Some(to));
            self.cpu.set_kernel_stack(kernel_stack_top(to));
            state.current = Some(to);

            let save: *mut KernelContext = match from {
                Some(from) => &mut state.pcbs.get_mut(from).switch_context,
                None => &mut state.idle_context,
            };
            let load: *const KernelContext = &state.pcbs.get(to).switch_context;
            (save, load)
        });

        match from {
            Some(from) => kdebug!("sched: pid {} -> pid {}", from, to),
            None => kdebug!("sched: idle -> pid {}", to),
        }
        unsafe { self.cpu.switch_context(save, load) };
    }
}
