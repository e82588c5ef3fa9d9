//! arch — the hardware seam
//!
//! The process core never touches privileged state directly. Everything it
//! needs from the processor goes through `Cpu`: the x86 implementation
//! lives in `x86`, host tests drive a simulated machine.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod x86;

use crate::sys::mem::Translation;

/// IRQ line of the interval timer
pub const TIMER_IRQ: u8 = 0;

/// Architectural exception names, by vector
pub const EXCEPTIONS: [&str; 20] = [
    "divide error",
    "debug",
    "non-maskable interrupt",
    "breakpoint",
    "overflow",
    "bound range exceeded",
    "invalid opcode",
    "device not available",
    "double fault",
    "coprocessor segment overrun",
    "invalid tss",
    "segment not present",
    "stack-segment fault",
    "general protection fault",
    "page fault",
    "reserved",
    "x87 floating-point error",
    "alignment check",
    "machine check",
    "simd floating-point error",
];

pub fn exception_name(vector: u8) -> &'static str {
    EXCEPTIONS.get(vector as usize).copied().unwrap_or("unknown exception")
}

/// Kernel stack and frame pointer of a suspended kernel path
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelContext {
    pub esp: u32,
    pub ebp: u32,
}

impl KernelContext {
    pub const fn empty() -> Self {
        Self { esp: 0, ebp: 0 }
    }
}

pub trait Cpu {
    /// Load a page directory base (implies a full TLB flush)
    fn load_directory(&self, phys: u32);

    fn invalidate_page(&self, vaddr: u32);

    /// Stack the CPU switches to on the next user → kernel transition
    fn set_kernel_stack(&self, esp0: u32);

    /// Physical address of a kernel object
    fn physical_address<T>(&self, object: &T) -> u32;

    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R;

    /// Bytes behind a user address already checked against the active
    /// directory.
    ///
    /// # Safety
    /// `translation` must come from the active directory and cover `len`
    /// contiguous bytes; the slice must not outlive that mapping.
    unsafe fn user_memory(&self, translation: Translation, len: usize) -> &mut [u8];

    /// Save the current kernel context into `save` and drop to ring 3 at
    /// `entry`. Comes back only through `resume_kernel_caller` on the same
    /// context, with its status.
    ///
    /// # Safety
    /// `save` must stay valid until the matching resume.
    unsafe fn enter_user_mode(&self, save: *mut KernelContext, entry: u32, user_stack: u32) -> u32;

    /// Return `status` from the `enter_user_mode` call that saved `ctx`.
    ///
    /// # Safety
    /// `ctx` must have been saved by a call that has not returned yet.
    unsafe fn resume_kernel_caller(&self, ctx: KernelContext, status: u32) -> !;

    /// Save into `save`, resume whoever saved `load`.
    ///
    /// # Safety
    /// `load` must hold a context saved by `switch_context` or
    /// `run_detached` whose stack is still intact.
    unsafe fn switch_context(&self, save: *mut KernelContext, load: *const KernelContext);

    /// Save into `save` and run `f` on a spare kernel stack. Returns when
    /// `f` returns or when something later switches back to `save`.
    ///
    /// # Safety
    /// Same rules as `switch_context` for `save`.
    unsafe fn run_detached(&self, save: *mut KernelContext, f: &mut dyn FnMut());

    /// Reload the interval timer for the next period
    fn rearm_timer(&self);

    fn end_of_interrupt(&self, irq: u8);

    /// Nothing left to run on this path
    fn idle(&self) -> !;
}
