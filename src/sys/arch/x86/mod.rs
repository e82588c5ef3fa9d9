//! x86 — 32-bit protected mode
//!
//!   gdt       — flat segments, ring-3 selectors, the TSS
//!   idt       — exception, IRQ and syscall gates
//!   pic       — 8259 pair
//!   cmos      — RTC registers behind the CMOS index port
//!   pit       — one-shot interval timer
//!   context   — ring transition and kernel stack switching
//!   paging    — turning on PSE paging
//!   multiboot — boot header and boot information

pub mod cmos;
pub mod context;
pub mod gdt;
pub mod idt;
pub mod multiboot;
pub mod paging;
pub mod pic;
pub mod pit;

use crate::sys::arch::{Cpu, KernelContext};
use crate::sys::mem::Translation;
use ::x86::bits32::eflags::{self, EFlags};

/// The processor this kernel runs on
pub struct X86Cpu;

pub fn interrupts_enabled() -> bool {
    unsafe { eflags::read() }.contains(EFlags::FLAGS_IF)
}

pub fn enable_interrupts() {
    unsafe { ::x86::irq::enable() };
}

pub fn disable_interrupts() {
    unsafe { ::x86::irq::disable() };
}

/// Run `f` with interrupts masked, restoring the previous state after
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let enabled = interrupts_enabled();
    if enabled {
        disable_interrupts();
    }
    let result = f();
    if enabled {
        enable_interrupts();
    }
    result
}

/// Halt forever with interrupts on
pub fn hlt_loop() -> ! {
    loop {
        unsafe {
            ::x86::irq::enable();
            ::x86::halt();
        }
    }
}

impl Cpu for X86Cpu {
    fn load_directory(&self, phys: u32) {
        unsafe { ::x86::controlregs::cr3_write(phys as u64) };
    }

    fn invalidate_page(&self, vaddr: u32) {
        unsafe { ::x86::tlb::flush(vaddr as usize) };
    }

    fn set_kernel_stack(&self, esp0: u32) {
        gdt::set_kernel_stack(esp0);
    }

    /// The kernel page is identity-mapped
    fn physical_address<T>(&self, object: &T) -> u32 {
        object as *const T as u32
    }

    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        without_interrupts(f)
    }

    unsafe fn user_memory(&self, translation: Translation, len: usize) -> &mut [u8] {
        core::slice::from_raw_parts_mut(translation.virt as *mut u8, len)
    }

    unsafe fn enter_user_mode(&self, save: *mut KernelContext, entry: u32, user_stack: u32) -> u32 {
        context::enter_user_mode(save, entry, user_stack)
    }

    unsafe fn resume_kernel_caller(&self, ctx: KernelContext, status: u32) -> ! {
        context::resume_kernel_caller(ctx.esp, ctx.ebp, status)
    }

    unsafe fn switch_context(&self, save: *mut KernelContext, load: *const KernelContext) {
        context::switch_context(save, load)
    }

    unsafe fn run_detached(&self, save: *mut KernelContext, f: &mut dyn FnMut()) {
        context::run_detached(save, f)
    }

    fn rearm_timer(&self) {
        pit::rearm();
    }

    fn end_of_interrupt(&self, irq: u8) {
        pic::end_of_interrupt(irq);
    }

    fn idle(&self) -> ! {
        hlt_loop()
    }
}
