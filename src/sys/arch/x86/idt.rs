//! IDT — exception, IRQ and syscall gates
//!
//! The stubs save what the handlers clobber and call into the kernel
//! binary through the `extern "C"` entry points below:
//!
//!   exception_entry(vector, error, cs) -> !   vectors 0..20
//!   timer_entry()                             IRQ 0
//!   keyboard_entry()                          IRQ 1
//!   rtc_entry()                               IRQ 8
//!   syscall_entry(n, arg1, arg2, arg3) -> i32 int 0x80, callable from ring 3

use super::gdt::{KERNEL_CS, KERNEL_DS};
use super::pic;
use crate::sys::arch::TIMER_IRQ;
use crate::sys::dev::rtc::RTC_IRQ;
use core::arch::naked_asm;
use lazy_static::lazy_static;
use ::x86::dtables::{lidt, DescriptorTablePointer};
use ::x86::segmentation::{BuildDescriptor, Descriptor, DescriptorBuilder, GateDescriptorBuilder, SegmentSelector};
use ::x86::Ring;

pub const KEYBOARD_IRQ:   u8 = 1;
pub const SYSCALL_VECTOR: u8 = 0x80;


extern "C" {
    fn exception_entry(vector: u32, error: u32, cs: u32) -> !;
    fn timer_entry();
    fn keyboard_entry();
    fn rtc_entry();
    fn syscall_entry(n: u32, arg1: u32, arg2: u32, arg3: u32) -> i32;
}

/// Present, DPL 0, 32-bit interrupt gate
fn interrupt_gate(handler: unsafe extern "C" fn()) -> Descriptor {
    let selector = SegmentSelector::from_raw(KERNEL_CS);
    <DescriptorBuilder as GateDescriptorBuilder<u32>>::interrupt_descriptor(selector, handler as usize as u32)
        .present()
        .dpl(Ring::Ring0)
        .finish()
}

/// Present, DPL 3, 32-bit trap gate: interrupts stay on during syscalls
fn syscall_gate(handler: unsafe extern "C" fn()) -> Descriptor {
    let selector = SegmentSelector::from_raw(KERNEL_CS);
    <DescriptorBuilder as GateDescriptorBuilder<u32>>::trap_gate_descriptor(selector, handler as usize as u32)
        .present()
        .dpl(Ring::Ring3)
        .finish()
}

macro_rules! exception_stub {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "push 0",
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym exception_common,
            )
        }
    };
    // The CPU already pushed an error code
    ($name:ident, $vector:literal, error) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym exception_common,
            )
        }
    };
}

exception_stub!(exception_0, 0);
exception_stub!(exception_1, 1);
exception_stub!(exception_2, 2);
exception_stub!(exception_3, 3);
exception_stub!(exception_4, 4);
exception_stub!(exception_5, 5);
exception_stub!(exception_6, 6);
exception_stub!(exception_7, 7);
exception_stub!(exception_8, 8, error);
exception_stub!(exception_9, 9);
exception_stub!(exception_10, 10, error);
exception_stub!(exception_11, 11, error);
exception_stub!(exception_12, 12, error);
exception_stub!(exception_13, 13, error);
exception_stub!(exception_14, 14, error);
exception_stub!(exception_15, 15);
exception_stub!(exception_16, 16);
exception_stub!(exception_17, 17, error);
exception_stub!(exception_18, 18);
exception_stub!(exception_19, 19);

const EXCEPTION_STUBS: [unsafe extern "C" fn(); 20] = [
    exception_0, exception_1, exception_2, exception_3, exception_4,
    exception_5, exception_6, exception_7, exception_8, exception_9,
    exception_10, exception_11, exception_12, exception_13, exception_14,
    exception_15, exception_16, exception_17, exception_18, exception_19,
];

/// Stack on entry: vector, error, eip, cs, eflags (, esp, ss from ring 3)
#[unsafe(naked)]
unsafe extern "C" fn exception_common() {
    naked_asm!(
        "mov ax, {kernel_ds}",
        "mov ds, ax",
        "mov es, ax",
        "mov eax, [esp]",
        "mov ecx, [esp + 4]",
        "mov edx, [esp + 12]",
        "push edx",
        "push ecx",
        "push eax",
        "call {handler}",
        "ud2",
        kernel_ds = const KERNEL_DS as u32,
        handler = sym exception_entry,
    )
}

macro_rules! irq_stub {
    ($name:ident, $handler:ident) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "pushad",
                "push ds",
                "push es",
                "mov ax, {kernel_ds}",
                "mov ds, ax",
                "mov es, ax",
                "cld",
                "call {handler}",
                "pop es",
                "pop ds",
                "popad",
                "iretd",
                kernel_ds = const KERNEL_DS as u32,
                handler = sym $handler,
            )
        }
    };
}

irq_stub!(timer_stub, timer_entry);
irq_stub!(keyboard_stub, keyboard_entry);
irq_stub!(rtc_stub, rtc_entry);

/// eax = number, ebx/ecx/edx = arguments; the result goes back in eax
#[unsafe(naked)]
unsafe extern "C" fn syscall_stub() {
    naked_asm!(
        "push ds",
        "push es",
        "push ebx",
        "push ecx",
        "push edx",
        "push esi",
        "push edi",
        "push ebp",
        "mov si, {kernel_ds}",
        "mov ds, si",
        "mov es, si",
        "cld",
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        "call {dispatch}",
        "add esp, 16",
        "pop ebp",
        "pop edi",
        "pop esi",
        "pop edx",
        "pop ecx",
        "pop ebx",
        "pop es",
        "pop ds",
        "iretd",
        kernel_ds = const KERNEL_DS as u32,
        dispatch = sym syscall_entry,
    )
}

lazy_static! {
    static ref IDT: [Descriptor; 256] = {
        let mut idt = [Descriptor::NULL; 256];
        for (vector, stub) in EXCEPTION_STUBS.iter().enumerate() {
            idt[vector] = interrupt_gate(*stub);
        }
        idt[pic::vector(TIMER_IRQ) as usize] = interrupt_gate(timer_stub);
        idt[pic::vector(KEYBOARD_IRQ) as usize] = interrupt_gate(keyboard_stub);
        idt[pic::vector(RTC_IRQ) as usize] = interrupt_gate(rtc_stub);
        idt[SYSCALL_VECTOR as usize] = syscall_gate(syscall_stub);
        idt
    };
}

pub fn init() {
    let pointer = DescriptorTablePointer::new_from_slice(&IDT[..]);
    unsafe { lidt(&pointer) };
}
