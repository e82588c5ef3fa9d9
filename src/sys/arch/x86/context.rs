//! Context — ring transition and kernel stack switching
//!
//! A suspended path is ebp, ebx, esi, edi pushed below a return address,
//! with esp/ebp kept in a `KernelContext`.

use super::gdt::{KERNEL_DS, USER_CS, USER_DS};
use crate::sys::arch::KernelContext;
use core::arch::naked_asm;
use core::ptr::addr_of;

const SPARE_STACK_SIZE: usize = 8 * 1024;

#[repr(C, align(16))]
struct SpareStack([u8; SPARE_STACK_SIZE]);

/// Stack for `run_detached`. Interrupts stay masked while it is in use.
static mut SPARE_STACK: SpareStack = SpareStack([0; SPARE_STACK_SIZE]);

/// Save the caller's context into `save` and `iret` to ring 3. Returns
/// `status` when `resume_kernel_caller` unwinds `save`.
#[unsafe(naked)]
pub unsafe extern "C" fn enter_user_mode(save: *mut KernelContext, entry: u32, user_stack: u32) -> u32 {
    naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "mov ecx, [esp + 24]",
        "mov edx, [esp + 28]",
        "mov ax, {user_ds}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push {user_ds}",
        "push edx",
        "pushfd",
        "or dword ptr [esp], 0x200",
        "push {user_cs}",
        "push ecx",
        "iretd",
        user_ds = const USER_DS as u32,
        user_cs = const USER_CS as u32,
    )
}

/// Return `status` from the `enter_user_mode` whose context is `esp`/`ebp`
#[unsafe(naked)]
pub unsafe extern "C" fn resume_kernel_caller(esp: u32, ebp: u32, status: u32) -> ! {
    naked_asm!(
        "mov ax, {kernel_ds}",
        "mov ds, ax",
        "mov es, ax",
        "mov eax, [esp + 12]",
        "mov ebp, [esp + 8]",
        "mov esp, [esp + 4]",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
        kernel_ds = const KERNEL_DS as u32,
    )
}

#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(save: *mut KernelContext, load: *const KernelContext) {
    naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",
        "mov edx, [esp + 24]",
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "mov esp, [edx]",
        "mov ebp, [edx + 4]",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    )
}

/// Save into `save`, then call `call(arg)` on `stack_top`. Comes back
/// here when `call` returns or when something switches to `save`.
#[unsafe(naked)]
unsafe extern "C" fn detach(
    save: *mut KernelContext,
    stack_top: u32,
    call: extern "C" fn(*mut u8),
    arg: *mut u8,
) {
    naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "mov ecx, [esp + 24]",
        "mov edx, [esp + 28]",
        "mov eax, [esp + 32]",
        "mov esi, esp",
        "mov esp, ecx",
        "xor ebp, ebp",
        "push eax",
        "call edx",
        "mov esp, esi",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    )
}

extern "C" fn trampoline(arg: *mut u8) {
    let f = unsafe { &mut *(arg as *mut &mut dyn FnMut()) };
    f();
}

pub unsafe fn run_detached(save: *mut KernelContext, f: &mut dyn FnMut()) {
    let mut f = f;
    let top = addr_of!(SPARE_STACK) as u32 + SPARE_STACK_SIZE as u32 - 16;
    detach(save, top, trampoline, &mut f as *mut &mut dyn FnMut() as *mut u8);
}
