#![no_std]
#![no_main]

use core::arch::naked_asm;
use core::panic::PanicInfo;
use termkern::sys::arch::x86::cmos::CmosPorts;
use termkern::sys::arch::x86::{self, gdt, idt, multiboot, paging, pic, pit, X86Cpu};
use termkern::sys::arch::{Cpu, TIMER_IRQ};
use termkern::sys::config::BootConfig;
use termkern::sys::console::Console;
use termkern::sys::debug::serial;
use termkern::sys::dev::rtc::{Rtc, RTC_IRQ};
use termkern::sys::fs::FlatFs;
use termkern::Kernel;
use termkern::{kerror, klog};

const BOOT_STACK_SIZE: usize = 16 * 1024;

#[repr(C, align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

static FLAT_FS: FlatFs = FlatFs::new();
static CONSOLE: Console = Console::new();
static RTC: Rtc<CmosPorts> = Rtc::new(CmosPorts);
static KERNEL: Kernel<X86Cpu> = Kernel::new(X86Cpu, &FLAT_FS, &CONSOLE);

/// Loader entry: eax = multiboot magic, ebx = boot information
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn _start() -> ! {
    naked_asm!(
        "cli",
        "lea esp, [{stack} + {size}]",
        "xor ebp, ebp",
        "push ebx",
        "push eax",
        "call {main}",
        "2:",
        "hlt",
        "jmp 2b",
        stack = sym BOOT_STACK,
        size = const BOOT_STACK_SIZE,
        main = sym kernel_main,
    )
}

extern "C" fn kernel_main(magic: u32, info: u32) -> ! {
    serial::init();
    klog!("termkern booting");
    if magic != multiboot::LOADER_MAGIC {
        panic!("not started by a multiboot loader (magic {:#x})", magic);
    }
    let boot = unsafe { multiboot::BootInfo::read(info) };

    let config = BootConfig::parse(boot.options());
    KERNEL.configure(config);
    gdt::init();
    idt::init();
    pic::init();

    match boot.module() {
        Some(image) => {
            if let Err(err) = FLAT_FS.mount(image) {
                kerror!("boot: filesystem module rejected: {}", err);
            }
        }
        None => kerror!("boot: no filesystem module"),
    }

    KERNEL.init();
    if let Err(err) = KERNEL.register_device("rtc", &RTC) {
        kerror!("boot: rtc: {}", err);
    }
    if let Err(err) = paging::enable() {
        panic!("{}", err);
    }

    pit::init(config.timer_divisor());
    pic::unmask(TIMER_IRQ);
    pic::unmask(idt::KEYBOARD_IRQ);
    klog!("boot: timer at {} Hz", config.timer_hz);

    if let Err(err) = KERNEL.launch_terminal(0) {
        kerror!("boot: terminal 0: {}", err);
    }
    KERNEL.cpu().idle()
}

#[no_mangle]
extern "C" fn exception_entry(vector: u32, error: u32, cs: u32) -> ! {
    let vector = vector as u8;
    if vector == 14 {
        kerror!("page fault at {:#x} (error {:#x})", paging::fault_address(), error);
    }
    if cs & 3 == 3 {
        KERNEL.fault(vector)
    }
    panic!("{} in the kernel (error {:#x})", termkern::sys::arch::exception_name(vector), error);
}

#[no_mangle]
extern "C" fn timer_entry() {
    KERNEL.on_timer_tick();
}

#[no_mangle]
extern "C" fn keyboard_entry() {
    CONSOLE.on_keyboard(&KERNEL);
}

#[no_mangle]
extern "C" fn rtc_entry() {
    RTC.on_interrupt();
    KERNEL.cpu().end_of_interrupt(RTC_IRQ);
}

#[no_mangle]
extern "C" fn syscall_entry(n: u32, arg1: u32, arg2: u32, arg3: u32) -> i32 {
    KERNEL.syscall(n, arg1, arg2, arg3)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86::disable_interrupts();
    if let Some(loc) = info.location() {
        kerror!("PANIC at {}:{}:{}: {}", loc.file(), loc.line(), loc.column(), info.message());
    } else {
        kerror!("PANIC: {}", info.message());
    }
    x86::hlt_loop()
}
