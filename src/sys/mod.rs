//! sys — kernel subsystems
//!
//! Layout:
//!   arch/    — hardware seam (`Cpu`), x86 implementation
//!   mem/     — layout constants, paging, address spaces
//!   proc/    — process table, PCBs, execute/halt, scheduler
//!   fs/      — read-only flat filesystem
//!   syscall/ — int 0x80 dispatcher and file calls
//!   debug/   — log records, serial sink
//!   dev      — device registry, terminal interface, RTC driver
//!   config   — capacities and boot options
//!   error    — error codes, exit status
//!   kernel   — the `Kernel` object tying it together

pub mod arch;
pub mod config;
pub mod debug;
pub mod dev;
pub mod error;
pub mod fs;
pub mod kernel;
pub mod mem;
pub mod proc;
pub mod syscall;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod console;

pub use kernel::Kernel;
