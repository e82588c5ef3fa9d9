//! Paging — switch the MMU on with 4 MB page support

use raw_cpuid::CpuId;
use ::x86::controlregs::{cr0, cr0_write, cr2, cr4, cr4_write, Cr0, Cr4};

pub fn has_large_pages() -> bool {
    CpuId::new().get_feature_info().is_some_and(|info| info.has_pse())
}

/// Turn on PSE and paging. CR3 must already hold the kernel directory.
pub fn enable() -> Result<(), &'static str> {
    if !has_large_pages() {
        return Err("processor lacks 4 MB pages (PSE)");
    }
    unsafe {
        cr4_write(cr4() | Cr4::CR4_ENABLE_PSE);
        cr0_write(cr0() | Cr0::CR0_ENABLE_PAGING);
    }
    Ok(())
}

/// Faulting address of the last page fault
pub fn fault_address() -> u32 {
    unsafe { cr2() as u32 }
}
