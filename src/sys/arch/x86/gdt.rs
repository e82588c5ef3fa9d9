//! GDT — flat kernel and user segments plus the TSS
//!
//! The TSS is only used for its ring-0 stack: `esp0` is reprogrammed on
//! every process switch so that the next interrupt from user mode lands on
//! the right slot stack.

use core::mem::size_of;
use core::sync::atomic::{AtomicU32, Ordering};
use lazy_static::lazy_static;
use ::x86::bits32::segmentation::load_cs;
use ::x86::dtables::{lgdt, DescriptorTablePointer};
use ::x86::segmentation::{
    load_ds, load_es, load_fs, load_gs, load_ss, BuildDescriptor, CodeSegmentType, DataSegmentType,
    Descriptor, DescriptorBuilder, GateDescriptorBuilder, SegmentDescriptorBuilder, SegmentSelector,
};
use ::x86::task::load_tr;
use ::x86::Ring;

pub const KERNEL_CS:    u16 = 0x08;
pub const KERNEL_DS:    u16 = 0x10;
pub const USER_CS:      u16 = 0x18 | 3;
pub const USER_DS:      u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

/// 4 GB in 4 KB units
const FLAT_LIMIT: u32 = 0xF_FFFF;

/// Hardware layout of a 32-bit TSS; `esp0` is atomic because it is
/// rewritten while the descriptor is live.
#[repr(C)]
pub struct TaskStateSegment {
    link:       u32,
    esp0:       AtomicU32,
    ss0:        u32,
    unused:     [u32; 22],
    trap:       u16,
    iomap_base: u16,
}

static TSS: TaskStateSegment = TaskStateSegment {
    link:       0,
    esp0:       AtomicU32::new(0),
    ss0:        KERNEL_DS as u32,
    unused:     [0; 22],
    trap:       0,
    iomap_base: size_of::<TaskStateSegment>() as u16,
};

fn code(ring: Ring) -> Descriptor {
    <DescriptorBuilder as SegmentDescriptorBuilder<u32>>::code_descriptor(0, FLAT_LIMIT, CodeSegmentType::ExecuteRead)
        .present()
        .dpl(ring)
        .limit_granularity_4kb()
        .db()
        .finish()
}

fn data(ring: Ring) -> Descriptor {
    <DescriptorBuilder as SegmentDescriptorBuilder<u32>>::data_descriptor(0, FLAT_LIMIT, DataSegmentType::ReadWrite)
        .present()
        .dpl(ring)
        .limit_granularity_4kb()
        .db()
        .finish()
}

fn tss() -> Descriptor {
    let base = &TSS as *const TaskStateSegment as u64;
    let limit = size_of::<TaskStateSegment>() as u64 - 1;
    <DescriptorBuilder as GateDescriptorBuilder<u32>>::tss_descriptor(base, limit, true)
        .present()
        .dpl(Ring::Ring0)
        .finish()
}

lazy_static! {
    static ref GDT: [Descriptor; 6] = [
        Descriptor::NULL,
        code(Ring::Ring0),
        data(Ring::Ring0),
        code(Ring::Ring3),
        data(Ring::Ring3),
        tss(),
    ];
}

pub fn init() {
    let pointer = DescriptorTablePointer::new_from_slice(&GDT[..]);
    let data = SegmentSelector::from_raw(KERNEL_DS);
    unsafe {
        lgdt(&pointer);
        load_cs(SegmentSelector::from_raw(KERNEL_CS));
        load_ds(data);
        load_es(data);
        load_fs(data);
        load_gs(data);
        load_ss(data);
        load_tr(SegmentSelector::from_raw(TSS_SELECTOR));
    }
}

/// Stack used on the next user → kernel transition
pub fn set_kernel_stack(esp0: u32) {
    TSS.esp0.store(esp0, Ordering::SeqCst);
}
