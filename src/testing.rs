//! Host test bench: a simulated machine, a filesystem image builder and
//! in-memory collaborators.
//!
//! User programs are closures keyed by entry address. `enter_user_mode`
//! runs the closure; `halt` unwinds back to the `enter_user_mode` frame
//! whose token it resumes. A program that returns without halting, or a
//! path that goes idle, parks the machine: the unwind runs out to
//! `World::run`, which reports `Outcome::Parked`.

use crate::sys::arch::{Cpu, KernelContext};
use crate::sys::dev::{Device, Terminals};
use crate::sys::error::Error;
use crate::sys::fs::flat::{BLOCK_SIZE, MAX_DENTRIES};
use crate::sys::fs::{DirEntry, FileSystem, FlatFs};
use crate::sys::kernel::Kernel;
use crate::sys::mem::{Translation, PROGRAM_IMAGE};
use crate::sys::proc::exec::{EXEC_MAGIC, HEADER_LEN};
use crate::sys::proc::Pid;
use crate::sys::config::{NAME_MAX, TERMINALS};
use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SHELL_ENTRY: u32 = PROGRAM_IMAGE + 0x100;
pub const A_ENTRY:     u32 = PROGRAM_IMAGE + 0x200;
pub const B_ENTRY:     u32 = PROGRAM_IMAGE + 0x300;
pub const C_ENTRY:     u32 = PROGRAM_IMAGE + 0x400;

pub const FRAME0: &[u8] = b"fish fish fish\nblue fish red fish\n";

const MEMORY_SIZE: usize = 0x200_0000;
const FAKE_TABLE_BASE: u32 = 0x10_0000;

type Program = Rc<dyn Fn(&Kernel<SimCpu>)>;

/// `halt` on its way back to an `execute`
struct Resumed {
    token:  u32,
    status: u32,
}

/// Nothing more runs on this path
struct Parked;

pub struct SimCpu {
    cr3:         Cell<u32>,
    esp0:        Cell<u32>,
    invalidated: RefCell<Vec<u32>>,
    tables:      RefCell<Vec<usize>>,
    memory:      UnsafeCell<Vec<u8>>,
    programs:    RefCell<HashMap<u32, Program>>,
    kernel:      Cell<*const Kernel<SimCpu>>,
    next_token:  Cell<u32>,
    switches:    Cell<usize>,
    detached:    Cell<usize>,
    rearms:      Cell<usize>,
    eois:        Cell<usize>,
}

impl SimCpu {
    pub fn new() -> Self {
        Self {
            cr3:         Cell::new(0),
            esp0:        Cell::new(0),
            invalidated: RefCell::new(Vec::new()),
            tables:      RefCell::new(Vec::new()),
            memory:      UnsafeCell::new(vec![0; MEMORY_SIZE]),
            programs:    RefCell::new(HashMap::new()),
            kernel:      Cell::new(std::ptr::null()),
            next_token:  Cell::new(0x1000),
            switches:    Cell::new(0),
            detached:    Cell::new(0),
            rearms:      Cell::new(0),
            eois:        Cell::new(0),
        }
    }

    pub fn cr3(&self) -> u32 {
        self.cr3.get()
    }

    pub fn esp0(&self) -> u32 {
        self.esp0.get()
    }

    pub fn invalidated(&self) -> Vec<u32> {
        self.invalidated.borrow().clone()
    }

    pub fn switches(&self) -> usize {
        self.switches.get()
    }

    pub fn detached(&self) -> usize {
        self.detached.get()
    }

    pub fn rearms(&self) -> usize {
        self.rearms.get()
    }

    pub fn eois(&self) -> usize {
        self.eois.get()
    }

    fn token(&self) -> u32 {
        let token = self.next_token.get();
        self.next_token.set(token + 0x10);
        token
    }
}

impl Default for SimCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for SimCpu {
    fn load_directory(&self, phys: u32) {
        self.cr3.set(phys);
    }

    fn invalidate_page(&self, vaddr: u32) {
        self.invalidated.borrow_mut().push(vaddr);
    }

    fn set_kernel_stack(&self, esp0: u32) {
        self.esp0.set(esp0);
    }

    fn physical_address<T>(&self, object: &T) -> u32 {
        let addr = object as *const T as usize;
        let mut tables = self.tables.borrow_mut();
        let index = match tables.iter().position(|&a| a == addr) {
            Some(index) => index,
            None => {
                tables.push(addr);
                tables.len() - 1
            }
        };
        FAKE_TABLE_BASE + index as u32 * 0x1000
    }

    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    unsafe fn user_memory(&self, translation: Translation, len: usize) -> &mut [u8] {
        let start = translation.phys as usize;
        &mut (&mut *self.memory.get())[start..start + len]
    }

    unsafe fn enter_user_mode(&self, save: *mut KernelContext, entry: u32, _user_stack: u32) -> u32 {
        let token = self.token();
        *save = KernelContext { esp: token, ebp: token };

        let program = self.programs.borrow().get(&entry).cloned();
        let kernel = self.kernel.get();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if let (Some(program), false) = (program, kernel.is_null()) {
                unsafe { program(&*kernel) };
            }
        }));
        match outcome {
            Ok(()) => panic::resume_unwind(Box::new(Parked)),
            Err(payload) => match payload.downcast_ref::<Resumed>() {
                Some(resumed) if resumed.token == token => resumed.status,
                _ => panic::resume_unwind(payload),
            },
        }
    }

    unsafe fn resume_kernel_caller(&self, ctx: KernelContext, status: u32) -> ! {
        panic::resume_unwind(Box::new(Resumed { token: ctx.esp, status }))
    }

    unsafe fn switch_context(&self, save: *mut KernelContext, _load: *const KernelContext) {
        let token = self.token();
        *save = KernelContext { esp: token, ebp: token };
        self.switches.set(self.switches.get() + 1);
    }

    unsafe fn run_detached(&self, save: *mut KernelContext, f: &mut dyn FnMut()) {
        let token = self.token();
        *save = KernelContext { esp: token, ebp: token };
        self.detached.set(self.detached.get() + 1);
        f();
    }

    fn rearm_timer(&self) {
        self.rearms.set(self.rearms.get() + 1);
    }

    fn end_of_interrupt(&self, _irq: u8) {
        self.eois.set(self.eois.get() + 1);
    }

    fn idle(&self) -> ! {
        panic::resume_unwind(Box::new(Parked))
    }
}

/// Builds `FlatFs` images. The directory starts with ".".
pub struct ImageBuilder {
    entries: Vec<([u8; NAME_MAX], u32, u32)>,
    files:   Vec<Vec<u8>>,
    /// Inodes whose blocks after the first point past the data area
    torn:    Vec<usize>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        let builder = Self { entries: Vec::new(), files: Vec::new(), torn: Vec::new() };
        builder.entry(".", 1, 0)
    }

    fn entry(mut self, name: &str, kind: u32, inode: u32) -> Self {
        assert!(name.len() <= NAME_MAX && self.entries.len() < MAX_DENTRIES);
        let mut bytes = [0; NAME_MAX];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        self.entries.push((bytes, kind, inode));
        self
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        let inode = self.files.len() as u32;
        self.files.push(data.to_vec());
        self.entry(name, 2, inode)
    }

    pub fn device(self, name: &str) -> Self {
        self.entry(name, 0, 0)
    }

    /// An executable whose header names `entry`
    pub fn program(self, name: &str, entry: u32) -> Self {
        self.file(name, &executable(entry, HEADER_LEN + 24))
    }

    /// An executable with a valid header whose second data block number
    /// is out of range: it passes the header check and fails to load.
    pub fn torn_program(mut self, name: &str, entry: u32) -> Self {
        self.torn.push(self.files.len());
        self.file(name, &executable(entry, BLOCK_SIZE + 64))
    }

    pub fn build(self) -> &'static [u8] {
        let blocks_of = |len: usize| len.div_ceil(BLOCK_SIZE);
        let data_count: usize = self.files.iter().map(|f| blocks_of(f.len())).sum();
        let inode_count = self.files.len();
        let mut image = vec![0u8; (1 + inode_count + data_count) * BLOCK_SIZE];

        let put = |image: &mut Vec<u8>, at: usize, value: u32| {
            image[at..at + 4].copy_from_slice(&value.to_le_bytes());
        };
        put(&mut image, 0, self.entries.len() as u32);
        put(&mut image, 4, inode_count as u32);
        put(&mut image, 8, data_count as u32);
        for (i, (name, kind, inode)) in self.entries.iter().enumerate() {
            let base = 64 + i * 64;
            image[base..base + NAME_MAX].copy_from_slice(name);
            put(&mut image, base + NAME_MAX, *kind);
            put(&mut image, base + NAME_MAX + 4, *inode);
        }

        let data_base = (1 + inode_count) * BLOCK_SIZE;
        let mut next_block = 0;
        for (inode, data) in self.files.iter().enumerate() {
            let base = (1 + inode) * BLOCK_SIZE;
            put(&mut image, base, data.len() as u32);
            for (slot, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
                let number = if slot > 0 && self.torn.contains(&inode) { data_count } else { next_block };
                put(&mut image, base + 4 + slot * 4, number as u32);
                let start = data_base + next_block * BLOCK_SIZE;
                image[start..start + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
        }
        Box::leak(image.into_boxed_slice())
    }
}

fn executable(entry: u32, len: usize) -> Vec<u8> {
    let mut data = vec![0; len];
    data[..4].copy_from_slice(&EXEC_MAGIC);
    data[24..28].copy_from_slice(&entry.to_le_bytes());
    data[HEADER_LEN..].fill(0x90);
    data
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal driver that records output and replays queued input lines
pub struct TestTerminals {
    active:   AtomicUsize,
    input:    Mutex<Vec<VecDeque<Vec<u8>>>>,
    output:   Mutex<Vec<Vec<u8>>>,
    attached: Mutex<Vec<Option<Pid>>>,
}

impl TestTerminals {
    pub fn new() -> Self {
        Self {
            active:   AtomicUsize::new(0),
            input:    Mutex::new(vec![VecDeque::new(); TERMINALS]),
            output:   Mutex::new(vec![Vec::new(); TERMINALS]),
            attached: Mutex::new(vec![None; TERMINALS]),
        }
    }

    pub fn push_line(&self, terminal: usize, line: &[u8]) {
        self.input.lock().unwrap()[terminal].push_back(line.to_vec());
    }

    pub fn output(&self, terminal: usize) -> Vec<u8> {
        self.output.lock().unwrap()[terminal].clone()
    }

    pub fn attached(&self, terminal: usize) -> Option<Pid> {
        self.attached.lock().unwrap()[terminal]
    }

    pub fn show(&self, terminal: usize) {
        self.active.store(terminal, Ordering::Relaxed);
    }
}

impl Default for TestTerminals {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminals for TestTerminals {
    fn active_terminal(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Never blocks: an empty queue reads as zero bytes
    fn read(&self, terminal: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let line = self.input.lock().unwrap()[terminal].pop_front().unwrap_or_default();
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line[..n]);
        Ok(n)
    }

    fn write(&self, terminal: usize, buf: &[u8]) -> Result<usize, Error> {
        self.output.lock().unwrap()[terminal].extend_from_slice(buf);
        Ok(buf.len())
    }

    fn video_frame(&self, terminal: usize) -> u32 {
        0xB9000 + terminal as u32 * 0x1000
    }

    fn set_active_process(&self, terminal: usize, pid: Option<Pid>) {
        self.attached.lock().unwrap()[terminal] = pid;
    }
}

/// Device that counts opens and closes
#[derive(Default)]
pub struct CountingDevice {
    opens:  AtomicUsize,
    closes: AtomicUsize,
}

impl CountingDevice {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }
}

impl Device for CountingDevice {
    fn open(&self) -> Result<(), Error> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        buf.fill(0);
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        Ok(buf.len())
    }

    fn close(&self) -> Result<(), Error> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

type Handler = Box<dyn FnOnce(&Kernel<SimCpu>) + Send>;

struct PendingInterrupt {
    name:    Vec<u8>,
    skip:    usize,
    handler: Handler,
}

/// `FlatFs` that can take an interrupt in the middle of a name lookup
pub struct BenchFs {
    image:   FlatFs,
    kernel:  AtomicPtr<Kernel<SimCpu>>,
    pending: Mutex<Option<PendingInterrupt>>,
}

impl BenchFs {
    fn new() -> Self {
        Self {
            image:   FlatFs::new(),
            kernel:  AtomicPtr::new(std::ptr::null_mut()),
            pending: Mutex::new(None),
        }
    }

    fn due(&self, name: &[u8]) -> Option<Handler> {
        let mut pending = self.pending.lock().unwrap();
        match pending.as_mut() {
            Some(next) if next.name == name && next.skip > 0 => {
                next.skip -= 1;
                None
            }
            Some(next) if next.name == name => pending.take().map(|next| next.handler),
            _ => None,
        }
    }
}

impl FileSystem for BenchFs {
    fn resolve(&self, name: &[u8]) -> Result<DirEntry, Error> {
        if let Some(handler) = self.due(name) {
            let kernel = self.kernel.load(Ordering::Relaxed);
            handler(unsafe { &*kernel });
        }
        self.image.resolve(name)
    }

    fn entry(&self, index: usize) -> Option<DirEntry> {
        self.image.entry(index)
    }

    fn length(&self, inode: u32) -> Result<u32, Error> {
        self.image.length(inode)
    }

    fn read_data(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, Error> {
        self.image.read_data(inode, offset, buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The path ended in user mode or idle
    Parked,
    /// The call came back normally
    Returned,
}

pub struct World {
    pub kernel:    Box<Kernel<SimCpu>>,
    pub fs:        &'static BenchFs,
    pub terminals: &'static TestTerminals,
    pub rtc:       &'static CountingDevice,
}

/// Enter the kernel the way an interrupt or boot path would
pub fn interrupt(kernel: &Kernel<SimCpu>, f: impl FnOnce(&Kernel<SimCpu>)) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| f(kernel))) {
        Ok(()) => Outcome::Returned,
        Err(payload) if payload.is::<Parked>() => Outcome::Parked,
        Err(payload) => panic::resume_unwind(payload),
    }
}

impl World {
    fn new(image: ImageBuilder) -> Self {
        let fs: &'static BenchFs = Box::leak(Box::new(BenchFs::new()));
        fs.image.mount(image.build()).unwrap();
        let terminals: &'static TestTerminals = Box::leak(Box::new(TestTerminals::new()));
        let rtc: &'static CountingDevice = Box::leak(Box::new(CountingDevice::default()));

        let kernel = Box::new(Kernel::new(SimCpu::new(), fs, terminals));
        kernel.cpu().kernel.set(&*kernel);
        fs.kernel.store(&*kernel as *const _ as *mut _, Ordering::Relaxed);
        kernel.register_device("rtc", rtc).unwrap();
        kernel.init();
        Self { kernel, fs, terminals, rtc }
    }

    /// Install the user program that runs at `entry`
    pub fn program(&self, entry: u32, program: impl Fn(&Kernel<SimCpu>) + 'static) {
        self.kernel.cpu().programs.borrow_mut().insert(entry, Rc::new(program));
    }

    pub fn run(&self, f: impl FnOnce(&Kernel<SimCpu>)) -> Outcome {
        interrupt(&self.kernel, f)
    }

    /// Run `handler` as an interrupt inside the lookup of `name`, after
    /// `skip` earlier lookups of it went through untouched
    pub fn interrupt_on_resolve(
        &self,
        name: &[u8],
        skip: usize,
        handler: impl FnOnce(&Kernel<SimCpu>) + Send + 'static,
    ) {
        *self.fs.pending.lock().unwrap() = Some(PendingInterrupt {
            name: name.to_vec(),
            skip,
            handler: Box::new(handler),
        });
    }

    /// Start terminal 0's shell
    pub fn boot(&self) -> Outcome {
        self.run(|k| {
            if let Err(err) = k.launch_terminal(0) {
                panic!("boot failed: {}", err);
            }
        })
    }
}

fn standard_image(with_shell: bool) -> ImageBuilder {
    let mut image = ImageBuilder::new();
    if with_shell {
        image = image.program("shell", SHELL_ENTRY);
    }
    image
        .program("a", A_ENTRY)
        .program("b", B_ENTRY)
        .program("c", C_ENTRY)
        .file("frame0.txt", FRAME0)
        .device("rtc")
        .device("ghost")
}

/// Shell, programs a/b/c, "frame0.txt" and the devices "rtc" and "ghost"
/// ("ghost" has no driver).
pub fn world() -> World {
    World::new(standard_image(true))
}

/// The standard image plus whatever `extend` adds
pub fn world_with(extend: impl FnOnce(ImageBuilder) -> ImageBuilder) -> World {
    World::new(extend(standard_image(true)))
}

pub fn world_without_shell() -> World {
    World::new(standard_image(false))
}
