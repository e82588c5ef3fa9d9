//! Console — VGA text terminals and the PS/2 keyboard
//!
//! The visible terminal owns the real screen at `VIDEO`; the others draw
//! into their backing pages. Alt+F1..F3 switch terminals.

use crate::sys::arch::x86::idt::KEYBOARD_IRQ;
use crate::sys::arch::x86::without_interrupts;
use crate::sys::arch::Cpu;
use crate::sys::config::TERMINALS;
use crate::sys::dev::Terminals;
use crate::sys::error::Error;
use crate::sys::kernel::Kernel;
use crate::sys::mem::{backing_frame, VIDEO};
use crate::sys::proc::Pid;
use core::sync::atomic::{AtomicUsize, Ordering};
use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, KeyState, Keyboard, ScancodeSet1};
use spin::Mutex;
use ::x86::io::inb;

const COLS: usize = 80;
const ROWS: usize = 25;
const CELLS: usize = COLS * ROWS;
const ATTRIBUTE: u16 = 0x0700;
const LINE_MAX: usize = 128;

const DATA_PORT: u16 = 0x60;

#[derive(Debug, Clone, Copy)]
enum Key {
    Char(u8),
    Backspace,
    Enter,
    Switch(usize),
}

struct Screen {
    row:   usize,
    col:   usize,
    line:  [u8; LINE_MAX],
    len:   usize,
    ready: bool,
}

impl Screen {
    const fn new() -> Self {
        Self { row: 0, col: 0, line: [0; LINE_MAX], len: 0, ready: false }
    }

    fn cell(row: usize, col: usize) -> *mut u16 {
        (VIDEO as *mut u16).wrapping_add(row * COLS + col)
    }

    /// Draw at `VIDEO`, whichever page it maps to right now
    fn put(&mut self, byte: u8) {
        match byte {
            b'\n' => {
                self.col = 0;
                self.row += 1;
            }
            byte => {
                unsafe { Self::cell(self.row, self.col).write_volatile(ATTRIBUTE | byte as u16) };
                self.col += 1;
                if self.col == COLS {
                    self.col = 0;
                    self.row += 1;
                }
            }
        }
        if self.row == ROWS {
            self.scroll();
        }
    }

    fn scroll(&mut self) {
        for i in 0..CELLS - COLS {
            unsafe {
                let below = Self::cell(0, i + COLS).read_volatile();
                Self::cell(0, i).write_volatile(below);
            }
        }
        for col in 0..COLS {
            unsafe { Self::cell(ROWS - 1, col).write_volatile(ATTRIBUTE | b' ' as u16) };
        }
        self.row = ROWS - 1;
    }

    fn erase(&mut self) {
        if self.col == 0 {
            if self.row == 0 {
                return;
            }
            self.row -= 1;
            self.col = COLS;
        }
        self.col -= 1;
        unsafe { Self::cell(self.row, self.col).write_volatile(ATTRIBUTE | b' ' as u16) };
    }

    /// Line editing for the terminal's pending read
    fn edit(&mut self, key: Key) {
        if self.ready {
            return;
        }
        match key {
            Key::Char(byte) if self.len < LINE_MAX - 1 => {
                self.line[self.len] = byte;
                self.len += 1;
                self.put(byte);
            }
            Key::Backspace if self.len > 0 => {
                self.len -= 1;
                self.erase();
            }
            Key::Enter => {
                self.line[self.len] = b'\n';
                self.len += 1;
                self.ready = true;
                self.put(b'\n');
            }
            _ => {}
        }
    }
}

struct KeyboardState {
    decoder: Keyboard<layouts::Us104Key, ScancodeSet1>,
    alt:     bool,
}

impl KeyboardState {
    fn decode(&mut self, scancode: u8) -> Option<Key> {
        let event = self.decoder.add_byte(scancode).ok()??;
        if matches!(event.code, KeyCode::LAlt | KeyCode::RAltGr) {
            self.alt = event.state != KeyState::Up;
        }
        match self.decoder.process_keyevent(event)? {
            DecodedKey::RawKey(KeyCode::F1) if self.alt => Some(Key::Switch(0)),
            DecodedKey::RawKey(KeyCode::F2) if self.alt => Some(Key::Switch(1)),
            DecodedKey::RawKey(KeyCode::F3) if self.alt => Some(Key::Switch(2)),
            DecodedKey::Unicode('\n') => Some(Key::Enter),
            DecodedKey::Unicode('\u{8}') => Some(Key::Backspace),
            DecodedKey::Unicode(c) if c.is_ascii() && !c.is_ascii_control() => Some(Key::Char(c as u8)),
            _ => None,
        }
    }
}

lazy_static! {
    static ref KEYBOARD: Mutex<KeyboardState> = Mutex::new(KeyboardState {
        decoder: Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore),
        alt:     false,
    });
}

pub struct Console {
    visible: AtomicUsize,
    screens: [Mutex<Screen>; TERMINALS],
}

impl Console {
    pub const fn new() -> Self {
        Self {
            visible: AtomicUsize::new(0),
            screens: [
                Mutex::new(Screen::new()),
                Mutex::new(Screen::new()),
                Mutex::new(Screen::new()),
            ],
        }
    }

    /// Keyboard IRQ
    pub fn on_keyboard<C: Cpu>(&self, kernel: &Kernel<C>) {
        let scancode = unsafe { inb(DATA_PORT) };
        kernel.cpu().end_of_interrupt(KEYBOARD_IRQ);

        let Some(key) = KEYBOARD.lock().decode(scancode) else {
            return;
        };
        match key {
            Key::Switch(terminal) => self.show(kernel, terminal),
            key => {
                let visible = self.visible.load(Ordering::Relaxed);
                kernel.with_kernel_view(|| self.screens[visible].lock().edit(key));
            }
        }
    }

    /// Make `terminal` the visible one
    fn show<C: Cpu>(&self, kernel: &Kernel<C>, terminal: usize) {
        let old = self.visible.load(Ordering::Relaxed);
        if terminal == old || terminal >= TERMINALS {
            return;
        }

        kernel.with_kernel_view(|| unsafe {
            let screen = VIDEO as *mut u16;
            core::ptr::copy_nonoverlapping(screen, backing_frame(old) as *mut u16, CELLS);
            core::ptr::copy_nonoverlapping(backing_frame(terminal) as *const u16, screen, CELLS);
        });
        self.visible.store(terminal, Ordering::Relaxed);
        for (term, frame) in [(old, backing_frame(old)), (terminal, VIDEO)] {
            if let Err(err) = kernel.remap_video(term, frame) {
                kerror!("console: remap of terminal {} failed: {}", term, err);
            }
        }
        klog!("console: showing terminal {}", terminal);

        if kernel.active_process(terminal).is_none() {
            if let Err(err) = kernel.launch_terminal(terminal) {
                kwarn!("console: terminal {} has no shell: {}", terminal, err);
            }
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminals for Console {
    fn active_terminal(&self) -> usize {
        self.visible.load(Ordering::Relaxed)
    }

    fn read(&self, terminal: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let screen = self.screens.get(terminal).ok_or(Error::BadTerminal)?;
        loop {
            let done = without_interrupts(|| {
                let mut screen = screen.lock();
                if !screen.ready {
                    return None;
                }
                let n = screen.len.min(buf.len());
                buf[..n].copy_from_slice(&screen.line[..n]);
                screen.len = 0;
                screen.ready = false;
                Some(n)
            });
            if let Some(n) = done {
                return Ok(n);
            }
            core::hint::spin_loop();
        }
    }

    /// Called from `terminal`'s own process, so `VIDEO` is its page
    fn write(&self, terminal: usize, buf: &[u8]) -> Result<usize, Error> {
        let screen = self.screens.get(terminal).ok_or(Error::BadTerminal)?;
        without_interrupts(|| {
            let mut screen = screen.lock();
            for &byte in buf {
                screen.put(byte);
            }
        });
        Ok(buf.len())
    }

    fn video_frame(&self, terminal: usize) -> u32 {
        if terminal == self.visible.load(Ordering::Relaxed) {
            VIDEO
        } else {
            backing_frame(terminal)
        }
    }

    fn set_active_process(&self, terminal: usize, pid: Option<Pid>) {
        match pid {
            Some(pid) => kdebug!("console: terminal {} runs pid {}", terminal, pid),
            None => kdebug!("console: terminal {} is idle", terminal),
        }
    }
}
