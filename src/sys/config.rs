//! Config — kernel capacities and boot-time settings
//!
//! Capacities are fixed at build time. The multiboot command line can
//! override the shell, the log level and the timer rate, e.g.
//! `shell=shell log=debug hz=100`.

use crate::sys::debug::Level;

// ---------------------------------------------------------------------------
// Capacities
// ---------------------------------------------------------------------------

pub const MAX_PROCESSES: usize = 6;
pub const TERMINALS:     usize = 3;
pub const MAX_FILES:     usize = 8;
pub const MAX_DEVICES:   usize = 6;

/// First descriptor `open` may hand out; 0 and 1 are the terminal streams
pub const FIRST_USER_FD: usize = 2;

/// Longest command line accepted by `execute`, NUL included
pub const COMMAND_MAX: usize = 1024;

/// Filesystem name length
pub const NAME_MAX: usize = 32;

pub const DEFAULT_SHELL: &str = "shell";

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

pub const PIT_INPUT_HZ:     u32 = 1_193_180;
pub const DEFAULT_TIMER_HZ: u32 = 100;
/// Below this the PIT divisor no longer fits in 16 bits
pub const MIN_TIMER_HZ:     u32 = 19;
pub const MAX_TIMER_HZ:     u32 = 1000;

// ---------------------------------------------------------------------------
// Boot configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellName {
    bytes: [u8; NAME_MAX],
    len:   usize,
}

impl ShellName {
    pub fn new(name: &[u8]) -> Option<Self> {
        if name.is_empty() || name.len() > NAME_MAX || name.contains(&b' ') {
            return None;
        }
        let mut bytes = [0; NAME_MAX];
        bytes[..name.len()].copy_from_slice(name);
        Some(Self { bytes, len: name.len() })
    }

    const fn default_shell() -> Self {
        let src = DEFAULT_SHELL.as_bytes();
        let mut bytes = [0; NAME_MAX];
        let mut i = 0;
        while i < src.len() {
            bytes[i] = src[i];
            i += 1;
        }
        Self { bytes, len: src.len() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    pub shell:     ShellName,
    pub log_level: Level,
    pub timer_hz:  u32,
}

impl BootConfig {
    pub const fn new() -> Self {
        Self {
            shell:     ShellName::default_shell(),
            log_level: Level::Info,
            timer_hz:  DEFAULT_TIMER_HZ,
        }
    }

    /// Parse `key=value` words; anything else on the line is skipped
    pub fn parse(cmdline: &str) -> Self {
        let mut config = Self::new();

        for word in cmdline.split_ascii_whitespace() {
            let Some((key, value)) = word.split_once('=') else {
                continue;
            };
            match key {
                "shell" => match ShellName::new(value.as_bytes()) {
                    Some(shell) => config.shell = shell,
                    None => kwarn!("config: bad shell name '{}'", value),
                },
                "log" => match Level::parse(value) {
                    Some(level) => config.log_level = level,
                    None => kwarn!("config: unknown log level '{}'", value),
                },
                "hz" => match value.parse::<u32>() {
                    Ok(hz) if (MIN_TIMER_HZ..=MAX_TIMER_HZ).contains(&hz) => config.timer_hz = hz,
                    _ => kwarn!("config: timer rate '{}' out of range", value),
                },
                _ => kwarn!("config: unknown key '{}'", key),
            }
        }

        config
    }

    pub const fn timer_divisor(&self) -> u16 {
        (PIT_INPUT_HZ / self.timer_hz) as u16
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_line_keeps_defaults() {
        let config = BootConfig::parse("");
        assert_eq!(config, BootConfig::new());
        assert_eq!(config.shell.as_bytes(), b"shell");
        assert_eq!(config.timer_divisor(), 11931);
    }

    #[test]
    fn recognised_keys_override_defaults() {
        let config = BootConfig::parse("/boot/termkern shell=sh log=debug hz=50");
        assert_eq!(config.shell.as_bytes(), b"sh");
        assert_eq!(config.log_level, Level::Debug);
        assert_eq!(config.timer_hz, 50);
    }

    #[test]
    fn bad_values_are_ignored() {
        let config = BootConfig::parse("hz=5 log=loud shell= colour=blue");
        assert_eq!(config, BootConfig::new());
    }

    #[test]
    fn shell_names_are_bounded() {
        assert!(ShellName::new(&[b'x'; NAME_MAX]).is_some());
        assert!(ShellName::new(&[b'x'; NAME_MAX + 1]).is_none());
    }
}
