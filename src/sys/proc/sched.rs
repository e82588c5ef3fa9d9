//! Scheduler — round robin over terminals, driven by the timer
//!
//! Each tick moves service to the next terminal that has a process. A tick
//! on the idle path resumes the first running terminal.

use super::table::ProcessTable;
use super::Pid;
use crate::sys::arch::{Cpu, TIMER_IRQ};
use crate::sys::config::TERMINALS;
use crate::sys::kernel::Kernel;
use core::sync::atomic::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Idle,
    Running(Pid),
}

pub fn terminal_state(table: &ProcessTable, terminal: usize) -> TerminalState {
    match table.active_process(terminal) {
        Some(pid) => TerminalState::Running(pid),
        None => TerminalState::Idle,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing runs anywhere
    Idle,
    /// The running process is the only candidate
    Stay,
    Switch(Pid),
}

/// Next process after terminal `serving`, where `current` runs
pub fn pick_next(table: &ProcessTable, serving: usize, current: Pid) -> Decision {
    for step in 1..=TERMINALS {
        let terminal = (serving + step) % TERMINALS;
        if let TerminalState::Running(pid) = terminal_state(table, terminal) {
            return if pid == current { Decision::Stay } else { Decision::Switch(pid) };
        }
    }
    Decision::Idle
}

fn first_running(table: &ProcessTable) -> Option<Pid> {
    (0..TERMINALS).find_map(|terminal| table.active_process(terminal))
}

impl<C: Cpu> Kernel<C> {
    /// Timer interrupt handler
    pub fn on_timer_tick(&self) {
        self.cpu.rearm_timer();
        self.ticks.fetch_add(1, Ordering::Relaxed);
        // Acknowledge first: a switch does not come back here until later.
        self.cpu.end_of_interrupt(TIMER_IRQ);

        let next = self.with_state(|state| {
            if state.table.count() == 0 {
                return None;
            }
            let Some(current) = state.current else {
                return first_running(&state.table).map(|next| (None, next));
            };
            let serving = state.pcbs.get(current).terminal;
            match pick_next(&state.table, serving, current) {
                Decision::Switch(next) => Some((Some(current), next)),
                Decision::Stay | Decision::Idle => None,
            }
        });

        if let Some((from, to)) = next {
            self.switch_to(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mem::kernel_stack_top;
    use crate::sys::config::BootConfig;
    use crate::sys::error::ExitStatus;
    use crate::testing::{self, Outcome, SHELL_ENTRY};
    use std::cell::Cell;
    use std::rc::Rc;
    use proptest::prelude::*;

    fn pid(n: usize) -> Pid {
        Pid::new(n).unwrap()
    }

    fn table_with(active: [Option<usize>; TERMINALS]) -> ProcessTable {
        let mut table = ProcessTable::new();
        for (terminal, slot) in active.iter().enumerate() {
            if let Some(n) = slot {
                table.set_active_process(terminal, Pid::new(*n));
            }
        }
        table
    }

    #[test]
    fn rotation_moves_to_the_next_running_terminal() {
        let table = table_with([Some(1), Some(2), Some(3)]);
        assert_eq!(pick_next(&table, 0, pid(1)), Decision::Switch(pid(2)));
        assert_eq!(pick_next(&table, 1, pid(2)), Decision::Switch(pid(3)));
        assert_eq!(pick_next(&table, 2, pid(3)), Decision::Switch(pid(1)));
    }

    #[test]
    fn idle_terminals_are_skipped() {
        let table = table_with([Some(4), None, Some(2)]);
        assert_eq!(pick_next(&table, 0, pid(4)), Decision::Switch(pid(2)));
        assert_eq!(pick_next(&table, 2, pid(2)), Decision::Switch(pid(4)));
    }

    #[test]
    fn a_lone_process_stays() {
        let table = table_with([None, Some(5), None]);
        assert_eq!(pick_next(&table, 1, pid(5)), Decision::Stay);
        assert_eq!(terminal_state(&table, 0), TerminalState::Idle);
        assert_eq!(terminal_state(&table, 1), TerminalState::Running(pid(5)));
    }

    proptest! {
        #[test]
        fn the_chosen_terminal_is_the_first_running_one_after_serving(
            active in proptest::collection::vec(proptest::option::of(1usize..=6), TERMINALS),
            serving in 0..TERMINALS,
        ) {
            let mut slots = [None; TERMINALS];
            slots.copy_from_slice(&active);
            prop_assume!(slots[serving].is_some());
            let table = table_with(slots);
            let current = pid(slots[serving].unwrap());

            let expected = (1..=TERMINALS)
                .map(|step| (serving + step) % TERMINALS)
                .find_map(|t| slots[t])
                .map(pid);
            match pick_next(&table, serving, current) {
                Decision::Switch(next) => prop_assert_eq!(Some(next), expected),
                Decision::Stay => prop_assert_eq!(expected, Some(current)),
                Decision::Idle => prop_assert!(false),
            }
        }
    }

    #[test]
    fn tick_with_no_process_only_rearms() {
        let world = testing::world();
        world.kernel.on_timer_tick();
        let cpu = world.kernel.cpu();
        assert_eq!((cpu.rearms(), cpu.eois(), cpu.switches()), (1, 1, 0));
        assert_eq!(world.kernel.ticks(), 1);
    }

    #[test]
    fn tick_with_one_process_does_not_switch() {
        let world = testing::world();
        world.program(SHELL_ENTRY, |_| {});
        assert_eq!(world.boot(), Outcome::Parked);

        world.kernel.on_timer_tick();
        assert_eq!(world.kernel.cpu().switches(), 0);
        assert_eq!(world.kernel.current_pid(), Some(pid(1)));
    }

    #[test]
    fn tick_rotates_between_terminals() {
        let world = testing::world();
        world.program(SHELL_ENTRY, |_| {});
        assert_eq!(world.boot(), Outcome::Parked);
        assert_eq!(world.run(|k| k.launch_terminal(2).unwrap()), Outcome::Parked);
        assert_eq!(world.kernel.current_pid(), Some(pid(2)));

        let k = &world.kernel;
        k.on_timer_tick();
        assert_eq!(k.current_pid(), Some(pid(1)));
        assert_eq!(k.cpu().cr3(), k.directory_frame(Some(pid(1))));
        assert_eq!(k.cpu().esp0(), kernel_stack_top(pid(1)));

        k.on_timer_tick();
        assert_eq!(k.current_pid(), Some(pid(2)));
        assert_eq!(k.cpu().cr3(), k.directory_frame(Some(pid(2))));
        assert_eq!(k.cpu().switches(), 2);
    }

    #[test]
    fn tick_on_the_idle_path_resumes_a_waiting_terminal() {
        let world = testing::world();
        let runs = Rc::new(Cell::new(0));
        let count = runs.clone();
        world.program(SHELL_ENTRY, move |k| {
            count.set(count.get() + 1);
            if count.get() == 2 {
                k.configure(BootConfig::parse("shell=gone"));
                k.halt(ExitStatus::Exited(0));
            }
        });
        assert_eq!(world.boot(), Outcome::Parked);
        assert_eq!(world.run(|k| k.launch_terminal(1).unwrap()), Outcome::Parked);

        let k = &world.kernel;
        assert_eq!(k.current_pid(), None);
        assert_eq!(k.active_process(1), None);
        assert_eq!(k.process_count(), 1);
        assert_eq!(k.cpu().cr3(), k.directory_frame(None));

        k.on_timer_tick();
        assert_eq!(k.current_pid(), Some(pid(1)));
        assert_eq!(k.cpu().cr3(), k.directory_frame(Some(pid(1))));
        assert_eq!(k.cpu().esp0(), kernel_stack_top(pid(1)));
        assert_eq!(k.cpu().switches(), 1);
    }
}
