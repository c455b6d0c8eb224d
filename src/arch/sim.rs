//! # Simulated Machine
//!
//! Host stand-in for the Cortex-M4 port. One shared [`Registers`] value
//! plays the CPU's register file; task stacks are real memory and every
//! switch goes through [`save_context`]/[`restore_context`] exactly as the
//! PendSV/SysTick handlers would. Between a save and the next restore the
//! register file is overwritten with garbage, so anything a task sees again
//! must have survived the trip through its own stack.
//!
//! Task bodies are synthetic programs driven by their registers:
//! - `R4` counts the ticks the task has executed,
//! - `R5` counts ticks since its last sleep,
//! - `PC` advances by one instruction per tick,
//! - `R0` still holds the entry argument.

use super::Port;
use crate::context::{restore_context, save_context, Registers};
use crate::dispatch::{Entry, Resume};
use crate::scheduler::Scheduler;
use crate::stack::{StackRegion, TaskStack};
use crate::sync;
use crate::task::{Priority, TaskId};

/// Idle action of the simulated machine: one idle call is one tick.
#[derive(Debug, Default)]
pub struct SimPort {
    pub idle_ticks: u32,
}

impl Port for SimPort {
    fn idle(&mut self) {
        self.idle_ticks += 1;
    }
}

/// Behavior of a synthetic task.
#[derive(Debug, Clone, Copy, Default)]
pub struct Program {
    /// Sleep after this many consecutive ticks of work.
    pub sleep_after: Option<u32>,
    pub sleep_ms: u32,
    /// Return from the body once this many ticks have been executed.
    pub return_after: Option<u32>,
}

impl Program {
    pub fn busy() -> Self {
        Self::default()
    }

    pub fn sleeper(work_ticks: u32, sleep_ms: u32) -> Self {
        Self {
            sleep_after: Some(work_ticks),
            sleep_ms,
            return_after: None,
        }
    }

    pub fn returning(work_ticks: u32) -> Self {
        Self {
            return_after: Some(work_ticks),
            ..Self::default()
        }
    }
}

/// One tick of work seen from inside a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Scheduler clock while the work ran.
    pub tick: u64,
    pub task: TaskId,
    /// `R4` after the work: ticks executed so far.
    pub counter: u32,
    pub arg: u32,
    pub pc: u32,
}

/// Register contents a real CPU would leave behind after running other code.
const GARBAGE: Registers = Registers {
    r: [0xBAD0_BAD0; 13],
    lr: 0xBAD0_BAD0,
    pc: 0xBAD0_BAD0,
    xpsr: 0,
};

/// Instruction width the synthetic program counter advances by.
const INSTRUCTION: u32 = 2;

extern "C" fn sim_entry(_arg: u32) {}

extern "C" fn sim_task_end() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

pub struct Machine {
    pub scheduler: Scheduler,
    pub port: SimPort,
    regs: Registers,
    /// Stack pointer of the running task while its context is live.
    live_sp: *mut u32,
    running: Option<TaskId>,
    programs: Vec<Program>,
    pub trace: Vec<Observation>,
}

impl Machine {
    pub fn new(tick_hz: u32) -> Self {
        Self {
            scheduler: Scheduler::new(tick_hz, sim_task_end),
            port: SimPort::default(),
            regs: GARBAGE,
            live_sp: core::ptr::null_mut(),
            running: None,
            programs: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Create a task running `program`; its argument is `arg`.
    pub fn spawn(&mut self, program: Program, arg: u32, time_slice_ms: u32) -> TaskId {
        let stack: &'static mut TaskStack<64> = Box::leak(Box::new(TaskStack::new()));
        let region = StackRegion::from(stack);
        let id = self
            .scheduler
            .create_task_with_arg(sim_entry, arg, region, time_slice_ms, Priority::P1)
            .unwrap();
        self.programs.push(program);
        id
    }

    pub fn start(&mut self) {
        let resume = self.scheduler.start(&mut self.port);
        self.resume(resume);
    }

    /// Let the running task work for one tick period, then deliver the
    /// timer interrupt.
    pub fn tick(&mut self) {
        let task = self.running.expect("machine not started");
        self.execute(task);

        let sp = self.suspend();
        let resume = self.scheduler.dispatch(Entry::Tick(sp), &mut self.port);
        self.resume(resume);
    }

    pub fn run(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn running(&self) -> Option<TaskId> {
        self.running
    }

    /// Observations made by `task`, in order.
    pub fn trace_of(&self, task: TaskId) -> impl Iterator<Item = &Observation> + '_ {
        self.trace.iter().filter(move |o| o.task == task)
    }

    fn execute(&mut self, task: TaskId) {
        let regs = &mut self.regs;
        regs.r[4] += 1;
        regs.r[5] += 1;
        regs.pc = regs.pc.wrapping_add(INSTRUCTION);
        self.trace.push(Observation {
            tick: self.scheduler.ticks(),
            task,
            counter: regs.r[4],
            arg: regs.r[0],
            pc: regs.pc,
        });

        let program = self.programs[task.index()];
        if program.return_after == Some(regs.r[4]) {
            // Body returns: the link register leads into the guard.
            regs.pc = regs.lr;
            self.task_end();
        } else if program.sleep_after == Some(regs.r[5]) {
            regs.r[5] = 0;
            self.sleep(program.sleep_ms);
        }
    }

    /// `kernel::sleep` on this machine.
    fn sleep(&mut self, duration_ms: u32) {
        let scheduler = &mut self.scheduler;
        sync::critical_section(|_cs| scheduler.sleep_current(duration_ms));
        self.voluntary_switch();
    }

    /// `kernel::task_end` on this machine.
    fn task_end(&mut self) {
        assert_eq!(self.regs.pc, sim_task_end as usize as u32);
        let scheduler = &mut self.scheduler;
        sync::critical_section(|_cs| scheduler.terminate_current());
        self.voluntary_switch();
    }

    fn voluntary_switch(&mut self) {
        let sp = self.suspend();
        let resume = self.scheduler.dispatch(Entry::Voluntary(sp), &mut self.port);
        self.resume(resume);
    }

    /// Push the live registers onto the running task's stack.
    fn suspend(&mut self) -> *mut u32 {
        // SAFETY: live_sp is the running task's stack pointer with at least a
        // full frame of room below it (stacks are MIN_STACK_WORDS deep and
        // synthetic tasks use none of it).
        let sp = unsafe { save_context(self.live_sp, &self.regs) };
        self.regs = GARBAGE;
        self.running = None;
        sp
    }

    fn resume(&mut self, resume: Resume) {
        // SAFETY: the dispatcher hands back a stack pointer recorded by
        // `suspend` or by the initial frame builder.
        let (regs, sp) = unsafe { restore_context(resume.stack_pointer) };
        self.regs = regs;
        self.live_sp = sp;
        self.running = Some(resume.task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::THUMB_BIT;
    use crate::task::TaskState;

    fn ticks_observed(m: &Machine, task: TaskId) -> usize {
        m.trace_of(task).count()
    }

    #[test]
    fn test_context_survives_preemption_with_distinct_slices() {
        let mut m = Machine::new(1000);
        let a = m.spawn(Program::busy(), 0xA, 1);
        let b = m.spawn(Program::busy(), 0xB, 2);
        let c = m.spawn(Program::busy(), 0xC, 3);
        m.start();
        m.run(60);

        for (task, arg, share) in [(a, 0xA, 10), (b, 0xB, 20), (c, 0xC, 30)] {
            let seen: Vec<_> = m.trace_of(task).copied().collect();
            assert_eq!(seen.len(), share, "ticks granted to task {:?}", task);

            let entry_pc = sim_entry as usize as u32 & !THUMB_BIT;
            for (n, obs) in seen.iter().enumerate() {
                let n = n as u32 + 1;
                // Counters advance by exactly one per granted tick.
                assert_eq!(obs.counter, n);
                assert_eq!(obs.pc, entry_pc.wrapping_add(n * INSTRUCTION));
                assert_eq!(obs.arg, arg);
            }
            assert_eq!(m.scheduler.task(task).total_ticks(), share as u64);
        }
    }

    #[test]
    fn test_interleaving_follows_slices() {
        let mut m = Machine::new(1000);
        m.spawn(Program::busy(), 0, 1);
        m.spawn(Program::busy(), 1, 2);
        m.spawn(Program::busy(), 2, 3);
        m.start();
        m.run(12);

        let order: Vec<usize> = m.trace.iter().map(|o| o.task.index()).collect();
        assert_eq!(order, [0, 1, 1, 2, 2, 2, 0, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_sleeping_task_not_resumed_early() {
        let mut m = Machine::new(1000);
        let sleeper = m.spawn(Program::sleeper(1, 5), 0, 10);
        m.spawn(Program::busy(), 1, 2);
        m.start();
        m.run(40);

        let seen: Vec<_> = m.trace_of(sleeper).copied().collect();
        assert!(seen.len() >= 5);
        for pair in seen.windows(2) {
            // Slept right after the first observation at `pair[0].tick`.
            assert!(pair[1].tick >= pair[0].tick + 5, "{:?}", pair);
            assert!(pair[1].counter == pair[0].counter + 1);
        }
    }

    #[test]
    fn test_idle_when_everyone_sleeps() {
        let mut m = Machine::new(1000);
        let a = m.spawn(Program::sleeper(1, 4), 0, 1);
        let b = m.spawn(Program::sleeper(1, 4), 1, 1);
        m.start();
        m.run(10);

        assert!(m.port.idle_ticks > 0);
        // Both keep making progress with their registers intact.
        assert!(ticks_observed(&m, a) >= 3);
        assert!(ticks_observed(&m, b) >= 3);
        for task in [a, b] {
            let counters: Vec<u32> = m.trace_of(task).map(|o| o.counter).collect();
            assert!(counters.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn test_returned_task_never_reappears() {
        let mut m = Machine::new(1000);
        let quitter = m.spawn(Program::returning(3), 0, 1);
        let other = m.spawn(Program::busy(), 1, 1);
        m.start();
        m.run(100);

        assert_eq!(ticks_observed(&m, quitter), 3);
        assert_eq!(m.scheduler.task(quitter).state(), TaskState::Terminated);
        let last_quit = m.trace_of(quitter).last().unwrap().tick;
        assert!(m.trace.iter().filter(|o| o.tick > last_quit).all(|o| o.task == other));
        assert_eq!(m.running(), Some(other));
    }

    #[test]
    fn test_single_running_task_at_every_boundary() {
        let mut m = Machine::new(1000);
        m.spawn(Program::sleeper(2, 3), 0, 1);
        m.spawn(Program::busy(), 1, 2);
        m.spawn(Program::returning(7), 2, 3);
        m.spawn(Program::sleeper(4, 1), 3, 2);
        m.start();

        for _ in 0..200 {
            m.tick();
            let running: Vec<_> = m
                .scheduler
                .tasks()
                .iter()
                .enumerate()
                .filter(|(_, t)| t.state() == TaskState::Running)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(running.len(), 1);
            assert_eq!(Some(running[0]), m.running().map(TaskId::index));
        }
    }
}
