//! # Dispatcher
//!
//! The single scheduler entry routine. Both the timer interrupt and a task
//! calling `sleep()` end up here; the [`Entry`] discriminator says which,
//! and from then on the two paths share one state machine:
//!
//! ```text
//!   Entry::Tick(sp) ──► TickEntry ──┐ save sp, advance clock, wake sleepers
//!                                   ▼
//!   Entry::Voluntary(sp) ─► VoluntaryEntry ─► Selecting ─► Resuming ─► Resume
//!                          save sp            ▲    │
//!   Entry::Start ─────────────────────────────┘    ▼
//!                                               Idle ── idle action, advance
//!                                                ▲  │   clock, wake sleepers
//!                                                └──┘   (no context save)
//! ```
//!
//! Whoever calls the dispatcher has already pushed the outgoing task's
//! context onto its own stack (exception entry plus the software frame on
//! Cortex-M); the entry carries the resulting stack pointer. The result is a
//! continuation: the task to resume and the stack pointer its saved context
//! is popped from.
//!
//! Time only moves on timer ticks. A voluntary entry selects without running
//! the sleep tracker, so a task that has just gone to sleep is not charged
//! for a tick it did not wait.

use core::ops::ControlFlow;

use log::trace;

use crate::arch::Port;
use crate::scheduler::Scheduler;
use crate::task::TaskId;

/// Why the dispatcher was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// The periodic timer interrupted the current task; `sp` points at its
    /// freshly saved context.
    Tick(*mut u32),
    /// The current task gave up the CPU (sleep, or its body returned); its
    /// stack was reshaped to look interrupted and saved at `sp`.
    Voluntary(*mut u32),
    /// First dispatch. There is no outgoing task.
    Start,
}

/// Dispatcher states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TickEntry(*mut u32),
    VoluntaryEntry(*mut u32),
    Selecting,
    Idle,
    Resuming(TaskId),
}

impl From<Entry> for Phase {
    fn from(entry: Entry) -> Self {
        match entry {
            Entry::Tick(sp) => Phase::TickEntry(sp),
            Entry::Voluntary(sp) => Phase::VoluntaryEntry(sp),
            Entry::Start => Phase::Selecting,
        }
    }
}

/// Where execution continues after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resume {
    pub task: TaskId,
    /// Saved context to restore.
    pub stack_pointer: *mut u32,
}

impl Scheduler {
    /// Run the dispatcher from `entry` until a task can be resumed.
    ///
    /// Never returns while no task is runnable: the idle action is repeated
    /// once per tick until a sleeper wakes.
    pub fn dispatch<P: Port>(&mut self, entry: Entry, port: &mut P) -> Resume {
        let mut phase = Phase::from(entry);
        loop {
            match self.step(phase, port) {
                ControlFlow::Continue(next) => phase = next,
                ControlFlow::Break(resume) => return resume,
            }
        }
    }

    /// Perform a single dispatcher transition.
    pub fn step<P: Port>(&mut self, phase: Phase, port: &mut P) -> ControlFlow<Resume, Phase> {
        match phase {
            Phase::TickEntry(sp) => {
                self.capture(sp);
                self.process_tick();
                ControlFlow::Continue(Phase::Selecting)
            }
            Phase::VoluntaryEntry(sp) => {
                self.capture(sp);
                ControlFlow::Continue(Phase::Selecting)
            }
            Phase::Selecting => match self.select() {
                Some(id) => ControlFlow::Continue(Phase::Resuming(id)),
                None => ControlFlow::Continue(Phase::Idle),
            },
            Phase::Idle => {
                if self.current.take().is_some() {
                    trace!("no task ready, idling");
                }
                port.idle();
                self.process_tick();
                ControlFlow::Continue(Phase::Selecting)
            }
            Phase::Resuming(id) => {
                if self.current != Some(id) {
                    trace!("switch to task {}", id.index());
                }
                self.current = Some(id);
                ControlFlow::Break(Resume {
                    task: id,
                    stack_pointer: self.tasks[id.index()].stack_pointer,
                })
            }
        }
    }

    /// Mark the scheduler started and pick the first task.
    pub fn start<P: Port>(&mut self, port: &mut P) -> Resume {
        self.started = true;
        self.dispatch(Entry::Start, port)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
