//! # Task Control Block
//!
//! Defines the task model for BRTOS. Each task owns a caller-supplied stack
//! region and a slot in the scheduler's fixed TCB table; the slot index is
//! the task's identity for its whole life.

use bitflags::bitflags;

use crate::config::MAX_PRIORITY_LEVELS;
use crate::stack::StackRegion;

/// Task body. Receives one argument and is not expected to return; if it
/// does, execution continues in the task-end guard.
pub type TaskEntry = extern "C" fn(u32);

/// Task-end guard placed in the link register of every fresh frame.
pub type TaskEnd = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///              select_next()
///   ┌───────┐ ─────────────► ┌─────────┐   sleep()   ┌──────────┐
///   │ Ready │                │ Running │ ──────────► │ Sleeping │
///   └───────┘ ◄───────────── └─────────┘             └──────────┘
///       ▲      slice expired      │                        │
///       │                         │ body returns           │
///       │                         ▼                        │
///       │                  ┌────────────┐                  │
///       │                  │ Terminated │                  │
///       │                  └────────────┘                  │
///       └──────────────────────────────────────────────────┘
///                        sleep ticks reach zero
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Slot not allocated.
    Invalid,
    /// Runnable, waiting for the selector.
    Ready,
    /// Owns the CPU. At most one task is in this state.
    Running,
    /// Waiting for its sleep counter to expire.
    Sleeping,
    /// Body returned. Absorbing: never scheduled again.
    Terminated,
}

bitflags! {
    /// Priority class of a task, one bit per level.
    ///
    /// Recorded in the TCB but not consulted by the round-robin selector.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Priority: u8 {
        const P1 = 0x01;
        const P2 = 0x02;
        const P3 = 0x04;
        const P4 = 0x08;
        const P5 = 0x10;
        const P6 = 0x20;
        const P7 = 0x40;
        const P8 = 0x80;
    }
}

const _: () = assert!(Priority::all().bits().count_ones() as usize == MAX_PRIORITY_LEVELS);

impl Priority {
    /// The level every task runs at in this scheduler.
    pub const LOWEST: Priority = Priority::P1;
}

/// Index of a task in the TCB table (equals its creation order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB): everything needed to run, suspend or resume
/// a task. Owned by the scheduler's table and never referenced by address
/// outside it.
pub struct TaskControlBlock {
    /// Task entry point. `None` for an unallocated slot.
    pub(crate) entry: Option<TaskEntry>,

    /// Priority class (informational).
    pub(crate) priority: Priority,

    /// Current execution state.
    pub(crate) state: TaskState,

    /// Maximum consecutive ticks in `Running` before forced rotation.
    pub(crate) time_slice: u32,

    /// Caller-supplied stack memory.
    pub(crate) stack: StackRegion,

    /// Saved stack pointer. Written only when a context is captured or the
    /// initial frame is built.
    pub(crate) stack_pointer: *mut u32,

    /// Ticks left until a sleeping task becomes ready.
    pub(crate) sleep_ticks: u32,

    /// Ticks since the task last entered `Running`.
    pub(crate) run_ticks: u32,

    /// Ticks charged to the task since creation.
    pub(crate) total_ticks: u64,
}

// Safety: the raw pointers only ever point into the task's own stack region,
// and TCBs are only touched inside critical sections.
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    /// An unallocated slot. Used to initialize the static table.
    pub const EMPTY: Self = Self {
        entry: None,
        priority: Priority::empty(),
        state: TaskState::Invalid,
        time_slice: 0,
        stack: StackRegion::EMPTY,
        stack_pointer: core::ptr::null_mut(),
        sleep_ticks: 0,
        run_ticks: 0,
        total_ticks: 0,
    };

    /// Fill a free slot. The stack must already hold the initial frame that
    /// `stack_pointer` points to.
    pub(crate) fn init(
        &mut self,
        entry: TaskEntry,
        priority: Priority,
        time_slice: u32,
        stack: StackRegion,
        stack_pointer: *mut u32,
    ) {
        *self = Self {
            entry: Some(entry),
            priority,
            state: TaskState::Ready,
            time_slice,
            stack,
            stack_pointer,
            sleep_ticks: 0,
            run_ticks: 0,
            total_ticks: 0,
        };
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Configured time slice in ticks.
    #[inline]
    pub fn time_slice(&self) -> u32 {
        self.time_slice
    }

    #[inline]
    pub fn entry(&self) -> Option<TaskEntry> {
        self.entry
    }

    #[inline]
    pub fn stack(&self) -> &StackRegion {
        &self.stack
    }

    #[inline]
    pub fn stack_pointer(&self) -> *mut u32 {
        self.stack_pointer
    }

    #[inline]
    pub fn sleep_ticks_remaining(&self) -> u32 {
        self.sleep_ticks
    }

    #[inline]
    pub fn ticks_in_current_run(&self) -> u32 {
        self.run_ticks
    }

    #[inline]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Ready or Running.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
