//! # Scheduler
//!
//! Core scheduling logic for BRTOS: the TCB table, task creation, the
//! round-robin selector and the sleep/wake tracker. The dispatcher in
//! `dispatch.rs` drives these on every entry.
//!
//! ## Scheduling Algorithm
//!
//! At each tick:
//! 1. **Wake sleepers**: decrement every sleeping task's counter; those
//!    reaching zero become Ready.
//! 2. **Charge the running task**: one more tick in its current run. While
//!    below its time slice it keeps the CPU without looking at anyone else.
//! 3. **Rotate**: once the slice is used up the task drops to Ready and the
//!    scan continues circularly; the first Ready task found is promoted.
//! 4. **Idle**: nothing Ready anywhere → no task, the dispatcher idles.
//!
//! Priority is recorded per task but never consulted: this is a single-queue
//! round robin.

use log::{debug, info, warn};

use crate::config::MAX_TASKS;
use crate::error::Error;
use crate::stack::StackRegion;
use crate::task::{Priority, TaskControlBlock, TaskEnd, TaskEntry, TaskId, TaskState};

// ---------------------------------------------------------------------------
// Time conversion
// ---------------------------------------------------------------------------

/// Milliseconds to ticks at `tick_hz`, truncating. Saturates at
/// `u32::MAX` ticks, so a long duration never comes out shorter.
#[inline]
pub const fn ms_to_ticks(ms: u32, tick_hz: u32) -> u32 {
    saturate(tick_hz as u64 * ms as u64 / 1000)
}

/// Ticks to milliseconds at `tick_hz`, truncating and saturating.
#[inline]
pub const fn ticks_to_ms(ticks: u32, tick_hz: u32) -> u32 {
    saturate(ticks as u64 * 1000 / tick_hz as u64)
}

const fn saturate(value: u64) -> u32 {
    if value > u32::MAX as u64 {
        u32::MAX
    } else {
        value as u32
    }
}

// ---------------------------------------------------------------------------
// Selector and tracker
// ---------------------------------------------------------------------------

/// Pick the next task to run, scanning `tasks` circularly from `start`.
///
/// A `Running` task is charged one tick; it keeps the CPU while still inside
/// its slice, otherwise it is demoted to `Ready` and the scan moves on. The
/// first `Ready` task found is promoted to `Running` with a fresh slice.
/// The scan covers each slot once. A task demoted at the start slot is not
/// reconsidered, so a lone task whose slice ran out yields `None` and the
/// CPU idles for one tick before it is picked again.
pub fn select_next(tasks: &mut [TaskControlBlock], start: usize) -> Option<TaskId> {
    let n = tasks.len();
    if n == 0 {
        return None;
    }

    for offset in 0..n {
        let i = (start + offset) % n;
        let tcb = &mut tasks[i];
        match tcb.state {
            TaskState::Running => {
                tcb.run_ticks += 1;
                tcb.total_ticks += 1;
                if tcb.run_ticks < tcb.time_slice {
                    return Some(TaskId(i));
                }
                // Slice used up: let the others run.
                tcb.state = TaskState::Ready;
            }
            TaskState::Ready => {
                tcb.run_ticks = 0;
                tcb.state = TaskState::Running;
                return Some(TaskId(i));
            }
            TaskState::Sleeping | TaskState::Terminated | TaskState::Invalid => {}
        }
    }

    None
}

/// Advance every sleeping task by one tick, readying those that expire.
pub fn tick_sleepers(tasks: &mut [TaskControlBlock]) {
    for tcb in tasks.iter_mut().filter(|t| t.state == TaskState::Sleeping) {
        debug_assert!(tcb.sleep_ticks > 0);
        tcb.sleep_ticks -= 1;
        if tcb.sleep_ticks == 0 {
            tcb.state = TaskState::Ready;
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state, constructed once at startup. The kernel
/// keeps the single instance behind a critical-section mutex; tests own
/// theirs directly.
pub struct Scheduler {
    /// Fixed-size TCB table. Only the first `task_count` slots are used.
    pub(crate) tasks: [TaskControlBlock; MAX_TASKS],

    /// Number of allocated slots.
    pub(crate) task_count: usize,

    /// Task currently owning the CPU, `None` while idle or before start.
    pub(crate) current: Option<TaskId>,

    /// Where the next selection scan begins: the last task dispatched.
    pub(crate) cursor: usize,

    /// Priority level in effect. Always the lowest.
    pub(crate) priority_level: Priority,

    /// Configured tick rate.
    pub(crate) tick_hz: u32,

    /// Ticks processed since start.
    pub(crate) tick_count: u64,

    /// Set once the first task has been dispatched.
    pub(crate) started: bool,

    /// Guard every fresh frame returns into.
    pub(crate) task_end: TaskEnd,
}

impl Scheduler {
    /// Create an empty scheduler for a tick source running at `tick_hz`.
    pub const fn new(tick_hz: u32, task_end: TaskEnd) -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            current: None,
            cursor: 0,
            priority_level: Priority::LOWEST,
            tick_hz,
            tick_count: 0,
            started: false,
            task_end,
        }
    }

    /// Register a new task. Its entry argument is 0.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the slot index, equal to creation order
    /// - `Err(Error::CapacityExceeded)`: the table is full
    /// - `Err(Error::AlreadyStarted)`: scheduling has begun
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        stack: StackRegion,
        time_slice_ms: u32,
        priority: Priority,
    ) -> Result<TaskId, Error> {
        self.create_task_with_arg(entry, 0, stack, time_slice_ms, priority)
    }

    /// Register a new task whose body receives `arg`.
    pub fn create_task_with_arg(
        &mut self,
        entry: TaskEntry,
        arg: u32,
        mut stack: StackRegion,
        time_slice_ms: u32,
        priority: Priority,
    ) -> Result<TaskId, Error> {
        if self.started {
            warn!("create_task after start rejected");
            return Err(Error::AlreadyStarted);
        }
        if self.task_count >= MAX_TASKS {
            warn!("create_task rejected: {} tasks already", MAX_TASKS);
            return Err(Error::CapacityExceeded);
        }

        let id = TaskId(self.task_count);
        let time_slice = ms_to_ticks(time_slice_ms, self.tick_hz);
        let sp = stack.build_initial_frame(entry, arg, self.task_end);
        self.tasks[id.0].init(entry, priority, time_slice, stack, sp);
        self.task_count += 1;

        debug!(
            "task {} created: slice {} ticks, priority {:#04x}",
            id.0,
            time_slice,
            priority.bits()
        );
        Ok(id)
    }

    /// Put the current task to sleep for at least `duration_ms`.
    ///
    /// The duration is rounded down to ticks but never below one, so a
    /// sleeping task always has a positive counter. Returns the ticks
    /// programmed, or `None` if no task is running.
    pub fn sleep_current(&mut self, duration_ms: u32) -> Option<u32> {
        let id = self.current?;
        let tcb = &mut self.tasks[id.0];
        if tcb.state != TaskState::Running {
            return None;
        }
        let ticks = ms_to_ticks(duration_ms, self.tick_hz).max(1);
        tcb.sleep_ticks = ticks;
        tcb.state = TaskState::Sleeping;
        Some(ticks)
    }

    /// Mark the current task terminated. Called by the task-end guard when
    /// a body returns; the task is never selected again.
    pub fn terminate_current(&mut self) {
        if let Some(id) = self.current {
            self.tasks[id.0].state = TaskState::Terminated;
            info!("task {} returned, terminated", id.0);
        }
    }

    /// One scheduler tick of timer processing: advance the clock and wake
    /// expired sleepers.
    pub(crate) fn process_tick(&mut self) {
        self.tick_count += 1;
        tick_sleepers(&mut self.tasks[..self.task_count]);
    }

    /// Run the selector from the cursor and record the outcome.
    pub(crate) fn select(&mut self) -> Option<TaskId> {
        let next = select_next(&mut self.tasks[..self.task_count], self.cursor);
        if let Some(id) = next {
            self.cursor = id.0;
        }
        next
    }

    /// Record the stack pointer of the task being switched out.
    pub(crate) fn capture(&mut self, sp: *mut u32) {
        if let Some(id) = self.current {
            let tcb = &mut self.tasks[id.0];
            debug_assert!(tcb.stack.contains(sp), "task {} stack overflow", id.0);
            tcb.stack_pointer = sp;
        }
    }

    /// All allocated TCBs, in creation order.
    #[inline]
    pub fn tasks(&self) -> &[TaskControlBlock] {
        &self.tasks[..self.task_count]
    }

    #[inline]
    pub fn task(&self, id: TaskId) -> &TaskControlBlock {
        &self.tasks[id.0]
    }

    #[inline]
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    #[inline]
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    #[inline]
    pub fn priority_level(&self) -> Priority {
        self.priority_level
    }

    #[inline]
    pub fn tick_hz(&self) -> u32 {
        self.tick_hz
    }

    /// Ticks processed since start.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.tick_count
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
