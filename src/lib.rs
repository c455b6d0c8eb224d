//! # BRTOS: Basic Round-robin Task Operating System
//!
//! A small preemptive, tick-driven, round-robin RTOS scheduler for
//! single-core ARM Cortex-M4 microcontrollers.
//!
//! ## Overview
//!
//! A fixed table of tasks shares one CPU. A periodic timer tick preempts
//! the running task; each task keeps the CPU for at most its own time
//! slice, then the next runnable task in table order takes over. A task
//! may give the CPU away early by sleeping for a number of milliseconds.
//! When nothing is runnable the dispatcher idles until the next tick.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                   │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │      init() · create_task() · sleep() · start()        │
//! ├──────────────────┬──────────────────┬──────────────────┤
//! │  Scheduler       │  Dispatcher      │  Sync Primitives │
//! │  scheduler.rs    │  dispatch.rs     │  sync.rs         │
//! │  ─ select_next() │  ─ Entry/Phase   │  ─ critical_     │
//! │  ─ tick_sleepers │  ─ dispatch()    │    section()     │
//! │  ─ sleep_current │  ─ idle loop     │                  │
//! ├──────────────────┴──────────────────┴──────────────────┤
//! │   Task Model (task.rs) · Stacks (stack.rs)             │
//! │   TCB · TaskState · Priority · TaskStack · StackRegion │
//! ├────────────────────────────────────────────────────────┤
//! │   Context Frame (context.rs)                           │
//! │   save_context() · restore_context() · frame layout    │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)               │
//! │    PendSV · SysTick · first-task launch · idle         │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - **Time slices** are given in milliseconds and converted to ticks at
//!   creation. A task is preempted once it has run for its slice.
//! - **Selection** starts at the slot after the last selected one and goes
//!   once around the table, so every runnable task is served in turn.
//! - **Sleep** marks the caller sleeping for at least the requested time
//!   and switches away immediately.
//! - **Priorities** are recorded per task but do not influence selection.
//! - A task whose body returns lands in a guard that terminates it; it is
//!   never selected again.
//!
//! ## Memory Model
//!
//! - **No heap**: all kernel state is statically allocated
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Caller-provided stacks**: `TaskStack<N>`, 8-byte aligned
//! - **Critical sections**: `critical_section::with()` for shared state
//!
//! The scheduling core (`scheduler`, `dispatch`, `context`) has no
//! hardware dependency and is exercised on the host against a simulated
//! machine; only `kernel` and `arch::cortex_m4` are target-specific.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod task;
pub mod stack;
pub mod context;
pub mod scheduler;
pub mod dispatch;
pub mod arch;
pub mod sync;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;

pub use error::Error;
pub use scheduler::Scheduler;
pub use stack::{StackRegion, TaskStack};
pub use task::{Priority, TaskId, TaskState};
