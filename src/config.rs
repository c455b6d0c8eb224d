//! # BRTOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; nothing is allocated dynamically.

use crate::context::CONTEXT_WORDS;

/// Maximum number of tasks the TCB table can hold. Creation beyond this
/// returns [`Error::CapacityExceeded`](crate::Error::CapacityExceeded).
pub const MAX_TASKS: usize = 5;

/// Number of priority classes a task can be tagged with. Recorded in the
/// TCB only; the round-robin selector never consults it.
pub const MAX_PRIORITY_LEVELS: usize = 8;

/// SysTick frequency in Hz (one tick every 0.5 ms). Time slices and sleep
/// durations are given in milliseconds and converted with this rate.
pub const TICK_HZ: u32 = 2000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Minimum per-task stack size in 32-bit words. Must hold the initial
/// context frame plus the deepest call chain of the task body.
pub const MIN_STACK_WORDS: usize = 64;

// The initial frame plus one word of alignment slack must always fit.
const _: () = assert!(MIN_STACK_WORDS >= CONTEXT_WORDS + 1);
const _: () = assert!(SYSTEM_CLOCK_HZ % TICK_HZ == 0);
