//! # BRTOS Example Firmware
//!
//! Two producers and a one-shot task sharing the CPU:
//!
//! | Task | Slice | Behavior |
//! |------|-------|----------|
//! | `fast_producer` | 10 ms | Short bursts, sleeps 5 ms between them |
//! | `slow_producer` | 20 ms | Longer bursts, sleeps 10 ms between them |
//! | `one_shot` | 10 ms | Counts once and returns |
//!
//! Both producers are preempted whenever a burst outlasts their slice, and
//! the CPU idles whenever both are asleep. `one_shot` exercises the task-end
//! guard: after it returns it is never scheduled again.

#![no_std]
#![no_main]

use core::hint::black_box;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use brtos::kernel;
use brtos::{Priority, StackRegion, TaskStack};

const STACK_WORDS: usize = 256;

static FAST_COUNT: AtomicU32 = AtomicU32::new(0);
static SLOW_COUNT: AtomicU32 = AtomicU32::new(0);

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Produces in short bursts.
extern "C" fn fast_producer(burst: u32) {
    loop {
        for _ in 0..burst {
            black_box(FAST_COUNT.fetch_add(1, Ordering::Relaxed));
        }
        kernel::sleep(5);
    }
}

/// Produces in long bursts; usually runs out of slice before sleeping.
extern "C" fn slow_producer(burst: u32) {
    loop {
        for _ in 0..burst {
            black_box(SLOW_COUNT.fetch_add(1, Ordering::Relaxed));
        }
        kernel::sleep(10);
    }
}

extern "C" fn one_shot(_: u32) {
    FAST_COUNT.fetch_add(1, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Creates the tasks. Runs once, before the first task starts.
fn initialize() {
    let fast = cortex_m::singleton!(: TaskStack<STACK_WORDS> = TaskStack::new()).unwrap();
    let slow = cortex_m::singleton!(: TaskStack<STACK_WORDS> = TaskStack::new()).unwrap();
    let once = cortex_m::singleton!(: TaskStack<STACK_WORDS> = TaskStack::new()).unwrap();

    kernel::create_task_with_arg(fast_producer, 1_000, StackRegion::from(fast), 10, Priority::P1)
        .expect("Failed to create fast_producer");
    kernel::create_task_with_arg(slow_producer, 50_000, StackRegion::from(slow), 20, Priority::P1)
        .expect("Failed to create slow_producer");
    kernel::create_task(one_shot, StackRegion::from(once), 10, Priority::P1)
        .expect("Failed to create one_shot");
}

/// Firmware entry point. Does not return.
#[entry]
fn main() -> ! {
    // Take ownership of core peripherals
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::run(cp, initialize)
}
