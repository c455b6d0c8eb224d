//! # Kernel
//!
//! Top-level kernel initialization and public API for BRTOS.
//!
//! The kernel owns the single scheduler instance and is the only code that
//! reaches it from interrupt context. Every access goes through a critical
//! section.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         └─► kernel::run(cp, initialize)
//!               ├─► kernel::init()           ← fresh scheduler
//!               ├─► initialize()             ← application creates tasks
//!               └─► kernel::start()          ← no return
//!                     ├─► Mask interrupts, set priorities, start SysTick
//!                     ├─► Dispatch the first task
//!                     └─► arch::start_first_task()
//! ```

use core::cell::RefCell;

use crate::arch::cortex_m4::{self, CortexM4Port};
use crate::arch::Port;
use crate::config::TICK_HZ;
use crate::dispatch::Entry;
use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::stack::StackRegion;
use crate::sync::{self, Mutex};
use crate::task::{Priority, TaskEntry, TaskId};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// The process-wide scheduler. `None` until `init()`.
static KERNEL: Mutex<RefCell<Option<Scheduler>>> = Mutex::new(RefCell::new(None));

/// Run `f` on the scheduler inside a critical section.
fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Result<R, Error> {
    sync::critical_section(|cs| {
        KERNEL
            .borrow_ref_mut(cs)
            .as_mut()
            .map(f)
            .ok_or(Error::NotInitialized)
    })
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel with an empty task table running at `TICK_HZ`.
///
/// Must be called before any other kernel function, from the main thread.
pub fn init() {
    sync::critical_section(|cs| {
        KERNEL
            .borrow_ref_mut(cs)
            .replace(Scheduler::new(TICK_HZ, task_end));
    });
}

/// Create a new task. Only valid before `start()`.
///
/// # Parameters
/// - `entry`: task body; receives 0 as its argument.
/// - `stack`: the task's stack, e.g. from `cortex_m::singleton!`.
/// - `time_slice_ms`: maximum continuous run time before rotation.
/// - `priority`: recorded, not used for scheduling.
///
/// # Example
/// ```ignore
/// let stack = cortex_m::singleton!(: TaskStack<128> = TaskStack::new()).unwrap();
/// kernel::create_task(producer, stack.into(), 10, Priority::P1)?;
/// ```
pub fn create_task(
    entry: TaskEntry,
    stack: StackRegion,
    time_slice_ms: u32,
    priority: Priority,
) -> Result<TaskId, Error> {
    with_scheduler(|s| s.create_task(entry, stack, time_slice_ms, priority))?
}

/// Create a new task whose body receives `arg`.
pub fn create_task_with_arg(
    entry: TaskEntry,
    arg: u32,
    stack: StackRegion,
    time_slice_ms: u32,
    priority: Priority,
) -> Result<TaskId, Error> {
    with_scheduler(|s| s.create_task_with_arg(entry, arg, stack, time_slice_ms, priority))?
}

/// Start scheduling. **Does not return.**
///
/// Interrupts stay masked from here until the first task is launched, so
/// no tick can arrive while Thread mode is still on the main stack.
///
/// Loops forever if `init()` was never called.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    cortex_m::interrupt::disable();

    let Ok(tick_hz) = with_scheduler(|s| s.tick_hz()) else {
        loop {
            cortex_m::asm::wfi();
        }
    };
    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);
    cortex_m4::configure_systick(&mut core_peripherals.SYST, tick_hz);

    // Idles inside the dispatcher until some task is ready.
    let first = with_scheduler(|s| s.start(&mut CortexM4Port));
    match first {
        Ok(resume) => unsafe { cortex_m4::start_first_task(resume.stack_pointer) },
        Err(_) => loop {
            cortex_m::asm::wfi();
        },
    }
}

/// Initialize, let the application create its tasks, start scheduling.
///
/// `initialize` is called exactly once, after the core is set up and
/// before any task runs.
pub fn run(core_peripherals: cortex_m::Peripherals, initialize: fn()) -> ! {
    init();
    initialize();
    start(core_peripherals)
}

/// Suspend the calling task for at least `duration_ms`.
///
/// Only valid from a running task. Returns once the task has been
/// rescheduled after the sleep expired.
pub fn sleep(duration_ms: u32) {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        if let Some(s) = kernel.as_mut() {
            if s.sleep_current(duration_ms).is_some() {
                // Pended inside the same critical section, so no tick can
                // slip in between the state change and the switch.
                cortex_m4::request_dispatch();
            }
        }
    });
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Ticks processed since the scheduler started.
pub fn ticks() -> u64 {
    with_scheduler(|s| s.ticks()).unwrap_or(0)
}

/// The task currently running, if any.
pub fn current_task() -> Option<TaskId> {
    with_scheduler(|s| s.current()).ok().flatten()
}

// ---------------------------------------------------------------------------
// Interrupt-side entry and task-end guard
// ---------------------------------------------------------------------------

/// Dispatcher entry used by the SysTick/PendSV trampolines. Returns the
/// stack pointer to restore.
///
/// The critical section covers the whole dispatch, idle iterations
/// included.
pub(crate) fn enter<P: Port>(entry: Entry, port: &mut P) -> *mut u32 {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        match (kernel.as_mut(), entry) {
            (Some(s), entry) => s.dispatch(entry, port).stack_pointer,
            (None, Entry::Tick(sp) | Entry::Voluntary(sp)) => sp,
            (None, Entry::Start) => core::ptr::null_mut(),
        }
    })
}

/// Where a task lands if its body returns: mark it terminated, hand the
/// CPU away and never run again. The stack is not reclaimed.
extern "C" fn task_end() -> ! {
    sync::critical_section(|cs| {
        if let Some(s) = KERNEL.borrow_ref_mut(cs).as_mut() {
            s.terminate_current();
        }
        cortex_m4::request_dispatch();
    });
    loop {
        cortex_m::asm::wfi();
    }
}
