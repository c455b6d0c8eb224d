//! # Synchronization Primitives
//!
//! Every read-modify-write of scheduler state (task states, sleep counters,
//! the tick clock) happens inside a critical section, so the timer tick
//! never observes a half-updated TCB.
//!
//! On the target the `critical-section` implementation comes from
//! `cortex-m` (`critical-section-single-core`: PRIMASK masking). Host tests
//! link the `std` implementation instead.

pub use critical_section::{CriticalSection, Mutex};

/// Run `f` with interrupts masked, restoring the previous mask afterwards.
///
/// Nests safely: an inner section inside an outer one leaves interrupts
/// masked until the outer section ends. The tick is held off for the whole
/// closure.
///
/// ```ignore
/// static STATE: Mutex<RefCell<u32>> = Mutex::new(RefCell::new(0));
/// sync::critical_section(|cs| *STATE.borrow_ref_mut(cs) += 1);
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
