//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements the dispatcher entries (SysTick and PendSV), SysTick
//! configuration, the idle action and the first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers,
//!   it plays the role of the scheduler's own stack
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the process stack. Both handlers then push R4–R11, hand the resulting PSP
//! to the dispatcher, and pop R4–R11 from whatever stack pointer comes back.
//! This is the frame described in `context.rs`.
//!
//! ## Two Entries, One Dispatcher
//!
//! - **SysTick** is the tick entry (`Entry::Tick`).
//! - **PendSV** is the voluntary entry (`Entry::Voluntary`). `sleep()` and the
//!   task-end guard pend it; exception entry does the stack reshaping that
//!   makes a voluntary switch look like an interrupted task.
//!
//! Both run at the lowest priority, so neither preempts the other and the
//! dispatcher never re-enters itself.
//!
//! Assumes no FPU context (`thumbv7em-none-eabi`): EXC_RETURN is always
//! "thread mode, process stack, basic frame".

use core::arch::{asm, global_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use super::Port;
use crate::config::SYSTEM_CLOCK_HZ;
use crate::dispatch::Entry;
use crate::kernel;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire at `tick_hz` from the processor
/// clock.
pub fn configure_systick(syst: &mut SYST, tick_hz: u32) {
    let reload = SYSTEM_CLOCK_HZ / tick_hz - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority.
///
/// Equal priority keeps the two dispatcher entries from nesting, and
/// lowest priority keeps them from delaying application ISRs.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// Voluntary entry trigger
// ---------------------------------------------------------------------------

/// Pend the voluntary dispatcher entry. Called inside a critical section;
/// PendSV is taken as soon as interrupts are unmasked.
#[inline]
pub fn request_dispatch() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// Idle action
// ---------------------------------------------------------------------------

/// Idle action used from inside the dispatcher.
///
/// The dispatcher runs inside SysTick/PendSV with interrupts masked, so the
/// next tick cannot be taken as an exception: wait for it to become pending
/// and consume it here. `WFI` is not used because a pending exception of
/// the active priority is not guaranteed to wake the core.
///
/// Application interrupts stay masked (PRIMASK) for the whole idle period,
/// so their latency is bounded by the longest stretch in which all tasks
/// sleep.
pub struct CortexM4Port;

impl Port for CortexM4Port {
    fn idle(&mut self) {
        while !SCB::is_pendst_pending() {
            cortex_m::asm::nop();
        }
        SCB::clear_pendst();
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task from its saved frame. Never returns.
///
/// Pops the software frame, switches Thread mode to PSP and then unstacks
/// the hardware frame by hand, since there is no exception to return from.
/// LR receives the task-end guard, R0 the entry argument. The stacked PC is
/// kept without the Thumb bit for exception return, so it is set again here
/// before `bx`.
///
/// # Safety
/// Must be called once, with interrupts disabled, on the stack pointer the
/// dispatcher returned for the first task.
pub unsafe fn start_first_task(sp: *mut u32) -> ! {
    asm!(
        "ldmia r0!, {{r4-r11}}",    // software frame (zeros)
        "msr psp, r0",
        "movs r0, #2",              // CONTROL.SPSEL = 1: Thread mode uses PSP
        "msr control, r0",
        "isb",
        "pop {{r0-r3, r12, lr}}",   // R0 = argument, LR = task-end guard
        "pop {{r4, r5}}",           // R4 = entry point, R5 = xPSR (discarded)
        "orr r4, r4, #1",           // stacked PC has the Thumb bit clear
        "cpsie i",
        "bx r4",
        in("r0") sp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// Dispatcher entries
// ---------------------------------------------------------------------------

// Both handlers are the same trampoline around a different Rust entry:
// push R4–R11 on the PSP, call the entry with the PSP in R0, pop R4–R11
// from the returned stack pointer, return to Thread mode on the PSP.
global_asm!(
    ".section .text.SysTick,\"ax\",%progbits",
    ".global SysTick",
    ".type SysTick,%function",
    ".thumb_func",
    "SysTick:",
    "    mrs r0, psp",
    "    stmdb r0!, {{r4-r11}}",
    "    bl {tick}",
    "    ldmia r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    mvn lr, #2",               // EXC_RETURN 0xFFFFFFFD
    "    bx lr",
    ".size SysTick, . - SysTick",
    "",
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    mrs r0, psp",
    "    stmdb r0!, {{r4-r11}}",
    "    bl {voluntary}",
    "    ldmia r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    mvn lr, #2",
    "    bx lr",
    ".size PendSV, . - PendSV",
    tick = sym tick_entry,
    voluntary = sym voluntary_entry,
);

/// Timer tick: the interrupted task's context is at `sp`.
extern "C" fn tick_entry(sp: *mut u32) -> *mut u32 {
    kernel::enter(Entry::Tick(sp), &mut CortexM4Port)
}

/// Sleep or task end: the yielding task's context is at `sp`.
extern "C" fn voluntary_entry(sp: *mut u32) -> *mut u32 {
    kernel::enter(Entry::Voluntary(sp), &mut CortexM4Port)
}
