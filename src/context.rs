//! # Execution Context
//!
//! The register image that fully determines where a suspended task resumes,
//! and the push/pop routines that move it between the register file and a
//! task stack.
//!
//! ## Frame Layout (word offsets from the saved stack pointer)
//!
//! ```text
//! high addr  15  xPSR   ┐
//!            14  PC     │
//!            13  LR     │ hardware frame (stacked by exception entry)
//!            12  R12    │
//!          8..12 R0–R3  ┘
//!          0..8  R4–R11 ─ software frame (stacked by the dispatcher)
//! low addr              <- saved stack pointer
//! ```
//!
//! On Cortex-M4 the hardware half is pushed by exception entry and popped by
//! exception return; `arch::cortex_m4` performs the software half in
//! assembly. [`save_context`] and [`restore_context`] perform the whole frame
//! and are the reference for both the initial stack image and the simulated
//! machine. They must stay symmetric: every word pushed is popped in the same
//! count and reverse order.

use crate::task::{TaskEnd, TaskEntry};

/// Words pushed by the dispatcher (R4–R11).
pub const SOFTWARE_FRAME_WORDS: usize = 8;

/// Words pushed by exception entry (R0–R3, R12, LR, PC, xPSR).
pub const HARDWARE_FRAME_WORDS: usize = 8;

/// Size of a complete saved context.
pub const CONTEXT_WORDS: usize = SOFTWARE_FRAME_WORDS + HARDWARE_FRAME_WORDS;

/// Initial program status: Thumb state, nothing else.
pub const INITIAL_XPSR: u32 = 0x0100_0000;

/// Bit 0 of a Thumb code address. Set in function pointers and in LR, but
/// must be clear in a stacked PC: exception return loads it verbatim and
/// Thumb state comes from xPSR.T instead.
pub const THUMB_BIT: u32 = 1;

/// Word offsets of individual registers within a saved frame.
pub mod frame {
    pub const R4: usize = 0;
    pub const R11: usize = 7;
    pub const R0: usize = 8;
    pub const R3: usize = 11;
    pub const R12: usize = 12;
    pub const LR: usize = 13;
    pub const PC: usize = 14;
    pub const XPSR: usize = 15;
}

/// Snapshot of the register set shared by all tasks.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    /// General-purpose registers R0–R12.
    pub r: [u32; 13],
    /// Link register. Holds the task-end guard in a fresh frame.
    pub lr: u32,
    /// Program counter at which the task resumes.
    pub pc: u32,
    /// Program status register.
    pub xpsr: u32,
}

impl Registers {
    /// Register contents for a task that has never run: R0 carries the
    /// entry argument, PC the entry point and LR the task-end guard, so a
    /// returning body falls into the guard.
    ///
    /// PC holds the entry address with the Thumb bit cleared; LR keeps it,
    /// since the body returns through `bx lr`.
    pub fn initial(entry: TaskEntry, arg: u32, task_end: TaskEnd) -> Self {
        let mut regs = Self::default();
        regs.r[0] = arg;
        // Code addresses are 32 bits wide on the target.
        regs.lr = task_end as usize as u32;
        regs.pc = entry as usize as u32 & !THUMB_BIT;
        regs.xpsr = INITIAL_XPSR;
        regs
    }
}

/// Push `regs` onto the full-descending stack ending at `sp` and return
/// the new stack pointer, which is what gets recorded in the outgoing TCB.
///
/// # Safety
/// The `CONTEXT_WORDS` words directly below `sp` must be valid for writes
/// and owned by the task whose context is being saved.
pub unsafe fn save_context(sp: *mut u32, regs: &Registers) -> *mut u32 {
    let hardware = [
        regs.xpsr, regs.pc, regs.lr, regs.r[12], regs.r[3], regs.r[2], regs.r[1], regs.r[0],
    ];

    let mut sp = sp;
    for word in hardware.into_iter().chain(regs.r[4..12].iter().rev().copied()) {
        sp = sp.sub(1);
        sp.write_volatile(word);
    }
    sp
}

/// Pop a saved context starting at `sp`. Returns the registers and the
/// stack pointer the task resumes with (just above the frame).
///
/// # Safety
/// `sp` must point at a frame produced by [`save_context`] (or the initial
/// image built from it) that is still intact.
pub unsafe fn restore_context(sp: *mut u32) -> (Registers, *mut u32) {
    let mut regs = Registers::default();
    let mut sp = sp;
    let mut pop = || {
        let word = sp.read_volatile();
        sp = sp.add(1);
        word
    };

    for slot in regs.r[4..12].iter_mut() {
        *slot = pop();
    }
    for index in [0, 1, 2, 3, 12] {
        regs.r[index] = pop();
    }
    regs.lr = pop();
    regs.pc = pop();
    regs.xpsr = pop();

    (regs, sp)
}
