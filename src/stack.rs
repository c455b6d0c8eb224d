//! # Task Stacks
//!
//! Stack memory is supplied by the application as `&'static mut TaskStack<N>`
//! and handed to the scheduler as a [`StackRegion`]. Building the initial
//! frame is the only place a task stack is written outside a context switch.

use crate::config::MIN_STACK_WORDS;
use crate::context::{self, Registers, CONTEXT_WORDS};
use crate::task::{TaskEnd, TaskEntry};

/// Stack memory for one task, `N` 32-bit words, aligned to 8 bytes as
/// required by the AAPCS.
///
/// `N` below [`MIN_STACK_WORDS`] is rejected at compile time: a stack that
/// cannot hold the initial frame would corrupt adjacent memory before any
/// runtime check could run.
///
/// ```
/// use brtos::TaskStack;
///
/// static STACK: TaskStack<64> = TaskStack::new();
/// ```
///
/// ```compile_fail
/// use brtos::TaskStack;
///
/// // Too small for the initial context frame.
/// static STACK: TaskStack<8> = TaskStack::new();
/// ```
#[repr(C, align(8))]
pub struct TaskStack<const N: usize> {
    words: [u32; N],
}

impl<const N: usize> TaskStack<N> {
    const FITS_CONTEXT: () = assert!(
        N >= MIN_STACK_WORDS,
        "task stack smaller than MIN_STACK_WORDS"
    );

    pub const fn new() -> Self {
        let () = Self::FITS_CONTEXT;
        Self { words: [0; N] }
    }
}

impl<const N: usize> Default for TaskStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A task's stack memory: base address and length in words.
#[derive(Debug)]
pub struct StackRegion {
    base: *mut u32,
    words: usize,
}

impl StackRegion {
    pub(crate) const EMPTY: Self = Self {
        base: core::ptr::null_mut(),
        words: 0,
    };

    /// Lowest address of the region.
    #[inline]
    pub fn base(&self) -> *mut u32 {
        self.base
    }

    #[inline]
    pub fn len_words(&self) -> usize {
        self.words
    }

    /// One past the highest word, aligned down to 8 bytes. The stack grows
    /// down from here.
    pub fn top(&self) -> *mut u32 {
        let end = self.base.wrapping_add(self.words) as usize;
        let aligned = end & !0x07;
        self.base.wrapping_add((aligned - self.base as usize) / 4)
    }

    /// True if `sp` lies within the region (the top included).
    pub fn contains(&self, sp: *const u32) -> bool {
        let sp = sp as usize;
        sp >= self.base as usize && sp <= self.base.wrapping_add(self.words) as usize
    }

    /// Write the image a first dispatch restores from and return the stack
    /// pointer to record in the TCB.
    ///
    /// The frame is pushed with the same routine the context switch uses,
    /// so starting a task is indistinguishable from resuming one that was
    /// interrupted just before its first instruction: R0 holds `arg`, PC the
    /// entry point, LR the task-end guard and every other register zero.
    pub fn build_initial_frame(
        &mut self,
        entry: TaskEntry,
        arg: u32,
        task_end: TaskEnd,
    ) -> *mut u32 {
        debug_assert!(self.words >= CONTEXT_WORDS + 1);
        let regs = Registers::initial(entry, arg, task_end);
        // SAFETY: the region is exclusively owned ('static mut borrow taken
        // in `From`) and at least MIN_STACK_WORDS long, so the frame below
        // `top()` is in bounds.
        unsafe { context::save_context(self.top(), &regs) }
    }
}

impl<const N: usize> From<&'static mut TaskStack<N>> for StackRegion {
    fn from(stack: &'static mut TaskStack<N>) -> Self {
        Self {
            base: stack.words.as_mut_ptr(),
            words: N,
        }
    }
}
