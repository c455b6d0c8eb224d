//! # Architecture Abstraction Layer
//!
//! Provides a hardware abstraction boundary for the scheduler.
//! Currently implements the Cortex-M4 port; the simulated machine used by
//! the host tests sits behind the same trait.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(test)]
pub mod sim;

/// What the dispatcher needs from the machine it runs on.
pub trait Port {
    /// Idle action taken when no task is ready. Must return once the next
    /// tick has arrived (the tick is consumed here, not delivered as a new
    /// dispatcher entry) and must be safe to repeat any number of times.
    ///
    /// Called with the dispatcher's critical section held. On Cortex-M that
    /// means PRIMASK is set for as long as every task sleeps: no application
    /// interrupt is serviced until a task becomes ready again.
    fn idle(&mut self);
}
