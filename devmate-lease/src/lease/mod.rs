//! Device lease coordination.
//!
//! [`transition`] decides what a device becomes under an [`Action`].
//! [`TransitionCoordinator`] makes the read-decide-write sequence atomic per
//! device name, and [`LeaseService`] exposes the operations callers use.

mod coordinator;
mod machine;
mod service;

#[cfg(test)]
mod tests;

pub use coordinator::TransitionCoordinator;
pub use machine::{transition, Action, Next};
pub use service::LeaseService;
