//! Water tank monitoring core.
//!
//! Converts raw distance readings from level sensors into fill percentages,
//! drives the per-tank alarm state machine (normal / warning / critical /
//! overflow, each alarm level with an "unsafe" hysteresis sub-state) and
//! triggers irrigation side effects through the [`scheduler::Scheduler`]
//! contract when a tank enters or leaves an alarm level.
//!
//! Data flow for one reading:
//!
//! ```text
//! reading -> engine::validate -> geometry percentage -> percentage observers
//!         -> state_machine::compute_next_state -> side effects -> state observers
//! ```

pub mod engine;
pub mod error;
pub mod feed;
pub mod geometry;
pub mod monitor;
pub mod notify;
pub mod observer;
pub mod payload;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod side_effects;
pub mod state_machine;
pub mod tank;
pub mod units;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;
