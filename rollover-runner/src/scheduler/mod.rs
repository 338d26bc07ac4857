//! Rollover scheduling
//!
//! Two long-lived loops share one [`ScheduleRegistry`]:
//! - [`DiscoveryLoop`] keeps each service's container membership current and
//!   resets its schedule when membership drifts
//! - [`RolloverWorker`] restarts the head container of every due service and
//!   rotates it to the tail
//!
//! The registry lock serializes them: discovery never rewrites the schedule
//! while a worker pass is in progress.

pub mod discovery;
pub mod ordering;
pub mod registry;
pub mod worker;

pub use discovery::DiscoveryLoop;
pub use registry::{ScheduleRegistry, Timing};
pub use worker::RolloverWorker;
