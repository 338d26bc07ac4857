//! Core domain types
//!
//! These types describe what the runner observes and manages: the fixed set of
//! logical services it was told about, and the containers the runtime reports
//! for them. Containers are never owned here, only observed.

pub mod container;
pub mod service;
