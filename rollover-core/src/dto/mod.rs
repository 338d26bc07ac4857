//! Data Transfer Objects for container runtime responses
//!
//! DTOs mirror the JSON the runtime actually returns (Engine API bodies and
//! CLI output lines) and convert into the domain types in [`crate::domain`].

pub mod container;
