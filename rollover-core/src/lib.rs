//! Rollover Core
//!
//! Core types shared by the rollover runtime client and the runner.
//!
//! This crate contains:
//! - Domain types: services, the service allow-list, observed containers
//! - DTOs: wire shapes returned by the container runtime, decoded into domain types

pub mod domain;
pub mod dto;
