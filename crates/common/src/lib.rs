//! Shared error definitions and readiness state owners used across all tether crates.

pub mod error;
pub mod readiness;

pub use {
    error::{Error, Result},
    readiness::{Capability, ReadinessFlags, ReadinessHandle, ReadinessOwner, ReadinessSet},
};
