//! playguard-common - shared types for the Playguard daemon
//!
//! Data model, event bus, configuration, and the common error type used by
//! the monitor daemon and its review API.

pub mod config;
pub mod error;
pub mod events;
pub mod model;

pub use error::{Error, Result};
