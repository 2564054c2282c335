//! Bound Token Trust Controller Library
//!
//! Core functionality for the Bound Token Trust Controller: the signing key
//! rotation and issuer trust controllers, the resource client they write
//! through, and the runtime that schedules them.
//! Tests are included in the module files (e.g., controller/issuer/mod.rs).

pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod crypto;
pub mod error;
pub mod events;
pub mod observability;
pub mod runtime;
pub mod server;

// Re-export CRD types for convenience
pub use crd::*;
pub use error::{Error, Result};
