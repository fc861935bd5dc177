//! Data model
//!
//! Requests, roles and host descriptors shared by every kubeprov crate.

mod host;
mod request;
mod role;

// Re-exports
pub use host::*;
pub use request::*;
pub use role::*;
