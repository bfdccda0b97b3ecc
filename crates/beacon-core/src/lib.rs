//! beacon-core — shared types, status codes, configuration and jitter.
//! All other Beacon crates depend on this one.

pub mod config;
pub mod endpoint;
pub mod jitter;
pub mod status;

pub use endpoint::{EndpointIdentity, EndpointParseError, EndpointRecord, Transport};
pub use jitter::Jitter;
pub use status::StatusCode;
