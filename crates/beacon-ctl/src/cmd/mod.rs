//! CLI command modules.

pub mod endpoints;
pub mod http;
pub mod status;
