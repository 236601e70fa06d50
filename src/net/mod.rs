//! Remote API access: wire types and the HTTP client.

pub mod api;
pub mod types;
