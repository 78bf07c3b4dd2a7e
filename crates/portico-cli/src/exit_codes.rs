//! Process exit codes.
//!
//! Proxy failures map through `ProxyError::exit_code`:
//! 1 configuration/manifest, 5 network, 6 cache.

pub const SUCCESS: i32 = 0;
pub const INTERNAL_ERROR: i32 = 2;
