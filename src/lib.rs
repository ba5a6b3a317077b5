//! mcp-cache library
//!
//! Unified caching layer: memory, file and Redis backends behind one
//! manager, function memoization and a response cache for upstream AI
//! calls.

// Lets `#[memoized]` expansions name `::mcp_cache::...` from inside this crate too.
extern crate self as mcp_cache;

pub mod cache;
pub mod cli;
pub mod config;
pub mod logger;

pub use cache::{CacheManager, memoized};

pub fn pkg_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
