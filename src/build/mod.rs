//! Single-flight build orchestration.
//!
//! A build task fetches and builds two source trees in sequence, packages
//! the resulting file and records an artifact. At most one task runs at a
//! time across every process that shares the lock. The module follows
//! hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
