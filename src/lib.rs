//! Solobuild: a single-flight build orchestrator.
//!
//! Solobuild accepts build requests naming a branch for each of two source
//! repositories, runs a fixed fetch, build and package pipeline for one
//! request at a time and keeps a durable record of every task, stage log
//! and artifact.
//!
//! # Architecture
//!
//! Solobuild follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, processes,
//!   filesystem)
//!
//! # Modules
//!
//! - [`build`]: Task lifecycle, pipeline execution and the engine facade
//! - [`config`]: Engine configuration loaded from TOML
//! - [`telemetry`]: Log subscriber setup for binaries

pub mod build;
pub mod config;
pub mod telemetry;
