//! Step definitions for build cancellation scenarios.

mod given;
mod then;
mod when;
pub mod world;
