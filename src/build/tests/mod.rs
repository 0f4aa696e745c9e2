//! Unit tests for the build module.

mod domain_tests;
mod support;
