//! Testability harness utilities.
//!
//! Deterministic signal generators shared by unit tests, the integration
//! suite in `tests/`, and the offline replay tooling.

pub mod signals;
