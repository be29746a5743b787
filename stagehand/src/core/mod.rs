//! Deterministic, pure logic shared by the phase executor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod containment;
pub mod limits;
pub mod quality;
pub mod workflow;
