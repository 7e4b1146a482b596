//! Deterministic, pure logic shared by the generator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! buffers and manifests and return deterministic outputs suitable for tests.

pub mod anchor;
pub mod buffer;
pub mod manifest;
pub mod naming;
pub mod ops;
pub mod shell;
