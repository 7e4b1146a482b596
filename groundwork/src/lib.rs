//! Opinionated application generator.
//!
//! Turns a freshly generated Rails scaffold into a deployable skeleton by
//! applying an ordered manifest of text and file mutations, then provisions
//! hosting environments for it. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (anchors, text edits, manifests).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, assets, process execution).
//!   Isolated behind traits to enable scripted doubles in tests.
//!
//! Orchestration modules ([`pipeline`], [`hosting`], [`recipe`], [`generate`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod generate;
pub mod hosting;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod recipe;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
