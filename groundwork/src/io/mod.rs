//! Side-effecting helpers: filesystem, assets, templates and subprocesses.

pub mod assets;
pub mod config;
pub mod process;
pub mod runner;
pub mod templates;
pub mod tree;
