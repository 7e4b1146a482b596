//! Stable exit codes for groundwork CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, a failed scaffold generator, or other errors.
pub const INVALID: i32 = 1;
/// A manifest step failed and the pipeline aborted; the tree is left as is.
pub const ABORTED: i32 = 2;
