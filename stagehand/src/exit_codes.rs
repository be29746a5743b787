//! Stable exit codes for stagehand commands.

/// Command succeeded, or the phase advanced its item.
pub const OK: i32 = 0;
/// Bad arguments, missing item, unreadable config, or another unexpected error.
pub const INVALID: i32 = 1;
/// The phase ran but did not advance its item; the reason is recorded as `last_error`.
pub const PHASE_FAILED: i32 = 2;
