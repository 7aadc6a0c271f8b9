//! Stable exit codes for sidecheck CLI commands.

/// Command succeeded; for `sidecheck scan`, every type is permitted.
pub const OK: i32 = 0;
/// Command failed due to invalid arguments, config or unreadable inputs.
pub const INVALID: i32 = 1;
/// `sidecheck scan` found at least one type not permitted on the side.
pub const EXCLUDED: i32 = 2;
