//! Stable exit codes for the `typecase` CLI.

use crate::result::RunResult;

/// Every target, file, test and assertion passed (or was skipped).
pub const OK: i32 = 0;
/// Something failed or errored during the run.
pub const FAILED: i32 = 1;
/// Invalid configuration or usage; nothing ran.
pub const INVALID: i32 = 2;

pub fn for_result(result: Option<&RunResult>) -> i32 {
    match result {
        Some(result) if !result.has_failures() => OK,
        _ => FAILED,
    }
}
