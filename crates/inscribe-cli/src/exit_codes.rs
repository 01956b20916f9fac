//! Process exit codes. Part of the public contract for scripts that drive `inscribe`.

use inscribe_core::PackError;

pub const SUCCESS: i32 = 0;
pub const INTEGRITY_FAILURE: i32 = 1; // Hash/canonicalization/compression failure
pub const INPUT_ERROR: i32 = 2; // Bad catalog, config or arguments
pub const IO_ERROR: i32 = 3; // Artifact or manifest could not be read/written

/// Map an error chain to an exit code, preferring the typed pipeline error.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.chain().find_map(|e| e.downcast_ref::<PackError>()) {
        Some(pack) => pack.exit_code(),
        None => INPUT_ERROR,
    }
}
