//! CLI Exit Code Registry
//!
//! Single source of truth for `pwarecon` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | Usage error (bad args)                               |
//! | 3    | Cannot read or write a file                          |
//! | 4    | Records or overrides file could not be parsed        |
//! | 5    | Invalid config                                       |
//! | 6    | `--strict` and a subject failed quality checks       |
//!
//! New codes: add the constant, document what triggers it, update the table.

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unsupported input format.
pub const EXIT_USAGE: u8 = 2;

/// Input or output file could not be read or written.
pub const EXIT_IO: u8 = 3;

/// Records or manual overrides are malformed.
pub const EXIT_INPUT_PARSE: u8 = 4;

/// Config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 5;

/// Quality checks flagged a subject and `--strict` was given.
pub const EXIT_QUALITY_FLAGGED: u8 = 6;

use pwa_recon::ReconError;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::MissingColumn { .. }
        | ReconError::InvalidRecord { .. }
        | ReconError::Json(_)
        | ReconError::Csv(_) => EXIT_INPUT_PARSE,
    }
}
