use crate::conversion::ConversionError;

// Exit codes for CLI automation
pub const SUCCESS: i32 = 0;
pub const ERROR: i32 = 1;
pub const NOT_FOUND: i32 = 2;
pub const INVALID_INPUT: i32 = 3;

/// Exit code for a failed conversion
pub fn conversion_exit_code(error: &ConversionError) -> i32 {
    match error {
        ConversionError::NothingToConvert(_) => INVALID_INPUT,
        ConversionError::Api(e) if e.status() == Some(404) => NOT_FOUND,
        _ => ERROR,
    }
}
