// Error types for the vocal trainer
//
// Training errors are user-facing and recoverable at the session boundary;
// library errors flag defects in authored reference data and surface at load.

mod library;
mod training;

pub use library::{log_library_error, LibraryError, LibraryErrorCodes};
pub use training::{log_training_error, TrainingError, TrainingErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so callers (CLI, HTTP, UI bridges) can map
/// failures without matching on variants.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
