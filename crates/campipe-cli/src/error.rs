// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// Capture, scaler or display device not found or inaccessible
    DeviceNotFound(String),
    /// Hardware memory allocation failed
    AllocationFailed(String),
    /// Display plane selection or update failed
    DisplayError(String),
    /// General error from the pipeline library
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            CliError::AllocationFailed(msg) => write!(f, "Allocation failed: {}", msg),
            CliError::DisplayError(msg) => write!(f, "Display error: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::InvalidArgs(_) => ExitCode::from(2),
            CliError::DeviceNotFound(_) => ExitCode::from(3),
            CliError::AllocationFailed(_) => ExitCode::from(4),
            CliError::DisplayError(_) => ExitCode::from(5),
            CliError::General(_) => ExitCode::from(1),
        }
    }
}

/// Map campipe::Error to CliError with appropriate exit codes
impl From<campipe::Error> for CliError {
    fn from(err: campipe::Error) -> Self {
        use campipe::Error;

        match err {
            Error::NoDevice(what) => CliError::DeviceNotFound(what),
            Error::AllocationFailure => {
                CliError::AllocationFailed("hardware memory exhausted".to_string())
            }
            Error::NoMatchingPlane => {
                CliError::DisplayError("no matching video overlay plane".to_string())
            }
            Error::UnsupportedFormat(fourcc) => {
                CliError::InvalidArgs(format!("unsupported pixel format: {}", fourcc))
            }
            Error::UnsupportedConversion(fourcc) => {
                CliError::InvalidArgs(format!("format {} has no scaler mapping", fourcc))
            }
            Error::InvalidFormat(what) => CliError::General(what),
            Error::LibraryNotLoaded(lib_err) => {
                CliError::General(format!("failed to load vendor library: {}", lib_err))
            }
            Error::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::NotFound => {
                    CliError::DeviceNotFound(format!("device not found: {}", io_err))
                }
                std::io::ErrorKind::PermissionDenied => {
                    CliError::DeviceNotFound(format!("permission denied: {}", io_err))
                }
                _ => CliError::General(format!("I/O error: {}", io_err)),
            },

            // Catch-all for any future error variants (non-exhaustive enum)
            _ => CliError::General(format!("unexpected error: {}", err)),
        }
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
