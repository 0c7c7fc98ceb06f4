//! Error types for the nazim library.
//!
//! A single error enum covers every failure the adapter layer can report:
//! - Descriptor validation
//! - Missing native tools (`schtasks`, `systemctl`, `launchctl`)
//! - Tasks that are absent from the native scheduler
//! - Privilege elevation on Windows
//! - Native tools exiting with output we do not recognise
//!
//! # Examples
//!
//! ```no_run
//! use nazim::{errors::NazimError, platform};
//!
//! # fn example() -> Result<(), NazimError> {
//! let manager = platform::for_current_os(&nazim::paths::Paths::from_env()?)?;
//! match manager.state("backup") {
//!   Ok(state) => println!("backup is {state:?}"),
//!   Err(e) if e.is_not_found() => println!("backup is not installed"),
//!   Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Errors that can occur while managing scheduled services.
#[derive(Error, Debug)]
pub enum NazimError {
  /// The service descriptor failed validation.
  ///
  /// Raised before any native call is made and never retried. The string
  /// describes the offending field.
  #[error("invalid service: {0}")]
  InvalidService(String),

  /// A command or argument cannot be embedded safely in a native definition.
  ///
  /// Returned by the systemd escaper when a token contains a newline or
  /// carriage return, or when the command path cannot be resolved.
  #[error("invalid command: {0}")]
  InvalidCommand(String),

  /// The native control tool is missing or unusable on this machine.
  #[error("{tool} is not available: {reason}")]
  ToolUnavailable {
    /// The tool that was probed
    tool:   String,
    /// Why the probe failed
    reason: String,
  },

  /// The task, unit or agent does not exist in the native scheduler.
  ///
  /// The string parameter carries the native identifier that was looked up.
  #[error("service not found: {0}")]
  NotFound(String),

  /// The user declined the elevation prompt.
  #[error("elevation was cancelled or denied, approve the UAC prompt to continue")]
  ElevationDeclined,

  /// The elevation mechanism itself failed.
  #[error("failed to request elevation: {0}")]
  Elevation(String),

  /// The elevated child process ran but reported failure.
  #[error("elevated process exited with code {0}")]
  ElevatedChildFailed(i32),

  /// A native tool exited unsuccessfully with output we do not recognise.
  ///
  /// `output` is the combined stdout and stderr, preserved verbatim.
  #[error("{tool} {args} failed: {output}")]
  ToolFailed {
    /// The program that was run
    tool:   String,
    /// Its arguments joined by spaces
    args:   String,
    /// Combined stdout and stderr
    output: String,
  },

  /// There is no adapter for the running operating system.
  #[error("unsupported OS: {0}")]
  UnsupportedPlatform(String),

  /// The interval cannot be expressed by the native scheduler.
  #[error("unsupported interval: {0}")]
  UnsupportedInterval(String),

  /// A service with this name is already in the store.
  #[error("service {0} already exists")]
  ServiceExists(String),

  /// No service with this name is in the store.
  #[error("service {0} does not exist")]
  UnknownService(String),

  /// File system and process spawning errors.
  #[error(transparent)]
  IO(#[from] std::io::Error),

  /// The service store could not be parsed or serialized.
  #[error(transparent)]
  Yaml(#[from] serde_yaml::Error),
}

impl NazimError {
  /// Whether this error means the native scheduler has no such task.
  pub fn is_not_found(&self) -> bool { matches!(self, NazimError::NotFound(_)) }

  /// Whether this error was raised by descriptor or command validation.
  ///
  /// Validation errors are rejected before any native call is made.
  pub fn is_validation_error(&self) -> bool {
    matches!(
      self,
      NazimError::InvalidService(_)
        | NazimError::InvalidCommand(_)
        | NazimError::UnsupportedInterval(_)
    )
  }

  /// Builds a [`NazimError::ToolFailed`] from a program, its arguments and
  /// the raw output it produced.
  pub(crate) fn tool_failed(tool: &str, args: &[&str], output: impl Into<String>) -> Self {
    NazimError::ToolFailed {
      tool:   tool.to_string(),
      args:   args.join(" "),
      output: output.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_predicates() {
    assert!(NazimError::NotFound("nazim-x".into()).is_not_found());
    assert!(!NazimError::ElevationDeclined.is_not_found());
    assert!(NazimError::InvalidService("empty".into()).is_validation_error());
    assert!(NazimError::InvalidCommand("newline".into()).is_validation_error());
    assert!(!NazimError::NotFound("x".into()).is_validation_error());
  }

  #[test]
  fn test_tool_failed_keeps_output() {
    let err = NazimError::tool_failed("schtasks", &["/run", "/tn", "Nazim_x"], "ERROR: boom\r\n");
    match &err {
      NazimError::ToolFailed { tool, args, output } => {
        assert_eq!(tool, "schtasks");
        assert_eq!(args, "/run /tn Nazim_x");
        assert_eq!(output, "ERROR: boom\r\n");
      },
      other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().starts_with("schtasks /run /tn Nazim_x failed: ERROR: boom"));
  }
}
