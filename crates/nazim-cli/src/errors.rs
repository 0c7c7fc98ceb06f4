//! Error types for the nazim CLI.
//!
//! Library failures, terminal prompts and file operations are wrapped transparently so the
//! message the user sees is the one the failing component produced. Bad flag combinations
//! that clap cannot express are reported as [`CliErrors::Usage`].

use thiserror::Error;

/// Errors that can occur while running a CLI command.
#[derive(Error, Debug)]
pub enum CliErrors {
  /// Errors from the nazim library
  #[error(transparent)]
  Nazim(#[from] nazim::NazimError),

  /// Errors from interactive prompts
  #[error(transparent)]
  Dialoguer(#[from] dialoguer::Error),

  /// File system and editor errors
  #[error(transparent)]
  IO(#[from] std::io::Error),

  /// A flag combination the command cannot act on
  #[error("{0}")]
  Usage(String),
}
