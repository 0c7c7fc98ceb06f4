//! Scripts written through the interactive editor.
//!
//! When a service is added with the command `write` (or `edit`), the CLI opens an editor on a
//! template from [`template`] and saves the result under the scripts directory. The saved file
//! then becomes the service's command.

use std::{fs, path::PathBuf};

use chrono::{DateTime, Local, Utc};

use super::*;

/// Commands that open the script editor instead of naming a program.
pub const EDITOR_SENTINELS: &[&str] = &["write", "edit"];

/// Whether `command` asks for an interactively written script.
pub fn is_editor_sentinel(command: &str) -> bool {
  EDITOR_SENTINELS.iter().any(|sentinel| command.eq_ignore_ascii_case(sentinel))
}

/// Script file extension for an OS identifier.
pub fn extension(os: &str) -> &'static str {
  match os {
    "windows" => "bat",
    _ => "sh",
  }
}

/// Where the script for `name` lives, e.g. `scripts/initscript.sh`.
pub fn script_path(paths: &Paths, name: &str, os: &str) -> PathBuf {
  paths.scripts_dir.join(format!("{}.{}", normalize::normalize(name), extension(os)))
}

/// Starter contents for a new script.
pub fn template(name: &str, os: &str, now: DateTime<Local>) -> String {
  match os {
    "windows" => {
      let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string());
      format!(
        "@echo off\r\nREM Service: {name}\r\nREM Created: {} (Local) / {} (UTC)\r\nREM Created \
         by: {user}\r\n\r\nREM Your code here:\r\n\r\nexit /b 0\r\n",
        now.format("%Y-%m-%d %H:%M:%S %Z"),
        now.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S UTC"),
      )
    },
    _ => format!(
      "#!/bin/sh\n# Service: {name}\n# Created: {}\n\n# Your code here:\n\nexit 0\n",
      now.format("%Y-%m-%d %H:%M:%S")
    ),
  }
}

/// Starter contents for a new script created now.
pub fn fresh_template(name: &str, os: &str) -> String { template(name, os, Local::now()) }

/// Whether a previously written, non-empty script exists at `path`.
///
/// An elevated re-launch of `add` finds the script its unelevated parent already wrote and
/// reuses it instead of opening the editor a second time.
pub fn is_reusable(path: &std::path::Path) -> bool {
  fs::metadata(path).map(|meta| meta.is_file() && meta.len() > 0).unwrap_or(false)
}

/// Writes a script and makes it executable on Unix.
pub fn save(path: &std::path::Path, contents: &str) -> Result<(), NazimError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(path, contents)?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
  }
  tracing::debug!("Saved script {}", path.display());
  Ok(())
}
