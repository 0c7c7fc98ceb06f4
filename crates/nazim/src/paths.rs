//! Directory layout for everything nazim reads or writes.
//!
//! # Defaults
//!
//! ```text
//! config dir:    $XDG_CONFIG_HOME/nazim   (Windows: %APPDATA%\nazim, else ~/.config/nazim)
//! service store: <config dir>/services.yaml
//! scripts:       <config dir>/scripts
//! logs:          <config dir>/logs
//! wrappers:      <config dir>/wrappers
//! systemd units: $XDG_CONFIG_HOME/systemd/user (else ~/.config/systemd/user)
//! launchd plist: ~/Library/LaunchAgents
//! ```

use std::path::{Path, PathBuf};

use super::*;

/// Name used for nazim's own directories.
pub const APP_NAME: &str = "nazim";

/// Resolved directories used by the store and the adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
  /// Root of nazim's own configuration
  pub config_dir:        PathBuf,
  /// Scripts created through the interactive editor
  pub scripts_dir:       PathBuf,
  /// Per-service output logs and nazim's diagnostic log
  pub log_dir:           PathBuf,
  /// Generated Windows logging wrappers
  pub wrapper_dir:       PathBuf,
  /// Per-user systemd unit directory
  pub systemd_user_dir:  PathBuf,
  /// Per-user launchd agent directory
  pub launch_agents_dir: PathBuf,
}

impl Paths {
  /// Resolves the default layout from the environment.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::IO`] if no home directory can be determined.
  pub fn from_env() -> Result<Self, NazimError> {
    let home = dirs::home_dir().ok_or_else(|| {
      std::io::Error::new(std::io::ErrorKind::NotFound, "unable to determine home directory")
    })?;
    let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from).filter(|p| p.is_absolute());

    let config_base = match &xdg {
      Some(dir) => dir.clone(),
      None if cfg!(windows) => dirs::config_dir().unwrap_or_else(|| home.clone()),
      None => home.join(".config"),
    };
    let systemd_base = xdg.unwrap_or_else(|| home.join(".config"));

    Ok(Self::with_dirs(
      config_base.join(APP_NAME),
      systemd_base.join("systemd").join("user"),
      home.join("Library").join("LaunchAgents"),
    ))
  }

  /// Places every directory under `root`. Used to sandbox tests.
  pub fn rooted(root: impl AsRef<Path>) -> Self {
    let root = root.as_ref();
    Self::with_dirs(
      root.join(APP_NAME),
      root.join("systemd").join("user"),
      root.join("Library").join("LaunchAgents"),
    )
  }

  fn with_dirs(config_dir: PathBuf, systemd_user_dir: PathBuf, launch_agents_dir: PathBuf) -> Self {
    Self {
      scripts_dir: config_dir.join("scripts"),
      log_dir: config_dir.join("logs"),
      wrapper_dir: config_dir.join("wrappers"),
      config_dir,
      systemd_user_dir,
      launch_agents_dir,
    }
  }

  /// The YAML service store.
  pub fn config_file(&self) -> PathBuf { self.config_dir.join("services.yaml") }

  /// Output log for a normalized service name with the given extension.
  pub fn service_log(&self, safe_name: &str, extension: &str) -> PathBuf {
    self.log_dir.join(format!("{safe_name}.{extension}"))
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn test_rooted_layout() {
    let dir = tempdir().unwrap();
    let paths = Paths::rooted(dir.path());
    assert_eq!(paths.config_file(), dir.path().join("nazim").join("services.yaml"));
    assert_eq!(paths.scripts_dir, dir.path().join("nazim").join("scripts"));
    assert_eq!(paths.service_log("backup", "log"), dir.path().join("nazim/logs/backup.log"));
    assert!(paths.systemd_user_dir.ends_with("systemd/user"));
    assert!(paths.launch_agents_dir.ends_with("Library/LaunchAgents"));
  }

  #[test]
  fn test_from_env_is_absolute() {
    let paths = Paths::from_env().unwrap();
    assert!(paths.config_dir.is_absolute());
    assert!(paths.config_dir.ends_with(APP_NAME));
  }
}
