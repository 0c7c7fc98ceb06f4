//! Native scheduler adapters behind one interface.
//!
//! Each supported OS gets a [`ServiceManager`] that speaks its own control tool:
//! - [`windows`] drives Task Scheduler through `schtasks`, elevating through UAC when needed
//! - [`linux`] writes per-user systemd units and drives them with `systemctl --user`
//! - [`macos`] writes per-user LaunchAgents plists and drives them with `launchctl`
//!
//! All three are compiled on every platform so they can be exercised against a fake
//! [`CommandRunner`]; only the selection in [`for_current_os`] depends on the host.
//!
//! # State model
//!
//! ```text
//!          install
//! (absent) -------> installed + enabled
//! installed + enabled  --disable--> installed + disabled
//! installed + disabled --enable-->  installed + enabled
//! installed + *        --uninstall--> (absent)
//! ```
//!
//! `run` fires the task immediately from either installed state without changing it.
//! `install` is idempotent: an existing definition with the same name is removed first.

use super::*;

pub mod linux;
pub mod macos;
pub mod windows;

pub use linux::SystemdManager;
pub use macos::LaunchdManager;
pub use windows::WindowsManager;

/// Result of an adapter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T = ()> {
  /// The operation ran in this process.
  Done(T),
  /// The operation was handed to an elevated copy of this process, which already performed it.
  ///
  /// Callers must not repeat the work or report it a second time.
  Elevated,
}

impl<T> Outcome<T> {
  /// Whether the work was done by an elevated child.
  pub fn is_elevated(&self) -> bool { matches!(self, Outcome::Elevated) }

  /// The value of a [`Outcome::Done`], if any.
  pub fn done(self) -> Option<T> {
    match self {
      Outcome::Done(value) => Some(value),
      Outcome::Elevated => None,
    }
  }
}

/// Whether an installed task's trigger is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  /// The trigger fires.
  Enabled,
  /// The definition exists but the trigger is inactive.
  Disabled,
}

impl std::fmt::Display for TaskState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TaskState::Enabled => write!(f, "Enabled"),
      TaskState::Disabled => write!(f, "Disabled"),
    }
  }
}

/// Install, control and inspect one service in the native scheduler.
///
/// Every method takes the human-entered service name; adapters normalize it with
/// [`normalize`](crate::normalize) into their own identifier.
pub trait ServiceManager {
  /// Writes the native definition for `service` and activates its trigger.
  ///
  /// Replaces any previous definition with the same name.
  ///
  /// # Errors
  ///
  /// Returns a validation error before touching the scheduler if the descriptor is invalid,
  /// or [`NazimError::ToolFailed`] if the native tool rejects the definition.
  fn install(&self, service: &Service) -> Result<Outcome, NazimError>;

  /// Removes the definition. Succeeds when nothing is installed.
  fn uninstall(&self, name: &str) -> Result<Outcome, NazimError>;

  /// Re-activates the trigger of an installed service.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::NotFound`] if the service is not installed.
  fn enable(&self, name: &str) -> Result<Outcome, NazimError>;

  /// Deactivates the trigger, keeping the definition. Succeeds when nothing is installed.
  fn disable(&self, name: &str) -> Result<Outcome, NazimError>;

  /// Fires the service immediately, independent of its trigger.
  fn run(&self, name: &str) -> Result<Outcome, NazimError>;

  /// Best-effort check for an installed definition. Query failures read as `false`.
  fn is_installed(&self, name: &str) -> bool;

  /// Reports whether the trigger is active.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::NotFound`] if the service is not installed.
  fn state(&self, name: &str) -> Result<Outcome<TaskState>, NazimError>;
}

/// Picks the adapter for an OS identifier as reported by [`std::env::consts::OS`].
///
/// # Errors
///
/// Returns [`NazimError::UnsupportedPlatform`] for anything but `windows`, `linux` and `macos`,
/// and [`NazimError::ToolUnavailable`] if the Linux adapter cannot reach `systemctl`.
pub fn select(os: &str, paths: &Paths) -> Result<Box<dyn ServiceManager>, NazimError> {
  match os {
    "windows" => Ok(Box::new(WindowsManager::new(runner::SystemRunner, elevation::Uac, paths))),
    "linux" => Ok(Box::new(SystemdManager::new(runner::SystemRunner, paths)?)),
    "macos" => Ok(Box::new(LaunchdManager::new(runner::SystemRunner, paths))),
    other => Err(NazimError::UnsupportedPlatform(other.to_string())),
  }
}

/// Picks the adapter for the running OS.
pub fn for_current_os(paths: &Paths) -> Result<Box<dyn ServiceManager>, NazimError> {
  select(std::env::consts::OS, paths)
}

/// Removes a file, treating an already missing file as success.
pub(crate) fn remove_if_exists(path: &std::path::Path) -> Result<(), NazimError> {
  match std::fs::remove_file(path) {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
    _ => Ok(()),
  }
}
