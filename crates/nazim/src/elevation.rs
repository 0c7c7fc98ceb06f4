//! Administrative privilege detection and the UAC hand-off (Windows only).
//!
//! Elevation is a two-phase protocol between two separate processes:
//!
//! 1. The unprivileged process notices it lacks rights, asks the OS to start a copy of itself
//!    with the same arguments under the `runas` verb, waits for that copy, and reports
//!    [`Outcome::Elevated`](crate::platform::Outcome::Elevated) without doing the work itself.
//! 2. The elevated copy re-executes the same command and performs the mutation.
//!
//! The two processes share nothing but exit codes and the filesystem.

use super::*;

/// Win32 `ERROR_CANCELLED`, returned when the user dismisses the UAC prompt.
pub const ERROR_CANCELLED: i32 = 1223;

/// Detects and requests administrative rights.
pub trait Elevation {
  /// Whether the current process token is elevated.
  fn is_elevated(&self) -> bool;

  /// Re-launches the current executable elevated with the original arguments and waits for it.
  ///
  /// `Ok(())` means the elevated child handled the request and succeeded; the caller must not
  /// repeat the operation.
  ///
  /// # Errors
  ///
  /// - [`NazimError::ElevationDeclined`] when the user cancels the prompt
  /// - [`NazimError::ElevatedChildFailed`] when the child ran but exited non-zero
  /// - [`NazimError::Elevation`] for any other failure of the mechanism
  fn request_elevation(&self) -> Result<(), NazimError>;
}

/// The real UAC-backed implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uac;

#[cfg(target_os = "windows")]
mod win {
  use std::{ffi::c_void, mem, os::windows::ffi::OsStrExt};

  use windows::{
    core::{w, PCWSTR},
    Win32::{
      Foundation::{CloseHandle, HANDLE},
      Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY},
      System::Threading::{
        GetCurrentProcess, GetExitCodeProcess, OpenProcessToken, WaitForSingleObject, INFINITE,
      },
      UI::{
        Shell::{ShellExecuteExW, SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW},
        WindowsAndMessaging::SW_SHOWNORMAL,
      },
    },
  };

  use super::*;

  fn wide(s: &std::ffi::OsStr) -> Vec<u16> { s.encode_wide().chain(Some(0)).collect() }

  pub(super) fn token_is_elevated() -> bool {
    let mut token = HANDLE::default();
    unsafe {
      if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
        return false;
      }
      let mut elevation = TOKEN_ELEVATION::default();
      let mut returned = 0u32;
      let queried = GetTokenInformation(
        token,
        TokenElevation,
        Some(&mut elevation as *mut _ as *mut c_void),
        mem::size_of::<TOKEN_ELEVATION>() as u32,
        &mut returned,
      );
      let _ = CloseHandle(token);
      queried.is_ok() && elevation.TokenIsElevated != 0
    }
  }

  pub(super) fn relaunch_elevated() -> Result<(), NazimError> {
    let exe = std::env::current_exe()?;
    let params = std::env::args()
      .skip(1)
      .map(|arg| crate::escape::argv_quote(&arg))
      .collect::<Vec<_>>()
      .join(" ");

    let file = wide(exe.as_os_str());
    let parameters = wide(std::ffi::OsStr::new(&params));

    let mut info = SHELLEXECUTEINFOW {
      cbSize: mem::size_of::<SHELLEXECUTEINFOW>() as u32,
      fMask: SEE_MASK_NOCLOSEPROCESS,
      lpVerb: w!("runas"),
      lpFile: PCWSTR(file.as_ptr()),
      lpParameters: PCWSTR(parameters.as_ptr()),
      nShow: SW_SHOWNORMAL.0,
      ..Default::default()
    };

    unsafe {
      if let Err(e) = ShellExecuteExW(&mut info) {
        if e.code().0 & 0xFFFF == ERROR_CANCELLED {
          return Err(NazimError::ElevationDeclined);
        }
        return Err(NazimError::Elevation(e.message()));
      }

      let process = info.hProcess;
      if process.is_invalid() {
        return Err(NazimError::Elevation("no process handle for elevated child".to_string()));
      }
      WaitForSingleObject(process, INFINITE);
      let mut code = 0u32;
      let exited = GetExitCodeProcess(process, &mut code);
      let _ = CloseHandle(process);
      exited.map_err(|e| NazimError::Elevation(e.message()))?;

      match code as i32 {
        0 => Ok(()),
        ERROR_CANCELLED => Err(NazimError::ElevationDeclined),
        other => Err(NazimError::ElevatedChildFailed(other)),
      }
    }
  }
}

impl Elevation for Uac {
  #[cfg(target_os = "windows")]
  fn is_elevated(&self) -> bool { win::token_is_elevated() }

  #[cfg(not(target_os = "windows"))]
  fn is_elevated(&self) -> bool { false }

  #[cfg(target_os = "windows")]
  fn request_elevation(&self) -> Result<(), NazimError> {
    tracing::info!("Requesting elevation for {:?}", std::env::args().collect::<Vec<_>>());
    win::relaunch_elevated()
  }

  #[cfg(not(target_os = "windows"))]
  fn request_elevation(&self) -> Result<(), NazimError> {
    Err(NazimError::Elevation("elevation is only supported on Windows".to_string()))
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(not(target_os = "windows"))]
  #[test]
  fn test_uac_is_inert_off_windows() {
    assert!(!Uac.is_elevated());
    assert!(matches!(Uac.request_elevation(), Err(NazimError::Elevation(_))));
  }
}
