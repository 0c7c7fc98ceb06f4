//! Windows Task Scheduler adapter.
//!
//! Services become tasks named `Nazim_<safe>` created through `schtasks`. Task Scheduler can
//! neither change directory nor capture output, so every task runs a small generated wrapper
//! pair from the `wrappers` directory:
//!
//! ```text
//! <safe>.cmd   the command line, prefixed with `cd /d <dir> &&` when a workdir is set
//! <safe>.ps1   runs the .cmd, timestamps each output line and appends it to logs\<safe>.log
//! ```
//!
//! # Privileges
//!
//! Creating tasks needs administrator rights, so [`install`](ServiceManager::install) checks
//! the process token first and hands the whole invocation to an elevated copy of the program
//! when it is not elevated. The other mutating operations try unprivileged first and only
//! elevate when `schtasks` answers "access is denied". [`run`](ServiceManager::run) never
//! elevates.

use std::{fs, path::PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use super::*;
use crate::{
  elevation::{Elevation, Uac},
  escape::{windows_command_line, windows_quote},
  normalize::{normalize, task_name},
  runner::SystemRunner,
};

const SCHTASKS: &str = "schtasks";

/// Outputs that mean the task does not exist.
const MISSING: &[&str] = &["does not exist", "cannot find"];

/// Outputs that mean administrator rights are needed.
const DENIED: &[&str] = &["access is denied", "privileges"];

lazy_static! {
  static ref STATUS: Regex = Regex::new(r"(?mi)^\s*Status:\s*(\w+)").unwrap();
}

/// Manages services as Task Scheduler tasks.
#[derive(Debug)]
pub struct WindowsManager<R = SystemRunner, E = Uac> {
  runner:    R,
  elevation: E,
  paths:     Paths,
}

impl<R: CommandRunner, E: Elevation> WindowsManager<R, E> {
  /// Creates the adapter.
  pub fn new(runner: R, elevation: E, paths: &Paths) -> Self {
    Self { runner, elevation, paths: paths.clone() }
  }

  fn schtasks(&self, args: &[&str]) -> Result<CommandOutput, NazimError> {
    self.runner.run(SCHTASKS, args)
  }

  /// Runs `schtasks`, elevating if it reports that administrator rights are required.
  ///
  /// Returns `None` when the request was handed to an elevated child.
  fn schtasks_privileged(&self, args: &[&str]) -> Result<Option<CommandOutput>, NazimError> {
    let output = self.schtasks(args)?;
    if output.success() || self.elevation.is_elevated() || !mentions_any(&output, DENIED) {
      return Ok(Some(output));
    }

    info!("schtasks {} needs administrator rights, requesting elevation", args.join(" "));
    self.elevation.request_elevation()?;
    Ok(None)
  }

  fn wrapper_files(&self, name: &str) -> (PathBuf, PathBuf) {
    let safe = normalize(name);
    let dir = &self.paths.wrapper_dir;
    (dir.join(format!("{safe}.cmd")), dir.join(format!("{safe}.ps1")))
  }

  /// Writes the logging wrapper pair and returns the task command line that runs it.
  fn write_wrapper(&self, service: &Service) -> Result<String, NazimError> {
    let (cmd, ps1) = self.wrapper_files(&service.name);
    let log = self.paths.service_log(&normalize(&service.name), "log");
    fs::create_dir_all(&self.paths.wrapper_dir)?;
    fs::create_dir_all(&self.paths.log_dir)?;

    // batch files expand %VAR%, so literal percents are doubled
    let mut line = windows_command_line(&service.command, &service.args).replace('%', "%%");
    if let Some(workdir) = &service.workdir {
      line = format!("cd /d {} && {line}", windows_quote(&workdir.to_string_lossy()));
    }
    fs::write(&cmd, format!("@echo off\r\n{line}\r\n"))?;

    let script = format!(
      "& '{cmd}' 2>&1 | ForEach-Object {{ \"[{{0}}] {{1}}\" -f (Get-Date -Format 'yyyy-MM-dd \
       HH:mm:ss'), $_ }} | Add-Content -Path '{log}'\r\nexit $LASTEXITCODE\r\n",
      cmd = powershell_quote(&cmd.to_string_lossy()),
      log = powershell_quote(&log.to_string_lossy()),
    );
    fs::write(&ps1, script)?;
    debug!("Wrote wrappers {} and {}", cmd.display(), ps1.display());

    Ok(format!(
      "powershell.exe -NoProfile -ExecutionPolicy Bypass -WindowStyle Hidden -File \"{}\"",
      ps1.display()
    ))
  }

  fn remove_wrapper(&self, name: &str) -> Result<(), NazimError> {
    let (cmd, ps1) = self.wrapper_files(name);
    remove_if_exists(&cmd)?;
    remove_if_exists(&ps1)
  }
}

/// Escapes a value for a single-quoted PowerShell string.
fn powershell_quote(value: &str) -> String { value.replace('\'', "''") }

fn mentions_any(output: &CommandOutput, needles: &[&str]) -> bool {
  needles.iter().any(|needle| output.mentions(needle))
}

/// Maps a trigger onto `schtasks /create` schedule flags.
///
/// Intervals under a day run every N minutes, rounding up to whole minutes. Whole days run
/// daily every N days. Anything else has no `schtasks` equivalent.
fn schedule(trigger: Trigger) -> Result<Vec<String>, NazimError> {
  let flags: Vec<String> = match trigger {
    Trigger::OnStartup => vec!["/sc".into(), "onstart".into(), "/ru".into(), "SYSTEM".into()],
    Trigger::OnLogon => vec!["/sc".into(), "onlogon".into()],
    Trigger::Interval(interval) => {
      let secs = interval.as_secs();
      if secs < 86_400 {
        let minutes = secs.div_ceil(60).max(1);
        vec!["/sc".into(), "minute".into(), "/mo".into(), minutes.to_string()]
      } else if secs % 86_400 == 0 && secs / 86_400 <= 365 {
        vec!["/sc".into(), "daily".into(), "/mo".into(), (secs / 86_400).to_string()]
      } else {
        return Err(NazimError::UnsupportedInterval(format!(
          "{interval} is neither under a day nor a whole number of days up to 365"
        )));
      }
    },
  };
  Ok(flags)
}

impl<R: CommandRunner, E: Elevation> ServiceManager for WindowsManager<R, E> {
  fn install(&self, service: &Service) -> Result<Outcome, NazimError> {
    service.validate()?;
    let schedule = schedule(service.trigger()?)?;

    if !self.elevation.is_elevated() {
      info!("Installing {} needs administrator rights, requesting elevation", service.name);
      self.elevation.request_elevation()?;
      return Ok(Outcome::Elevated);
    }

    if let Err(e) = self.uninstall(&service.name) {
      warn!("Failed to remove previous definition of {}: {}", service.name, e);
    }

    let task = task_name(&service.name);
    let task_run = self.write_wrapper(service)?;
    let mut args = vec!["/create", "/tn", task.as_str(), "/tr", task_run.as_str()];
    args.extend(schedule.iter().map(String::as_str));
    args.push("/f");

    let output = self.schtasks(&args)?;
    if !output.success() {
      return Err(NazimError::tool_failed(SCHTASKS, &args, output.combined()));
    }

    info!("Installed {} as {}", service.name, task);
    Ok(Outcome::Done(()))
  }

  fn uninstall(&self, name: &str) -> Result<Outcome, NazimError> {
    let task = task_name(name);
    let args = ["/delete", "/tn", task.as_str(), "/f"];
    let Some(output) = self.schtasks_privileged(&args)? else {
      return Ok(Outcome::Elevated);
    };

    if !output.success() {
      if !mentions_any(&output, MISSING) {
        return Err(NazimError::tool_failed(SCHTASKS, &args, output.combined()));
      }
      debug!("{} does not exist, nothing to remove", task);
    }
    self.remove_wrapper(name)?;

    info!("Uninstalled {}", task);
    Ok(Outcome::Done(()))
  }

  fn enable(&self, name: &str) -> Result<Outcome, NazimError> {
    let task = task_name(name);
    let args = ["/change", "/tn", task.as_str(), "/enable"];
    let Some(output) = self.schtasks_privileged(&args)? else {
      return Ok(Outcome::Elevated);
    };

    match output.success() {
      true => {
        info!("Enabled {}", task);
        Ok(Outcome::Done(()))
      },
      false if mentions_any(&output, MISSING) => Err(NazimError::NotFound(task)),
      false => Err(NazimError::tool_failed(SCHTASKS, &args, output.combined())),
    }
  }

  fn disable(&self, name: &str) -> Result<Outcome, NazimError> {
    let task = task_name(name);
    let args = ["/change", "/tn", task.as_str(), "/disable"];
    let Some(output) = self.schtasks_privileged(&args)? else {
      return Ok(Outcome::Elevated);
    };

    match output.success() {
      true => info!("Disabled {}", task),
      false if mentions_any(&output, MISSING) => debug!("{} does not exist, nothing to disable", task),
      false => return Err(NazimError::tool_failed(SCHTASKS, &args, output.combined())),
    }
    Ok(Outcome::Done(()))
  }

  fn run(&self, name: &str) -> Result<Outcome, NazimError> {
    let task = task_name(name);
    let args = ["/run", "/tn", task.as_str()];
    let output = self.schtasks(&args)?;

    match output.success() {
      true => {
        info!("Triggered {}", task);
        Ok(Outcome::Done(()))
      },
      false if mentions_any(&output, MISSING) => Err(NazimError::NotFound(task)),
      false => Err(NazimError::tool_failed(SCHTASKS, &args, output.combined())),
    }
  }

  fn is_installed(&self, name: &str) -> bool {
    let task = task_name(name);
    match self.schtasks(&["/query", "/tn", &task]) {
      Ok(output) => output.success(),
      Err(e) => {
        debug!("Querying {} failed: {}", task, e);
        false
      },
    }
  }

  fn state(&self, name: &str) -> Result<Outcome<TaskState>, NazimError> {
    let task = task_name(name);
    let args = ["/query", "/tn", task.as_str(), "/fo", "LIST"];
    let Some(output) = self.schtasks_privileged(&args)? else {
      return Ok(Outcome::Elevated);
    };

    if !output.success() {
      return match mentions_any(&output, MISSING) {
        true => Err(NazimError::NotFound(task)),
        false => Err(NazimError::tool_failed(SCHTASKS, &args, output.combined())),
      };
    }

    let disabled =
      STATUS.captures_iter(&output.stdout).any(|status| status[1].eq_ignore_ascii_case("disabled"));
    Ok(Outcome::Done(if disabled { TaskState::Disabled } else { TaskState::Enabled }))
  }
}

#[cfg(test)]
mod tests {
  use tempfile::{tempdir, TempDir};

  use super::*;
  use crate::{
    elevation::fake::{FakeElevation, Response},
    runner::fake::FakeRunner,
  };

  const MISSING_TASK: &str = "ERROR: The system cannot find the file specified.\r\n";
  const ACCESS_DENIED: &str = "ERROR: Access is denied.\r\n";

  fn query(status: &str) -> CommandOutput {
    CommandOutput::ok(format!(
      "\r\nFolder: \\\r\nHostName:      DESKTOP\r\nTaskName:      \\Nazim_backup\r\nNext Run \
       Time: N/A\r\nStatus:        {status}\r\nLogon Mode:    Interactive/Background\r\n"
    ))
  }

  fn manager(
    elevation: FakeElevation,
  ) -> (TempDir, FakeRunner, WindowsManager<FakeRunner, FakeElevation>) {
    let dir = tempdir().unwrap();
    let runner = FakeRunner::new();
    let manager = WindowsManager::new(runner.clone(), elevation, &Paths::rooted(dir.path()));
    (dir, runner, manager)
  }

  fn backup() -> Service {
    Service::new("backup", "C:\\Program Files\\7-Zip\\7z.exe")
      .with_args(["a", "out file.7z", "C:\\data"])
      .every("5m".parse().unwrap())
  }

  #[test]
  fn test_install_as_admin() {
    let (dir, runner, manager) = manager(FakeElevation::admin());
    assert_eq!(manager.install(&backup()).unwrap(), Outcome::Done(()));

    let calls = runner.calls();
    assert_eq!(calls[0], "schtasks /delete /tn Nazim_backup /f");
    assert!(calls[1].starts_with("schtasks /create /tn Nazim_backup /tr powershell.exe -NoProfile"));
    assert!(calls[1].contains("backup.ps1\""));
    assert!(calls[1].ends_with("/sc minute /mo 5 /f"));

    let wrappers = dir.path().join("nazim/wrappers");
    let cmd = fs::read_to_string(wrappers.join("backup.cmd")).unwrap();
    assert_eq!(cmd, "@echo off\r\n\"C:\\Program Files\\7-Zip\\7z.exe\" a \"out file.7z\" C:\\data\r\n");

    let ps1 = fs::read_to_string(wrappers.join("backup.ps1")).unwrap();
    assert!(ps1.contains("Get-Date -Format 'yyyy-MM-dd HH:mm:ss'"));
    assert!(ps1.contains("2>&1"));
    assert!(ps1.contains("backup.log'"));
    assert!(dir.path().join("nazim/logs").is_dir());
  }

  #[test]
  fn test_install_requests_elevation() {
    let elevation = FakeElevation::user(Response::Accept);
    let (dir, runner, manager) = manager(elevation.clone());
    assert_eq!(manager.install(&backup()).unwrap(), Outcome::Elevated);
    assert_eq!(elevation.requests(), 1);
    assert!(runner.calls().is_empty());
    assert!(!dir.path().join("nazim/wrappers").exists());
  }

  #[traced_test]
  #[test]
  fn test_elevation_is_logged() {
    let (_dir, _runner, manager) = manager(FakeElevation::user(Response::Accept));
    manager.install(&backup()).unwrap();
    assert!(logs_contain("Installing backup needs administrator rights"));
  }

  #[test]
  fn test_install_elevation_declined() {
    let (_dir, runner, manager) = manager(FakeElevation::user(Response::Decline));
    assert!(matches!(manager.install(&backup()), Err(NazimError::ElevationDeclined)));
    assert!(runner.calls().is_empty());
  }

  #[test]
  fn test_validation_precedes_elevation() {
    let elevation = FakeElevation::user(Response::Accept);
    let (_dir, _runner, manager) = manager(elevation.clone());
    let both = backup().on_startup();
    assert!(manager.install(&both).unwrap_err().is_validation_error());

    let odd = Service::new("odd", "x.exe").every("25h".parse().unwrap());
    assert!(matches!(manager.install(&odd), Err(NazimError::UnsupportedInterval(_))));
    assert_eq!(elevation.requests(), 0);
  }

  #[test]
  fn test_schedule_mapping() {
    let flags = |trigger| schedule(trigger).unwrap().join(" ");
    assert_eq!(flags(Trigger::OnStartup), "/sc onstart /ru SYSTEM");
    assert_eq!(flags(Trigger::OnLogon), "/sc onlogon");
    assert_eq!(flags(Trigger::Interval(Interval::from_secs(30))), "/sc minute /mo 1");
    assert_eq!(flags(Trigger::Interval(Interval::from_secs(90))), "/sc minute /mo 2");
    assert_eq!(flags(Trigger::Interval(Interval::from_secs(3_600))), "/sc minute /mo 60");
    assert_eq!(flags(Trigger::Interval(Interval::from_secs(172_800))), "/sc daily /mo 2");
    assert!(schedule(Trigger::Interval(Interval::from_secs(90_000))).is_err());
    assert!(schedule(Trigger::Interval(Interval::from_secs(86_400 * 366))).is_err());
  }

  #[test]
  fn test_workdir_prefix_and_percent() {
    let (dir, _runner, manager) = manager(FakeElevation::admin());
    let service = Service::new("report", "report.bat")
      .with_args(["100%"])
      .with_workdir("C:\\My Reports")
      .on_logon();
    manager.install(&service).unwrap();

    let cmd = fs::read_to_string(dir.path().join("nazim/wrappers/report.cmd")).unwrap();
    assert_eq!(cmd, "@echo off\r\ncd /d \"C:\\My Reports\" && report.bat 100%%\r\n");
  }

  #[test]
  fn test_install_then_uninstall() {
    let (dir, runner, manager) = manager(FakeElevation::admin());
    manager.install(&backup()).unwrap();
    assert!(manager.is_installed("backup"));

    manager.uninstall("backup").unwrap();
    runner.respond("schtasks /query", CommandOutput::failed(1, MISSING_TASK));
    assert!(!manager.is_installed("backup"));
    assert!(!dir.path().join("nazim/wrappers/backup.cmd").exists());
    assert!(!dir.path().join("nazim/wrappers/backup.ps1").exists());
  }

  #[test]
  fn test_uninstall_missing_is_noop() {
    let (_dir, runner, manager) = manager(FakeElevation::user(Response::Accept));
    runner.respond("schtasks /delete", CommandOutput::failed(1, MISSING_TASK));
    assert_eq!(manager.uninstall("ghost").unwrap(), Outcome::Done(()));
  }

  #[test]
  fn test_uninstall_elevates_only_when_denied() {
    let elevation = FakeElevation::user(Response::Accept);
    let (_dir, runner, manager) = manager(elevation.clone());
    assert_eq!(manager.uninstall("backup").unwrap(), Outcome::Done(()));
    assert_eq!(elevation.requests(), 0);

    runner.respond("schtasks /delete", CommandOutput::failed(1, ACCESS_DENIED));
    assert_eq!(manager.uninstall("backup").unwrap(), Outcome::Elevated);
    assert_eq!(elevation.requests(), 1);
  }

  #[test]
  fn test_denied_while_elevated_is_an_error() {
    let (_dir, runner, manager) = manager(FakeElevation::admin());
    runner.respond("schtasks /change", CommandOutput::failed(1, ACCESS_DENIED));
    match manager.disable("backup") {
      Err(NazimError::ToolFailed { output, .. }) => assert_eq!(output, ACCESS_DENIED),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn test_disable_enable_round_trip() {
    let (_dir, runner, manager) = manager(FakeElevation::admin());
    manager.install(&backup()).unwrap();
    runner.clear();

    manager.disable("backup").unwrap();
    runner.respond("schtasks /query", query("Disabled"));
    assert_eq!(manager.state("backup").unwrap(), Outcome::Done(TaskState::Disabled));

    manager.enable("backup").unwrap();
    runner.respond("schtasks /query", query("Ready"));
    assert_eq!(manager.state("backup").unwrap(), Outcome::Done(TaskState::Enabled));

    assert_eq!(runner.calls_to("schtasks /change"), [
      "schtasks /change /tn Nazim_backup /disable",
      "schtasks /change /tn Nazim_backup /enable",
    ]);
  }

  #[test]
  fn test_absent_task_semantics() {
    let (_dir, runner, manager) = manager(FakeElevation::admin());
    runner.respond("schtasks", CommandOutput::failed(1, MISSING_TASK));
    assert_eq!(manager.disable("ghost").unwrap(), Outcome::Done(()));
    assert!(manager.enable("ghost").unwrap_err().is_not_found());
    assert!(manager.run("ghost").unwrap_err().is_not_found());
    assert!(manager.state("ghost").unwrap_err().is_not_found());
    assert!(!manager.is_installed("ghost"));
  }

  #[test]
  fn test_state_elevates_when_denied() {
    let elevation = FakeElevation::user(Response::Accept);
    let (_dir, runner, manager) = manager(elevation.clone());
    runner.respond("schtasks /query", CommandOutput::failed(1, ACCESS_DENIED));
    assert_eq!(manager.state("backup").unwrap(), Outcome::Elevated);
    assert_eq!(elevation.requests(), 1);
  }

  #[test]
  fn test_run_never_elevates() {
    let elevation = FakeElevation::user(Response::Accept);
    let (_dir, runner, manager) = manager(elevation.clone());
    manager.run("backup").unwrap();
    assert_eq!(runner.calls(), ["schtasks /run /tn Nazim_backup"]);

    runner.respond("schtasks /run", CommandOutput::failed(1, ACCESS_DENIED));
    assert!(matches!(manager.run("backup"), Err(NazimError::ToolFailed { .. })));
    assert_eq!(elevation.requests(), 0);
  }

  #[test]
  fn test_reinstall_reflects_second_definition() {
    let (dir, runner, manager) = manager(FakeElevation::admin());
    manager.install(&backup()).unwrap();
    let second = Service::new("backup", "robocopy").with_args(["C:\\a", "D:\\b"]).on_startup();
    manager.install(&second).unwrap();

    let cmd = fs::read_to_string(dir.path().join("nazim/wrappers/backup.cmd")).unwrap();
    assert_eq!(cmd, "@echo off\r\nrobocopy C:\\a D:\\b\r\n");
    let creates = runner.calls_to("schtasks /create");
    assert_eq!(creates.len(), 2);
    assert!(creates[1].ends_with("/sc onstart /ru SYSTEM /f"));
    assert_eq!(runner.calls_to("schtasks /delete").len(), 2);
  }
}
