//! Per-user systemd adapter.
//!
//! Every service becomes a `nazim-<safe>.service` unit of `Type=oneshot` in the user unit
//! directory. Interval services get a paired `nazim-<safe>.timer`; the timer is what gets
//! enabled and disabled, so disabling stops the trigger without touching the definition.
//!
//! Startup and logon services are enabled directly and wanted by `default.target`, which the
//! user's service manager reaches at login.

use std::{fs, path::PathBuf};

use tracing::{debug, info, warn};

use super::*;
use crate::{escape, normalize::unit_stem, runner::SystemRunner};

const SYSTEMCTL: &str = "systemctl";

/// Outputs from `stop`/`disable` that mean the unit is already gone.
const BENIGN: &[&str] = &["not loaded", "not found", "does not exist", "no such file"];

/// Manages services as systemd user units.
#[derive(Debug)]
pub struct SystemdManager<R = SystemRunner> {
  runner:   R,
  unit_dir: PathBuf,
  paths:    Paths,
}

impl<R: CommandRunner> SystemdManager<R> {
  /// Creates the adapter after checking that `systemctl` answers.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::ToolUnavailable`] if `systemctl --version` cannot be run or fails.
  pub fn new(runner: R, paths: &Paths) -> Result<Self, NazimError> {
    let unavailable = |reason: String| NazimError::ToolUnavailable {
      tool: SYSTEMCTL.to_string(),
      reason,
    };
    match runner.run(SYSTEMCTL, &["--version"]) {
      Ok(output) if output.success() => {},
      Ok(output) => return Err(unavailable(output.combined().trim().to_string())),
      Err(e) => return Err(unavailable(e.to_string())),
    }

    Ok(Self { runner, unit_dir: paths.systemd_user_dir.clone(), paths: paths.clone() })
  }

  fn service_file(&self, name: &str) -> PathBuf {
    self.unit_dir.join(format!("{}.service", unit_stem(name)))
  }

  fn timer_file(&self, name: &str) -> PathBuf {
    self.unit_dir.join(format!("{}.timer", unit_stem(name)))
  }

  fn systemctl(&self, args: &[&str]) -> Result<CommandOutput, NazimError> {
    let args: Vec<&str> = std::iter::once("--user").chain(args.iter().copied()).collect();
    self.runner.run(SYSTEMCTL, &args)
  }

  /// Runs `systemctl --user <args>` and fails on a non-zero exit.
  fn systemctl_checked(&self, args: &[&str]) -> Result<CommandOutput, NazimError> {
    let output = self.systemctl(args)?;
    if !output.success() {
      let args: Vec<&str> = std::iter::once("--user").chain(args.iter().copied()).collect();
      return Err(NazimError::tool_failed(SYSTEMCTL, &args, output.combined()));
    }
    Ok(output)
  }

  /// The unit whose enablement controls the trigger: the timer if there is one.
  fn trigger_unit(&self, name: &str) -> String {
    let stem = unit_stem(name);
    match self.timer_file(name).exists() {
      true => format!("{stem}.timer"),
      false => format!("{stem}.service"),
    }
  }

  fn service_unit(&self, service: &Service, trigger: Trigger) -> Result<String, NazimError> {
    let exec_start = escape::exec_start_line(&service.command, &service.args)?;
    let log = self.paths.service_log(&normalize::normalize(&service.name), "log");

    let mut unit = format!(
      "[Unit]\nDescription=nazim: {}\nAfter=network.target\n\n[Service]\nType=oneshot\n{}\n",
      no_specifiers(&service.name),
      exec_start
    );
    if let Some(workdir) = &service.workdir {
      let workdir = workdir.to_string_lossy();
      if workdir.contains(['\n', '\r']) {
        return Err(NazimError::InvalidCommand(format!(
          "working directory {workdir:?} contains a newline or carriage return"
        )));
      }
      unit.push_str(&format!("WorkingDirectory={}\n", no_specifiers(&workdir)));
    }
    unit.push_str(&format!(
      "StandardOutput=append:{log}\nStandardError=append:{log}\n",
      log = no_specifiers(&log.to_string_lossy())
    ));
    if !matches!(trigger, Trigger::Interval(_)) {
      unit.push_str("\n[Install]\nWantedBy=default.target\n");
    }
    Ok(unit)
  }

  fn timer_unit(service: &Service, interval: Interval) -> String {
    let span = timespan(interval);
    format!(
      "[Unit]\nDescription=nazim timer: {name}\n\n[Timer]\nOnBootSec={span}\n\
       OnUnitActiveSec={span}\nUnit={stem}.service\n\n[Install]\nWantedBy=timers.target\n",
      name = no_specifiers(&service.name),
      stem = unit_stem(&service.name),
    )
  }
}

/// Doubles `%` so systemd does not expand specifiers in free-text unit settings.
fn no_specifiers(text: &str) -> String { text.replace('%', "%%") }

/// Formats an interval as a systemd time span in the largest of `h`, `m` or `s` that divides it.
fn timespan(interval: Interval) -> String {
  let secs = interval.as_secs();
  match secs {
    s if s >= 3_600 && s % 3_600 == 0 => format!("{}h", s / 3_600),
    s if s >= 60 && s % 60 == 0 => format!("{}m", s / 60),
    s => format!("{s}s"),
  }
}

impl<R: CommandRunner> ServiceManager for SystemdManager<R> {
  fn install(&self, service: &Service) -> Result<Outcome, NazimError> {
    service.validate()?;
    let trigger = service.trigger()?;
    let unit = self.service_unit(service, trigger)?;

    if let Err(e) = self.uninstall(&service.name) {
      warn!("Failed to remove previous definition of {}: {}", service.name, e);
    }

    fs::create_dir_all(&self.unit_dir)?;
    fs::create_dir_all(&self.paths.log_dir)?;
    fs::write(self.service_file(&service.name), unit)?;
    debug!("Wrote {}", self.service_file(&service.name).display());

    let stem = unit_stem(&service.name);
    match trigger {
      Trigger::Interval(interval) => {
        fs::write(self.timer_file(&service.name), Self::timer_unit(service, interval))?;
        self.systemctl_checked(&["daemon-reload"])?;
        self.systemctl_checked(&["enable", &format!("{stem}.timer")])?;
        self.systemctl_checked(&["start", &format!("{stem}.timer")])?;
      },
      Trigger::OnStartup | Trigger::OnLogon => {
        self.systemctl_checked(&["daemon-reload"])?;
        self.systemctl_checked(&["enable", &format!("{stem}.service")])?;
      },
    }

    info!("Installed {} as {}", service.name, stem);
    Ok(Outcome::Done(()))
  }

  fn uninstall(&self, name: &str) -> Result<Outcome, NazimError> {
    let stem = unit_stem(name);
    let files = [(self.timer_file(name), "timer"), (self.service_file(name), "service")];
    let present: Vec<_> = files.iter().filter(|(path, _)| path.exists()).collect();
    if present.is_empty() {
      debug!("{} is not installed, nothing to remove", stem);
      return Ok(Outcome::Done(()));
    }

    for (_, kind) in &present {
      let unit = format!("{stem}.{kind}");
      for action in ["stop", "disable"] {
        let output = self.systemctl(&[action, &unit])?;
        if !output.success() && !BENIGN.iter().any(|benign| output.mentions(benign)) {
          return Err(NazimError::tool_failed(
            SYSTEMCTL,
            &["--user", action, &unit],
            output.combined(),
          ));
        }
      }
    }
    for (path, _) in &present {
      remove_if_exists(path)?;
    }
    self.systemctl_checked(&["daemon-reload"])?;

    info!("Uninstalled {}", stem);
    Ok(Outcome::Done(()))
  }

  fn enable(&self, name: &str) -> Result<Outcome, NazimError> {
    if !self.service_file(name).exists() {
      return Err(NazimError::NotFound(unit_stem(name)));
    }
    let unit = self.trigger_unit(name);
    self.systemctl_checked(&["enable", &unit])?;
    if unit.ends_with(".timer") {
      self.systemctl_checked(&["start", &unit])?;
    }
    info!("Enabled {}", unit);
    Ok(Outcome::Done(()))
  }

  fn disable(&self, name: &str) -> Result<Outcome, NazimError> {
    if !self.service_file(name).exists() {
      debug!("{} is not installed, nothing to disable", unit_stem(name));
      return Ok(Outcome::Done(()));
    }
    let unit = self.trigger_unit(name);
    if unit.ends_with(".timer") {
      self.systemctl_checked(&["stop", &unit])?;
    }
    self.systemctl_checked(&["disable", &unit])?;
    info!("Disabled {}", unit);
    Ok(Outcome::Done(()))
  }

  fn run(&self, name: &str) -> Result<Outcome, NazimError> {
    if !self.service_file(name).exists() {
      return Err(NazimError::NotFound(unit_stem(name)));
    }
    let unit = format!("{}.service", unit_stem(name));
    self.systemctl_checked(&["start", "--no-block", &unit])?;
    info!("Triggered {}", unit);
    Ok(Outcome::Done(()))
  }

  fn is_installed(&self, name: &str) -> bool { self.service_file(name).exists() }

  fn state(&self, name: &str) -> Result<Outcome<TaskState>, NazimError> {
    let unit = self.trigger_unit(name);
    let output = self.systemctl(&["is-enabled", &unit])?;
    let combined = output.combined();
    let answer = combined.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");

    match answer {
      "enabled" | "enabled-runtime" | "static" | "alias" => Ok(Outcome::Done(TaskState::Enabled)),
      "disabled" | "masked" | "masked-runtime" => Ok(Outcome::Done(TaskState::Disabled)),
      _ if output.mentions("not found") || output.mentions("no such file") =>
        Err(NazimError::NotFound(unit)),
      _ => Err(NazimError::tool_failed(SYSTEMCTL, &["--user", "is-enabled", &unit], output.combined())),
    }
  }
}
