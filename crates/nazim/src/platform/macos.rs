//! Per-user launchd adapter.
//!
//! Services become LaunchAgents at `~/Library/LaunchAgents/com.nazim.<safe>.plist`. Loading
//! the plist is what enables a job and unloading it disables it, so a disabled service is one
//! whose plist exists but whose label is missing from `launchctl list`.

use std::{fs, path::PathBuf};

use tracing::{debug, info, warn};

use super::*;
use crate::{escape::xml, normalize, runner::SystemRunner};

const LAUNCHCTL: &str = "launchctl";

/// Outputs from `unload` that mean the job was not loaded to begin with.
const NOT_LOADED: &[&str] = &["could not find", "not loaded", "no such process"];

/// Manages services as launchd user agents.
#[derive(Debug)]
pub struct LaunchdManager<R = SystemRunner> {
  runner:     R,
  agents_dir: PathBuf,
  log_dir:    PathBuf,
}

impl<R: CommandRunner> LaunchdManager<R> {
  /// Creates the adapter. `launchctl` is only looked up when first used.
  pub fn new(runner: R, paths: &Paths) -> Self {
    Self { runner, agents_dir: paths.launch_agents_dir.clone(), log_dir: paths.log_dir.clone() }
  }

  fn plist_file(&self, name: &str) -> PathBuf {
    self.agents_dir.join(format!("{}.plist", normalize::launchd_label(name)))
  }

  fn launchctl(&self, args: &[&str]) -> Result<CommandOutput, NazimError> {
    self.runner.run(LAUNCHCTL, args)
  }

  fn launchctl_checked(&self, args: &[&str]) -> Result<CommandOutput, NazimError> {
    let output = self.launchctl(args)?;
    if !output.success() {
      return Err(NazimError::tool_failed(LAUNCHCTL, args, output.combined()));
    }
    Ok(output)
  }

  /// Renders the agent definition.
  fn plist(&self, service: &Service, trigger: Trigger) -> String {
    let safe = normalize::normalize(&service.name);
    let string = |value: &str| format!("    <string>{}</string>\n", xml(value));

    let mut plist = String::from(
      "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST \
       1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n<plist version=\"1.0\">\n\
       <dict>\n",
    );
    plist.push_str(&format!(
      "  <key>Label</key>\n  <string>{}</string>\n",
      xml(&normalize::launchd_label(&service.name))
    ));

    plist.push_str("  <key>ProgramArguments</key>\n  <array>\n");
    plist.push_str(&string(&service.command));
    for arg in &service.args {
      plist.push_str(&string(arg));
    }
    plist.push_str("  </array>\n");

    if let Some(workdir) = &service.workdir {
      plist.push_str(&format!(
        "  <key>WorkingDirectory</key>\n  <string>{}</string>\n",
        xml(&workdir.to_string_lossy())
      ));
    }

    match trigger {
      Trigger::OnStartup | Trigger::OnLogon =>
        plist.push_str("  <key>RunAtLoad</key>\n  <true/>\n"),
      Trigger::Interval(interval) => plist.push_str(&format!(
        "  <key>StartInterval</key>\n  <integer>{}</integer>\n",
        interval.as_secs()
      )),
    }

    for (key, ext) in [("StandardOutPath", "out"), ("StandardErrorPath", "err")] {
      let log = self.log_dir.join(format!("{safe}.{ext}"));
      plist.push_str(&format!(
        "  <key>{key}</key>\n  <string>{}</string>\n",
        xml(&log.to_string_lossy())
      ));
    }

    plist.push_str("</dict>\n</plist>\n");
    plist
  }

  /// Unloads a plist, treating "not loaded" answers as success.
  fn unload(&self, plist: &str) -> Result<(), NazimError> {
    let output = self.launchctl(&["unload", plist])?;
    if output.success() || NOT_LOADED.iter().any(|needle| output.mentions(needle)) {
      return Ok(());
    }
    Err(NazimError::tool_failed(LAUNCHCTL, &["unload", plist], output.combined()))
  }
}

impl<R: CommandRunner> ServiceManager for LaunchdManager<R> {
  fn install(&self, service: &Service) -> Result<Outcome, NazimError> {
    service.validate()?;
    let trigger = service.trigger()?;
    let contents = self.plist(service, trigger);

    if let Err(e) = self.uninstall(&service.name) {
      warn!("Failed to remove previous definition of {}: {}", service.name, e);
    }

    fs::create_dir_all(&self.agents_dir)?;
    fs::create_dir_all(&self.log_dir)?;
    let path = self.plist_file(&service.name);
    fs::write(&path, contents)?;
    debug!("Wrote {}", path.display());

    let plist = path.to_string_lossy();
    if !self.launchctl(&["load", &plist])?.success() {
      debug!("First load of {} failed, reloading", plist);
      let _ = self.launchctl(&["unload", &plist])?;
      self.launchctl_checked(&["load", &plist])?;
    }

    info!("Installed {} as {}", service.name, normalize::launchd_label(&service.name));
    Ok(Outcome::Done(()))
  }

  fn uninstall(&self, name: &str) -> Result<Outcome, NazimError> {
    let path = self.plist_file(name);
    if !path.exists() {
      debug!("{} does not exist, nothing to remove", path.display());
      return Ok(Outcome::Done(()));
    }

    self.unload(&path.to_string_lossy())?;
    remove_if_exists(&path)?;
    info!("Uninstalled {}", normalize::launchd_label(name));
    Ok(Outcome::Done(()))
  }

  fn enable(&self, name: &str) -> Result<Outcome, NazimError> {
    let path = self.plist_file(name);
    if !path.exists() {
      return Err(NazimError::NotFound(normalize::launchd_label(name)));
    }

    let plist = path.to_string_lossy();
    let output = self.launchctl(&["load", &plist])?;
    if !output.success() && !output.mentions("already loaded") {
      return Err(NazimError::tool_failed(LAUNCHCTL, &["load", &plist], output.combined()));
    }
    info!("Enabled {}", normalize::launchd_label(name));
    Ok(Outcome::Done(()))
  }

  fn disable(&self, name: &str) -> Result<Outcome, NazimError> {
    let path = self.plist_file(name);
    if !path.exists() {
      debug!("{} does not exist, nothing to disable", path.display());
      return Ok(Outcome::Done(()));
    }

    self.unload(&path.to_string_lossy())?;
    info!("Disabled {}", normalize::launchd_label(name));
    Ok(Outcome::Done(()))
  }

  fn run(&self, name: &str) -> Result<Outcome, NazimError> {
    let label = normalize::launchd_label(name);
    if !self.plist_file(name).exists() {
      return Err(NazimError::NotFound(label));
    }
    self.launchctl_checked(&["start", &label])?;
    info!("Triggered {}", label);
    Ok(Outcome::Done(()))
  }

  fn is_installed(&self, name: &str) -> bool { self.plist_file(name).exists() }

  fn state(&self, name: &str) -> Result<Outcome<TaskState>, NazimError> {
    let label = normalize::launchd_label(name);
    let listing = self.launchctl_checked(&["list"])?;
    let loaded =
      listing.stdout.lines().any(|line| line.split_whitespace().last() == Some(label.as_str()));

    match (loaded, self.plist_file(name).exists()) {
      (true, _) => Ok(Outcome::Done(TaskState::Enabled)),
      (false, true) => Ok(Outcome::Done(TaskState::Disabled)),
      (false, false) => Err(NazimError::NotFound(label)),
    }
  }
}
