//! Command handlers.
//!
//! Each handler reads the service store, talks to the platform adapter and prints the result.
//! The store is only written after the adapter reports [`Outcome::Done`]; when the work was
//! handed to an elevated child the handler returns quietly, since the child already did it.

use std::{
  env::consts::OS,
  path::{Path, PathBuf},
};

use nazim::{
  elevation::{Elevation, Uac},
  normalize::native_id, platform, script, service::validate_name, Interval, NazimError, Outcome,
  Paths, Service, ServiceManager, ServiceStore, TaskState, Trigger,
};
use tracing::{debug, info, warn};

use super::*;

/// Widest command shown by `list`.
const COMMAND_WIDTH: usize = 50;

/// Flags shared by `add` and `edit`.
#[derive(Args, Debug, Default)]
pub struct ServiceFlags {
  /// Program or script to run, or `write` to author a script in your editor
  #[arg(short, long)]
  pub command:    Option<String>,
  /// Arguments for the command, split on whitespace
  #[arg(short, long, allow_hyphen_values = true)]
  pub args:       Option<String>,
  /// Directory to run the command from
  #[arg(short, long)]
  pub workdir:    Option<PathBuf>,
  /// Run when the system starts
  #[arg(long, conflicts_with_all = ["on_logon", "interval"])]
  pub on_startup: bool,
  /// Run when the user logs on
  #[arg(long, conflicts_with = "interval")]
  pub on_logon:   bool,
  /// Run repeatedly, e.g. 30s, 5m, 1h or 2d
  #[arg(short, long)]
  pub interval:   Option<Interval>,
  /// Arguments passed verbatim after `--`
  #[arg(last = true)]
  pub raw_args:   Vec<String>,
}

impl ServiceFlags {
  /// The trigger selected by the flags, if any.
  pub fn trigger(&self) -> Option<Trigger> {
    match (self.on_startup, self.on_logon, self.interval) {
      (true, ..) => Some(Trigger::OnStartup),
      (_, true, _) => Some(Trigger::OnLogon),
      (.., Some(interval)) => Some(Trigger::Interval(interval)),
      _ => None,
    }
  }

  /// Arguments from `--args` followed by the raw trailing ones.
  fn extra_args(&self) -> Vec<String> {
    let split = self.args.iter().flat_map(|args| args.split_whitespace().map(String::from));
    split.chain(self.raw_args.iter().cloned()).collect()
  }

  fn is_empty(&self) -> bool {
    self.command.is_none()
      && self.args.is_none()
      && self.workdir.is_none()
      && self.trigger().is_none()
      && self.raw_args.is_empty()
  }
}

/// Splits a command that holds its own arguments, unless it names an existing path.
///
/// `"python3 -m http.server"` becomes `python3` plus two arguments, while
/// `"C:\Program Files\tool.exe"` is kept whole when that file exists.
pub fn split_command(command: &str) -> (String, Vec<String>) {
  if !command.contains(char::is_whitespace) || Path::new(command).exists() {
    return (command.to_string(), Vec::new());
  }
  let mut words = command.split_whitespace().map(String::from);
  let program = words.next().unwrap_or_default();
  (program, words.collect())
}

/// Shortens `text` to at most `width` characters, marking the cut with `...`.
pub fn truncate(text: &str, width: usize) -> String {
  if text.chars().count() <= width {
    return text.to_string();
  }
  let kept: String = text.chars().take(width.saturating_sub(3)).collect();
  format!("{kept}...")
}

/// Shared state for one CLI invocation.
pub struct App {
  paths:    Paths,
  store:    ServiceStore,
  manager:  Option<Box<dyn ServiceManager>>,
  /// Running with administrative rights, as the elevated child of a UAC hand-off does
  elevated: bool,
}

impl App {
  /// Opens the store. The platform adapter is created on first use.
  pub fn new(paths: Paths) -> Result<Self, CliErrors> {
    let store = ServiceStore::open(&paths)?;
    debug!("Using service store at {}", store.path().display());
    Ok(Self { paths, store, manager: None, elevated: Uac.is_elevated() })
  }

  fn manager(&mut self) -> Result<&dyn ServiceManager, CliErrors> {
    if self.manager.is_none() {
      self.manager = Some(platform::for_current_os(&self.paths)?);
    }
    match &self.manager {
      Some(manager) => Ok(manager.as_ref()),
      None => Err(NazimError::UnsupportedPlatform(OS.to_string()).into()),
    }
  }

  /// Resolves `--command`, opening the script editor for the `write`/`edit` sentinel.
  fn resolve_command(
    &self,
    name: &str,
    command: &str,
    reuse_script: bool,
  ) -> Result<(String, Vec<String>), CliErrors> {
    if script::is_editor_sentinel(command) {
      let path = self.write_script(name, reuse_script)?;
      return Ok((path.to_string_lossy().into_owned(), Vec::new()));
    }
    Ok(split_command(command))
  }

  /// Opens the editor on the script for `name` and saves the result.
  fn write_script(&self, name: &str, reuse: bool) -> Result<PathBuf, CliErrors> {
    let path = script::script_path(&self.paths, name, OS);
    if reuse && script::is_reusable(&path) {
      info!("Reusing existing script {}", path.display());
      return Ok(path);
    }

    let initial = match script::is_reusable(&path) {
      true => std::fs::read_to_string(&path)?,
      false => script::fresh_template(name, OS),
    };
    println!("{} Opening editor for {}", style(PENCIL).cyan(), style(path.display()).yellow());

    let edited = dialoguer::Editor::new()
      .extension(&format!(".{}", script::extension(OS)))
      .edit(&initial)?;
    match edited {
      Some(contents) if !contents.trim().is_empty() => {
        script::save(&path, &contents)?;
        println!("{} Script saved to {}", style(SAVE).green(), style(path.display()).yellow());
        Ok(path)
      },
      _ => Err(CliErrors::Usage("script was not saved, nothing to install".to_string())),
    }
  }

  /// `nazim add`
  pub fn add(&mut self, name: String, flags: ServiceFlags) -> Result<(), CliErrors> {
    validate_name(&name)?;
    if let Some(existing) = self.store.conflicting(&name) {
      return Err(NazimError::ServiceExists(existing.name.clone()).into());
    }
    let trigger = flags.trigger().ok_or_else(|| {
      CliErrors::Usage("one of --on-startup, --on-logon or --interval is required".to_string())
    })?;
    let command = flags
      .command
      .as_deref()
      .ok_or_else(|| CliErrors::Usage("--command is required".to_string()))?;

    let (command, mut args) = self.resolve_command(&name, command, true)?;
    args.extend(flags.extra_args());

    let mut service = Service::new(name, command).with_args(args);
    service.workdir = flags.workdir;
    service.set_trigger(trigger);
    service.validate()?;

    if self.manager()?.install(&service)?.is_elevated() {
      return Ok(());
    }
    println!(
      "{} Service {} installed ({})",
      style(SUCCESS).green(),
      style(&service.name).yellow(),
      service.describe_trigger()
    );
    self.store.add(service)?;
    Ok(())
  }

  /// `nazim edit`
  pub fn edit(&mut self, name: String, flags: ServiceFlags) -> Result<(), CliErrors> {
    let mut service = self.store.get(&name)?.clone();
    if flags.is_empty() {
      return Err(CliErrors::Usage("nothing to change, pass at least one flag".to_string()));
    }

    match &flags.command {
      Some(command) => {
        // An elevated child re-running `edit -c write` keeps the script its parent just saved.
        let (command, mut args) = self.resolve_command(&name, command, self.elevated)?;
        args.extend(flags.extra_args());
        service.command = command;
        service.args = args;
      },
      None if flags.args.is_some() || !flags.raw_args.is_empty() => {
        service.args = flags.extra_args();
      },
      None => {},
    }
    if let Some(workdir) = flags.workdir.clone() {
      service.workdir = Some(workdir);
    }
    if let Some(trigger) = flags.trigger() {
      service.set_trigger(trigger);
    }
    service.validate()?;

    let enabled = service.enabled;
    let manager = self.manager()?;
    if manager.install(&service)?.is_elevated() {
      return Ok(());
    }
    if !enabled && manager.disable(&service.name)?.is_elevated() {
      return Ok(());
    }

    println!("{} Service {} updated", style(SUCCESS).green(), style(&service.name).yellow());
    self.store.update(service)?;
    Ok(())
  }

  /// `nazim remove`
  pub fn remove(&mut self, name: String, accept_defaults: bool) -> Result<(), CliErrors> {
    let service = self.store.get(&name)?.clone();

    if !accept_defaults && console::Term::stdout().is_term() {
      let confirm = dialoguer::Confirm::new()
        .with_prompt(format!("Remove service {name}?"))
        .default(false)
        .interact()?;
      if !confirm {
        println!("{} Keeping {}", style(INFO).blue(), style(&name).yellow());
        return Ok(());
      }
    }

    match self.manager().and_then(|manager| manager.uninstall(&name).map_err(CliErrors::from)) {
      Ok(Outcome::Elevated) => return Ok(()),
      Ok(Outcome::Done(())) => {},
      Err(e) => {
        warn!("Uninstalling {} failed: {}", name, e);
        println!("{} Could not uninstall {}: {}", style(WARNING).yellow(), name, e);
      },
    }

    let script = script::script_path(&self.paths, &name, OS);
    if Path::new(&service.command) == script {
      match std::fs::remove_file(&script) {
        Ok(()) => debug!("Removed script {}", script.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(e.into()),
      }
    }

    self.store.remove(&name)?;
    println!("{} Service {} removed", style(SUCCESS).green(), style(&name).yellow());
    Ok(())
  }

  /// `nazim enable` and `nazim disable`
  pub fn set_enabled(&mut self, name: String, enabled: bool) -> Result<(), CliErrors> {
    let mut service = self.store.get(&name)?.clone();
    let manager = self.manager()?;
    let outcome = match enabled {
      true => manager.enable(&name)?,
      false => manager.disable(&name)?,
    };
    if outcome.is_elevated() {
      return Ok(());
    }

    service.enabled = enabled;
    self.store.update(service)?;
    let verb = if enabled { "enabled" } else { "disabled" };
    println!("{} Service {} {}", style(SUCCESS).green(), style(&name).yellow(), verb);
    Ok(())
  }

  /// `nazim run`
  pub fn run(&mut self, name: String) -> Result<(), CliErrors> {
    self.store.get(&name)?;
    if self.manager()?.run(&name)?.is_elevated() {
      return Ok(());
    }
    println!("{} Service {} started", style(ROCKET).cyan(), style(&name).yellow());
    Ok(())
  }

  /// `nazim list`
  pub fn list(&mut self) -> Result<(), CliErrors> {
    let services: Vec<Service> = self.store.list().into_iter().cloned().collect();
    if services.is_empty() {
      println!(
        "{} No services configured. Add one with {}",
        style(INFO).blue(),
        style("nazim add").yellow()
      );
      return Ok(());
    }

    let manager = self.manager()?;
    println!(
      "{}",
      style(format!(
        "{:<20} {:<width$} {:<14} {}",
        "NAME",
        "COMMAND",
        "TYPE",
        "STATUS",
        width = COMMAND_WIDTH
      ))
      .bold()
    );
    for service in &services {
      let mut status =
        if manager.is_installed(&service.name) { "Installed" } else { "Not installed" }.to_string();
      if !service.enabled {
        status.push_str(" (Disabled)");
      }
      println!(
        "{:<20} {:<width$} {:<14} {}",
        service.name,
        truncate(&service.command_line(), COMMAND_WIDTH),
        service.describe_trigger(),
        status,
        width = COMMAND_WIDTH
      );
    }
    Ok(())
  }

  /// `nazim status`
  pub fn status(&mut self, name: String) -> Result<(), CliErrors> {
    let service = self.store.get(&name)?.clone();

    println!("{} {}", style(LOOKING_GLASS).cyan(), style(&service.name).bold());
    println!("   Command:   {}", style(service.command_line()).yellow());
    println!("   Type:      {}", service.describe_trigger());
    if let Some(workdir) = &service.workdir {
      println!("   Workdir:   {}", workdir.display());
    }
    println!("   Native ID: {}", native_id(&service.name, OS));
    println!("   Platform:  {}", service.platform);

    let manager = self.manager()?;
    let installed = manager.is_installed(&service.name);
    println!("   Installed: {}", if installed { style("yes").green() } else { style("no").red() });

    match manager.state(&service.name) {
      Ok(Outcome::Done(TaskState::Enabled)) =>
        println!("   State:     {}", style("Enabled").green()),
      Ok(Outcome::Done(TaskState::Disabled)) =>
        println!("   State:     {}", style("Disabled").yellow()),
      Ok(Outcome::Elevated) => {},
      Err(e) if e.is_not_found() => println!("   State:     {}", style("Not installed").red()),
      Err(e) => {
        warn!("Querying {} failed: {}", name, e);
        println!("   State:     {} ({})", style("Unknown").red(), e);
      },
    }
    Ok(())
  }
}
