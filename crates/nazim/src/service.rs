//! The service descriptor and its validation rules.
//!
//! A [`Service`] describes one managed task: what to run, where, and when. It is the only
//! domain entity in nazim. Descriptors are persisted as a flat YAML record by the
//! [`store`](crate::store) and handed by reference to a platform adapter for installation.
//!
//! Triggers are stored as independent flags (`on_startup`, `on_logon`, `interval`) so that
//! whatever is on disk can be loaded, but only descriptors with exactly one trigger pass
//! [`Service::validate`]. Adapters work with the resolved [`Trigger`] enum.
//!
//! # Examples
//!
//! ```
//! use nazim::service::{Interval, Service, Trigger};
//!
//! # fn example() -> Result<(), nazim::errors::NazimError> {
//! let backup = Service::new("backup", "/usr/bin/tar")
//!   .with_args(["-czf", "out.tgz", "/data"])
//!   .every("1h".parse::<Interval>()?);
//!
//! backup.validate()?;
//! assert_eq!(backup.trigger()?, Trigger::Interval("1h".parse()?));
//! # Ok(())
//! # }
//! ```

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::*;

/// Longest service name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Characters no scheduler can carry in a task name.
const FORBIDDEN_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Seconds in each unit accepted by [`Interval`], largest first.
const UNITS: &[(u64, char)] = &[(86_400, 'd'), (3_600, 'h'), (60, 'm'), (1, 's')];

/// A fixed, strictly positive repeat interval.
///
/// Written and parsed as `<n><unit>` where unit is one of `s`, `m`, `h` or `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval(Duration);

impl Interval {
  /// Wraps a duration. Zero is representable but rejected by validation.
  pub fn new(duration: Duration) -> Self { Self(duration) }

  /// Shorthand for an interval of whole seconds.
  pub fn from_secs(secs: u64) -> Self { Self(Duration::from_secs(secs)) }

  /// The interval as a [`Duration`].
  pub fn duration(&self) -> Duration { self.0 }

  /// The interval in whole seconds.
  pub fn as_secs(&self) -> u64 { self.0.as_secs() }
}

impl fmt::Display for Interval {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let secs = self.as_secs();
    if secs == 0 {
      return write!(f, "0s");
    }
    // `UNITS` ends with seconds, so a divisor always exists
    let (size, suffix) =
      UNITS.iter().find(|(size, _)| secs % size == 0).copied().unwrap_or((1, 's'));
    write!(f, "{}{}", secs / size, suffix)
  }
}

impl FromStr for Interval {
  type Err = NazimError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(NazimError::InvalidService("duration cannot be empty".to_string()));
    }

    let (value, suffix) = s.split_at(s.len() - s.chars().last().map_or(0, char::len_utf8));
    let multiplier = match suffix {
      "s" => 1,
      "m" => 60,
      "h" => 3_600,
      "d" => 86_400,
      _ =>
        return Err(NazimError::InvalidService(
          "invalid duration suffix, use s, m, h, or d".to_string(),
        )),
    };

    let value: i64 = value
      .parse()
      .map_err(|e| NazimError::InvalidService(format!("invalid duration value: {e}")))?;
    if value <= 0 {
      return Err(NazimError::InvalidService(format!(
        "duration value must be positive, got {value}"
      )));
    }

    let secs = (value as u64)
      .checked_mul(multiplier)
      .ok_or_else(|| NazimError::InvalidService(format!("duration {s} is too large")))?;
    Ok(Self::from_secs(secs))
  }
}

impl Serialize for Interval {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Interval {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
  }
}

/// The condition that fires a scheduled task. Exactly one applies to a valid service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// Run once when the machine (or the user's service manager) starts.
  OnStartup,
  /// Run when the user logs on.
  OnLogon,
  /// Run repeatedly at a fixed interval.
  Interval(Interval),
}

/// A command registered with the native scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
  /// Human-entered name, normalized by adapters into native identifiers
  pub name:       String,
  /// Program or script path to execute
  pub command:    String,
  /// Arguments passed to the command, in order
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub args:       Vec<String>,
  /// Directory to run the command from
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workdir:    Option<PathBuf>,
  /// Run at system startup
  #[serde(default)]
  pub on_startup: bool,
  /// Run at user logon
  #[serde(default)]
  pub on_logon:   bool,
  /// Run at a fixed interval
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interval:   Option<Interval>,
  /// Whether the trigger is active; independent of installation
  #[serde(default = "default_enabled")]
  pub enabled:    bool,
  /// OS the descriptor was created under, informational only
  #[serde(default)]
  pub platform:   String,
}

fn default_enabled() -> bool { true }

impl Service {
  /// Creates an enabled descriptor with no trigger set yet.
  pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
    Self {
      name:       name.into(),
      command:    command.into(),
      args:       Vec::new(),
      workdir:    None,
      on_startup: false,
      on_logon:   false,
      interval:   None,
      enabled:    true,
      platform:   std::env::consts::OS.to_string(),
    }
  }

  /// Replaces the argument list.
  pub fn with_args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    self.args = args.into_iter().map(Into::into).collect();
    self
  }

  /// Sets the working directory.
  pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
    self.workdir = Some(workdir.into());
    self
  }

  /// Marks the service to run at startup.
  pub fn on_startup(mut self) -> Self {
    self.on_startup = true;
    self
  }

  /// Marks the service to run at logon.
  pub fn on_logon(mut self) -> Self {
    self.on_logon = true;
    self
  }

  /// Makes the service repeat at `interval`.
  pub fn every(mut self, interval: Interval) -> Self {
    self.interval = Some(interval);
    self
  }

  /// Replaces whatever trigger is set with `trigger`.
  pub fn set_trigger(&mut self, trigger: Trigger) {
    self.on_startup = trigger == Trigger::OnStartup;
    self.on_logon = trigger == Trigger::OnLogon;
    self.interval = match trigger {
      Trigger::Interval(interval) => Some(interval),
      _ => None,
    };
  }

  /// Checks that the descriptor can be installed.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::InvalidService`] if:
  /// - the name breaks the character or length rules (see [`validate_name`])
  /// - the command is empty
  /// - zero or more than one trigger is set
  /// - the interval is zero
  pub fn validate(&self) -> Result<(), NazimError> {
    validate_name(&self.name)?;
    if self.command.trim().is_empty() {
      return Err(NazimError::InvalidService("service command is required".to_string()));
    }
    self.trigger().map(|_| ())
  }

  /// Resolves the single trigger of this descriptor.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::InvalidService`] when no trigger or several triggers are set, or
  /// the interval is zero.
  pub fn trigger(&self) -> Result<Trigger, NazimError> {
    let interval = match self.interval {
      Some(interval) if interval.duration().is_zero() =>
        return Err(NazimError::InvalidService("interval must be positive".to_string())),
      other => other,
    };

    match (self.on_startup, self.on_logon, interval) {
      (true, false, None) => Ok(Trigger::OnStartup),
      (false, true, None) => Ok(Trigger::OnLogon),
      (false, false, Some(interval)) => Ok(Trigger::Interval(interval)),
      (false, false, None) => Err(NazimError::InvalidService(
        "service must have one of on_startup, on_logon or an interval".to_string(),
      )),
      _ => Err(NazimError::InvalidService(
        "on_startup, on_logon and interval are mutually exclusive".to_string(),
      )),
    }
  }

  /// A short human description of the trigger, e.g. `Startup` or `Every 5m`.
  pub fn describe_trigger(&self) -> String {
    match self.trigger() {
      Ok(Trigger::OnStartup) => "Startup".to_string(),
      Ok(Trigger::OnLogon) => "Logon".to_string(),
      Ok(Trigger::Interval(interval)) => format!("Every {interval}"),
      Err(_) => "-".to_string(),
    }
  }

  /// The command followed by its arguments, space separated, for display.
  pub fn command_line(&self) -> String {
    std::iter::once(self.command.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// Checks a service name against the rules every scheduler can live with.
///
/// The name must be non-empty, at most [`MAX_NAME_LEN`] bytes, free of leading or trailing
/// whitespace, free of `..`, not start with `.`, and contain none of
/// `\ / : * ? " < > |` or control characters.
pub fn validate_name(name: &str) -> Result<(), NazimError> {
  let invalid = |reason: String| Err(NazimError::InvalidService(reason));

  if name.trim().is_empty() {
    return invalid("service name cannot be empty".to_string());
  }
  if name.len() > MAX_NAME_LEN {
    return invalid(format!(
      "service name too long (max {MAX_NAME_LEN} characters, got {})",
      name.len()
    ));
  }
  if name.trim() != name {
    return invalid("service name cannot have leading or trailing spaces".to_string());
  }
  if name.contains("..") {
    return invalid("service name cannot contain '..'".to_string());
  }
  if name.starts_with('.') {
    return invalid("service name cannot start with '.'".to_string());
  }
  if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
    return invalid(format!("service name cannot contain '{c}'"));
  }
  if name.chars().any(char::is_control) {
    return invalid("service name cannot contain control characters".to_string());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn startup(name: &str) -> Service { Service::new(name, "/bin/true").on_startup() }

  #[test]
  fn test_interval_parse() {
    assert_eq!("30s".parse::<Interval>().unwrap().as_secs(), 30);
    assert_eq!("5m".parse::<Interval>().unwrap().as_secs(), 300);
    assert_eq!(" 1h ".parse::<Interval>().unwrap().as_secs(), 3_600);
    assert_eq!("2d".parse::<Interval>().unwrap().as_secs(), 172_800);

    for bad in ["", "5", "0m", "-1h", "1.5h", "h", "10x", "5µ"] {
      assert!(bad.parse::<Interval>().is_err(), "{bad:?} should not parse");
    }
  }

  #[test]
  fn test_interval_display_uses_largest_even_unit() {
    assert_eq!(Interval::from_secs(45).to_string(), "45s");
    assert_eq!(Interval::from_secs(90).to_string(), "90s");
    assert_eq!(Interval::from_secs(5_400).to_string(), "90m");
    assert_eq!(Interval::from_secs(7_200).to_string(), "2h");
    assert_eq!(Interval::from_secs(86_400).to_string(), "1d");
  }

  #[test]
  fn test_valid_names() {
    for name in ["backup", "init script", "db-dump_2", "ação", "a.b"] {
      assert!(validate_name(name).is_ok(), "{name:?} should be valid");
    }
  }

  #[test]
  fn test_invalid_names() {
    let long = "x".repeat(MAX_NAME_LEN + 1);
    for name in [
      "",
      "   ",
      " lead",
      "trail ",
      "a/b",
      "a\\b",
      "c:d",
      "star*",
      "what?",
      "say\"hi\"",
      "<tag>",
      "pi|pe",
      "tab\tname",
      "new\nline",
      "bell\u{7}",
      "..",
      "up..dir",
      ".hidden",
      long.as_str(),
    ] {
      assert!(validate_name(name).is_err(), "{name:?} should be rejected");
    }
    assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
  }

  #[test]
  fn test_validate_requires_command() {
    let mut service = startup("empty");
    service.command = "  ".to_string();
    assert!(service.validate().unwrap_err().is_validation_error());
  }

  #[test]
  fn test_trigger_must_be_exclusive() {
    let both = Service::new("both", "/bin/true").on_startup().every(Interval::from_secs(60));
    assert!(both.validate().is_err());

    let logon_and_startup = Service::new("both", "/bin/true").on_startup().on_logon();
    assert!(logon_and_startup.validate().is_err());

    let none = Service::new("none", "/bin/true");
    assert!(none.validate().is_err());

    let zero = Service::new("zero", "/bin/true").every(Interval::from_secs(0));
    assert!(zero.validate().is_err());
  }

  #[test]
  fn test_trigger_resolution() {
    assert_eq!(startup("s").trigger().unwrap(), Trigger::OnStartup);
    assert_eq!(Service::new("l", "x").on_logon().trigger().unwrap(), Trigger::OnLogon);
    let every = Service::new("i", "x").every(Interval::from_secs(300));
    assert_eq!(every.trigger().unwrap(), Trigger::Interval(Interval::from_secs(300)));
    assert_eq!(every.describe_trigger(), "Every 5m");
  }

  #[test]
  fn test_set_trigger_replaces_previous() {
    let mut service = startup("swap");
    service.set_trigger(Trigger::Interval(Interval::from_secs(3_600)));
    assert!(!service.on_startup);
    assert_eq!(service.trigger().unwrap(), Trigger::Interval(Interval::from_secs(3_600)));

    service.set_trigger(Trigger::OnLogon);
    assert!(service.interval.is_none());
    assert_eq!(service.trigger().unwrap(), Trigger::OnLogon);
  }

  #[test]
  fn test_yaml_shape() {
    let service = Service::new("backup", "/usr/bin/tar")
      .with_args(["-czf", "out.tgz"])
      .every(Interval::from_secs(3_600));
    let yaml = serde_yaml::to_string(&service).unwrap();
    assert!(yaml.contains("interval: 1h"));
    assert!(!yaml.contains("workdir"));

    let parsed: Service = serde_yaml::from_str(
      "name: init\ncommand: init.sh\non_startup: true\nenabled: false\nplatform: linux\n",
    )
    .unwrap();
    assert!(parsed.args.is_empty());
    assert!(!parsed.enabled);
    assert_eq!(parsed.trigger().unwrap(), Trigger::OnStartup);

    assert!(serde_yaml::from_str::<Service>("name: x\ncommand: y\ninterval: 0m\n").is_err());
  }
}
