//! Mapping human-entered service names onto native scheduler identifiers.
//!
//! Every adapter runs the name through [`normalize`] before building its identifier, so the
//! same service is always addressed the same way whether it is being installed, queried or
//! removed:
//!
//! | Scheduler          | Identifier             |
//! |--------------------|------------------------|
//! | Windows schtasks   | `Nazim_<safe>`         |
//! | systemd user units | `nazim-<safe>`         |
//! | launchd agents     | `com.nazim.<safe>`     |

/// Characters removed from names: whitespace plus path and shell metacharacters.
const STRIPPED: &[char] = &[' ', '\t', '\r', '\n', '\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Removes whitespace and path/shell metacharacters from `name`.
///
/// Pure and total: the result may be empty when the input held nothing but stripped
/// characters, so callers validate separately.
///
/// ```
/// assert_eq!(nazim::normalize::normalize("init script"), "initscript");
/// assert_eq!(nazim::normalize::normalize("a/b:c"), "abc");
/// ```
pub fn normalize(name: &str) -> String { name.chars().filter(|c| !STRIPPED.contains(c)).collect() }

/// Task Scheduler task name, e.g. `Nazim_backup`.
pub fn task_name(name: &str) -> String { format!("Nazim_{}", normalize(name)) }

/// systemd unit stem without suffix, e.g. `nazim-backup`.
pub fn unit_stem(name: &str) -> String { format!("nazim-{}", normalize(name)) }

/// launchd job label, e.g. `com.nazim.backup`.
pub fn launchd_label(name: &str) -> String { format!("com.nazim.{}", normalize(name)) }

/// The identifier the scheduler of `os` uses for `name`.
pub fn native_id(name: &str, os: &str) -> String {
  match os {
    "windows" => task_name(name),
    "macos" => launchd_label(name),
    _ => unit_stem(name),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clean_names_are_unchanged() {
    for name in ["backup", "db-dump_2", "a.b", "ação", "X"] {
      assert_eq!(normalize(name), name);
      assert_eq!(normalize(&normalize(name)), normalize(name));
    }
  }

  #[test]
  fn test_forbidden_characters_are_stripped() {
    let dirty = "my \\/:*?\"<>|\t\n\rservice";
    let clean = normalize(dirty);
    assert_eq!(clean, "myservice");
    assert!(!clean.contains(STRIPPED));
  }

  #[test]
  fn test_may_become_empty() {
    assert_eq!(normalize(" / "), "");
  }

  #[test]
  fn test_native_identifiers() {
    assert_eq!(task_name("init script"), "Nazim_initscript");
    assert_eq!(unit_stem("backup"), "nazim-backup");
    assert_eq!(launchd_label("init script"), "com.nazim.initscript");
    assert_eq!(native_id("a b", "windows"), "Nazim_ab");
    assert_eq!(native_id("a b", "linux"), "nazim-ab");
  }
}
