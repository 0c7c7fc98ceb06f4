//! Embedding a command and its arguments in each native definition format.
//!
//! One dialect per scheduler:
//! - [`windows_command_line`] quotes tokens for a `schtasks /tr` command line
//! - [`exec_start_line`] renders a systemd `ExecStart=` directive
//! - [`xml`] escapes text for a plist `<string>` element
//!
//! [`argv_quote`] is separate: it quotes the arguments of a re-launched process for the MSVC
//! runtime parser rather than for a scheduler.
//!
//! Only the systemd dialect can fail. Unit files are line oriented, so a newline in any token
//! would let it inject directives; those tokens are rejected instead of escaped.

use std::path::{Path, PathBuf};

use super::*;

/// Characters that force a Windows token into quotes.
const WINDOWS_SPECIAL: &[char] = &[' ', '\t', '"', '&', '|', '<', '>', '(', ')'];

/// Quotes a single token for a Windows command line.
///
/// Tokens that are empty or contain space, tab, quote or one of `& | < > ( )` are wrapped in
/// double quotes with embedded quotes doubled. Anything else is returned unchanged.
pub fn windows_quote(token: &str) -> String {
  if !token.is_empty() && !token.contains(WINDOWS_SPECIAL) {
    return token.to_string();
  }
  format!("\"{}\"", token.replace('"', "\"\""))
}

/// Builds a space-joined Windows command line from a command and its arguments.
///
/// ```
/// use nazim::escape::windows_command_line;
///
/// let line = windows_command_line("C:\\Program Files\\tool.exe", &["--out", "a b.txt"]);
/// assert_eq!(line, r#""C:\Program Files\tool.exe" --out "a b.txt""#);
/// ```
pub fn windows_command_line<S: AsRef<str>>(command: &str, args: &[S]) -> String {
  std::iter::once(windows_quote(command))
    .chain(args.iter().map(|arg| windows_quote(arg.as_ref())))
    .collect::<Vec<_>>()
    .join(" ")
}

/// Quotes one argument so `CommandLineToArgvW` and the MSVC runtime parse it back unchanged.
///
/// Used for the parameters of a re-launched process. Backslashes are literal except in front
/// of a quote, so runs of them before a quote, or before the closing quote, are doubled.
///
/// ```
/// use nazim::escape::argv_quote;
///
/// assert_eq!(argv_quote("plain"), "plain");
/// assert_eq!(argv_quote(r"C:\My Dir\"), r#""C:\My Dir\\""#);
/// assert_eq!(argv_quote(r#"say "hi""#), r#""say \"hi\"""#);
/// ```
pub fn argv_quote(token: &str) -> String {
  if !token.is_empty() && !token.contains([' ', '\t', '\n', '\u{b}', '"']) {
    return token.to_string();
  }

  let mut quoted = String::with_capacity(token.len() + 2);
  quoted.push('"');
  let mut backslashes = 0;
  for c in token.chars() {
    match c {
      '\\' => backslashes += 1,
      '"' => {
        quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
        quoted.push('"');
        backslashes = 0;
      },
      c => {
        quoted.extend(std::iter::repeat('\\').take(backslashes));
        quoted.push(c);
        backslashes = 0;
      },
    }
  }
  quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
  quoted.push('"');
  quoted
}

/// Rejects tokens that would break out of a single unit-file line.
fn reject_line_breaks(token: &str) -> Result<(), NazimError> {
  if token.contains(['\n', '\r']) {
    return Err(NazimError::InvalidCommand(format!(
      "{:?} contains a newline or carriage return",
      token
    )));
  }
  Ok(())
}

/// Resolves `command` to an absolute path.
///
/// Absolute paths are kept, bare names are looked up on `PATH`, and anything else is made
/// absolute against the current directory.
pub fn resolve_command(command: &str) -> Result<PathBuf, NazimError> {
  let path = Path::new(command);
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }
  if path.components().count() == 1 {
    if let Ok(found) = which::which(command) {
      return Ok(found);
    }
  }
  std::path::absolute(path)
    .map_err(|e| NazimError::InvalidCommand(format!("cannot resolve {command}: {e}")))
}

/// Quotes one token for `ExecStart`, escaping backslash, quote and control characters plus
/// the `%` specifier and `$` variable prefixes systemd would otherwise expand.
fn systemd_quote(token: &str) -> String {
  let mut quoted = String::with_capacity(token.len() + 2);
  quoted.push('"');
  for c in token.chars() {
    match c {
      '\\' => quoted.push_str("\\\\"),
      '"' => quoted.push_str("\\\""),
      '\n' => quoted.push_str("\\n"),
      '\r' => quoted.push_str("\\r"),
      '\t' => quoted.push_str("\\t"),
      '%' => quoted.push_str("%%"),
      '$' => quoted.push_str("$$"),
      c => quoted.push(c),
    }
  }
  quoted.push('"');
  quoted
}

/// Renders the `ExecStart=` line of a systemd service unit.
///
/// The command is resolved with [`resolve_command`] and every token is double quoted.
///
/// # Errors
///
/// Returns [`NazimError::InvalidCommand`] if the command or any argument contains `\n` or
/// `\r`, or if the command path cannot be resolved.
///
/// ```
/// use nazim::escape::exec_start_line;
///
/// let line = exec_start_line("/usr/bin/tar", &["-czf", "out.tgz", "/data"]).unwrap();
/// assert_eq!(line, r#"ExecStart="/usr/bin/tar" "-czf" "out.tgz" "/data""#);
/// assert!(exec_start_line("/bin/echo", &["two\nlines"]).is_err());
/// ```
pub fn exec_start_line<S: AsRef<str>>(command: &str, args: &[S]) -> Result<String, NazimError> {
  reject_line_breaks(command)?;
  for arg in args {
    reject_line_breaks(arg.as_ref())?;
  }

  let resolved = resolve_command(command)?;
  let resolved = resolved.to_str().ok_or_else(|| {
    NazimError::InvalidCommand(format!("{} is not valid UTF-8", resolved.display()))
  })?;

  let mut line = String::from("ExecStart=");
  line.push_str(&systemd_quote(resolved));
  for arg in args {
    line.push(' ');
    line.push_str(&systemd_quote(arg.as_ref()));
  }
  Ok(line)
}

/// Escapes `& < > " '` as XML entities for a plist `<string>` element.
pub fn xml(text: &str) -> String { quick_xml::escape::escape(text).into_owned() }
