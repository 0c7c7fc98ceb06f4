//! The seam between adapters and the native control tools.
//!
//! Adapters never spawn processes directly; they go through a [`CommandRunner`]. Production
//! code uses [`SystemRunner`], tests substitute a recording fake that returns canned output
//! so no real `schtasks`, `systemctl` or `launchctl` is ever invoked.

use std::process::Command;

use tracing::{debug, trace};

use super::*;

/// Exit status and captured output of a finished native tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  /// Exit code, `None` when the process was killed by a signal
  pub code:   Option<i32>,
  /// Captured stdout, lossily decoded
  pub stdout: String,
  /// Captured stderr, lossily decoded
  pub stderr: String,
}

impl CommandOutput {
  /// A successful run that printed `stdout`.
  pub fn ok(stdout: impl Into<String>) -> Self {
    Self { code: Some(0), stdout: stdout.into(), stderr: String::new() }
  }

  /// A failed run with exit `code` that printed `stderr`.
  pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
    Self { code: Some(code), stdout: String::new(), stderr: stderr.into() }
  }

  /// Whether the tool exited with status zero.
  pub fn success(&self) -> bool { self.code == Some(0) }

  /// Stdout followed by stderr, the only channel tools report through.
  pub fn combined(&self) -> String {
    match (self.stdout.is_empty(), self.stderr.is_empty()) {
      (_, true) => self.stdout.clone(),
      (true, false) => self.stderr.clone(),
      (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
    }
  }

  /// Case-insensitive search of the combined output.
  pub fn mentions(&self, needle: &str) -> bool {
    self.combined().to_lowercase().contains(&needle.to_lowercase())
  }
}

/// Runs native tools on behalf of an adapter.
pub trait CommandRunner {
  /// Runs `program` with `args`, waits for it, and captures its output.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::IO`] only when the process could not be spawned; a non-zero exit
  /// is reported through [`CommandOutput::code`].
  fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, NazimError>;
}

/// Spawns real processes with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
  fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, NazimError> {
    debug!("Running: {} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output()?;
    let output = CommandOutput {
      code:   output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    trace!("{} exited with {:?}: {}", program, output.code, output.combined());
    Ok(output)
  }
}

#[cfg(test)]
pub(crate) mod fake {
  use std::{cell::RefCell, rc::Rc};

  use super::*;

  /// Records every invocation and answers from scripted rules.
  ///
  /// Rules match on a prefix of the rendered command line (`program arg arg ...`); the most
  /// recently added matching rule wins, so a test can change an answer mid-scenario.
  /// Unmatched commands succeed with empty output.
  #[derive(Clone, Debug, Default)]
  pub struct FakeRunner {
    calls: Rc<RefCell<Vec<String>>>,
    rules: Rc<RefCell<Vec<(String, CommandOutput)>>>,
  }

  impl FakeRunner {
    pub fn new() -> Self { Self::default() }

    /// Answers commands starting with `prefix` with `output`.
    pub fn respond(&self, prefix: &str, output: CommandOutput) -> &Self {
      self.rules.borrow_mut().push((prefix.to_string(), output));
      self
    }

    /// Every command line run so far.
    pub fn calls(&self) -> Vec<String> { self.calls.borrow().clone() }

    /// Command lines starting with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
      self.calls().into_iter().filter(|call| call.starts_with(prefix)).collect()
    }

    pub fn clear(&self) { self.calls.borrow_mut().clear() }
  }

  impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, NazimError> {
      let line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
      self.calls.borrow_mut().push(line.clone());
      let answer = self
        .rules
        .borrow()
        .iter()
        .rev()
        .find(|(prefix, _)| line.starts_with(prefix.as_str()))
        .map(|(_, output)| output.clone());
      Ok(answer.unwrap_or_else(|| CommandOutput::ok("")))
    }
  }
}
