//! Register commands and scripts with the operating system's native scheduler.
//!
//! nazim keeps one small [`Service`] descriptor per task and translates it into whatever the
//! host understands:
//! - Windows Task Scheduler through `schtasks`
//! - per-user systemd units through `systemctl --user`
//! - per-user launchd agents through `launchctl`
//!
//! Every backend implements the same [`platform::ServiceManager`] interface, so callers pick an
//! adapter once with [`platform::for_current_os`] and never branch on the OS again.
//!
//! # Example
//! ```rust,no_run
//! use nazim::{paths::Paths, platform, service::Interval, Service};
//!
//! fn main() -> Result<(), nazim::NazimError> {
//!   let paths = Paths::from_env()?;
//!   let manager = platform::for_current_os(&paths)?;
//!
//!   let backup = Service::new("backup", "/usr/bin/tar")
//!     .with_args(["-czf", "out.tgz", "/data"])
//!     .every("1h".parse::<Interval>()?);
//!   manager.install(&backup)?;
//!
//!   assert!(manager.is_installed("backup"));
//!   Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod elevation;
pub mod errors;
pub mod escape;
pub mod normalize;
pub mod paths;
pub mod platform;
pub mod runner;
pub mod script;
pub mod service;
pub mod store;

pub use errors::NazimError;
pub use paths::Paths;
pub use platform::{Outcome, ServiceManager, TaskState};
pub use runner::{CommandOutput, CommandRunner};
pub use service::{Interval, Service, Trigger};
pub use store::ServiceStore;
#[cfg(test)] use tracing_test::traced_test;
