//! `nazim`: register commands and scripts with the native OS scheduler.
//!
//! ```bash
//! nazim add -n backup -c /usr/bin/tar -i 1h -- -czf out.tgz /data
//! nazim add -n "init script" -c write --on-startup
//! nazim list
//! nazim disable backup
//! nazim remove init script
//! ```

use std::path::Path;

use clap::{builder::ArgAction, Args, Parser, Subcommand};
use commands::{App, ServiceFlags};
use console::{style, Emoji};
use errors::CliErrors;
use nazim::Paths;
use tracing::{debug, trace};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
  fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

pub mod commands;
pub mod errors;

static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static PENCIL: Emoji<'_, '_> = Emoji("📝 ", "");
static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✨ ", "");
static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");
static ERROR: Emoji<'_, '_> = Emoji("❌ ", "error: ");

#[derive(Parser)]
#[command(author, version, about = "Register commands and scripts with the native OS scheduler")]
struct Cli {
  /// Verbose mode (-v, -vv, -vvv)
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Register a new service and install it in the scheduler
  Add {
    /// Name of the service
    #[arg(short, long)]
    name:  String,
    #[command(flatten)]
    flags: ServiceFlags,
  },
  /// List configured services
  List,
  /// Show details and scheduler state of a service
  #[command(visible_alias = "info")]
  Status {
    /// Name of the service
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>,
  },
  /// Change a service and reinstall it
  Edit {
    /// Name of the service
    #[arg(required = true, num_args = 1..)]
    name:  Vec<String>,
    #[command(flatten)]
    flags: ServiceFlags,
  },
  /// Uninstall a service and forget it
  Remove {
    /// Name of the service
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>,
    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    yes:  bool,
  },
  /// Re-activate the trigger of a service
  Enable {
    /// Name of the service
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>,
  },
  /// Deactivate the trigger of a service, keeping its definition
  Disable {
    /// Name of the service
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>,
  },
  /// Run a service now, independent of its trigger
  Run {
    /// Name of the service
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>,
  },
}

/// Setup logging with the specified verbosity level.
///
/// Console output goes to stderr at the chosen level. A debug-level copy is appended to
/// `nazim.log` in `log_dir` when that file can be opened; the returned guard flushes it.
fn setup_logging(verbosity: u8, log_dir: &Path) -> Option<WorkerGuard> {
  let verbosity = match std::env::var("NAZIM_VERBOSE").as_deref() {
    Ok("1") | Ok("true") => verbosity.max(1),
    _ => verbosity,
  };
  let filter = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  let stderr_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(verbosity > 1)
    .with_file(verbosity > 2)
    .with_line_number(verbosity > 2)
    .with_filter(filter);

  let file_appender = std::fs::create_dir_all(log_dir).ok().and_then(|_| {
    rolling::RollingFileAppender::builder()
      .rotation(rolling::Rotation::NEVER)
      .filename_prefix("nazim")
      .filename_suffix("log")
      .build(log_dir)
      .ok()
  });
  let (file_layer, guard) = match file_appender {
    Some(appender) => {
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(EnvFilter::new("nazim=debug,nazim_cli=debug"));
      (Some(layer), Some(guard))
    },
    None => (None, None),
  };

  tracing_subscriber::registry().with(stderr_layer).with(file_layer).init();
  guard
}

fn join_name(words: Vec<String>) -> String { words.join(" ") }

fn run(command: Commands, paths: Paths) -> Result<(), CliErrors> {
  let mut app = App::new(paths)?;
  match command {
    Commands::Add { name, flags } => app.add(name, flags),
    Commands::List => app.list(),
    Commands::Status { name } => app.status(join_name(name)),
    Commands::Edit { name, flags } => app.edit(join_name(name), flags),
    Commands::Remove { name, yes } => app.remove(join_name(name), yes),
    Commands::Enable { name } => app.set_enabled(join_name(name), true),
    Commands::Disable { name } => app.set_enabled(join_name(name), false),
    Commands::Run { name } => app.run(join_name(name)),
  }
}

fn main() {
  let cli = Cli::parse();

  let paths = match Paths::from_env() {
    Ok(paths) => paths,
    Err(e) => {
      eprintln!("{} {}", style(ERROR).red(), style(e).red());
      std::process::exit(1);
    },
  };
  let guard = setup_logging(cli.verbose, &paths.log_dir);
  debug!("Resolved paths: {:?}", paths);
  trace!("Arguments: {:?}", std::env::args().collect::<Vec<_>>());

  if let Err(e) = run(cli.command, paths) {
    debug!("Command failed: {:?}", e);
    eprintln!("{} {}", style(ERROR).red(), style(e).red());
    drop(guard);
    std::process::exit(1);
  }
}
