use std::env;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use jevis_sysreader::config::{
    APP_NAME, AppConfig, load_config, load_or_init_config, resolve_config_path,
    write_default_config,
};
use jevis_sysreader::disk::{self, SystemStores};
use jevis_sysreader::{ExampleRunner, Session, TracingReporter};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn async_main(ctx: RuntimeContext, command: Command) -> Result<()> {
    handle_remote(&ctx, command).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let create_config = !matches!(cli.command, Command::Init(_));
    let ctx = RuntimeContext::new(cli.common.clone(), create_config)?;
    ctx.init_logging()?;
    debug!("resolved config file: {}", ctx.config_file.display());

    match cli.command {
        Command::DiskUsage => handle_disk_usage(&ctx),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
        command => async_main(ctx, command),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reads local system data and writes it into a JEVis system.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    /// Output machine readable YAML
    #[arg(long, global = true)]
    yaml: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Emit additional diagnostics for troubleshooting
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every example operation from the config, in order
    Run,
    /// List the objects of a class and the latest value of their attributes
    ListObjects {
        /// Name of the class
        class: String,
    },
    /// Print name, unique flag, valid parents and types of a class
    DescribeClass {
        /// Name of the class
        class: String,
    },
    /// Write the local disk capacity as a new sample
    WriteMeasurement(WriteMeasurementCommand),
    /// Create a new object under a parent object
    CreateObject(CreateObjectCommand),
    /// Print the local disk capacity without connecting
    DiskUsage,
    /// Create a default config file
    Init(InitCommand),
    /// Inspect or modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct WriteMeasurementCommand {
    /// ID of the target object
    object_id: i64,
    /// Name of the attribute to write to
    attribute: String,
    /// Note attached to the sample (defaults to the configured note)
    #[arg(long)]
    note: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct CreateObjectCommand {
    /// ID of the parent object
    parent_id: i64,
    /// Class of the new object
    class: String,
    /// Name of the new object
    name: String,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Overwrite an existing config file
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration (passwords redacted)
    Show,
    /// Print the config file path
    Path,
    /// Reset the config file to defaults
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts, create_config: bool) -> Result<Self> {
        let config_file = resolve_config_path(common.config.clone())?;
        let config = if create_config {
            load_or_init_config(&config_file)?
        } else {
            load_config(&config_file)?
        };

        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("jevis_sysreader={level},jevis_api={level}"))
        });

        let file_layer = match self.config.logging.file.as_deref() {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {path}"))?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
            }
            None => None,
        };

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(self.common.diagnostics)
                        .with_file(self.common.diagnostics)
                        .with_line_number(self.common.diagnostics),
                )
                .try_init()
                .ok();
        }

        // Also init env_logger for the log macros used here
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.quiet {
            LevelFilter::Error
        } else if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self.configured_level(),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn configured_level(&self) -> LevelFilter {
        // Logging is not installed yet; an unknown level falls back silently.
        LevelFilter::from_str(&self.config.logging.level).unwrap_or(LevelFilter::Info)
    }

    /// Print a value as JSON or YAML when requested.
    ///
    /// Returns `false` when neither format was asked for.
    fn print_structured<T: Serialize>(&self, value: &T) -> Result<bool> {
        if self.common.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("serializing output to JSON")?
            );
            Ok(true)
        } else if self.common.yaml {
            println!(
                "{}",
                serde_yaml::to_string(value).context("serializing output to YAML")?
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

async fn handle_remote(ctx: &RuntimeContext, command: Command) -> Result<()> {
    let session = Session::open(&ctx.config.connection)
        .await
        .with_context(|| {
            format!(
                "connecting to {}:{}/{}",
                ctx.config.connection.host, ctx.config.connection.port, ctx.config.connection.schema
            )
        })?;

    let runner = ExampleRunner::new(session, Arc::new(TracingReporter));
    runner.report_connected();
    let examples = &ctx.config.examples;

    match command {
        Command::Run => {
            let summary = runner.run_all(examples).await;
            if !ctx.print_structured(&summary)? {
                info!(
                    "finished: {} succeeded, {} failed",
                    summary.succeeded, summary.failed
                );
            }
        }
        Command::ListObjects { class } => {
            let objects = runner.list_objects_by_class(&class).await?;
            ctx.print_structured(&objects)?;
        }
        Command::DescribeClass { class } => {
            let description = runner.describe_class(&class).await?;
            ctx.print_structured(&description)?;
        }
        Command::WriteMeasurement(cmd) => {
            let note = cmd.note.as_deref().unwrap_or(&examples.measurement.note);
            let sample = runner
                .write_measurement(cmd.object_id, &cmd.attribute, note)
                .await?;
            ctx.print_structured(&sample)?;
        }
        Command::CreateObject(cmd) => {
            let created = runner
                .create_object(cmd.parent_id, &cmd.class, &cmd.name)
                .await?;
            ctx.print_structured(&created)?;
        }
        other => return Err(anyhow!("{other:?} does not use a JEVis connection")),
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct DiskUsage {
    total_bytes: u64,
}

fn handle_disk_usage(ctx: &RuntimeContext) -> Result<()> {
    let total_bytes = disk::total_capacity(&SystemStores, &TracingReporter);
    let usage = DiskUsage { total_bytes };
    if !ctx.print_structured(&usage)? {
        println!("{total_bytes}");
    }
    Ok(())
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.config_file.display()
        ));
    }

    write_default_config(&ctx.config_file)?;
    info!("wrote default config to {}", ctx.config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let shown = ctx.config.redacted();
            if !ctx.print_structured(&shown)? {
                println!("{shown:#?}");
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => write_default_config(&ctx.config_file),
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
