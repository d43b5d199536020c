use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;

use rustclr_host::host::{Host, HostConfig, DEFAULT_DOMAIN_NAME};
use rustclr_host::locate::RuntimeLocator;
use rustclr_host::properties::Property;
use rustclr_host::tpa::{AssemblyListBuilder, Extension};
use rustclr_host::Result;

/// Native host for the CoreCLR runtime.
#[derive(Debug, Parser)]
#[command(name = "rustclr", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalOptions {
    /// Directory containing the runtime library. Falls back to CORE_ROOT,
    /// the installed shared framework (Windows), then the directory of this
    /// executable.
    #[arg(long, global = true, value_name = "DIR")]
    runtime_dir: Option<PathBuf>,

    /// Friendly name of the execution domain.
    #[arg(long, global = true, default_value = DEFAULT_DOMAIN_NAME)]
    domain_name: String,

    /// Trusted assembly pattern, highest priority first. Repeatable.
    #[arg(short, long = "extension", global = true, value_name = "PATTERN")]
    extensions: Vec<Extension>,

    /// Extra runtime property. Repeatable.
    #[arg(short, long = "property", global = true, value_name = "KEY=VALUE")]
    properties: Vec<Property>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the trusted platform assembly list for a directory.
    Tpa {
        #[arg(value_name = "DIR")]
        directory: PathBuf,
    },

    /// Execute the entry point of a managed application.
    Run {
        #[arg(value_name = "APP")]
        app: PathBuf,

        /// Arguments passed to the managed entry point.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Call a static, parameterless managed method.
    Invoke {
        /// Path to the assembly containing the method.
        #[arg(value_name = "ASSEMBLY_PATH")]
        assembly_path: PathBuf,

        /// Assembly name; defaults to the file name without extension.
        #[arg(long)]
        assembly_name: Option<String>,

        /// Fully qualified type name.
        #[arg(long = "type", value_name = "TYPE")]
        type_name: String,

        /// Method name.
        #[arg(long)]
        method: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.global.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(exit_status(code)),
        Err(err) => {
            error!(error = %err, "host failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Maps a managed exit code onto a process status. Codes outside `0..=255`
/// become 1 so they never read as success.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn run(cli: Cli) -> Result<i32> {
    let global = cli.global;
    let extensions = if global.extensions.is_empty() {
        Extension::defaults()
    } else {
        global.extensions
    };

    match cli.command {
        Command::Tpa { directory } => {
            let list = AssemblyListBuilder::new(extensions).build(&directory);
            println!("{list}");
            Ok(0)
        }
        Command::Run { app, args } => {
            let config = host_config(
                &app,
                global.runtime_dir,
                global.domain_name,
                extensions,
                global.properties,
            )?;
            Host::start(&config)?.run(&args)
        }
        Command::Invoke {
            assembly_path,
            assembly_name,
            type_name,
            method,
        } => {
            let assembly_name = match assembly_name {
                Some(name) => name,
                None => assembly_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let config = host_config(
                &assembly_path,
                global.runtime_dir,
                global.domain_name,
                extensions,
                global.properties,
            )?;
            Host::start(&config)?.invoke(&assembly_name, &type_name, &method)?;
            Ok(0)
        }
    }
}

fn host_config(
    app: &Path,
    runtime_dir: Option<PathBuf>,
    domain_name: String,
    extensions: Vec<Extension>,
    extra_properties: Vec<Property>,
) -> Result<HostConfig> {
    let app_path = std::fs::canonicalize(app)?;
    Ok(HostConfig {
        app_path,
        locator: RuntimeLocator::from_env(runtime_dir),
        domain_name,
        extensions,
        extra_properties,
    })
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("rustclr_host=debug,rustclr=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
