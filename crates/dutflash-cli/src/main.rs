//! dutflash - flash a device under test to a requested build
//!
//! Resolves the build, skips devices already running it, retries the update
//! a bounded number of times and keeps the device's stored properties in
//! sync with what it runs.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dutflash_core::LATEST_BUILD;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::FlashArgs;
use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "dutflash")]
#[command(author, version, about = "Flash devices under test")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DUTFLASH_CONFIG")]
    config: Option<PathBuf>,

    /// Base directory for downloads, logs and state not set in the config
    #[arg(long, env = "DUTFLASH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flash a device to the requested build
    Flash {
        /// Device name (as stored in the property store)
        #[arg(short, long)]
        device: String,

        /// Build token: "latest" or a build number
        #[arg(short, long)]
        build: Option<String>,

        /// Branch to take the build from
        #[arg(long)]
        branch: Option<String>,

        /// Image kind: development, production, factory, diagnostic
        #[arg(short, long)]
        image: Option<String>,

        /// Flash even if the device already runs the build
        #[arg(long)]
        force: bool,

        /// Abort without reporting if the device already runs the build
        #[arg(long)]
        abort_if_on_build: bool,

        /// Maximum number of update attempts
        #[arg(short, long)]
        attempts: Option<u32>,

        /// JSON file describing the CI trigger ({"trigger_type": ..., "build": ...})
        #[arg(long)]
        trigger: Option<PathBuf>,
    },

    /// Resolve a build token without flashing
    Resolve {
        /// Build token: "latest" or a build number
        #[arg(short, long, default_value = LATEST_BUILD)]
        build: String,

        /// Branch to resolve on
        #[arg(long)]
        branch: Option<String>,
    },

    /// Show the stored properties of a device
    Show {
        /// Device name
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("dutflash=info,dutflash_engine=info,dutflash_local=warn")
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load_or_default()
    };
    let data_dir = cli.data_dir.clone().unwrap_or_else(config::default_data_dir);
    let merged = config.resolve(&data_dir);

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    match cli.command {
        Commands::Flash {
            device,
            build,
            branch,
            image,
            force,
            abort_if_on_build,
            attempts,
            trigger,
        } => {
            let args = FlashArgs {
                device,
                build,
                branch,
                image,
                force,
                abort_if_on_build,
                attempts,
                trigger,
            };
            commands::flash(&args, &merged, &ctx).await
        }

        Commands::Resolve { build, branch } => {
            commands::resolve(&build, branch.as_deref(), &merged, &ctx).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Show { device } => {
            commands::show(&device, &merged, &ctx).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
