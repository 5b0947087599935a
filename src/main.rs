//! tickio - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tickio::demo::run_demo;
use tickio::util::config::{load_config_or_default, CONFIG_FILE};
use tickio::util::logger::{self, LogLevel};
use tickio::{NAME, VERSION};

/// Cooperative single-threaded task runtime
#[derive(Parser, Debug)]
#[command(name = "tickio")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file
    #[arg(short, long, global = true, value_name = "FILE", default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the demo workload
    Demo {
        /// How long to run the loop, in milliseconds
        #[arg(long, value_name = "N", default_value_t = 3000)]
        run_ms: u64,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.log.level
    };
    logger::init_with_level(level);

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::Demo { run_ms } => {
            let stats =
                run_demo(config, Duration::from_millis(run_ms)).context("Demo failed")?;
            println!("{:#?}", stats);
        }
        Commands::Config => {
            let text = config
                .to_toml_string()
                .context("Failed to render config")?;
            print!("{}", text);
        }
    }

    Ok(())
}
