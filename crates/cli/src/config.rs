//! Command-line arguments and configuration loading.

use crate::commands::Command;
use anyhow::Context;
use clap::Parser;
use distribution::DistributionConfig;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Offline simulator for bucket distribution.
#[derive(Parser, Debug)]
#[command(name = "bucketctl", author, version, about, long_about = None)]
pub struct CliConfig {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Install logging and run the selected command.
    pub fn run(self) -> anyhow::Result<()> {
        init_tracing(self.verbose);
        let result = self.command.execute()?;
        println!("{result}");
        Ok(())
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load a distribution config from a JSON file, or the defaults.
///
/// Missing fields in the file keep their default values.
pub fn load_distribution_config(path: Option<&Path>) -> anyhow::Result<DistributionConfig> {
    let config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => DistributionConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
