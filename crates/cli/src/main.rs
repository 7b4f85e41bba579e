//! CLI entry point for bucketctl.

use bucketctl::CliConfig;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    config.run()
}
