use std::path::PathBuf;

use clap::Parser;
use dora_tpcc::TpccConfig;
use miette::{IntoDiagnostic, Result};

use crate::run::RunArgs;

/// Data-oriented TPC-C driver.
#[derive(Debug, Parser)]
#[command(name = "dora", version)]
pub enum Cli {
    Run(RunArgs),
    /// Print the effective configuration as JSON.
    Config {
        /// Configuration file to merge over the defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self {
            Cli::Run(args) => args.run(),
            Cli::Config { config } => {
                let config = load_config(config.as_deref())?;
                let json = serde_json::to_string_pretty(&config).into_diagnostic()?;
                println!("{json}");
                Ok(())
            }
        }
    }
}

/// Reads a JSON configuration; missing fields keep their defaults.
pub(crate) fn load_config(path: Option<&std::path::Path>) -> Result<TpccConfig> {
    let Some(path) = path else {
        return Ok(TpccConfig::default());
    };
    let text = std::fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&text).into_diagnostic()
}
