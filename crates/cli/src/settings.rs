//! Effective run settings: the configuration file overlaid with flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use taskmill_core::configs::{load_flow_config, FlowConfig, CONFIG_FILE_NAME};
use taskmill_core::middleware::{
    buffer_parallel, dry_run, report_flow, report_long_run, report_status, silent_non_failing,
};
use taskmill_core::{ExecuteOptions, Flow};

use crate::Cli;

/// Interval of "still running" notices when neither flags nor config set one.
pub const DEFAULT_LONG_RUN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub verbose: bool,
    pub no_deps: bool,
    pub dry_run: bool,
    pub long_run: Duration,
    pub skip: Vec<String>,
}

impl Settings {
    /// Load the configuration file named by `--config`, or `taskmill.yml` in
    /// the working directory when it exists, and apply the flags on top.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load(path)?,
            None => {
                let default = PathBuf::from(CONFIG_FILE_NAME);
                if default.is_file() {
                    load(&default)?
                } else {
                    FlowConfig::default()
                }
            }
        };
        Ok(Self::merge(&config, cli))
    }

    /// Flags win over the file; skip lists are combined.
    pub fn merge(config: &FlowConfig, cli: &Cli) -> Self {
        let file = config.execute_options();
        let mut skip = file.skip;
        skip.extend(cli.skip.iter().cloned());

        Self {
            verbose: cli.verbose || config.verbose(),
            no_deps: cli.no_deps || file.no_deps,
            dry_run: cli.dry_run || config.dry_run(),
            long_run: cli
                .long_run
                .map(Duration::from_secs)
                .or_else(|| config.long_run())
                .unwrap_or(DEFAULT_LONG_RUN),
            skip,
        }
    }

    pub fn execute_options(&self) -> ExecuteOptions {
        let options = ExecuteOptions::new().skip(self.skip.iter().cloned());
        if self.no_deps {
            options.no_deps()
        } else {
            options
        }
    }

    /// Install the default reporting middlewares.
    pub fn install(&self, flow: &mut Flow) {
        flow.use_executor(report_flow);
        flow.use_runner(buffer_parallel);
        flow.use_runner(report_status);
        if !self.verbose {
            flow.use_runner(silent_non_failing);
        }
        flow.use_runner(report_long_run(self.long_run));
        if self.dry_run {
            flow.use_runner(dry_run);
        }
    }
}

fn load(path: &Path) -> Result<FlowConfig> {
    load_flow_config(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}
