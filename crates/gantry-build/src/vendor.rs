//! Front-end vendor package installation.

use crate::command::CommandRunner;
use crate::config::PathConfig;
use crate::pipeline::BuildError;
use crate::report::ErrorGuard;

/// Runs the configured package install command.
pub struct VendorFetcher<'a> {
    config: &'a PathConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> VendorFetcher<'a> {
    pub fn new(config: &'a PathConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    pub fn fetch(&self, guard: &mut ErrorGuard<'_>) -> Result<(), BuildError> {
        let Some((program, args)) = self.config.vendor.command.split_first() else {
            tracing::info!("No vendor command configured, skipping fetch");
            return Ok(());
        };

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.runner.run(&self.config.root, program, &args)?;
        if !output.is_empty() {
            tracing::debug!("{}", output);
        }

        guard.record(Ok(self.config.resolve(&self.config.vendor.dest)));
        Ok(())
    }
}
