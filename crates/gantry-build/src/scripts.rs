//! Script pass-through: the entry file is copied with a notice header.

use std::fs;

use crate::config::PathConfig;
use crate::notice;
use crate::pipeline::BuildError;
use crate::report::ErrorGuard;
use crate::views::write_file;

/// Builds the `javascripts` task.
pub struct ScriptBuilder<'a> {
    config: &'a PathConfig,
}

impl<'a> ScriptBuilder<'a> {
    pub fn new(config: &'a PathConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, guard: &mut ErrorGuard<'_>) -> Result<(), BuildError> {
        let scripts = &self.config.javascripts;
        let entry = self.config.resolve(&scripts.src).join(&scripts.entry);

        let source = fs::read_to_string(&entry).map_err(|e| BuildError::Io {
            path: entry.clone(),
            source: e,
        })?;

        let output_path = self.config.resolve(&scripts.dest).join(&scripts.entry);
        write_file(&output_path, notice::stamp(&scripts.src, &source).as_bytes())?;
        guard.record(Ok(output_path));

        Ok(())
    }
}
