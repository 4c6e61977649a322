//! Recursive, structure-preserving asset copies (images, fonts).

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::config::CopyPaths;
use crate::config::PathConfig;
use crate::pipeline::BuildError;
use crate::report::ErrorGuard;

/// Copies one asset category verbatim.
pub struct AssetCopier<'a> {
    config: &'a PathConfig,
    paths: &'a CopyPaths,
}

impl<'a> AssetCopier<'a> {
    pub fn new(config: &'a PathConfig, paths: &'a CopyPaths) -> Self {
        Self { config, paths }
    }

    /// Copy every file under the source directory. Any filesystem error,
    /// including a missing source directory, fails the task.
    pub fn copy(&self, guard: &mut ErrorGuard<'_>) -> Result<(), BuildError> {
        let src = self.config.resolve(&self.paths.src);
        let dest = self.config.resolve(&self.paths.dest);

        if !src.is_dir() {
            return Err(BuildError::Io {
                path: src,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "source directory not found",
                ),
            });
        }

        for entry in WalkDir::new(&src).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::Io {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| src.clone()),
                source: e.into(),
            })?;

            let relative = entry.path().strip_prefix(&src).unwrap_or(entry.path());
            let target = dest.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| BuildError::Io {
                    path: target.clone(),
                    source: e,
                })?;
            } else {
                fs::copy(entry.path(), &target).map_err(|e| BuildError::Io {
                    path: entry.path().to_path_buf(),
                    source: e,
                })?;
                guard.record(Ok(target));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskKind;
    use crate::report::NoEvents;
    use tempfile::tempdir;

    #[test]
    fn copies_tree() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("app/assets/images");
        fs::create_dir_all(src.join("icons")).unwrap();
        fs::write(src.join("logo.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        fs::write(src.join("icons/star.svg"), "<svg/>").unwrap();
        let config = PathConfig::with_root(temp.path());

        let mut guard = ErrorGuard::new(TaskKind::Images, &NoEvents);
        AssetCopier::new(&config, &config.images)
            .copy(&mut guard)
            .unwrap();

        let out = temp.path().join("public/images");
        assert_eq!(
            fs::read(out.join("logo.png")).unwrap(),
            vec![0x89, 0x50, 0x4e, 0x47]
        );
        assert_eq!(
            fs::read_to_string(out.join("icons/star.svg")).unwrap(),
            "<svg/>"
        );
        assert_eq!(guard.finish().outputs.len(), 2);
    }

    #[test]
    fn missing_source_is_fatal() {
        let temp = tempdir().unwrap();
        let config = PathConfig::with_root(temp.path());

        let mut guard = ErrorGuard::new(TaskKind::Fonts, &NoEvents);
        let result = AssetCopier::new(&config, &config.fonts).copy(&mut guard);

        assert!(matches!(result, Err(BuildError::Io { .. })));
    }
}
