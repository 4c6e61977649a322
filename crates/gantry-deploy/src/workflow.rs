//! Promote the build output to the publishing branch.
//!
//! Every step runs synchronously and the first failure stops the sequence.
//! Nothing is rolled back: a failure after the checkout leaves the
//! repository on the publishing branch with a partial merge in progress,
//! to be finished or aborted by hand.

use std::fs;
use std::path::{Path, PathBuf};

use gantry_build::{CommandError, CommandRunner, PathConfig};

/// Errors that abort a deploy.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Can only deploy from {expected} (currently on {actual})")]
    Precondition { expected: String, actual: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a successful deploy did.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployReport {
    /// Branch the deploy started from and returned to
    pub branch: String,
    /// Entries moved from the output directory to the root
    pub moved: Vec<PathBuf>,
    /// Paths deleted from the publishing branch
    pub removed: Vec<PathBuf>,
}

pub struct DeployWorkflow<'a> {
    config: &'a PathConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> DeployWorkflow<'a> {
    pub fn new(config: &'a PathConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Run the deploy.
    pub fn run(&self) -> Result<DeployReport, DeployError> {
        let deploy = &self.config.deploy;

        let branch = self.current_branch()?;
        if branch != deploy.source_branch {
            return Err(DeployError::Precondition {
                expected: deploy.source_branch.clone(),
                actual: if branch.is_empty() {
                    "detached HEAD".to_string()
                } else {
                    branch
                },
            });
        }

        tracing::info!("Switching to {}...", deploy.publish_branch);
        self.git(&["checkout", &deploy.publish_branch])?;

        tracing::info!(
            "Merging {} into {}...",
            deploy.source_branch,
            deploy.publish_branch
        );
        self.git(&["merge", &deploy.source_branch, "--no-commit", "--no-ff"])?;

        tracing::info!(
            "Moving the contents of {} to the root",
            self.config.paths.public.display()
        );
        let moved = self.promote_output()?;

        tracing::info!("Removing redundant files...");
        let removed = self.remove_artifacts()?;

        tracing::info!("Committing...");
        self.git(&["add", "."])?;
        self.git(&["commit", "-am", &deploy.message])?;

        tracing::info!("Pushing...");
        self.git(&["push", &deploy.remote, &deploy.publish_branch])?;

        tracing::info!("Switching back to {}...", branch);
        self.git(&["checkout", &branch])?;

        Ok(DeployReport {
            branch,
            moved,
            removed,
        })
    }

    fn git(&self, args: &[&str]) -> Result<String, DeployError> {
        Ok(self.runner.run(&self.config.root, "git", args)?)
    }

    /// Current branch name; empty when HEAD is detached.
    fn current_branch(&self) -> Result<String, DeployError> {
        match self.git(&["symbolic-ref", "--short", "-q", "HEAD"]) {
            Ok(branch) => Ok(branch),
            Err(DeployError::Command(CommandError::Failed { .. })) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Move every entry of the output directory into the repository root,
    /// replacing anything already there.
    fn promote_output(&self) -> Result<Vec<PathBuf>, DeployError> {
        let output = self.config.output_dir();
        let entries = fs::read_dir(&output).map_err(|e| io_error(&output, e))?;

        let mut names: Vec<_> = entries
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<Result<_, _>>()
            .map_err(|e| io_error(&output, e))?;
        names.sort();

        let mut moved = Vec::with_capacity(names.len());
        for name in names {
            let from = output.join(&name);
            let to = self.config.root.join(&name);

            remove_path(&to)?;
            fs::rename(&from, &to).map_err(|e| io_error(&from, e))?;
            tracing::info!("{} -> {}", from.display(), to.display());
            moved.push(to);
        }

        Ok(moved)
    }

    /// Delete the output directory, the app sources and the metadata files.
    fn remove_artifacts(&self) -> Result<Vec<PathBuf>, DeployError> {
        let targets = [&self.config.paths.public, &self.config.paths.app]
            .into_iter()
            .chain(self.config.deploy.remove.iter());

        let mut removed = Vec::new();
        for target in targets {
            let path = self.config.resolve(target);
            if remove_path(&path)? {
                removed.push(path);
            }
        }

        Ok(removed)
    }
}

/// Remove a file or directory tree. Returns whether anything existed.
fn remove_path(path: &Path) -> Result<bool, DeployError> {
    let result = match fs::symlink_metadata(path) {
        Err(_) => return Ok(false),
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
    };

    result.map(|_| true).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> DeployError {
    DeployError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_build::command::render;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records every command; answers `symbolic-ref` with `branch` and
    /// fails any command starting with `fail_on`.
    struct FakeGit {
        branch: Option<String>,
        fail_on: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGit {
        fn on(branch: &str) -> Self {
            Self {
                branch: Some(branch.to_string()),
                fail_on: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeGit {
        fn run(&self, _cwd: &Path, program: &str, args: &[&str]) -> Result<String, CommandError> {
            let line = render(program, args);
            self.calls.lock().unwrap().push(line.clone());

            let failed = || CommandError::Failed {
                command: line.clone(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            };

            if self.fail_on.as_deref().is_some_and(|f| line.starts_with(f)) {
                return Err(failed());
            }
            if args.first() == Some(&"symbolic-ref") {
                return self.branch.clone().ok_or_else(failed);
            }
            Ok(String::new())
        }
    }

    fn project(root: &Path) -> PathConfig {
        let files = [
            ("public/index.html", "<body>Hello</body>"),
            ("public/stylesheets/application.css", "a{color:red}"),
            ("app/views/index.haml", "Hello"),
            ("package.json", "{}"),
            ("gantry.toml", ""),
            ("README.md", "readme"),
        ];
        for (path, contents) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        PathConfig::with_root(root)
    }

    #[test]
    fn refuses_other_branches_before_mutating() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());
        let git = FakeGit::on("feature");

        let err = DeployWorkflow::new(&config, &git).run().unwrap_err();

        assert!(matches!(
            err,
            DeployError::Precondition { ref actual, .. } if actual == "feature"
        ));
        assert_eq!(git.calls(), vec!["git symbolic-ref --short -q HEAD"]);
        assert!(temp.path().join("public/index.html").exists());
    }

    #[test]
    fn detached_head_is_a_precondition_failure() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());
        let git = FakeGit {
            branch: None,
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        };

        let err = DeployWorkflow::new(&config, &git).run().unwrap_err();

        assert!(matches!(err, DeployError::Precondition { .. }));
        assert_eq!(git.calls().len(), 1);
    }

    #[test]
    fn runs_steps_in_order() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());
        let git = FakeGit::on("master");

        let report = DeployWorkflow::new(&config, &git).run().unwrap();

        assert_eq!(
            git.calls(),
            vec![
                "git symbolic-ref --short -q HEAD",
                "git checkout gh-pages",
                "git merge master --no-commit --no-ff",
                "git add .",
                "git commit -am Update gh-pages",
                "git push origin gh-pages",
                "git checkout master",
            ]
        );
        assert_eq!(report.branch, "master");
        assert_eq!(
            report.moved,
            vec![temp.path().join("index.html"), temp.path().join("stylesheets")]
        );
    }

    #[test]
    fn promotes_output_and_removes_artifacts() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());
        let git = FakeGit::on("master");

        let report = DeployWorkflow::new(&config, &git).run().unwrap();

        let root = temp.path();
        assert_eq!(
            fs::read_to_string(root.join("index.html")).unwrap(),
            "<body>Hello</body>"
        );
        assert!(root.join("stylesheets/application.css").exists());
        assert!(!root.join("public").exists());
        assert!(!root.join("app").exists());
        assert!(!root.join("package.json").exists());
        assert!(!root.join("gantry.toml").exists());
        assert!(root.join("README.md").exists());
        assert_eq!(
            report.removed,
            vec![
                root.join("public"),
                root.join("app"),
                root.join("package.json"),
                root.join("gantry.toml"),
            ]
        );
    }

    #[test]
    fn replaces_existing_root_entries() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());
        fs::create_dir_all(temp.path().join("stylesheets")).unwrap();
        fs::write(temp.path().join("stylesheets/old.css"), "old").unwrap();
        let git = FakeGit::on("master");

        DeployWorkflow::new(&config, &git).run().unwrap();

        assert!(!temp.path().join("stylesheets/old.css").exists());
        assert!(temp.path().join("stylesheets/application.css").exists());
    }

    #[test]
    fn failing_step_stops_the_sequence() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());
        let git = FakeGit {
            fail_on: Some("git push".to_string()),
            ..FakeGit::on("master")
        };

        let err = DeployWorkflow::new(&config, &git).run().unwrap_err();

        assert!(matches!(err, DeployError::Command(_)));
        assert_eq!(git.calls().last().unwrap(), "git push origin gh-pages");
        assert!(!git.calls().contains(&"git checkout master".to_string()));
    }
}
