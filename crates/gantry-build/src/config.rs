//! Path configuration for the asset pipeline.
//!
//! A [`PathConfig`] is built once at startup (from `gantry.toml` or defaults)
//! and handed to every task behind an `Arc`. Nothing mutates it afterwards.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::pipeline::BuildError;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "gantry.toml";

/// Source and destination directories for every asset category.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Project root every relative path is resolved against
    #[serde(skip)]
    pub root: PathBuf,

    pub paths: ProjectPaths,
    pub layouts: LayoutPaths,
    pub views: ViewPaths,
    pub stylesheets: StylesheetPaths,
    pub javascripts: ScriptPaths,
    pub images: CopyPaths,
    pub fonts: CopyPaths,
    pub vendor: VendorConfig,
    pub deploy: DeployConfig,
    pub watch: WatchConfig,
    pub server: ServerConfig,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            paths: ProjectPaths::default(),
            layouts: LayoutPaths::default(),
            views: ViewPaths::default(),
            stylesheets: StylesheetPaths::default(),
            javascripts: ScriptPaths::default(),
            images: CopyPaths {
                src: PathBuf::from("app/assets/images"),
                dest: PathBuf::from("public/images"),
            },
            fonts: CopyPaths {
                src: PathBuf::from("app/assets/fonts"),
                dest: PathBuf::from("public/fonts"),
            },
            vendor: VendorConfig::default(),
            deploy: DeployConfig::default(),
            watch: WatchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Roots of the project: the build output and the editable sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectPaths {
    /// Build output directory
    pub public: PathBuf,
    /// Application source directory
    pub app: PathBuf,
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self {
            public: PathBuf::from("public"),
            app: PathBuf::from("app"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutPaths {
    pub src: PathBuf,
    /// Layout name without extension
    pub default: String,
}

impl Default for LayoutPaths {
    fn default() -> Self {
        Self {
            src: PathBuf::from("app/layouts"),
            default: "application".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewPaths {
    pub src: PathBuf,
    pub dest: PathBuf,
    /// Extension of view and layout templates
    pub extension: String,
    /// Extension given to rendered views
    pub output_extension: String,
}

impl Default for ViewPaths {
    fn default() -> Self {
        Self {
            src: PathBuf::from("app/views"),
            dest: PathBuf::from("public"),
            extension: "haml".to_string(),
            output_extension: "html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StylesheetPaths {
    pub src: PathBuf,
    pub dest: PathBuf,
    /// Entry point file name inside `src`
    pub entry: String,
}

impl Default for StylesheetPaths {
    fn default() -> Self {
        Self {
            src: PathBuf::from("app/assets/stylesheets"),
            dest: PathBuf::from("public/stylesheets"),
            entry: "application.scss".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptPaths {
    pub src: PathBuf,
    pub dest: PathBuf,
    /// Entry point file name inside `src`
    pub entry: String,
}

impl Default for ScriptPaths {
    fn default() -> Self {
        Self {
            src: PathBuf::from("app/assets/javascripts"),
            dest: PathBuf::from("public/javascripts"),
            entry: "index.js".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CopyPaths {
    pub src: PathBuf,
    pub dest: PathBuf,
}

/// Front-end vendor packages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// Directory the package manager installs into
    pub dest: PathBuf,
    /// Install command; an empty list skips the fetch
    pub command: Vec<String>,
    /// Style include directories, relative to `dest`
    pub style_includes: Vec<PathBuf>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            dest: PathBuf::from("bower_components"),
            command: vec!["bower".to_string(), "install".to_string()],
            style_includes: vec![
                PathBuf::from("bootstrap-sass-official/assets/stylesheets"),
                PathBuf::from("bourbon/app/assets/stylesheets"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// The only branch deploys may start from
    pub source_branch: String,
    pub publish_branch: String,
    pub remote: String,
    pub message: String,
    /// Metadata files removed from the publishing branch
    pub remove: Vec<PathBuf>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            source_branch: "master".to_string(),
            publish_branch: "gh-pages".to_string(),
            remote: "origin".to_string(),
            message: "Update gh-pages".to_string(),
            remove: [
                ".eslintrc",
                "gulpfile.js",
                "bower.json",
                "package.json",
                CONFIG_FILE,
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub overlap: OverlapPolicy,
}

/// What the watcher does with a change for a task that is already running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Serialize runs: every change gets its own completed run
    #[default]
    Queue,
    /// Discard changes that arrive while a run is in flight
    Drop,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" => Ok(Self::Queue),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown overlap policy '{}' (expected queue or drop)", other)),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => f.write_str("queue"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub livereload_port: u16,
    /// External static file server, e.g. `node_modules/.bin/http-server`.
    /// The built-in server is used when unset.
    pub command: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            livereload_port: 35729,
            command: None,
        }
    }
}

impl PathConfig {
    /// Default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Load configuration from `path` if it exists, defaults otherwise.
    ///
    /// The project root is the directory containing the config file.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let root = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if !path.exists() {
            return Ok(Self::with_root(root));
        }

        let content = fs::read_to_string(path).map_err(|e| BuildError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config: PathConfig = toml::from_str(&content).map_err(|e| {
            BuildError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.root = root;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Resolved build output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.paths.public)
    }

    /// Resolved path of the default layout template.
    pub fn layout_path(&self) -> PathBuf {
        self.resolve(&self.layouts.src).join(format!(
            "{}.{}",
            self.layouts.default, self.views.extension
        ))
    }

    /// Include paths handed to the style compiler, local sources first.
    pub fn style_include_paths(&self) -> Vec<PathBuf> {
        let vendor = self.resolve(&self.vendor.dest);
        std::iter::once(self.resolve(&self.stylesheets.src))
            .chain(self.vendor.style_includes.iter().map(|p| vendor.join(p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_follow_project_layout() {
        let config = PathConfig::with_root("/site");

        assert_eq!(config.output_dir(), PathBuf::from("/site/public"));
        assert_eq!(
            config.layout_path(),
            PathBuf::from("/site/app/layouts/application.haml")
        );
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.deploy.source_branch, "master");
        assert_eq!(config.watch.overlap, OverlapPolicy::Queue);
    }

    #[test]
    fn include_paths_list_local_sources_first() {
        let config = PathConfig::with_root("/site");
        let includes = config.style_include_paths();

        assert_eq!(includes.len(), 3);
        assert_eq!(includes[0], PathBuf::from("/site/app/assets/stylesheets"));
        assert!(includes[1].ends_with("bootstrap-sass-official/assets/stylesheets"));
        assert!(includes[2].ends_with("bourbon/app/assets/stylesheets"));
    }

    #[test]
    fn loads_partial_config() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[paths]\npublic = \"dist\"\n\n[watch]\noverlap = \"drop\"\n",
        )
        .unwrap();

        let config = PathConfig::load(&path).unwrap();

        assert_eq!(config.root, temp.path());
        assert_eq!(config.output_dir(), temp.path().join("dist"));
        assert_eq!(config.paths.app, PathBuf::from("app"));
        assert_eq!(config.watch.overlap, OverlapPolicy::Drop);
    }

    #[test]
    fn missing_config_yields_defaults() {
        let temp = tempdir().unwrap();
        let config = PathConfig::load(&temp.path().join(CONFIG_FILE)).unwrap();

        assert_eq!(config.views.extension, "haml");
    }

    #[test]
    fn rejects_malformed_config() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[paths\npublic = ").unwrap();

        assert!(matches!(PathConfig::load(&path), Err(BuildError::Config(_))));
    }

    #[test]
    fn parses_overlap_policy() {
        assert_eq!("queue".parse::<OverlapPolicy>(), Ok(OverlapPolicy::Queue));
        assert_eq!("drop".parse::<OverlapPolicy>(), Ok(OverlapPolicy::Drop));
        assert!("race".parse::<OverlapPolicy>().is_err());
    }
}
