//! View rendering: every view template is compiled and wrapped in the layout.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{context, Environment, Value};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::PathConfig;
use crate::pipeline::BuildError;
use crate::report::{ErrorGuard, FileFailure, FileOutcome};

/// Name of the layout slot that receives a compiled view.
pub const CONTENT_SLOT: &str = "content";

/// A compiled layout, plus the environment views are compiled in.
pub struct Layout {
    env: Environment<'static>,
    name: String,
}

impl Layout {
    /// Compile the layout template.
    pub fn compile(name: &str, source: String) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template_owned(name.to_string(), source)?;

        Ok(Self {
            env,
            name: name.to_string(),
        })
    }

    /// Compile and render a view body.
    pub fn render_view(&self, name: &str, source: &str) -> Result<String, minijinja::Error> {
        self.env.render_named_str(name, source, context! {})
    }

    /// Substitute `content` verbatim into the layout's content slot.
    pub fn wrap(&self, content: String) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template(&self.name)?;
        tmpl.render(context! {
            content => Value::from_safe_string(content),
        })
    }
}

/// A view template waiting to be rendered.
#[derive(Debug)]
struct ViewFile {
    source_path: PathBuf,
    relative_path: PathBuf,
}

/// Builds the `views` task.
pub struct ViewBuilder<'a> {
    config: &'a PathConfig,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(config: &'a PathConfig) -> Self {
        Self { config }
    }

    /// Render every view into the output directory.
    ///
    /// The layout is compiled once; a layout error fails the whole run,
    /// while a broken view only fails its own file.
    pub fn build(&self, guard: &mut ErrorGuard<'_>) -> Result<(), BuildError> {
        let layout_path = self.config.layout_path();
        let source = fs::read_to_string(&layout_path).map_err(|e| BuildError::Io {
            path: layout_path.clone(),
            source: e,
        })?;

        let layout_name = layout_path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("layout");

        let layout = Layout::compile(layout_name, source).map_err(|e| BuildError::Transform {
            path: layout_path.clone(),
            message: e.to_string(),
        })?;

        let views = self.discover_views()?;
        tracing::debug!("Rendering {} views", views.len());

        // Collected in discovery order so reports are stable.
        let outcomes: Vec<Result<FileOutcome, BuildError>> = views
            .par_iter()
            .map(|view| self.build_view(&layout, view))
            .collect();

        for outcome in outcomes {
            guard.record(outcome?);
        }

        Ok(())
    }

    fn discover_views(&self) -> Result<Vec<ViewFile>, BuildError> {
        let views_dir = self.config.resolve(&self.config.views.src);

        if !views_dir.is_dir() {
            return Err(BuildError::Io {
                path: views_dir,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "views directory not found",
                ),
            });
        }

        let extension = self.config.views.extension.as_str();

        Ok(WalkDir::new(&views_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(extension))
            .map(|e| ViewFile {
                source_path: e.path().to_path_buf(),
                relative_path: e
                    .path()
                    .strip_prefix(&views_dir)
                    .unwrap_or(e.path())
                    .to_path_buf(),
            })
            .collect())
    }

    fn build_view(&self, layout: &Layout, view: &ViewFile) -> Result<FileOutcome, BuildError> {
        let source = fs::read_to_string(&view.source_path).map_err(|e| BuildError::Io {
            path: view.source_path.clone(),
            source: e,
        })?;

        let name = view.relative_path.to_string_lossy();
        let html = match layout
            .render_view(&name, &source)
            .and_then(|body| layout.wrap(body))
        {
            Ok(html) => html,
            Err(e) => {
                return Ok(Err(FileFailure {
                    source: view.source_path.clone(),
                    message: e.to_string(),
                }))
            }
        };

        let output_path = self.output_path(&view.relative_path);
        write_file(&output_path, html.as_bytes())?;

        Ok(Ok(output_path))
    }

    /// `views.src/a/b.haml` -> `views.dest/a/b.html`
    fn output_path(&self, relative: &Path) -> PathBuf {
        self.config
            .resolve(&self.config.views.dest)
            .join(relative)
            .with_extension(&self.config.views.output_extension)
    }
}

/// Write `contents`, creating parent directories.
pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(path, contents).map_err(|e| BuildError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
