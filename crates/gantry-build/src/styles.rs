//! Stylesheet pipeline: glob-expand, compile, minify, stamp, write.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::config::PathConfig;
use crate::glob::{slash_path, Glob};
use crate::notice;
use crate::pipeline::BuildError;
use crate::report::{ErrorGuard, FileFailure};
use crate::views::write_file;

/// Extensions picked up by import globs.
pub const IMPORT_EXTENSIONS: [&str; 2] = ["css", "scss"];

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"@import\s+(?:url\(\s*)?["']([^"']*\*[^"']*)["']\s*\)?\s*;?"#)
            .expect("import pattern is valid")
    })
}

/// Replace globbed `@import` directives with one import per matching file.
///
/// Only local paths containing `*` are expanded, resolved relative to
/// `base_dir`. Other imports and remote URLs are left as they are. A glob
/// with no matches expands to nothing.
pub fn expand_imports(source: &str, base_dir: &Path) -> Result<String, String> {
    let mut error = None;

    let expanded = import_regex().replace_all(source, |caps: &Captures| {
        let pattern = &caps[1];
        if is_remote(pattern) {
            return caps[0].to_string();
        }
        let glob = match Glob::new(pattern) {
            Ok(glob) => glob,
            Err(e) => {
                error.get_or_insert_with(|| format!("invalid import glob '{}': {}", pattern, e));
                return String::new();
            }
        };

        glob.expand(base_dir)
            .into_iter()
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMPORT_EXTENSIONS.contains(&e))
            })
            .map(|path| format!("@import \"{}\";", slash_path(&path)))
            .collect::<Vec<_>>()
            .join("\n")
    });

    match error {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn is_remote(path: &str) -> bool {
    path.starts_with("//") || path.contains("://")
}

/// Compile SCSS with the given include paths.
pub fn compile_scss(source: String, include_paths: &[PathBuf]) -> Result<String, String> {
    let options = grass::Options::default().load_paths(include_paths);
    grass::from_string(source, &options).map_err(|e| e.to_string())
}

/// Minify CSS using lightningcss, dropping every comment.
pub fn minify_css(css: &str) -> Result<String, String> {
    use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};

    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| format!("CSS parse error: {}", e))?;

    // `/*! ... */` comments survive minification unless cleared.
    stylesheet.license_comments.clear();

    let minified = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..Default::default()
        })
        .map_err(|e| format!("CSS minify error: {}", e))?;

    Ok(minified.code)
}

/// Builds the `stylesheets` task.
pub struct StyleBuilder<'a> {
    config: &'a PathConfig,
}

impl<'a> StyleBuilder<'a> {
    pub fn new(config: &'a PathConfig) -> Self {
        Self { config }
    }

    /// Compile the entry stylesheet into one minified CSS file.
    pub fn build(&self, guard: &mut ErrorGuard<'_>) -> Result<(), BuildError> {
        let styles = &self.config.stylesheets;
        let source_dir = self.config.resolve(&styles.src);
        let entry = source_dir.join(&styles.entry);

        let source = fs::read_to_string(&entry).map_err(|e| BuildError::Io {
            path: entry.clone(),
            source: e,
        })?;

        let css = match self.compile(&source, &source_dir) {
            Ok(css) => css,
            Err(message) => {
                guard.record(Err(FileFailure {
                    source: entry,
                    message,
                }));
                return Ok(());
            }
        };

        let output_path = self
            .config
            .resolve(&styles.dest)
            .join(Path::new(&styles.entry).with_extension("css"));

        write_file(&output_path, notice::stamp(&styles.src, &css).as_bytes())?;
        guard.record(Ok(output_path));

        Ok(())
    }

    fn compile(&self, source: &str, source_dir: &Path) -> Result<String, String> {
        let expanded = expand_imports(source, source_dir)?;
        let css = compile_scss(expanded, &self.config.style_include_paths())?;
        minify_css(&css)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskKind;
    use crate::report::NoEvents;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn minifies_css() {
        let css = r#"
.button {
    background-color: blue;
    padding: 10px;
}
        "#;

        let minified = minify_css(css).unwrap();

        assert!(!minified.contains('\n'));
        assert!(minified.contains(".button"));
    }

    #[test]
    fn whitespace_and_comments_do_not_change_output() {
        let plain = ".a{color:red}.b{margin:0}";
        let noisy = r#"
/*! license banner */
.a {
    /* primary */
    color: red;
}

/* spacing */
.b { margin: 0; }
"#;

        assert_eq!(minify_css(plain).unwrap(), minify_css(noisy).unwrap());
    }

    #[test]
    fn expands_import_globs() {
        let temp = tempdir().unwrap();
        let partials = temp.path().join("partials");
        fs::create_dir_all(&partials).unwrap();
        fs::write(partials.join("_b.scss"), "").unwrap();
        fs::write(partials.join("_a.scss"), "").unwrap();
        fs::write(partials.join("notes.txt"), "").unwrap();

        let out = expand_imports(
            "@import \"base\";\n@import 'partials/*';\n",
            temp.path(),
        )
        .unwrap();

        assert_eq!(
            out,
            "@import \"base\";\n@import \"partials/_a.scss\";\n@import \"partials/_b.scss\";\n"
        );
    }

    #[test]
    fn leaves_urls_and_query_strings_alone() {
        let temp = tempdir().unwrap();
        let source = concat!(
            "@import url(\"https://fonts.googleapis.com/css?family=Roboto\");\n",
            "@import url(\"//cdn.example.com/themes/*.css\");\n",
            "@import \"print?v=2\";\n",
            "body{color:red}\n",
        );

        let out = expand_imports(source, temp.path()).unwrap();

        assert_eq!(out, source);
    }

    #[test]
    fn empty_glob_expands_to_nothing() {
        let temp = tempdir().unwrap();
        let out = expand_imports("@import url(\"missing/**/*\");", temp.path()).unwrap();

        assert_eq!(out, "");
    }

    fn site(root: &Path, entry: &str) -> PathConfig {
        let dir = root.join("app/assets/stylesheets");
        fs::create_dir_all(dir.join("partials")).unwrap();
        fs::write(dir.join("application.scss"), entry).unwrap();
        PathConfig::with_root(root)
    }

    #[test]
    fn builds_stamped_stylesheet() {
        let temp = tempdir().unwrap();
        let config = site(
            temp.path(),
            "$accent: #ff0000;\n@import 'partials/*';\nbody { color: $accent; }\n",
        );
        fs::write(
            temp.path().join("app/assets/stylesheets/partials/_nav.scss"),
            "/* nav */\n.nav { .item { padding: 0; } }\n",
        )
        .unwrap();

        let mut guard = ErrorGuard::new(TaskKind::Stylesheets, &NoEvents);
        StyleBuilder::new(&config).build(&mut guard).unwrap();
        let report = guard.finish();

        assert!(report.is_success());
        let css =
            fs::read_to_string(temp.path().join("public/stylesheets/application.css")).unwrap();
        assert!(css.starts_with(
            "/* Don't edit this file. Make changes in app/assets/stylesheets instead. */\n"
        ));
        let body = css.lines().nth(1).unwrap();
        assert!(body.contains(".nav .item{padding:0}"));
        assert!(!body.contains("/*"));
    }

    #[test]
    fn unresolved_import_is_a_file_failure() {
        let temp = tempdir().unwrap();
        let config = site(temp.path(), "@import 'bootstrap';\n");

        let mut guard = ErrorGuard::new(TaskKind::Stylesheets, &NoEvents);
        StyleBuilder::new(&config).build(&mut guard).unwrap();
        let report = guard.finish();

        assert_eq!(report.failures.len(), 1);
        assert!(report.outputs.is_empty());
        assert!(!temp.path().join("public/stylesheets/application.css").exists());
    }
}
