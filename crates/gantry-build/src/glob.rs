//! Path globs over project-relative paths.
//!
//! Matching is done by the `glob` crate with `*` kept inside one path
//! segment. `{a,b}` alternation is expanded up front into one pattern per
//! alternative. Used for stylesheet import expansion and watch subscriptions.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    alternatives: Vec<Pattern>,
}

impl Glob {
    /// Compile a glob pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let alternatives = expand_braces(pattern)
            .iter()
            .map(|alt| Pattern::new(alt))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            pattern: pattern.to_string(),
            alternatives,
        })
    }

    /// Compile `suffix` under the literal directory `dir`.
    ///
    /// Wildcard characters in `dir` match themselves.
    pub fn within(dir: &Path, suffix: &str) -> Result<Self, PatternError> {
        let prefix = Pattern::escape(&slash_path(dir));
        if prefix.is_empty() {
            Self::new(suffix)
        } else {
            Self::new(&format!("{}/{}", prefix, suffix))
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Match a relative path.
    pub fn is_match(&self, path: &Path) -> bool {
        let path = slash_path(path);
        self.alternatives
            .iter()
            .any(|p| p.matches_with(&path, OPTIONS))
    }

    /// Files under `root` matching the pattern, relative to `root` and sorted.
    ///
    /// A pattern whose directories don't exist matches nothing.
    pub fn expand(&self, root: &Path) -> Vec<PathBuf> {
        let prefix = Pattern::escape(&root.to_string_lossy());
        let mut matches = Vec::new();

        for alt in &self.alternatives {
            let full = format!("{}/{}", prefix.trim_end_matches('/'), alt.as_str());
            let Ok(paths) = glob::glob_with(&full, OPTIONS) else {
                continue;
            };

            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => {
                        // A `.` root may come back without its prefix.
                        let rel = path.strip_prefix(root).unwrap_or(path.as_path());
                        matches.push(rel.to_path_buf());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping unreadable path: {}", e),
                }
            }
        }

        matches.sort();
        matches.dedup();
        matches
    }
}

/// Join path components with `/`.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Expand the first `{a,b}` group, then recurse on each result.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0;
    let mut close = None;
    let mut splits = Vec::new();
    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(open + i),
            _ => {}
        }
    }

    // Unbalanced or single-item braces are literal.
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };
    if splits.is_empty() {
        return vec![pattern.to_string()];
    }

    let head = &pattern[..open];
    let tail = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|w| expand_braces(&format!("{}{}{}", head, &pattern[w[0] + 1..w[1]], tail)))
        .collect()
}
