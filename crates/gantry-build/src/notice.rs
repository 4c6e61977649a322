//! Generated-file notice headers.

use std::path::Path;

/// The comment prepended to generated stylesheets and scripts.
pub fn notice(source_dir: &Path) -> String {
    format!(
        "/* Don't edit this file. Make changes in {} instead. */\n",
        source_dir.display()
    )
}

/// Prepend the notice for `source_dir` to `content`.
pub fn stamp(source_dir: &Path, content: &str) -> String {
    let mut out = notice(source_dir);
    out.push_str(content);
    out
}
