//! Question repository scan used by `reset` and `validate --all`.
//!
//! Question files are `*.md` files inside a section directory; files at the
//! scan root (README and friends) and hidden directories are skipped.

use std::fs;
use std::path::{Path, PathBuf};

const QUESTION_EXTENSION: &str = "md";

/// Collects question file paths under `root`, sorted.
pub fn collect_question_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && !is_hidden(&path) {
            collect_into(&path, &mut out)?;
        }
    }
    out.sort();
    Ok(out)
}

fn collect_into(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            collect_into(&path, out)?;
        } else if path.extension().and_then(|ext| ext.to_str()) == Some(QUESTION_EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
