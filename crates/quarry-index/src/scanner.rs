//! Filesystem scanner honoring ignore rules.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{IndexError, Result};

/// Scan `root` and return all candidate file paths, sorted.
///
/// Respects `.gitignore`, global git excludes, and `.cursorignore`; hidden
/// files and directories are skipped. An empty `extensions` set admits every
/// file.
///
/// # Errors
///
/// Returns [`IndexError::Scan`] if `root` is not a directory or the walker
/// fails (unreadable root, symlink cycle).
pub fn scan_directory(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(IndexError::Scan(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let ext_set: HashSet<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .add_custom_ignore_filename(".cursorignore")
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| IndexError::Scan(e.to_string()))?;
        let path = entry.path();

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if ext_set.is_empty() || ext_set.contains(&ext.to_lowercase()) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Root-relative path with forward slashes, or `None` when `file` is outside
/// `root` or not valid UTF-8.
#[must_use]
pub fn relative_path(root: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
