//! File-tree Merkle summary: build, diff, persistence.
//!
//! Leaves are file-content hashes; each directory hashes its children in
//! child-path alphabetical order. Diffing two summaries only consults the
//! file leaves, so it is linear in the number of files; directory hashes are
//! preserved in the stored summary for future prefix-based skipping.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hasher::sha256_text;

/// Sentinel path of the root directory node.
pub const ROOT_PATH: &str = ".";

/// A node in the Merkle summary: a file leaf or a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleNode {
    /// Relative forward-slash path of this node.
    pub path: String,
    /// Lowercase hex SHA-256.
    pub hash: String,
    /// Whether this is a file leaf.
    pub is_file: bool,
    /// Child paths, sorted alphabetically. Empty for files.
    pub children: Vec<String>,
}

/// File-level difference between two summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl MerkleDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => ROOT_PATH.to_string(),
    }
}

fn depth(path: &str) -> usize {
    if path == ROOT_PATH {
        0
    } else {
        path.matches('/').count() + 1
    }
}

/// Build a summary from `(relative_path, file_hash)` pairs.
///
/// Every ancestor directory of every file appears as a directory node, up to
/// and including the root `"."`. Empty input produces an empty summary.
#[must_use]
pub fn build(file_hashes: &[(String, String)]) -> Vec<MerkleNode> {
    let mut dir_children: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut nodes: BTreeMap<String, MerkleNode> = BTreeMap::new();

    for (path, hash) in file_hashes {
        nodes.insert(
            path.clone(),
            MerkleNode {
                path: path.clone(),
                hash: hash.clone(),
                is_file: true,
                children: vec![],
            },
        );

        let parent = parent_path(path);
        let siblings = dir_children.entry(parent.clone()).or_default();
        if !siblings.contains(path) {
            siblings.push(path.clone());
        }

        // Register every ancestor directory as a child of its own parent.
        let mut current = parent;
        loop {
            let grandparent = parent_path(&current);
            if grandparent == current {
                break;
            }
            let siblings = dir_children.entry(grandparent.clone()).or_default();
            if !siblings.contains(&current) {
                siblings.push(current.clone());
            }
            current = grandparent;
        }
    }

    // Hash directories bottom-up: deepest first, root last.
    let mut dir_paths: Vec<String> = dir_children.keys().cloned().collect();
    dir_paths.sort_by(|a, b| depth(b).cmp(&depth(a)));

    for dir_path in &dir_paths {
        let mut children = dir_children.get(dir_path).cloned().unwrap_or_default();
        children.sort();

        let mut combined = String::new();
        for child in &children {
            if let Some(node) = nodes.get(child) {
                combined.push_str(&node.hash);
            }
        }

        nodes.insert(
            dir_path.clone(),
            MerkleNode {
                path: dir_path.clone(),
                hash: sha256_text(&combined),
                is_file: false,
                children,
            },
        );
    }

    nodes.into_values().collect()
}

/// Diff two summaries into added / removed / modified file path sets.
#[must_use]
pub fn diff(old: &[MerkleNode], new: &[MerkleNode]) -> MerkleDiff {
    let old_files: BTreeMap<&str, &str> = old
        .iter()
        .filter(|n| n.is_file)
        .map(|n| (n.path.as_str(), n.hash.as_str()))
        .collect();
    let new_files: BTreeMap<&str, &str> = new
        .iter()
        .filter(|n| n.is_file)
        .map(|n| (n.path.as_str(), n.hash.as_str()))
        .collect();

    let mut result = MerkleDiff::default();

    for (path, new_hash) in &new_files {
        match old_files.get(path) {
            None => result.added.push((*path).to_string()),
            Some(old_hash) if old_hash != new_hash => result.modified.push((*path).to_string()),
            _ => {}
        }
    }

    for path in old_files.keys() {
        if !new_files.contains_key(path) {
            result.removed.push((*path).to_string());
        }
    }

    result
}

/// Hash of the root node, if present.
#[must_use]
pub fn root_hash(nodes: &[MerkleNode]) -> Option<&str> {
    nodes
        .iter()
        .find(|n| n.path == ROOT_PATH)
        .map(|n| n.hash.as_str())
}

/// Persist a summary as JSON, creating the parent directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
pub fn save(path: &Path, nodes: &[MerkleNode]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(nodes)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a previously saved summary. A missing or unparseable file is treated
/// as "no prior index" and yields an empty summary; this never errors.
#[must_use]
pub fn load(path: &Path) -> Vec<MerkleNode> {
    let Ok(data) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str(&data) {
        Ok(nodes) => nodes,
        Err(e) => {
            tracing::warn!("corrupt merkle summary at {}: {e}; starting fresh", path.display());
            Vec::new()
        }
    }
}
