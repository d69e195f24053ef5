//! SHA-256 content hashing over file bytes and chunk text.

use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

/// One successfully hashed file.
#[derive(Debug, Clone)]
pub struct FileHash {
    pub path: PathBuf,
    pub hash: String,
}

/// Result of hashing a batch of files.
#[derive(Debug, Default)]
pub struct HashOutcome {
    pub hashed: Vec<FileHash>,
    pub failed: Vec<(PathBuf, std::io::Error)>,
}

/// SHA-256 of a text, lowercase hex.
#[must_use]
pub fn sha256_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of a file's bytes, streamed. Line endings are not normalized:
/// a CRLF/LF flip is a content change.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a batch of files in parallel, preserving input order among successes.
/// Unreadable files land in `failed` instead of aborting the batch.
#[must_use]
pub fn hash_files(paths: &[PathBuf]) -> HashOutcome {
    let results: Vec<_> = paths
        .par_iter()
        .map(|path| match sha256_file(path) {
            Ok(hash) => Ok(FileHash {
                path: path.clone(),
                hash,
            }),
            Err(e) => Err((path.clone(), e)),
        })
        .collect();

    let mut outcome = HashOutcome::default();
    for result in results {
        match result {
            Ok(fh) => outcome.hashed.push(fh),
            Err(fail) => outcome.failed.push(fail),
        }
    }
    outcome
}
