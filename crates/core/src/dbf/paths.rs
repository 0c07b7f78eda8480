//! Resolution of the datafiles root and per-company data directories.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::constants::COMPANY_MASTER_FILE;
use crate::errors::{Error, Result};

/// Candidate locations for the datafiles root, relative to the working
/// directory, probed in order.
const ROOT_CANDIDATES: &[&str] = &["datafiles", "../datafiles", "../../datafiles"];

/// Directories the company-master walk never descends into.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "dist", "build", ".git"];

/// Maximum directory depth for the company-master walk.
const WALK_DEPTH: usize = 4;

/// Name of the temp file remembering the user-selected root between runs.
const SAVED_ROOT_FILE: &str = "financialsx-datafiles-root";

/// Resolves a company argument to its data directory.
///
/// Absolute paths are taken verbatim; relative names are joined under the
/// discovered datafiles root.
pub fn resolve_company_dir(company: &str) -> Result<PathBuf> {
    let as_path = Path::new(company);
    if as_path.is_absolute() {
        return Ok(as_path.to_path_buf());
    }
    let root = find_datafiles_root()?;
    Ok(root.join(company))
}

/// Finds the datafiles root.
///
/// Order of precedence: the saved user selection (when it still exists on
/// disk), then the first populated candidate relative to the working
/// directory.
pub fn find_datafiles_root() -> Result<PathBuf> {
    if let Some(saved) = load_saved_root() {
        if saved.is_dir() {
            debug!("using saved datafiles root {}", saved.display());
            return Ok(saved);
        }
    }

    for candidate in ROOT_CANDIDATES {
        let path = PathBuf::from(candidate);
        if is_populated_dir(&path) {
            debug!("using datafiles root {}", path.display());
            return Ok(path);
        }
    }

    Err(Error::NotFound(
        "no datafiles directory found near the working directory".to_string(),
    ))
}

/// Locates `compmast.dbf` by a depth-limited walk from the given start,
/// skipping hidden and build directories.
pub fn find_company_master(start: &Path) -> Option<PathBuf> {
    walk_for_master(start, 0)
}

fn walk_for_master(dir: &Path, depth: usize) -> Option<PathBuf> {
    if depth > WALK_DEPTH {
        return None;
    }
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_file() && name.eq_ignore_ascii_case(COMPANY_MASTER_FILE) {
            return Some(path);
        }
        if path.is_dir() {
            if name.starts_with('.') || SKIPPED_DIRS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
                continue;
            }
            subdirs.push(path);
        }
    }
    for sub in subdirs {
        if let Some(found) = walk_for_master(&sub, depth + 1) {
            return Some(found);
        }
    }
    None
}

/// Persists the user-selected datafiles root for the next run.
pub fn save_root(root: &Path) -> Result<()> {
    let marker = saved_root_marker();
    fs::write(&marker, root.display().to_string())?;
    info!("saved datafiles root {}", root.display());
    Ok(())
}

/// Reads the previously saved root selection, if any.
pub fn load_saved_root() -> Option<PathBuf> {
    let marker = saved_root_marker();
    let contents = fs::read_to_string(marker).ok()?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

fn saved_root_marker() -> PathBuf {
    std::env::temp_dir().join(SAVED_ROOT_FILE)
}

/// Directory for durable log files: a `logs` directory next to the
/// executable when it is writable, otherwise the OS temp directory.
pub fn find_log_dir() -> PathBuf {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("logs")));
    if let Some(dir) = beside_exe {
        if dir.is_dir() || fs::create_dir_all(&dir).is_ok() {
            return dir;
        }
    }
    std::env::temp_dir()
}

fn is_populated_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
