// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script discovery under the monitored paths.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;
use wildmatch::WildMatch;

use crate::process::ProcessError;
use crate::store::MonitorConfig;

const SCRIPT_EXTENSION: &str = "py";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: PathBuf,
}

/// Every script under the monitored paths whose file name matches none of
/// the exclude patterns. Each monitored root is visited once.
pub fn discover(base_dir: &Path, config: &MonitorConfig) -> Vec<ScriptEntry> {
    let base = normalize(base_dir, Path::new("."));
    let excludes: Vec<WildMatch> =
        config.exclude_patterns.iter().map(|p| WildMatch::new(p)).collect();
    let mut visited = HashSet::new();
    let mut scripts = Vec::new();

    for root in monitored_roots(base_dir, config) {
        if !visited.insert(root.clone()) || !root.exists() {
            continue;
        }
        if root.is_file() {
            if let Some(entry) = script_entry(&root, &base, &excludes) {
                scripts.push(entry);
            }
            continue;
        }
        let walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(entry) = script_entry(entry.path(), &base, &excludes) {
                scripts.push(entry);
            }
        }
    }
    scripts
}

/// Whether `path` lies inside one of the monitored roots.
pub fn is_in_monitored_paths(base_dir: &Path, config: &MonitorConfig, path: &Path) -> bool {
    let candidate = normalize(base_dir, path);
    monitored_roots(base_dir, config).iter().any(|root| candidate.starts_with(root))
}

/// Validate a launch request: inside a monitored path, then present on disk.
pub fn resolve_launch(
    base_dir: &Path,
    config: &MonitorConfig,
    script_path: &str,
) -> Result<PathBuf, ProcessError> {
    let requested = Path::new(script_path);
    if script_path.trim().is_empty() || !is_in_monitored_paths(base_dir, config, requested) {
        return Err(ProcessError::InvalidPath(script_path.to_owned()));
    }
    let resolved = normalize(base_dir, requested);
    if !resolved.is_file() {
        return Err(ProcessError::ScriptNotFound(script_path.to_owned()));
    }
    Ok(resolved)
}

fn monitored_roots(base_dir: &Path, config: &MonitorConfig) -> Vec<PathBuf> {
    config.monitor_paths.iter().map(|p| normalize(base_dir, Path::new(p))).collect()
}

fn script_entry(path: &Path, base: &Path, excludes: &[WildMatch]) -> Option<ScriptEntry> {
    if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
        return None;
    }
    let name = path.file_name()?.to_string_lossy().into_owned();
    if excludes.iter().any(|pattern| pattern.matches(&name)) {
        return None;
    }
    let relative_path = path.strip_prefix(base).unwrap_or(path).to_path_buf();
    Some(ScriptEntry { name, path: path.to_path_buf(), relative_path })
}

/// Absolute form of `path` (relative ones resolve against `base_dir`),
/// canonicalized when it exists and lexically cleaned otherwise.
fn normalize(base_dir: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() { path.to_path_buf() } else { base_dir.join(path) };
    if let Ok(canonical) = joined.canonicalize() {
        return canonical;
    }
    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    clean
}

#[cfg(test)]
#[path = "scripts_tests.rs"]
mod tests;
