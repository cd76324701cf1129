// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON documents persisted next to the server: the saved SSH connection
//! list and the monitor configuration.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a saved connection authenticates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    Password,
    KeyFile,
}

fn default_port() -> u16 {
    22
}

/// One saved connection. `name` is unique within the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl SshConfig {
    /// Names that appear more than once, in first-seen order.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut dups = Vec::new();
        for record in &self.connections {
            if !seen.insert(record.name.as_str()) && !dups.contains(&record.name) {
                dups.push(record.name.clone());
            }
        }
        dups
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_paths")]
    pub monitor_paths: Vec<String>,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_monitor_paths() -> Vec<String> {
    vec![".".to_owned()]
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["monitor.py".to_owned()]
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { monitor_paths: default_monitor_paths(), exclude_patterns: default_exclude_patterns() }
    }
}

/// A JSON document on disk with atomic replacement.
///
/// Writes go through a temp file in the same directory and a rename, and
/// are serialized so concurrent saves cannot interleave.
pub struct JsonStore<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()), _doc: PhantomData }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the default document if none exists yet.
    pub fn ensure_exists(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        self.save(&T::default())
    }

    /// Current document, or the default when missing or unreadable.
    pub fn load(&self) -> T {
        match self.try_load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "using default configuration");
                T::default()
            }
        }
    }

    pub fn try_load(&self) -> anyhow::Result<T> {
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let doc = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(doc)
    }

    pub fn save(&self, doc: &T) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
