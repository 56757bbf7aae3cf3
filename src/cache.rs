use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Hash a non-string cache key into a fixed-width hex digest.
///
/// Top-level object properties are sorted by name first, so two
/// semantically-equal keys with different property order collide.
pub fn ordered_hash(key: &Value) -> Result<String> {
    let canonical = match key {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            serde_json::to_string(&sorted)?
        }
        other => serde_json::to_string(other)?,
    };
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{:x}", digest))
}

/// A key-value store over one or two JSON documents on disk.
///
/// The cache records real provider calls so they can be replayed in tests
/// and development. It is append-only and unbounded: entries are written on
/// first miss and never evicted. Reads and writes may target different files
/// so a read-only baseline snapshot can be combined with a separate write
/// target. There is no cross-process locking; concurrent writers to the same
/// file can lose updates (last writer wins on the whole document).
#[derive(Debug)]
pub struct LocalCache {
    read_path: PathBuf,
    write_path: PathBuf,
    confirmed: AtomicBool,
}

impl LocalCache {
    /// A cache reading and writing one file.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        LocalCache {
            read_path: path.clone(),
            write_path: path,
            confirmed: AtomicBool::new(false),
        }
    }

    /// A cache with a read baseline and a separate write target.
    pub fn with_paths<R: Into<PathBuf>, W: Into<PathBuf>>(read_path: R, write_path: W) -> Self {
        LocalCache {
            read_path: read_path.into(),
            write_path: write_path.into(),
            confirmed: AtomicBool::new(false),
        }
    }

    /// Look up a value. String keys are used verbatim; any other JSON key is
    /// canonicalized and hashed. Entries written to this cache shadow the
    /// read baseline.
    pub fn get(&self, key: &Value) -> Result<Option<Value>> {
        self.get_by_key(&key_string(key)?)
    }

    /// Store a value under a key, rewriting the entire write-side document.
    pub fn set(&self, key: &Value, value: Value) -> Result<()> {
        self.set_by_key(&key_string(key)?, value)
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<Value>> {
        self.confirm_files_exist()?;
        let written = self.load(&self.write_path)?;
        if let Some(value) = written.get(key) {
            return Ok(Some(value.clone()));
        }
        if self.read_path != self.write_path {
            let baseline = self.load(&self.read_path)?;
            if let Some(value) = baseline.get(key) {
                return Ok(Some(value.clone()));
            }
        }
        Ok(None)
    }

    pub fn set_by_key(&self, key: &str, value: Value) -> Result<()> {
        self.confirm_files_exist()?;
        let mut document = self.load(&self.write_path)?;
        document.insert(key.to_string(), value);
        fs::write(
            &self.write_path,
            serde_json::to_string_pretty(&Value::Object(document))?,
        )
        .with_context(|| format!("failed to write cache file {}", self.write_path.display()))?;
        Ok(())
    }

    /// Ensure the backing directories and files exist, seeding missing files
    /// with an empty document. Runs at most once per cache instance.
    fn confirm_files_exist(&self) -> Result<()> {
        if self.confirmed.load(Ordering::Acquire) {
            return Ok(());
        }
        for path in [&self.read_path, &self.write_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create cache directory {}", parent.display())
                    })?;
                }
            }
            if !path.exists() {
                tracing::debug!(path = %path.display(), "initializing empty cache file");
                fs::write(path, "{}")
                    .with_context(|| format!("failed to create cache file {}", path.display()))?;
            }
        }
        self.confirmed.store(true, Ordering::Release);
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Map<String, Value>> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read cache file {}", path.display()))?;
        let document: Value = serde_json::from_str(&data)
            .with_context(|| format!("cache file {} is not valid JSON", path.display()))?;
        match document {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("cache file {} is not a JSON object", path.display()),
        }
    }
}

fn key_string(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        other => ordered_hash(other),
    }
}
