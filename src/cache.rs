//! Content-addressed store of separation results.
//!
//! Layout: `<root>/<fingerprint>/entry.json` plus one `<stem>.wav` per stem.
//! Entries are never evicted. Writers stage into a private directory and
//! rename it into place, so readers only ever see complete entries.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, StemError},
    io::crypto::is_fingerprint,
    types::{EngineKind, SeparationRequest, SeparationResult, Stem},
};

const ENTRY_FILE: &str = "entry.json";
const ENTRY_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct EntryManifest {
    version: u32,
    request: SeparationRequest,
    engine: EngineKind,
    model: String,
    stems: Vec<String>,
    log: String,
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, key: &str) -> Result<PathBuf> {
        if !is_fingerprint(key) {
            return Err(StemError::InvalidInput(format!("bad cache key `{key}`")));
        }
        Ok(self.root.join(key))
    }

    /// The stored result for `key`, or `None` on a miss. Unreadable or
    /// incomplete entries count as misses.
    pub fn get(&self, key: &str) -> Result<Option<SeparationResult>> {
        let dir = self.entry_dir(key)?;
        let manifest_path = dir.join(ENTRY_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }
        match read_entry(&dir) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                log::warn!("ignoring cache entry {key}: {e}");
                Ok(None)
            }
        }
    }

    /// Copies `result`'s stems into the entry for `key` and returns the
    /// result with paths pointing into the cache.
    pub fn put(
        &self,
        key: &str,
        request: &SeparationRequest,
        result: &SeparationResult,
    ) -> Result<SeparationResult> {
        let dir = self.entry_dir(key)?;
        fs::create_dir_all(&self.root)?;

        let staging = self
            .root
            .join(format!("{key}.part-{}", std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let write = || -> Result<()> {
            for stem in &result.stems {
                fs::copy(&stem.path, staging.join(stem_file(&stem.name)))?;
            }
            let manifest = EntryManifest {
                version: ENTRY_VERSION,
                request: *request,
                engine: result.engine,
                model: result.model.clone(),
                stems: result.stems.iter().map(|s| s.name.clone()).collect(),
                log: result.log.clone(),
            };
            fs::write(
                staging.join(ENTRY_FILE),
                serde_json::to_vec_pretty(&manifest)?,
            )?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if dir.exists() {
            if let Ok(existing) = read_entry(&dir) {
                // Another writer finished first.
                let _ = fs::remove_dir_all(&staging);
                return Ok(existing);
            }
            fs::remove_dir_all(&dir)?;
        }
        fs::rename(&staging, &dir)?;
        log::debug!("cached {} stems under {}", result.stems.len(), dir.display());

        read_entry(&dir)
    }

    /// Returns the cached result for `key`, computing and storing it with
    /// `compute` on a miss. The flag is true on a hit.
    pub fn get_or_compute<F>(
        &self,
        key: &str,
        request: &SeparationRequest,
        compute: F,
    ) -> Result<(SeparationResult, bool)>
    where
        F: FnOnce() -> Result<SeparationResult>,
    {
        if let Some(hit) = self.get(key)? {
            return Ok((hit, true));
        }
        let fresh = compute()?;
        Ok((self.put(key, request, &fresh)?, false))
    }
}

fn stem_file(name: &str) -> String {
    format!("{name}.wav")
}

fn read_entry(dir: &Path) -> Result<SeparationResult> {
    let raw = fs::read(dir.join(ENTRY_FILE))?;
    let manifest: EntryManifest = serde_json::from_slice(&raw)?;
    if manifest.version != ENTRY_VERSION {
        return Err(anyhow::anyhow!("unsupported entry version {}", manifest.version).into());
    }

    let mut stems = Vec::with_capacity(manifest.stems.len());
    for name in manifest.stems {
        let path = dir.join(stem_file(&name));
        if !path.is_file() {
            return Err(anyhow::anyhow!("stem {name} missing").into());
        }
        stems.push(Stem { name, path });
    }

    Ok(SeparationResult {
        engine: manifest.engine,
        model: manifest.model,
        stems,
        log: manifest.log,
    })
}
