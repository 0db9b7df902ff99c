use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wasmtime::Engine;
use wasmtime::component::Component;

use crate::error::RuntimeError;

/// Version prefix the host supports. `initialize` reports
/// [`RuntimeError::VersionMismatch`] for packs whose manifest version does
/// not start with this.
pub const SUPPORTED_PACK_VERSION: &str = "1.0";

/// Environment variable naming an explicit pack location, probed after the
/// well-known candidates.
pub const PACK_ENV: &str = "CAPSTAN_HOME";

/// Module file extensions, in resolution order.
const MODULE_EXTS: &[&str] = &["wasm", "wat"];
const PRECOMPILED_EXT: &str = "cwasm";
const MANIFEST_FILE: &str = "pack.json";
const CACHE_DIR: &str = ".cache";

/// Manifest at the pack root (`pack.json`), written by whatever installed
/// the module pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackManifest {
    /// Pack name, informational.
    pub name: String,
    /// Pack format version; checked against [`SUPPORTED_PACK_VERSION`].
    pub version: String,
}

/// The installed module pack.
///
/// Layout under the pack root:
/// ```text
/// {root}/
///   pack.json             - manifest
///   {name}.wasm|.wat      - module sources
///   .cache/
///     {name}-{hash}.cwasm - precompiled artifacts, keyed by source hash
/// ```
pub struct ModulePack {
    root: PathBuf,
}

impl ModulePack {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Ordered candidate locations: well-known paths first, then the
    /// environment override.
    pub fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from("/usr/local/share/capstan")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".capstan").join("modules"));
        }
        if let Some(env_home) = std::env::var_os(PACK_ENV) {
            candidates.push(PathBuf::from(env_home));
        }
        candidates
    }

    /// Probe `candidates` in order and adopt the first existing directory.
    pub fn discover(candidates: &[PathBuf]) -> Option<Self> {
        candidates
            .iter()
            .find(|path| path.is_dir())
            .map(|path| Self::new(path.clone()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the pack manifest, if present.
    pub fn manifest(&self) -> Result<Option<PackManifest>, RuntimeError> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// List the module names present in the pack directory, sorted and
    /// de-duplicated across extensions.
    pub fn module_names(&self) -> Result<Vec<String>, RuntimeError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_module = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| MODULE_EXTS.contains(&ext));
            if is_module {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    names.push(stem.to_owned());
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Compile module source through the precompiled cache.
    ///
    /// Cache entries are keyed by the source content hash, so a changed
    /// module file never resurrects a stale artifact. Cache write failures
    /// are ignored; the freshly compiled component is returned either way.
    pub fn load_or_compile(
        &self,
        name: &str,
        source: &[u8],
        engine: &Engine,
    ) -> Result<Component, RuntimeError> {
        let cache_dir = self.root.join(CACHE_DIR);
        let cached = cache_dir.join(format!("{name}-{}.{PRECOMPILED_EXT}", hash_source(source)));

        if cached.exists() {
            if let Ok(component) = load_precompiled(&cached, engine) {
                tracing::debug!(module = name, "loaded from precompiled cache");
                return Ok(component);
            }
            tracing::debug!(module = name, "precompiled cache invalid, recompiling");
        }

        let component =
            Component::new(engine, source).map_err(|e| RuntimeError::LoadModule {
                module: name.to_owned(),
                reason: e.to_string(),
            })?;

        if let Ok(serialized) = component.serialize() {
            if std::fs::create_dir_all(&cache_dir).is_ok() {
                let _ = std::fs::write(&cached, serialized);
                tracing::debug!(module = name, "saved precompiled cache");
            }
        }

        Ok(component)
    }
}

/// Resolve a module name to a file across the search path, trying
/// `<dir>/<name>.wasm` then `<dir>/<name>.wat` in each directory in order.
pub(crate) fn resolve_module(search_paths: &[PathBuf], name: &str) -> Option<PathBuf> {
    for dir in search_paths {
        for ext in MODULE_EXTS {
            let candidate = dir.join(format!("{name}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn hash_source(source: &[u8]) -> String {
    let digest = Sha256::digest(source);
    hex::encode(&digest[..8])
}

fn load_precompiled(path: &Path, engine: &Engine) -> Result<Component> {
    // SAFETY: cache entries are written by this same engine version, and
    // the content-hash key ties each one to its source bytes.
    unsafe { Component::deserialize_file(engine, path) }
}
