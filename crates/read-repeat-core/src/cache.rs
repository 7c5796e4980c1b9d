//! On-disk cache for converted source text.
//!
//! Conversions that shell out (pandoc, pdftotext) are stored under
//! `.cache/<sha256 of source path>/` next to a small TOML signature of the
//! source file. A cached entry is reused only while the signature matches.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub const CACHE_DIR: &str = ".cache";

pub fn hash_dir(source: &Path) -> PathBuf {
    hash_dir_in(Path::new(CACHE_DIR), source)
}

fn hash_dir_in(root: &Path, source: &Path) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(source.as_os_str().to_string_lossy().as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    root.join(hash)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSignature {
    source_len: u64,
    source_modified_unix_secs: Option<u64>,
}

pub fn source_signature(path: &Path) -> Result<SourceSignature> {
    let meta = fs::metadata(path)
        .with_context(|| format!("Failed to read source metadata for {}", path.display()))?;

    let modified = meta
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs());

    Ok(SourceSignature {
        source_len: meta.len(),
        source_modified_unix_secs: modified,
    })
}

#[derive(Debug, Clone)]
pub struct ConversionCache {
    root: PathBuf,
}

impl Default for ConversionCache {
    fn default() -> Self {
        Self::new(CACHE_DIR)
    }
}

impl ConversionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir_for(&self, source: &Path) -> PathBuf {
        hash_dir_in(&self.root, source)
    }

    fn paths(&self, source: &Path, tool: &str) -> (PathBuf, PathBuf) {
        let dir = self.dir_for(source);
        (
            dir.join(format!("{tool}-plain.txt")),
            dir.join(format!("{tool}-plain.meta.toml")),
        )
    }

    /// Cached text for `source` converted by `tool`, if the signature still
    /// matches. Missing or unreadable metadata counts as a miss.
    pub fn read(
        &self,
        source: &Path,
        tool: &str,
        signature: &SourceSignature,
    ) -> Result<Option<String>> {
        let (text_path, meta_path) = self.paths(source, tool);

        let Ok(meta_str) = fs::read_to_string(&meta_path) else {
            return Ok(None);
        };
        let Ok(cached) = toml::from_str::<SourceSignature>(&meta_str) else {
            return Ok(None);
        };
        if &cached != signature {
            return Ok(None);
        }

        let text = fs::read_to_string(&text_path).with_context(|| {
            format!("Failed to read cached text at {}", text_path.display())
        })?;
        Ok(Some(text))
    }

    pub fn write(
        &self,
        source: &Path,
        tool: &str,
        signature: &SourceSignature,
        text: &str,
    ) -> Result<()> {
        let (text_path, meta_path) = self.paths(source, tool);
        if let Some(parent) = text_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }

        fs::write(&text_path, text)
            .with_context(|| format!("Failed to write cached text at {}", text_path.display()))?;
        let meta_toml = toml::to_string(signature).context("Failed to serialize cache metadata")?;
        fs::write(&meta_path, meta_toml).with_context(|| {
            format!("Failed to write cache metadata at {}", meta_path.display())
        })?;
        Ok(())
    }
}
