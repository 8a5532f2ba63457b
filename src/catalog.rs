// Flat-file descriptor catalog: `.torrent` files in one directory with
// optional `{id}.json` sidecars carrying display metadata.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resolves catalog ids to descriptor files on disk. Consulted before an
/// activation to confirm the id is known.
pub trait DescriptorCatalog: Send + Sync {
    fn resolve_descriptor(&self, id: &str) -> Option<PathBuf>;
}

/// Sidecar metadata stored next to a descriptor file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "Other".to_string()
}

impl Default for DescriptorMeta {
    fn default() -> Self {
        Self {
            name: None,
            category: default_category(),
        }
    }
}

pub struct FsCatalog {
    dir: PathBuf,
}

impl FsCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Ids are flat file stems; reject anything that could escape the
    /// catalog directory.
    fn descriptor_path(&self, id: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return None;
        }
        Some(self.dir.join(format!("{id}.torrent")))
    }

    /// Sidecar metadata for a descriptor; defaults when the sidecar is
    /// missing or unreadable.
    pub fn metadata(&self, id: &str) -> DescriptorMeta {
        let Some(path) = self.descriptor_path(id) else {
            return DescriptorMeta::default();
        };
        fs::read(path.with_extension("json"))
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default()
    }

    /// All descriptor ids present in the catalog directory, sorted.
    pub fn list_ids(&self) -> io::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("torrent") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl DescriptorCatalog for FsCatalog {
    fn resolve_descriptor(&self, id: &str) -> Option<PathBuf> {
        let path = self.descriptor_path(id)?;
        path.is_file().then_some(path)
    }
}
