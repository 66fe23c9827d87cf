//
// storage.rs
// Dicom-Viewer-rs
//
// Keeps loaded byte blobs addressable by stable resource identifiers so frames can be decoded repeatedly.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};

/// Scheme used for blobs registered from local files.
pub const FILE_SCHEME: &str = "dicomfile:";

/// Shared blob registry. Cloning hands out another handle to the same registry.
#[derive(Clone, Default)]
pub struct ResourceStore {
    blobs: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a local blob and returns its `dicomfile:` identifier.
    ///
    /// The identifier is derived from a sanitized name stem plus a content hash, so
    /// registering the same bytes twice yields the same identifier.
    pub fn register(&self, original_name: Option<&str>, bytes: Vec<u8>) -> String {
        let stem = original_name
            .and_then(|n| Path::new(n).file_stem().and_then(|s| s.to_str()))
            .map(sanitize_filename)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "dicom".to_string());

        let hash = hex::encode(Sha256::digest(&bytes));
        let id = format!("{}{}-{}", FILE_SCHEME, stem, &hash[..12]);
        self.insert(&id, bytes);
        id
    }

    /// Caches bytes under an arbitrary base identifier (used for fetched URLs).
    pub fn insert(&self, id: &str, bytes: Vec<u8>) {
        // A poisoned lock only means another writer panicked mid-insert; the map is still usable.
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(id.to_string(), Arc::new(bytes));
    }

    pub fn get(&self, id: &str) -> Option<Arc<Vec<u8>>> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.get(id).cloned()
    }
}

fn sanitize_filename(input: &str) -> String {
    // Keep only ASCII word characters and a few safe separators so identifiers stay URL-friendly.
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
