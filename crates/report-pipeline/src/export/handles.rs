//! Revocable local handles for generated artifacts
//!
//! Each generated document is registered under a fresh `blob:report/<uuid>`
//! handle. The bytes stay resident until the handle is revoked, so every
//! holder of a handle is responsible for revoking it on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::constants;

/// Opaque reference to a registered artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered artifact blob
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub bytes: Arc<[u8]>,
    pub mime: String,
    pub file_name: String,
}

/// Registry of live artifact handles, shared by the pipeline and its owners
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    inner: Arc<Mutex<HashMap<ArtifactHandle, StoredArtifact>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ArtifactHandle, StoredArtifact>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register bytes under a new, never reused handle
    pub fn create(&self, bytes: Vec<u8>, mime: &str, file_name: &str) -> ArtifactHandle {
        let handle = ArtifactHandle(format!("{}{}", constants::HANDLE_SCHEME, Uuid::new_v4()));
        debug!("Registered artifact {} ({} bytes)", handle, bytes.len());
        self.entries().insert(
            handle.clone(),
            StoredArtifact {
                bytes: bytes.into(),
                mime: mime.to_string(),
                file_name: file_name.to_string(),
            },
        );
        handle
    }

    pub fn get(&self, handle: &ArtifactHandle) -> Option<StoredArtifact> {
        self.entries().get(handle).cloned()
    }

    /// Release a handle. Returns false if it was already revoked.
    pub fn revoke(&self, handle: &ArtifactHandle) -> bool {
        let removed = self.entries().remove(handle).is_some();
        if removed {
            debug!("Revoked artifact {}", handle);
        }
        removed
    }

    pub fn is_live(&self, handle: &ArtifactHandle) -> bool {
        self.entries().contains_key(handle)
    }

    /// Number of handles not yet revoked
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }
}
