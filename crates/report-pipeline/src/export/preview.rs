//! Preview actions against a generated document handle

use std::path::{Path, PathBuf};
use tracing::info;

use super::handles::{ArtifactHandle, ArtifactStore, StoredArtifact};
use crate::error::ExportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewAction {
    Open,
    Print,
    Save { dir: PathBuf },
    Email,
}

/// The surface showing a generated document (viewer, print dialog, mail client)
pub trait PreviewSurface: Send + Sync {
    fn open(&self, handle: &ArtifactHandle, artifact: &StoredArtifact) -> Result<(), ExportError>;
    fn print(&self, handle: &ArtifactHandle, artifact: &StoredArtifact) -> Result<(), ExportError>;
    fn email(&self, handle: &ArtifactHandle, artifact: &StoredArtifact) -> Result<(), ExportError>;
}

/// Run `action` against a live handle. `Save` returns the written path.
pub fn perform(
    store: &ArtifactStore,
    surface: &dyn PreviewSurface,
    handle: &ArtifactHandle,
    action: &PreviewAction,
) -> Result<Option<PathBuf>, ExportError> {
    let artifact = store
        .get(handle)
        .ok_or_else(|| ExportError::HandleRevoked(handle.to_string()))?;

    match action {
        PreviewAction::Open => surface.open(handle, &artifact)?,
        PreviewAction::Print => surface.print(handle, &artifact)?,
        PreviewAction::Email => surface.email(handle, &artifact)?,
        PreviewAction::Save { dir } => return save(&artifact, dir).map(Some),
    }
    Ok(None)
}

fn save(artifact: &StoredArtifact, dir: &Path) -> Result<PathBuf, ExportError> {
    let path = dir.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes[..])?;
    info!("Saved: {}", path.display());
    Ok(path)
}
