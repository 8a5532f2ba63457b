// Shapes registry results into the JSON summaries the HTTP surface
// returns, attaching a stable per-file stream locator.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Error;
use crate::registry::SwarmRegistry;
use crate::swarm::FileDescriptor;

#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
    pub index: usize,
    pub stream_url: String,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub files: Vec<FileSummary>,
}

fn summarize(id: &str, name: &str, files: &[FileDescriptor]) -> SessionSummary {
    SessionSummary {
        id: id.to_string(),
        name: name.to_string(),
        files: files
            .iter()
            .map(|file| FileSummary {
                name: file.name.clone(),
                size: file.length,
                index: file.index,
                stream_url: format!("/{}/{}", id, file.index),
            })
            .collect(),
    }
}

/// Activate a session (idempotent) and describe it.
pub async fn activate_by_id(
    registry: &Arc<SwarmRegistry>,
    id: &str,
    locator: &Path,
) -> Result<SessionSummary, Error> {
    let handle = registry.activate(id, locator).await?;
    Ok(summarize(id, handle.name(), handle.files()))
}

/// Describe every active session.
pub fn list_active_summaries(registry: &SwarmRegistry) -> Vec<SessionSummary> {
    registry
        .list_active()
        .iter()
        .map(|session| summarize(&session.id, &session.name, &session.files))
        .collect()
}

/// Tear down a session; `false` when it is not active.
pub fn deactivate_by_id(registry: &SwarmRegistry, id: &str) -> bool {
    registry.deactivate(id)
}
