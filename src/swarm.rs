// Capability seam for the peer-to-peer download engine. The crate never
// implements the swarm protocol itself; it consumes these traits.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// A finite, forward-only stream of body chunks covering one requested byte
/// range. Exactly one pipe reads it. A chunk may take a while to arrive when
/// the underlying pieces have not been downloaded yet; the sender side yields
/// an error (or simply stops) when the owning session is closed.
pub type ByteSource = mpsc::Receiver<Result<Bytes>>;

/// One file inside an open session. Indices follow original descriptor order
/// and are fixed for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub index: usize,
    pub name: String,
    pub length: u64,
}

/// A live download session opened from a descriptor.
pub trait SessionHandle: Send + Sync {
    /// Display name of the descriptor.
    fn name(&self) -> &str;

    /// Ordered file list, fixed after open.
    fn files(&self) -> &[FileDescriptor];

    /// Open a byte source covering `[start, end]` (inclusive) of one file.
    /// Bytes are delivered progressively as pieces arrive from the swarm.
    fn open_byte_range(&self, file_index: usize, start: u64, end: u64) -> Result<ByteSource>;

    /// Tear down the session, cancelling every open byte source. Idempotent.
    fn close(&self);
}

/// Capability that turns a descriptor file into a live session.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    async fn open(&self, locator: &Path) -> Result<Arc<dyn SessionHandle>>;
}
