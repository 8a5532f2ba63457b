// Shared test doubles: an in-memory swarm engine whose sessions serve
// deterministic byte patterns, with scriptable open behavior.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use seedstream::swarm::{ByteSource, FileDescriptor, SessionHandle, SwarmEngine};

/// Deterministic content so range assertions can compare exact bytes.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub struct FakeFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl FakeFile {
    pub fn new(name: &str, len: usize) -> Self {
        Self {
            name: name.to_string(),
            data: patterned(len),
        }
    }
}

pub struct FakeEngine {
    name: String,
    files: Arc<Vec<FakeFile>>,
    open_delay: Duration,
    fail_next_open: AtomicBool,
    fail_byte_ranges: AtomicBool,
    open_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new(files: Vec<FakeFile>) -> Self {
        Self {
            name: "fake-descriptor".to_string(),
            files: Arc::new(files),
            open_delay: Duration::ZERO,
            fail_next_open: AtomicBool::new(false),
            fail_byte_ranges: AtomicBool::new(false),
            open_calls: AtomicUsize::new(0),
        }
    }

    /// A 1000-byte video plus a 100-byte text file.
    pub fn two_files() -> Self {
        Self::new(vec![
            FakeFile::new("movie.mkv", 1000),
            FakeFile::new("notes.txt", 100),
        ])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// The next `open` call fails; later calls succeed.
    pub fn fail_next_open(self) -> Self {
        self.fail_next_open.store(true, Ordering::SeqCst);
        self
    }

    /// Every `open_byte_range` call on opened sessions fails.
    pub fn failing_byte_ranges(self) -> Self {
        self.fail_byte_ranges.store(true, Ordering::SeqCst);
        self
    }

    pub fn open_count(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwarmEngine for FakeEngine {
    async fn open(&self, _locator: &Path) -> Result<Arc<dyn SessionHandle>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        if self.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("no reachable peers"));
        }

        let files = self
            .files
            .iter()
            .enumerate()
            .map(|(index, file)| FileDescriptor {
                index,
                name: file.name.clone(),
                length: file.data.len() as u64,
            })
            .collect();

        Ok(Arc::new(FakeSession {
            name: self.name.clone(),
            files,
            data: Arc::clone(&self.files),
            fail_byte_ranges: self.fail_byte_ranges.load(Ordering::SeqCst),
            cancel: CancellationToken::new(),
        }))
    }
}

pub struct FakeSession {
    name: String,
    files: Vec<FileDescriptor>,
    data: Arc<Vec<FakeFile>>,
    fail_byte_ranges: bool,
    cancel: CancellationToken,
}

impl SessionHandle for FakeSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    fn open_byte_range(&self, file_index: usize, start: u64, end: u64) -> Result<ByteSource> {
        if self.fail_byte_ranges {
            return Err(anyhow!("piece storage unavailable"));
        }
        let file = self
            .data
            .get(file_index)
            .ok_or_else(|| anyhow!("file index {file_index} out of range"))?;
        if start > end || end >= file.data.len() as u64 {
            return Err(anyhow!("invalid range [{start}, {end}]"));
        }

        let slice = file.data[start as usize..=end as usize].to_vec();
        let cancel = self.cancel.clone();

        // Small chunks through a small buffer so tests exercise backpressure.
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for chunk in slice.chunks(64) {
                if cancel.is_cancelled() {
                    let _ = tx.send(Err(anyhow!("session closed"))).await;
                    return;
                }
                if tx.send(Ok(Bytes::copy_from_slice(chunk))).await.is_err() {
                    // Receiver dropped (client disconnected).
                    return;
                }
            }
        });

        Ok(rx)
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}
