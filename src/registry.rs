// Active-session cache: single-flight activation, recency tracking, and
// idle eviction. The map behind one mutex is the only shared mutable state;
// session handles are owned by their entries and reached through it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::Error;
use crate::swarm::{FileDescriptor, SessionHandle, SwarmEngine};

type Handle = Arc<dyn SessionHandle>;

/// Outcome of one activation, broadcast to every caller waiting on it.
/// `None` while the engine call is still in flight.
type Outcome = Option<Result<Handle, Error>>;

struct ActiveEntry {
    handle: Handle,
    last_accessed: Instant,
    active_streams: u32,
}

enum Entry {
    /// Engine call in flight; concurrent activators share the channel.
    Activating(watch::Receiver<Outcome>),
    Active(ActiveEntry),
}

/// Snapshot of one active session, taken without mutating recency.
pub struct ActiveSnapshot {
    pub id: String,
    pub name: String,
    pub files: Vec<FileDescriptor>,
}

pub struct SwarmRegistry {
    engine: Arc<dyn SwarmEngine>,
    entries: Mutex<HashMap<String, Entry>>,
    idle_timeout: Duration,
    sweep_token: CancellationToken,
}

impl SwarmRegistry {
    /// Create the registry and start its idle sweeper. Must be called from
    /// within a tokio runtime.
    pub fn new(engine: Arc<dyn SwarmEngine>, config: &StreamConfig) -> Arc<Self> {
        let registry = Arc::new(Self {
            engine,
            entries: Mutex::new(HashMap::new()),
            idle_timeout: config.idle_timeout(),
            sweep_token: CancellationToken::new(),
        });
        registry.spawn_sweeper(config.sweep_interval());
        registry
    }

    /// Return the session for `id`, activating it through the engine if it
    /// is not live yet. Concurrent calls for the same id share one engine
    /// `open`; every caller observes the same success or failure.
    pub async fn activate(&self, id: &str, locator: &Path) -> Result<Handle, Error> {
        enum Plan {
            Join(watch::Receiver<Outcome>),
            Drive(watch::Sender<Outcome>, watch::Receiver<Outcome>),
        }

        let plan = {
            let mut entries = self.entries.lock();
            match entries.get_mut(id) {
                Some(Entry::Active(entry)) => {
                    entry.last_accessed = Instant::now();
                    debug!("session already active: {}", id);
                    return Ok(Arc::clone(&entry.handle));
                }
                Some(Entry::Activating(rx)) => Plan::Join(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    entries.insert(id.to_string(), Entry::Activating(rx.clone()));
                    Plan::Drive(tx, rx)
                }
            }
        };

        match plan {
            Plan::Join(rx) => self.join_activation(id, rx).await,
            Plan::Drive(tx, rx) => self.drive_activation(id, locator, tx, rx).await,
        }
    }

    /// Wait on an activation someone else is driving.
    async fn join_activation(
        &self,
        id: &str,
        mut rx: watch::Receiver<Outcome>,
    ) -> Result<Handle, Error> {
        debug!("joining in-flight activation: {}", id);
        // Copy the outcome out of the watch ref before touching `rx` again.
        let outcome = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|outcome| match &*outcome {
                Some(Ok(handle)) => Ok(Arc::clone(handle)),
                Some(Err(e)) => Err(e.clone()),
                None => Err(Error::Activation("activation aborted".to_string())),
            });

        match outcome {
            Ok(result) => result,
            Err(_) => {
                // The driving task was cancelled before the engine answered.
                // Clear the stale entry so a later request can retry.
                self.remove_stale_activation(id, &rx);
                Err(Error::Activation("activation aborted".to_string()))
            }
        }
    }

    /// Perform the engine call and publish the outcome to all waiters.
    async fn drive_activation(
        &self,
        id: &str,
        locator: &Path,
        tx: watch::Sender<Outcome>,
        rx: watch::Receiver<Outcome>,
    ) -> Result<Handle, Error> {
        // If this future is dropped mid-open the entry must not stay stuck
        // in Activating; the guard clears it and the dropped sender wakes
        // any waiters.
        let mut guard = ActivationGuard {
            registry: self,
            id,
            rx: &rx,
            armed: true,
        };

        info!("activating session: {}", id);
        let result = self.engine.open(locator).await;

        let outcome = {
            let mut entries = self.entries.lock();
            match result {
                Ok(handle) => {
                    entries.insert(
                        id.to_string(),
                        Entry::Active(ActiveEntry {
                            handle: Arc::clone(&handle),
                            last_accessed: Instant::now(),
                            active_streams: 0,
                        }),
                    );
                    info!("session activated: {} ({} files)", id, handle.files().len());
                    Ok(handle)
                }
                Err(e) => {
                    entries.remove(id);
                    warn!("activation failed for {}: {:#}", id, e);
                    Err(Error::Activation(e.to_string()))
                }
            }
        };
        guard.armed = false;

        // Publish after the map reflects the outcome, so a waiter that
        // re-checks the map sees a consistent state.
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    fn remove_stale_activation(&self, id: &str, rx: &watch::Receiver<Outcome>) {
        let mut entries = self.entries.lock();
        if let Some(Entry::Activating(current)) = entries.get(id) {
            // Only remove the entry belonging to this activation attempt;
            // a fresh one may already have taken its place.
            if current.same_channel(rx) {
                entries.remove(id);
            }
        }
    }

    /// Read-only lookup. Refreshes recency on hit.
    pub fn get(&self, id: &str) -> Option<Handle> {
        let mut entries = self.entries.lock();
        match entries.get_mut(id) {
            Some(Entry::Active(entry)) => {
                entry.last_accessed = Instant::now();
                Some(Arc::clone(&entry.handle))
            }
            _ => None,
        }
    }

    /// Snapshot every active session. Does not mutate recency.
    pub fn list_active(&self) -> Vec<ActiveSnapshot> {
        let entries = self.entries.lock();
        let mut sessions: Vec<ActiveSnapshot> = entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                Entry::Active(e) => Some(ActiveSnapshot {
                    id: id.clone(),
                    name: e.handle.name().to_string(),
                    files: e.handle.files().to_vec(),
                }),
                Entry::Activating(_) => None,
            })
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Tear down a session regardless of live stream count; open byte
    /// sources are cancelled by the handle's close. Returns `false` when
    /// the id has no open session.
    pub fn deactivate(&self, id: &str) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            if !matches!(entries.get(id), Some(Entry::Active(_))) {
                return false;
            }
            entries.remove(id)
        };

        if let Some(Entry::Active(entry)) = entry {
            if entry.active_streams > 0 {
                debug!(
                    "deactivating {} with {} live streams",
                    id, entry.active_streams
                );
            }
            entry.handle.close();
            info!("session deactivated: {}", id);
            true
        } else {
            false
        }
    }

    /// Mark one transfer as open against `id`. The returned guard releases
    /// the slot exactly once when dropped, on every exit path.
    pub fn begin_stream(self: &Arc<Self>, id: &str) -> Result<StreamGuard, Error> {
        let mut entries = self.entries.lock();
        match entries.get_mut(id) {
            Some(Entry::Active(entry)) => {
                entry.active_streams += 1;
                entry.last_accessed = Instant::now();
                Ok(StreamGuard {
                    registry: Arc::clone(self),
                    id: id.to_string(),
                })
            }
            _ => Err(Error::NotFound),
        }
    }

    fn end_stream(&self, id: &str) {
        let mut entries = self.entries.lock();
        if let Some(Entry::Active(entry)) = entries.get_mut(id) {
            entry.active_streams = entry.active_streams.saturating_sub(1);
            entry.last_accessed = Instant::now();
        }
    }

    /// Number of live transfers against `id`, if it is active.
    pub fn stream_count(&self, id: &str) -> Option<u32> {
        let entries = self.entries.lock();
        match entries.get(id) {
            Some(Entry::Active(entry)) => Some(entry.active_streams),
            _ => None,
        }
    }

    /// Stop the sweeper and close every open session.
    pub fn shutdown(&self) {
        self.sweep_token.cancel();
        let handles: Vec<Handle> = {
            let mut entries = self.entries.lock();
            entries
                .drain()
                .filter_map(|(_, entry)| match entry {
                    Entry::Active(e) => Some(e.handle),
                    Entry::Activating(_) => None,
                })
                .collect()
        };
        for handle in handles {
            handle.close();
        }
    }

    fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let registry = Arc::downgrade(self);
        let token = self.sweep_token.clone();
        tokio::spawn(async move {
            let start = Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep_idle();
            }
            debug!("idle sweeper stopped");
        });
    }

    /// Evict every active session that has been idle past the timeout and
    /// has no live readers. Entries with readers are skipped regardless of
    /// age; the next sweep re-evaluates them.
    fn sweep_idle(&self) {
        let now = Instant::now();
        let expired: Vec<(String, Handle)> = {
            let mut entries = self.entries.lock();
            let ids: Vec<String> = entries
                .iter()
                .filter_map(|(id, entry)| match entry {
                    Entry::Active(e)
                        if e.active_streams == 0
                            && now.duration_since(e.last_accessed) > self.idle_timeout =>
                    {
                        Some(id.clone())
                    }
                    _ => None,
                })
                .collect();
            ids.into_iter()
                .filter_map(|id| match entries.remove(&id) {
                    Some(Entry::Active(e)) => Some((id, e.handle)),
                    _ => None,
                })
                .collect()
        };

        for (id, handle) in expired {
            info!("evicting idle session: {}", id);
            handle.close();
        }
    }
}

impl Drop for SwarmRegistry {
    fn drop(&mut self) {
        self.sweep_token.cancel();
    }
}

/// Clears a half-finished activation entry if the driving future is dropped.
struct ActivationGuard<'a> {
    registry: &'a SwarmRegistry,
    id: &'a str,
    rx: &'a watch::Receiver<Outcome>,
    armed: bool,
}

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.remove_stale_activation(self.id, self.rx);
        }
    }
}

/// Scoped hold on a session's stream slot; dropping it runs `end_stream`
/// exactly once, whether the transfer completed, errored, or the client
/// disconnected.
pub struct StreamGuard {
    registry: Arc<SwarmRegistry>,
    id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.end_stream(&self.id);
    }
}
