use thiserror::Error;

/// Errors surfaced by the streaming cache.
///
/// The enum is `Clone` so a single-flighted activation outcome can be handed
/// to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Unknown id, unknown file index, or id not currently active.
    #[error("not found")]
    NotFound,

    /// The swarm engine could not open the descriptor.
    #[error("activation failed: {0}")]
    Activation(String),

    /// A byte source could not be opened or failed mid-transfer.
    #[error("stream failed: {0}")]
    Stream(String),
}
