use thiserror::Error;

/// Failures surfaced by a key-value store adapter.
///
/// Store failures are fatal for the engine (spec class: store-io); callers
/// propagate them to the host rather than recovering.
#[derive(Debug, Error)]
pub enum KvStoreError {
    #[error("store I/O failure: {message}")]
    Io { message: String },

    #[error("store corruption: {message}")]
    Corruption { message: String },
}

impl KvStoreError {
    pub fn io(message: impl Into<String>) -> Self {
        KvStoreError::Io {
            message: message.into(),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        KvStoreError::Corruption {
            message: message.into(),
        }
    }
}
