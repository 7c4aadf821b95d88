//! Error kinds for the replication core (spec §7).

use thiserror::Error;

/// The seven error kinds spec §7 distinguishes, collapsed into one enum so
/// the transport layer can map each to the right HTTP status.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Kind 1: admission gate rejected the request. Retryable; 503.
    #[error("too many concurrent requests")]
    Admission,

    /// Kind 3: a bulk-item failure that didn't match the non-fatal class,
    /// a null bulk response, or retries exhausted. No partial ack list.
    #[error("fatal index failure: {0}")]
    FatalIndex(String),

    /// Kind 6: createDatabase/deleteDatabase/attachments. 501.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Kind 7: could not read or create a bucket/vbucket UUID after the
    /// retry budget. Fatal.
    #[error("could not reconcile uuid for {bucket}: {reason}")]
    UuidReconcile { bucket: String, reason: String },

    /// The requested index does not exist.
    #[error("index does not exist: {0}")]
    IndexMissing(String),

    /// Propagated from the Index client's transport.
    #[error("index client error: {0}")]
    Transport(#[from] anyhow::Error),

    /// Interruption during a retry sleep (spec §4.3, §5): converts to fatal.
    #[error("interrupted during retry wait")]
    Interrupted,
}

impl BridgeError {
    /// Whether the Source should interpret this as "back off and retry",
    /// matching spec §7's retryable/fatal distinction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Admission)
    }
}
