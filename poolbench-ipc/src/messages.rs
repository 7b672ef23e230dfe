//! IPC Message Types
//!
//! All messages are serialized with rkyv and validated on receipt.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Commands sent from a pool driver to its worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum PoolCommand {
    /// Evaluate a registered computation over a contiguous run of inputs
    Run(TaskRequest),

    /// Request graceful shutdown
    Shutdown,
}

/// One unit of work: a single item or a whole chunk
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct TaskRequest {
    /// Pool-assigned identifier, echoed in the reply
    pub task_id: u64,
    /// Registry name of the computation to apply
    pub computation: String,
    /// Position of `values[0]` in the full input sequence
    pub offset: u64,
    /// The inputs, in order
    pub values: Vec<u64>,
}

/// Messages sent from a worker back to its pool driver
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake with worker capabilities
    Hello(WorkerCapabilities),

    /// Task finished; `payload` is an rkyv archive of the result vector
    Complete {
        /// Task this reply belongs to
        task_id: u64,
        /// Encoded `Vec<T>`, one entry per input value
        payload: Vec<u8>,
    },

    /// Task failed; no partial results are returned
    Failure {
        /// Task this reply belongs to
        task_id: u64,
        /// Error category
        kind: FailureKind,
        /// Absolute input index that failed, when known
        index: Option<u64>,
        /// Input value that failed, when known
        value: Option<u64>,
        /// Human-readable error message
        message: String,
    },
}

/// Categories of task failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The computation returned an error
    Computation,
    /// The computation panicked (caught)
    Panic,
    /// The worker has no computation registered under the requested name
    UnknownComputation,
    /// The results could not be encoded
    Encoding,
}

/// Worker capabilities advertised during handshake
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// OS process id of the worker
    pub pid: u32,
    /// Names of the computations this worker can evaluate
    pub computations: Vec<String>,
}

impl WorkerCapabilities {
    /// Capabilities of the current process for the given registry contents
    pub fn current(computations: Vec<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
            computations,
        }
    }
}
