#![warn(missing_docs)]
//! poolbench IPC Protocol
//!
//! Framed rkyv protocol between a process pool and its worker processes.
//! Drivers send [`PoolCommand`]s, workers answer with [`WorkerMessage`]s;
//! task results travel as a nested rkyv archive of the typed result vector.

mod framing;
mod messages;

pub use framing::{
    FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, decode_payload, encode_payload,
    read_frame, write_frame,
};
pub use messages::{FailureKind, PoolCommand, TaskRequest, WorkerCapabilities, WorkerMessage};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Command-line flag that switches the binary into worker mode
pub const WORKER_FLAG: &str = "--pool-worker";

/// Environment variable naming the inherited `<read_fd>,<write_fd>` pair
pub const IPC_FD_ENV: &str = "POOLBENCH_IPC_FD";
