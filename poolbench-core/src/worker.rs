//! Worker Process Entry Point
//!
//! The worker side of the pool. A worker greets its driver with the names it
//! can evaluate, then answers `Run` commands one at a time from its own
//! registry until it is told to shut down or the driver goes away.
//!
//! Spawned workers find their channel in `POOLBENCH_IPC_FD`
//! (`<read_fd>,<write_fd>`, normally `3,4`) and stop between tasks once
//! SIGTERM arrives. Thread workers are handed a socket instead.

use crate::computation::{ComputationRegistry, ComputeError, EvaluateError};
use poolbench_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, PoolCommand, TaskRequest,
    WorkerCapabilities, WorkerMessage,
};
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{FromRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::debug;

/// Raised by the SIGTERM handler; the worker loop checks it between tasks.
static TERMINATED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_signal: libc::c_int) {
    TERMINATED.store(true, Ordering::Relaxed);
}

fn trap_sigterm() -> std::io::Result<()> {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = on_sigterm as extern "C" fn(libc::c_int) as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART;
    let ret = unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut())
    };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Errors that end the worker loop
#[derive(Debug, Error)]
pub enum WorkerError {
    /// No usable channel descriptors in the environment
    #[error("worker has no IPC channel: {0}")]
    Transport(String),

    /// The SIGTERM handler could not be installed
    #[error("failed to install SIGTERM handler: {0}")]
    Signal(std::io::Error),

    /// The command or reply channel broke
    #[error("worker IPC failed: {0}")]
    Ipc(#[from] FrameError),
}

/// Parse `<read_fd>,<write_fd>`: two distinct non-negative descriptors
fn parse_fd_pair(value: &str) -> Option<(RawFd, RawFd)> {
    let (read, write) = value.split_once(',')?;
    let read: RawFd = read.trim().parse().ok()?;
    let write: RawFd = write.trim().parse().ok()?;
    (read >= 0 && write >= 0 && read != write).then_some((read, write))
}

/// Worker main loop
pub struct WorkerMain {
    reader: FrameReader<Box<dyn Read + Send>>,
    writer: FrameWriter<Box<dyn Write + Send>>,
    registry: Arc<ComputationRegistry>,
    handle_signals: bool,
}

impl WorkerMain {
    /// Worker for a spawned process, over the descriptors named by
    /// `POOLBENCH_IPC_FD`.
    pub fn from_env(registry: Arc<ComputationRegistry>) -> Result<Self, WorkerError> {
        let value = std::env::var(IPC_FD_ENV).map_err(|_| {
            WorkerError::Transport(format!("{IPC_FD_ENV} is not set (workers are started by the pool)"))
        })?;
        let (read_fd, write_fd) = parse_fd_pair(&value).ok_or_else(|| {
            WorkerError::Transport(format!(
                "invalid {IPC_FD_ENV}={value:?}, expected <read_fd>,<write_fd>"
            ))
        })?;

        // The pool placed these for this process alone.
        let reader = unsafe { File::from_raw_fd(read_fd) };
        let writer = unsafe { File::from_raw_fd(write_fd) };
        Ok(Self {
            reader: FrameReader::new(Box::new(reader) as Box<dyn Read + Send>),
            writer: FrameWriter::new(Box::new(writer) as Box<dyn Write + Send>),
            registry,
            handle_signals: true,
        })
    }

    /// Worker over an explicit transport (thread-backed pools). Signals are
    /// left alone since the process is shared.
    pub fn with_transport(
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        registry: Arc<ComputationRegistry>,
    ) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
            registry,
            handle_signals: false,
        }
    }

    /// Run until `Shutdown`, end of stream, or SIGTERM
    pub fn run(&mut self) -> Result<(), WorkerError> {
        if self.handle_signals {
            trap_sigterm().map_err(WorkerError::Signal)?;
        }

        let computations = self
            .registry
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.writer
            .write(&WorkerMessage::Hello(WorkerCapabilities::current(computations)))?;

        let mut served = 0u64;
        loop {
            if self.handle_signals && TERMINATED.load(Ordering::Relaxed) {
                debug!(served, "worker terminated by SIGTERM");
                break;
            }

            let command: PoolCommand = match self.reader.read() {
                Ok(command) => command,
                // The pool went away; nothing left to answer.
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e.into()),
            };

            match command {
                PoolCommand::Run(task) => {
                    let reply = self.evaluate(task);
                    self.writer.write(&reply)?;
                    served += 1;
                }
                PoolCommand::Shutdown => break,
            }
        }

        debug!(served, "worker loop finished");
        Ok(())
    }

    fn evaluate(&self, task: TaskRequest) -> WorkerMessage {
        let Some(algorithm) = self.registry.get(&task.computation) else {
            return WorkerMessage::Failure {
                task_id: task.task_id,
                kind: FailureKind::UnknownComputation,
                index: None,
                value: None,
                message: format!("computation not registered: {}", task.computation),
            };
        };

        match algorithm.evaluate(&task.values) {
            Ok(payload) => WorkerMessage::Complete {
                task_id: task.task_id,
                payload,
            },
            Err(EvaluateError::Item(failure)) => WorkerMessage::Failure {
                task_id: task.task_id,
                kind: match failure.source {
                    ComputeError::Failed(_) => FailureKind::Computation,
                    ComputeError::Panicked(_) => FailureKind::Panic,
                },
                index: Some(task.offset + failure.index as u64),
                value: Some(failure.value),
                message: failure.source.to_string(),
            },
            Err(EvaluateError::Encoding(e)) => WorkerMessage::Failure {
                task_id: task.task_id,
                kind: FailureKind::Encoding,
                index: None,
                value: None,
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::Output;
    use std::os::unix::net::UnixStream;

    fn connect() -> (
        FrameReader<UnixStream>,
        FrameWriter<UnixStream>,
        std::thread::JoinHandle<Result<(), WorkerError>>,
    ) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let their_reader = theirs.try_clone().unwrap();
        let join = std::thread::spawn(move || {
            WorkerMain::with_transport(
                Box::new(their_reader),
                Box::new(theirs),
                Arc::new(ComputationRegistry::builtin()),
            )
            .run()
        });
        let reader = FrameReader::new(ours.try_clone().unwrap());
        let writer = FrameWriter::new(ours);
        (reader, writer, join)
    }

    fn run(task_id: u64, computation: &str, offset: u64, values: Vec<u64>) -> PoolCommand {
        PoolCommand::Run(TaskRequest {
            task_id,
            computation: computation.to_string(),
            offset,
            values,
        })
    }

    #[test]
    fn test_hello_then_results() {
        let (mut reader, mut writer, join) = connect();

        match reader.read::<WorkerMessage>().unwrap() {
            WorkerMessage::Hello(caps) => {
                assert_eq!(caps.computations, vec!["fibonacci", "primeChecker"]);
            }
            other => panic!("expected Hello, got {other:?}"),
        }

        writer.write(&run(1, "primeChecker", 0, vec![1, 2, 3, 4])).unwrap();
        match reader.read::<WorkerMessage>().unwrap() {
            WorkerMessage::Complete { task_id, payload } => {
                assert_eq!(task_id, 1);
                assert_eq!(
                    bool::decode(&payload).unwrap(),
                    vec![false, true, true, false]
                );
            }
            other => panic!("expected Complete, got {other:?}"),
        }

        writer.write(&PoolCommand::Shutdown).unwrap();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_failure_index_includes_offset() {
        let (mut reader, mut writer, join) = connect();
        let _hello: WorkerMessage = reader.read().unwrap();

        writer.write(&run(9, "fibonacci", 1000, vec![1, 2, 200])).unwrap();
        match reader.read::<WorkerMessage>().unwrap() {
            WorkerMessage::Failure {
                task_id,
                kind,
                index,
                value,
                ..
            } => {
                assert_eq!(task_id, 9);
                assert_eq!(kind, FailureKind::Computation);
                assert_eq!(index, Some(1002));
                assert_eq!(value, Some(200));
            }
            other => panic!("expected Failure, got {other:?}"),
        }

        drop(writer);
        drop(reader);
        // End of stream is a clean exit.
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_unknown_computation_keeps_worker_serving() {
        let (mut reader, mut writer, join) = connect();
        let _hello: WorkerMessage = reader.read().unwrap();

        writer.write(&run(2, "collatz", 0, vec![7])).unwrap();
        assert!(matches!(
            reader.read::<WorkerMessage>().unwrap(),
            WorkerMessage::Failure {
                kind: FailureKind::UnknownComputation,
                index: None,
                ..
            }
        ));

        writer.write(&run(3, "fibonacci", 0, vec![10])).unwrap();
        match reader.read::<WorkerMessage>().unwrap() {
            WorkerMessage::Complete { task_id, payload } => {
                assert_eq!(task_id, 3);
                assert_eq!(u64::decode(&payload).unwrap(), vec![55]);
            }
            other => panic!("expected Complete, got {other:?}"),
        }

        writer.write(&PoolCommand::Shutdown).unwrap();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_parse_fd_pair() {
        assert_eq!(parse_fd_pair("3,4"), Some((3, 4)));
        assert_eq!(parse_fd_pair(" 7 , 9 "), Some((7, 9)));
        assert_eq!(parse_fd_pair("3"), None);
        assert_eq!(parse_fd_pair("3,3"), None);
        assert_eq!(parse_fd_pair("-1,4"), None);
        assert_eq!(parse_fd_pair("stdin,stdout"), None);
    }
}
