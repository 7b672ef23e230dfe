//! Process Pool
//!
//! A fixed set of worker processes fed from one FIFO task queue.
//!
//! ```text
//!   apply_async ──► queue ──► driver 0 ──fd 3/4──► worker process 0
//!                      │
//!                      └────► driver 1 ──fd 3/4──► worker process 1
//!   PendingResult ◄── reply channel ◄── driver
//! ```
//!
//! Each driver thread owns one [`WorkerHandle`]: it pulls a task, sends it
//! over the command pipe, blocks for the reply, and hands the outcome to the
//! task's [`PendingResult`]. Dropping the pool discards queued tasks, shuts
//! every worker down and joins the drivers.

use crate::computation::{ComputationRegistry, Computation, Output};
use crate::progress::Progress;
use crate::worker::WorkerMain;
use poolbench_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, PoolCommand, TaskRequest,
    WORKER_FLAG, WorkerCapabilities, WorkerMessage,
};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors starting or talking to worker processes
#[derive(Debug, Error)]
pub enum PoolError {
    /// Zero workers requested
    #[error("Worker pool needs at least one worker")]
    NoWorkers,

    /// The worker could not be started
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// A driver thread could not be started
    #[error("Failed to start pool driver thread: {0}")]
    DriverFailed(std::io::Error),

    /// The worker channel broke
    #[error("IPC error: {0}")]
    IpcError(String),

    /// The worker exited mid-task
    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    /// Unexpected message or protocol version
    #[error("Worker protocol error: expected {expected}, got {got}")]
    #[allow(missing_docs)]
    ProtocolError { expected: String, got: String },
}

impl From<FrameError> for PoolError {
    fn from(e: FrameError) -> Self {
        PoolError::IpcError(e.to_string())
    }
}

/// Errors surfaced to a strategy while dispatching or collecting work
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The computation failed on one input
    #[error("{computation} failed on input #{index} (value {value}): {message}")]
    Computation {
        /// Computation name
        computation: String,
        /// Absolute position in the input sequence
        index: usize,
        /// The failing input
        value: u64,
        /// Returned error or panic
        kind: FailureKind,
        /// What the computation reported
        message: String,
    },

    /// The worker could not evaluate the task at all
    #[error("worker could not run {computation}: {message}")]
    #[allow(missing_docs)]
    Remote {
        computation: String,
        kind: FailureKind,
        message: String,
    },

    /// The task was dropped without an answer
    #[error("worker lost: {0}")]
    WorkerLost(String),

    /// The result payload was malformed
    #[error("failed to decode results: {0}")]
    Decode(String),

    /// Fewer or more results than inputs
    #[error("expected {expected} results, got {got}")]
    #[allow(missing_docs)]
    LengthMismatch { expected: usize, got: usize },

    /// The pool could not start
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// How worker processes are started
#[derive(Debug, Clone)]
pub enum WorkerLauncher {
    /// Re-execute `program` with the worker flag; the program must build the
    /// same computation registry as the caller
    Process {
        /// Executable to launch
        program: PathBuf,
    },
    /// Run the worker loop on a thread over a socket pair
    Thread {
        /// Computations the thread workers can evaluate
        registry: Arc<ComputationRegistry>,
    },
}

impl WorkerLauncher {
    /// Launch workers by re-executing the current binary
    pub fn current_exe() -> Result<Self, PoolError> {
        Ok(WorkerLauncher::Process {
            program: std::env::current_exe()?,
        })
    }

    /// Launch workers from a specific binary
    pub fn program(program: impl Into<PathBuf>) -> Self {
        WorkerLauncher::Process {
            program: program.into(),
        }
    }

    /// Run workers as threads of the current process
    pub fn threads(registry: Arc<ComputationRegistry>) -> Self {
        WorkerLauncher::Thread { registry }
    }

    fn launch(&self, index: usize) -> Result<WorkerHandle, PoolError> {
        match self {
            WorkerLauncher::Process { program } => WorkerHandle::spawn_process(program),
            WorkerLauncher::Thread { registry } => {
                WorkerHandle::spawn_thread(index, Arc::clone(registry))
            }
        }
    }
}

/// Lowest descriptor a pipe end may occupy. 3 and 4 are where the worker
/// expects its channel, so nothing the parent holds may sit there when the
/// child rearranges its table.
const FIRST_FREE_FD: RawFd = 5;

/// Create a pipe pair, returning (read_fd, write_fd). Both ends are
/// close-on-exec and numbered at or above [`FIRST_FREE_FD`].
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    match (move_above_reserved(fds[0]), move_above_reserved(fds[1])) {
        (Ok(read), Ok(write)) => Ok((read, write)),
        (Ok(fd), Err(e)) | (Err(e), Ok(fd)) => {
            close_fd(fd);
            Err(e)
        }
        (Err(e), Err(_)) => Err(e),
    }
}

/// Duplicate `fd` to the lowest free slot >= [`FIRST_FREE_FD`] with
/// close-on-exec set. The original is closed either way.
fn move_above_reserved(fd: RawFd) -> Result<RawFd, std::io::Error> {
    let moved = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, FIRST_FREE_FD) };
    let result = if moved < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(moved)
    };
    close_fd(fd);
    result
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Spawn `command` with a command pipe on the child's fd 3 and a message pipe
/// on its fd 4. Returns the child with the parent's ends: (reader of fd 4,
/// writer to fd 3).
fn spawn_with_channel(
    mut command: Command,
) -> Result<(Child, std::fs::File, std::fs::File), std::io::Error> {
    // cmd pipe: driver writes commands → worker reads from fd 3
    let (cmd_read, cmd_write) = create_pipe()?;
    // msg pipe: worker writes messages to fd 4 → driver reads
    let (msg_read, msg_write) = match create_pipe() {
        Ok(fds) => fds,
        Err(e) => {
            close_fd(cmd_read);
            close_fd(cmd_write);
            return Err(e);
        }
    };

    unsafe {
        command.pre_exec(move || {
            // Every pipe end is above fd 4, so placing one never clobbers the
            // other. dup2 clears close-on-exec on the copies; the originals
            // close at exec.
            if libc::dup2(cmd_read, 3) < 0 || libc::dup2(msg_write, 4) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let spawned = command.spawn();
    close_fd(cmd_read);
    close_fd(msg_write);
    match spawned {
        Ok(child) => {
            let reader = unsafe { std::fs::File::from_raw_fd(msg_read) };
            let writer = unsafe { std::fs::File::from_raw_fd(cmd_write) };
            Ok((child, reader, writer))
        }
        Err(e) => {
            close_fd(msg_read);
            close_fd(cmd_write);
            Err(e)
        }
    }
}

fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Outcome of one task as reported by the worker
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Complete(Vec<u8>),
    Failed {
        kind: FailureKind,
        index: Option<u64>,
        value: Option<u64>,
        message: String,
    },
}

enum Backend {
    Process(Child),
    Thread {
        join: Option<JoinHandle<()>>,
        socket: UnixStream,
    },
}

/// One live worker and its command/message channel
pub struct WorkerHandle {
    backend: Backend,
    reader: FrameReader<Box<dyn Read + Send>>,
    writer: FrameWriter<Box<dyn Write + Send>>,
    capabilities: Option<WorkerCapabilities>,
}

impl WorkerHandle {
    /// Spawn a worker process using fd 3/4 for IPC.
    fn spawn_process(binary: &std::path::Path) -> Result<Self, PoolError> {
        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let (child, reader_file, writer_file) = spawn_with_channel(command)?;
        debug!(pid = child.id(), program = %binary.display(), "worker process spawned");

        let mut handle = Self {
            backend: Backend::Process(child),
            reader: FrameReader::new(Box::new(reader_file) as Box<dyn Read + Send>),
            writer: FrameWriter::new(Box::new(writer_file) as Box<dyn Write + Send>),
            capabilities: None,
        };

        handle.wait_for_hello()?;
        Ok(handle)
    }

    /// Run the worker loop on a thread, connected by a Unix socket pair.
    fn spawn_thread(index: usize, registry: Arc<ComputationRegistry>) -> Result<Self, PoolError> {
        let (ours, theirs) = UnixStream::pair()?;
        let their_reader = theirs.try_clone()?;

        let join = thread::Builder::new()
            .name(format!("pool-worker-{index}"))
            .spawn(move || {
                let mut worker = WorkerMain::with_transport(
                    Box::new(their_reader),
                    Box::new(theirs),
                    registry,
                );
                if let Err(e) = worker.run() {
                    debug!(error = %e, "thread worker exited with error");
                }
            })?;

        let our_reader = ours.try_clone()?;
        let our_writer = ours.try_clone()?;

        let mut handle = Self {
            backend: Backend::Thread {
                join: Some(join),
                socket: ours,
            },
            reader: FrameReader::new(Box::new(our_reader) as Box<dyn Read + Send>),
            writer: FrameWriter::new(Box::new(our_writer) as Box<dyn Write + Send>),
            capabilities: None,
        };

        handle.wait_for_hello()?;
        Ok(handle)
    }

    /// Wait for Hello message from worker and validate protocol version
    fn wait_for_hello(&mut self) -> Result<(), PoolError> {
        let msg: WorkerMessage = self.reader.read()?;

        match msg {
            WorkerMessage::Hello(caps) => {
                if caps.protocol_version != poolbench_ipc::PROTOCOL_VERSION {
                    return Err(PoolError::ProtocolError {
                        expected: format!("protocol version {}", poolbench_ipc::PROTOCOL_VERSION),
                        got: format!("protocol version {}", caps.protocol_version),
                    });
                }
                debug!(pid = caps.pid, computations = ?caps.computations, "worker ready");
                self.capabilities = Some(caps);
                Ok(())
            }
            other => Err(PoolError::ProtocolError {
                expected: "Hello".to_string(),
                got: format!("{:?}", other),
            }),
        }
    }

    /// Worker capabilities from the handshake
    pub fn capabilities(&self) -> Option<&WorkerCapabilities> {
        self.capabilities.as_ref()
    }

    /// Send one task and block until the worker answers it
    pub(crate) fn execute(&mut self, request: TaskRequest) -> Result<TaskOutcome, PoolError> {
        let task_id = request.task_id;
        self.writer.write(&PoolCommand::Run(request))?;

        let msg: WorkerMessage = match self.reader.read() {
            Ok(msg) => msg,
            Err(FrameError::EndOfStream) => {
                return Err(PoolError::WorkerCrashed(
                    "Worker closed connection unexpectedly".to_string(),
                ));
            }
            Err(e) => {
                if !self.is_alive() {
                    return Err(PoolError::WorkerCrashed(
                        "Worker crashed during read".to_string(),
                    ));
                }
                return Err(PoolError::IpcError(e.to_string()));
            }
        };

        match msg {
            WorkerMessage::Complete {
                task_id: id,
                payload,
            } if id == task_id => Ok(TaskOutcome::Complete(payload)),
            WorkerMessage::Failure {
                task_id: id,
                kind,
                index,
                value,
                message,
            } if id == task_id => Ok(TaskOutcome::Failed {
                kind,
                index,
                value,
                message,
            }),
            other => Err(PoolError::ProtocolError {
                expected: format!("Complete/Failure for task {task_id}"),
                got: format!("{:?}", other),
            }),
        }
    }

    /// Check if the worker is still running
    pub fn is_alive(&mut self) -> bool {
        match &mut self.backend {
            Backend::Process(child) => matches!(child.try_wait(), Ok(None)),
            Backend::Thread { join, .. } => join.as_ref().is_some_and(|j| !j.is_finished()),
        }
    }

    /// Ask the worker to exit and wait for it
    pub fn shutdown(mut self) {
        let _ = self.writer.write(&PoolCommand::Shutdown);
        match &mut self.backend {
            Backend::Process(child) => {
                let _ = child.wait();
            }
            Backend::Thread { join, socket } => {
                let _ = socket.shutdown(std::net::Shutdown::Both);
                if let Some(join) = join.take() {
                    let _ = join.join();
                }
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        match &mut self.backend {
            Backend::Process(child) => {
                if matches!(child.try_wait(), Ok(None)) {
                    // Graceful: SIGTERM first, brief wait, then SIGKILL
                    let _ = send_sigterm(child.id());
                    std::thread::sleep(Duration::from_millis(50));
                    if matches!(child.try_wait(), Ok(None)) {
                        let _ = child.kill();
                    }
                    let _ = child.wait();
                }
            }
            Backend::Thread { join, socket } => {
                // The worker loop ends on EOF.
                let _ = socket.shutdown(std::net::Shutdown::Both);
                if let Some(join) = join.take() {
                    let _ = join.join();
                }
            }
        }
    }
}

type Reply = Result<TaskOutcome, PoolError>;

struct Job {
    request: TaskRequest,
    reply: SyncSender<Reply>,
}

fn drive(mut worker: WorkerHandle, queue: Arc<Mutex<Receiver<Job>>>, terminating: Arc<AtomicBool>) {
    let mut executed = 0u64;
    loop {
        let next = match queue.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };
        let Ok(job) = next else {
            break;
        };
        if terminating.load(Ordering::Acquire) {
            // Dropping the reply sender resolves the handle as lost.
            continue;
        }

        let outcome = worker.execute(job.request);
        let lost = matches!(
            outcome,
            Err(PoolError::WorkerCrashed(_)) | Err(PoolError::IpcError(_))
        );
        let _ = job.reply.send(outcome);
        executed += 1;
        if lost {
            warn!("worker lost, driver stopping");
            break;
        }
    }
    debug!(executed, "pool driver finished");
    worker.shutdown();
}

/// A not-yet-completed task; resolves to one result per submitted input
#[must_use = "a pending result does nothing until collected with `get`"]
pub struct PendingResult<T> {
    receiver: Receiver<Reply>,
    computation: &'static str,
    expected: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Output> PendingResult<T> {
    /// Block until the task finishes and decode its results
    pub fn get(self) -> Result<Vec<T>, DispatchError> {
        let outcome = self.receiver.recv().map_err(|_| {
            DispatchError::WorkerLost(format!(
                "{} task was dropped before it completed",
                self.computation
            ))
        })??;

        match outcome {
            TaskOutcome::Complete(payload) => {
                let values = T::decode(&payload).map_err(|e| DispatchError::Decode(e.to_string()))?;
                if values.len() != self.expected {
                    return Err(DispatchError::LengthMismatch {
                        expected: self.expected,
                        got: values.len(),
                    });
                }
                Ok(values)
            }
            TaskOutcome::Failed {
                kind,
                index: Some(index),
                value: Some(value),
                message,
            } => Err(DispatchError::Computation {
                computation: self.computation.to_string(),
                index: index as usize,
                value,
                kind,
                message,
            }),
            TaskOutcome::Failed { kind, message, .. } => Err(DispatchError::Remote {
                computation: self.computation.to_string(),
                kind,
                message,
            }),
        }
    }
}

/// A pending single-item task
#[must_use = "a pending result does nothing until collected with `get`"]
pub struct PendingItem<T>(PendingResult<T>);

impl<T: Output> PendingItem<T> {
    /// Block until the item finishes
    pub fn get(self) -> Result<T, DispatchError> {
        let mut values = self.0.get()?;
        let got = values.len();
        match values.pop() {
            Some(value) if got == 1 => Ok(value),
            _ => Err(DispatchError::LengthMismatch { expected: 1, got }),
        }
    }
}

/// Fixed-size pool of worker processes
pub struct ProcessPool {
    queue: Option<Sender<Job>>,
    drivers: Vec<JoinHandle<()>>,
    terminating: Arc<AtomicBool>,
    next_task: AtomicU64,
    progress: Progress,
}

impl ProcessPool {
    /// Start `workers` workers and wait for every handshake.
    ///
    /// If any worker fails to start, those already running are torn down.
    pub fn start(workers: usize, launcher: &WorkerLauncher) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            handles.push(launcher.launch(index)?);
        }

        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let terminating = Arc::new(AtomicBool::new(false));

        let mut drivers = Vec::with_capacity(workers);
        for (index, worker) in handles.into_iter().enumerate() {
            let queue = Arc::clone(&rx);
            let flag = Arc::clone(&terminating);
            let spawned = thread::Builder::new()
                .name(format!("pool-driver-{index}"))
                .spawn(move || drive(worker, queue, flag));
            match spawned {
                Ok(handle) => drivers.push(handle),
                Err(e) => {
                    terminating.store(true, Ordering::Release);
                    drop(tx);
                    for driver in drivers {
                        let _ = driver.join();
                    }
                    return Err(PoolError::DriverFailed(e));
                }
            }
        }

        debug!(workers, "process pool started");
        Ok(Self {
            queue: Some(tx),
            drivers,
            terminating,
            next_task: AtomicU64::new(0),
            progress: Progress::hidden(),
        })
    }

    /// Report progress from [`map`](Self::map)
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        self.drivers.len()
    }

    fn submit<T>(&self, computation: &Computation<T>, offset: usize, values: Vec<u64>) -> PendingResult<T> {
        let (reply, receiver) = mpsc::sync_channel(1);
        let expected = values.len();
        let request = TaskRequest {
            task_id: self.next_task.fetch_add(1, Ordering::Relaxed),
            computation: computation.name().to_string(),
            offset: offset as u64,
            values,
        };

        if let Some(queue) = &self.queue {
            // A closed queue drops the job, which resolves the handle as lost.
            let _ = queue.send(Job { request, reply });
        }

        PendingResult {
            receiver,
            computation: computation.name(),
            expected,
            _marker: PhantomData,
        }
    }

    /// Submit one input without waiting. `index` is its position in the
    /// input sequence, used for failure attribution.
    pub fn apply_async<T: Output>(
        &self,
        computation: &Computation<T>,
        index: usize,
        value: u64,
    ) -> PendingItem<T> {
        PendingItem(self.submit(computation, index, vec![value]))
    }

    /// Submit one input and block until it completes
    pub fn apply<T: Output>(
        &self,
        computation: &Computation<T>,
        index: usize,
        value: u64,
    ) -> Result<T, DispatchError> {
        self.apply_async(computation, index, value).get()
    }

    /// Submit a contiguous chunk starting at input position `offset`
    pub fn apply_chunk_async<T: Output>(
        &self,
        computation: &Computation<T>,
        offset: usize,
        chunk: &[u64],
    ) -> PendingResult<T> {
        self.submit(computation, offset, chunk.to_vec())
    }

    /// Apply `computation` to every input, splitting the work into tasks of
    /// `chunk_size` inputs. Results are in input order.
    pub fn map<T: Output>(
        &self,
        computation: &Computation<T>,
        inputs: &[u64],
        chunk_size: usize,
    ) -> Result<Vec<T>, DispatchError> {
        let chunk_size = chunk_size.max(1);
        let pending: Vec<PendingResult<T>> = self
            .progress
            .wrap("map", inputs.chunks(chunk_size))
            .enumerate()
            .map(|(position, chunk)| {
                self.apply_chunk_async(computation, position * chunk_size, chunk)
            })
            .collect();

        let mut results = Vec::with_capacity(inputs.len());
        for handle in pending {
            results.extend(handle.get()?);
        }
        Ok(results)
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        self.terminating.store(true, Ordering::Release);
        self.queue.take();
        for driver in self.drivers.drain(..) {
            let _ = driver.join();
        }
        debug!("process pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::ComputeError;
    use crate::payloads::{FIBONACCI, PRIME_CHECKER};

    fn square(n: u64) -> Result<u64, ComputeError> {
        Ok(n * n)
    }

    const SQUARE: Computation<u64> = Computation::new("square", square);

    fn thread_launcher() -> WorkerLauncher {
        WorkerLauncher::threads(Arc::new(ComputationRegistry::builtin().with(SQUARE)))
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = ProcessPool::start(0, &thread_launcher());
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_missing_program_is_startup_failure() {
        let launcher = WorkerLauncher::program("/nonexistent/poolbench-worker");
        let result = ProcessPool::start(2, &launcher);
        assert!(matches!(result, Err(PoolError::SpawnFailed(_))));
    }

    #[test]
    fn test_apply_blocks_for_each_item() {
        let pool = ProcessPool::start(2, &thread_launcher()).unwrap();
        assert_eq!(pool.workers(), 2);
        assert_eq!(pool.apply(&SQUARE, 0, 12).unwrap(), 144);
        assert!(pool.apply(&PRIME_CHECKER, 1, 13).unwrap());
    }

    #[test]
    fn test_async_handles_resolve_in_submission_order() {
        let pool = ProcessPool::start(3, &thread_launcher()).unwrap();
        let handles: Vec<_> = (0..50u64)
            .map(|n| pool.apply_async(&SQUARE, n as usize, n))
            .collect();
        let results: Vec<u64> = handles.into_iter().map(|h| h.get().unwrap()).collect();
        let expected: Vec<u64> = (0..50u64).map(|n| n * n).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_map_matches_sequential() {
        let pool = ProcessPool::start(4, &thread_launcher()).unwrap();
        let inputs: Vec<u64> = (1..=997).collect();
        let results = pool.map(&SQUARE, &inputs, 10).unwrap();
        assert_eq!(results.len(), inputs.len());
        assert!(results.iter().zip(&inputs).all(|(r, n)| *r == n * n));
    }

    #[test]
    fn test_chunk_failure_has_absolute_index() {
        let pool = ProcessPool::start(2, &thread_launcher()).unwrap();
        let chunk = [90u64, 91, 92, 93, 94, 95];
        let err = pool.apply_chunk_async(&FIBONACCI, 500, &chunk).get().unwrap_err();
        match err {
            DispatchError::Computation {
                computation,
                index,
                value,
                kind,
                ..
            } => {
                assert_eq!(computation, "fibonacci");
                assert_eq!(index, 504);
                assert_eq!(value, 94);
                assert_eq!(kind, FailureKind::Computation);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unregistered_computation_is_remote_error() {
        let launcher = WorkerLauncher::threads(Arc::new(ComputationRegistry::builtin()));
        let pool = ProcessPool::start(1, &launcher).unwrap();
        let err = pool.apply(&SQUARE, 0, 3).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Remote {
                kind: FailureKind::UnknownComputation,
                ..
            }
        ));
    }

    #[test]
    fn test_pool_survives_failed_task() {
        let pool = ProcessPool::start(1, &thread_launcher()).unwrap();
        assert!(pool.apply(&FIBONACCI, 0, 100).is_err());
        assert_eq!(pool.apply(&FIBONACCI, 1, 10).unwrap(), 55);
    }

    #[test]
    fn test_drop_discards_queued_work() {
        let pool = ProcessPool::start(1, &thread_launcher()).unwrap();
        let handles: Vec<_> = (0..200u64)
            .map(|n| pool.apply_async(&SQUARE, n as usize, n))
            .collect();
        drop(pool);

        // Every handle resolves: completed before teardown, or lost.
        for (n, handle) in handles.into_iter().enumerate() {
            match handle.get() {
                Ok(value) => assert_eq!(value, (n * n) as u64),
                Err(e) => assert!(matches!(e, DispatchError::WorkerLost(_))),
            }
        }
    }

    #[test]
    fn test_thread_worker_handshake() {
        let mut worker = thread_launcher().launch(0).unwrap();
        let caps = worker.capabilities().unwrap();
        assert_eq!(caps.protocol_version, poolbench_ipc::PROTOCOL_VERSION);
        assert!(caps.computations.iter().any(|c| c == "square"));
        assert!(worker.is_alive());
        worker.shutdown();
    }

    #[test]
    fn test_pipe_ends_stay_clear_of_worker_slots() {
        let pipes: Vec<(RawFd, RawFd)> = (0..4).map(|_| create_pipe().unwrap()).collect();
        for &(read, write) in &pipes {
            assert!(read >= FIRST_FREE_FD, "read end {read}");
            assert!(write >= FIRST_FREE_FD, "write end {write}");
            let flags = unsafe { libc::fcntl(read, libc::F_GETFD) };
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
        for (read, write) in pipes {
            close_fd(read);
            close_fd(write);
        }
    }

    #[test]
    fn test_child_sees_channel_on_fds_3_and_4() {
        let mut command = Command::new("/bin/sh");
        command
            .args(["-c", "read line <&3; echo \"got $line\" >&4"])
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        let (mut child, mut reader, mut writer) = spawn_with_channel(command).unwrap();

        writer.write_all(b"hello\n").unwrap();
        drop(writer);
        let mut reply = String::new();
        reader.read_to_string(&mut reply).unwrap();

        assert_eq!(reply, "got hello\n");
        assert!(child.wait().unwrap().success());
    }
}
