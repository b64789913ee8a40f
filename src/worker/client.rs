//! Async client for communicating with a driver worker process.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::error::{WorkerError, WorkerResult};
use super::protocol::{ErrorInfo, RequestEnvelope, ResponseEnvelope};

/// Default timeout for requests (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<WorkerResult<ResponseEnvelope>>>>>;

/// Async client for an external driver worker.
///
/// The client spawns the worker as a child process and communicates via
/// NDJSON (newline-delimited JSON) over stdin/stdout. Each request has a
/// unique ID for correlation with responses, so requests from several
/// connections can share one worker.
///
/// Once the worker's output closes or a write to it fails, the client is
/// dead for good: [`is_alive`](Self::is_alive) turns false and every later
/// request fails with [`WorkerError::WorkerExited`].
pub struct WorkerClient {
    /// Writer for sending requests to worker stdin.
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,

    /// Map of pending request IDs to response channels.
    pending: PendingMap,

    /// Set before pending requests are failed, never cleared.
    exited: Arc<AtomicBool>,

    /// Handle to the worker child process.
    _child: Child,

    /// Handle to the background reader task.
    reader_task: tokio::task::JoinHandle<()>,

    /// Request timeout duration.
    timeout: Duration,
}

impl WorkerClient {
    /// Spawn a new worker process with the default timeout.
    pub async fn spawn<P: AsRef<Path>>(worker_path: P) -> WorkerResult<Self> {
        Self::spawn_with_timeout(worker_path, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await
    }

    /// Spawn a new worker process with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::SpawnFailed`] if the binary cannot be started
    /// or its stdio cannot be captured.
    pub async fn spawn_with_timeout<P: AsRef<Path>>(
        worker_path: P,
        timeout: Duration,
    ) -> WorkerResult<Self> {
        let worker_path = worker_path.as_ref();
        let mut child = Command::new(worker_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or_else(|| stdio_missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| stdio_missing("stdout"))?;

        debug!(path = %worker_path.display(), "spawned driver worker");

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let exited = Arc::new(AtomicBool::new(false));
        let reader_task = Self::spawn_reader_task(stdout, pending.clone(), exited.clone());

        Ok(Self {
            stdin: Arc::new(Mutex::new(BufWriter::new(stdin))),
            pending,
            exited,
            _child: child,
            reader_task,
            timeout,
        })
    }

    /// Spawn the background task that reads responses from the worker.
    ///
    /// When the output closes, every request still waiting gets
    /// [`WorkerError::WorkerExited`], or [`WorkerError::ReadFailed`] if the
    /// stream broke with an I/O error.
    fn spawn_reader_task(
        stdout: ChildStdout,
        pending: PendingMap,
        exited: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            let failure = loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break None,
                    Ok(_) => match serde_json::from_str::<ResponseEnvelope>(&line) {
                        Ok(resp) => {
                            let mut pending = pending.lock().await;
                            if let Some(tx) = pending.remove(&resp.id) {
                                let _ = tx.send(Ok(resp));
                            }
                        }
                        Err(e) => warn!("driver worker: failed to parse response: {}", e),
                    },
                    Err(e) => {
                        warn!("driver worker: read error: {}", e);
                        break Some(e);
                    }
                }
            };

            // Mark dead before draining so no request can slip in unanswered.
            exited.store(true, Ordering::SeqCst);
            debug!("driver worker output closed");

            let mut pending = pending.lock().await;
            for (_, tx) in pending.drain() {
                let error = match &failure {
                    Some(e) => WorkerError::ReadFailed(io::Error::new(e.kind(), e.to_string())),
                    None => WorkerError::WorkerExited,
                };
                let _ = tx.send(Err(error));
            }
        })
    }

    /// Send a request to the worker and wait for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The worker has already exited
    /// - Serialization fails
    /// - Writing to the worker fails (the client is then marked dead)
    /// - The request times out
    /// - The worker returns an error response
    /// - Deserialization of the response fails
    pub async fn request<P, R>(&self, method: &str, params: P) -> WorkerResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if !self.is_alive() {
            return Err(WorkerError::WorkerExited);
        }

        let id = uuid::Uuid::new_v4().to_string();

        let request = RequestEnvelope {
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(WorkerError::SerializeFailed)?,
        };
        let line = serde_json::to_string(&request).map_err(WorkerError::SerializeFailed)? + "\n";

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // The reader may have drained the map just before this insert.
            if self.exited.load(Ordering::SeqCst) {
                return Err(WorkerError::WorkerExited);
            }
            pending.insert(id.clone(), tx);
        }

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&id);
            self.exited.store(true, Ordering::SeqCst);
            warn!(method, "driver worker: write failed: {}", e);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                // Drop the pending entry so a late reply is discarded.
                self.pending.lock().await.remove(&id);
                return Err(WorkerError::Timeout(self.timeout.as_secs()));
            }
        };

        if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            serde_json::from_value(result).map_err(WorkerError::DeserializeFailed)
        } else {
            let error = response.error.unwrap_or_else(|| ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "Unknown error".to_string(),
            });
            Err(Self::classify_error(&error.code, &error.message))
        }
    }

    async fn write_line(&self, line: &str) -> WorkerResult<()> {
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(WorkerError::WriteFailed)?;
        stdin.flush().await.map_err(WorkerError::WriteFailed)
    }

    /// Classify a worker error into a more specific error type.
    fn classify_error(code: &str, message: &str) -> WorkerError {
        match code {
            "DRIVER_NOT_FOUND" => WorkerError::DriverNotFound(message.to_string()),
            "CONNECTION_FAILED" => WorkerError::ConnectionFailed(message.to_string()),
            "INVALID_REQUEST" => WorkerError::InvalidRequest(message.to_string()),
            "METHOD_NOT_FOUND" => WorkerError::MethodNotFound(message.to_string()),
            _ => WorkerError::remote(code, message),
        }
    }

    /// Whether the worker can still answer requests.
    pub fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst) && !self.reader_task.is_finished()
    }

    /// Get the current request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn stdio_missing(stream: &str) -> WorkerError {
    WorkerError::SpawnFailed(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("worker {stream} not captured"),
    ))
}
