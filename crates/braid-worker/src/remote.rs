//! Line-delimited JSON worker protocol.
//!
//! The scheduler side writes one [`JobMessage`] per line to the worker's
//! stdin and reads one [`JobResult`] per line from its stdout. Anything the
//! worker prints on stderr is forwarded to the log. Closing stdin tells the
//! worker to finish and exit.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use braid_pipeline::{Connection, PipelineError, Sink, Source, Worker};
use braid_workflow::{Job, RuntimeKey};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::result::{JobMessage, JobResult, JobStatus};

/// Serve jobs read from `reader`, writing results to `writer`, until the
/// reader reaches end-of-file. Jobs run one at a time in arrival order.
///
/// Returns the number of jobs served.
pub async fn serve<R, W, K>(reader: R, mut writer: W, worker: &K) -> Result<usize, WorkerError>
where
  R: AsyncBufRead + Unpin,
  W: AsyncWrite + Unpin,
  K: Worker<JobMessage, JobResult>,
{
  let mut lines = reader.lines();
  let mut served = 0;

  while let Some(line) = lines.next_line().await? {
    if line.trim().is_empty() {
      continue;
    }
    let message: JobMessage = serde_json::from_str(&line)?;
    debug!(runtime_key = %message.key, node_id = %message.job.node_id, "job_received");

    let result = worker.work(message).await;
    write_line(&mut writer, &result).await?;
    served += 1;
  }

  writer.flush().await?;
  info!(served, "worker_finished");
  Ok(served)
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> Result<(), WorkerError>
where
  W: AsyncWrite + Unpin,
  T: serde::Serialize,
{
  let mut line = serde_json::to_vec(value)?;
  line.push(b'\n');
  writer.write_all(&line).await?;
  writer.flush().await?;
  Ok(())
}

/// Launches a worker process and connects to it.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
  program: String,
  args: Vec<String>,
  init: Option<Job>,
}

impl ProcessWorker {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      init: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  /// Run `job` on the worker before handing out the connection. The
  /// connection is only returned if it succeeds.
  pub fn with_init(mut self, job: Job) -> Self {
    self.init = Some(job);
    self
  }

  /// Start the process.
  ///
  /// Must be called from within a tokio runtime.
  pub async fn spawn(self) -> Result<(Connection<JobMessage, JobResult>, ProcessHandle), WorkerError> {
    let mut child = Command::new(&self.program)
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| WorkerError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    let stdin = child
      .stdin
      .take()
      .ok_or(WorkerError::MissingStream { stream: "stdin" })?;
    let stdout = child
      .stdout
      .take()
      .ok_or(WorkerError::MissingStream { stream: "stdout" })?;
    let stderr = child
      .stderr
      .take()
      .ok_or(WorkerError::MissingStream { stream: "stderr" })?;

    let worker = format!("{}:{}", self.program, child.id().unwrap_or_default());
    info!(worker = %worker, "worker_process_started");

    let stderr_task = {
      let worker = worker.clone();
      tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
          info!(worker = %worker, line = %line, "worker_stderr");
        }
      })
    };

    let mut sink = ProcessSink { stdin: Some(stdin) };
    let mut source = ProcessSource {
      lines: BufReader::new(stdout).lines(),
      worker,
    };

    if let Some(job) = self.init {
      let key = RuntimeKey::new();
      sink
        .send(JobMessage::new(key, job))
        .await
        .map_err(|e| WorkerError::InitFailed {
          message: e.to_string(),
        })?;

      match source.next().await {
        Some(result) if result.key == key && result.status == JobStatus::Ok => {
          debug!(worker = %source.worker, "worker_initialised");
        }
        Some(result) => {
          return Err(WorkerError::InitFailed {
            message: result
              .error
              .unwrap_or_else(|| "unexpected reply to init job".to_string()),
          });
        }
        None => {
          return Err(WorkerError::InitFailed {
            message: "worker exited before answering".to_string(),
          });
        }
      }
    }

    Ok((
      Connection::new(sink, source),
      ProcessHandle { child, stderr_task },
    ))
  }
}

/// Owns a running worker process.
pub struct ProcessHandle {
  child: Child,
  stderr_task: JoinHandle<()>,
}

impl ProcessHandle {
  pub fn id(&self) -> Option<u32> {
    self.child.id()
  }

  /// Wait for the process to exit. Close the connection's job sink first.
  pub async fn wait(mut self) -> Result<ExitStatus, WorkerError> {
    let status = self.child.wait().await?;
    if let Err(e) = self.stderr_task.await {
      warn!(error = %e, "stderr forwarding task failed");
    }
    Ok(status)
  }

  pub async fn kill(mut self) -> Result<(), WorkerError> {
    self.child.kill().await?;
    self.stderr_task.abort();
    Ok(())
  }
}

/// Writes jobs to the worker's stdin.
struct ProcessSink {
  stdin: Option<ChildStdin>,
}

#[async_trait]
impl Sink<JobMessage> for ProcessSink {
  async fn send(&mut self, item: JobMessage) -> Result<(), PipelineError> {
    let stdin = self.stdin.as_mut().ok_or(PipelineError::Shutdown)?;
    write_line(stdin, &item).await.map_err(|e| match e {
      WorkerError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe => PipelineError::Closed,
      e => PipelineError::WorkerFailed {
        message: e.to_string(),
      },
    })
  }

  async fn close(&mut self) {
    // Dropping stdin sends end-of-file.
    if let Some(mut stdin) = self.stdin.take() {
      if let Err(e) = stdin.shutdown().await {
        debug!(error = %e, "worker stdin already closed");
      }
    }
  }
}

/// Reads results from the worker's stdout.
struct ProcessSource {
  lines: Lines<BufReader<ChildStdout>>,
  worker: String,
}

#[async_trait]
impl Source<JobResult> for ProcessSource {
  async fn next(&mut self) -> Option<JobResult> {
    loop {
      let line = match self.lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => return None,
        Err(e) => {
          error!(worker = %self.worker, error = %e, "worker stdout failed");
          return None;
        }
      };
      if line.trim().is_empty() {
        continue;
      }
      match serde_json::from_str(&line) {
        Ok(result) => return Some(result),
        Err(e) => warn!(worker = %self.worker, error = %e, line = %line, "malformed worker result"),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::local::LocalWorker;
  use braid_workflow::{Argument, Hints};
  use serde_json::json;
  use std::collections::BTreeMap;

  fn add(x: i64, y: i64) -> Job {
    Job {
      node_id: "add".to_string(),
      function: "add".to_string(),
      arguments: BTreeMap::from([
        ("x".to_string(), Argument::Value(json!(x))),
        ("y".to_string(), Argument::Value(json!(y))),
      ]),
      hints: Hints::default(),
    }
  }

  #[tokio::test]
  async fn test_serve_answers_each_line() {
    let k1 = RuntimeKey::new();
    let k2 = RuntimeKey::new();
    let mut input = Vec::new();
    for (key, job) in [(k1, add(1, 1)), (k2, add(2, 3))] {
      input.extend(serde_json::to_vec(&JobMessage::new(key, job)).unwrap());
      input.extend(b"\n\n");
    }

    let mut output = Vec::new();
    let served = serve(&input[..], &mut output, &LocalWorker::builtin())
      .await
      .unwrap();
    assert_eq!(served, 2);

    let results = String::from_utf8(output)
      .unwrap()
      .lines()
      .map(|line| serde_json::from_str::<JobResult>(line).unwrap())
      .collect::<Vec<_>>();
    assert_eq!(results, vec![JobResult::ok(k1, json!(2)), JobResult::ok(k2, json!(5))]);
  }

  #[tokio::test]
  async fn test_serve_rejects_malformed_line() {
    let mut output = Vec::new();
    let err = serve(&b"not json\n"[..], &mut output, &LocalWorker::builtin())
      .await
      .unwrap_err();
    assert!(matches!(err, WorkerError::Protocol { .. }));
  }

  #[tokio::test]
  async fn test_spawn_missing_program() {
    let err = ProcessWorker::new("/nonexistent/braid-worker")
      .spawn()
      .await
      .err()
      .unwrap();
    assert!(matches!(err, WorkerError::Spawn { .. }));
  }
}
