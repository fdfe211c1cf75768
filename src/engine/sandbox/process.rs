use std::{io, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    sync::oneshot,
    task::JoinHandle,
};

use crate::engine::sandbox::{
    CapturedStream, ProcessRunner, RawOutcome, RuntimeDescriptor, Workspace,
};

const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs one interpreter invocation inside a workspace under a wall-clock deadline.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    output_limit: usize,
    drain_grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(output_limit: usize) -> Self {
        Self {
            output_limit,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub async fn run(&self, descriptor: &RuntimeDescriptor, workspace: &Workspace) -> RawOutcome {
        let mut cmd = Command::new(&descriptor.program);
        cmd.args(&descriptor.args);
        // A single argv element: the path is never split or shell-expanded.
        cmd.arg(workspace.source_path());
        cmd.current_dir(workspace.path());
        cmd.envs(descriptor.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(program = %descriptor.program, error = %err, "failed to launch runtime");
                return RawOutcome::launch_failed(
                    Some(spawn_exit_code(&err)),
                    format!("failed to start {}: {err}", descriptor.program),
                );
            }
        };
        let pid = child.id();

        let limit = self.output_limit;
        let stdout_reader = child.stdout.take().map(|out| StreamReader::spawn(out, limit));
        let stderr_reader = child.stderr.take().map(|err| StreamReader::spawn(err, limit));

        let wait_result = tokio::time::timeout(descriptor.timeout, child.wait()).await;

        match wait_result {
            Ok(Ok(status)) => {
                // Descendants left in the group must not outlive the run.
                kill_process_group(pid);
                let stdout = StreamReader::finish(stdout_reader, self.drain_grace).await;
                let stderr = StreamReader::finish(stderr_reader, self.drain_grace).await;

                match status.code() {
                    Some(exit_code) => RawOutcome::Completed {
                        exit_code,
                        stdout,
                        stderr,
                    },
                    None => RawOutcome::LaunchFailed {
                        exit_code: None,
                        message: termination_message(&status),
                        stdout,
                        stderr,
                    },
                }
            }
            Ok(Err(err)) => {
                kill_process_group(pid);
                let _ = child.start_kill();
                StreamReader::abort(stdout_reader);
                StreamReader::abort(stderr_reader);
                RawOutcome::launch_failed(None, format!("failed waiting for process: {err}"))
            }
            Err(_) => {
                tracing::debug!(pid = ?pid, timeout_ms = descriptor.timeout.as_millis() as u64, "deadline elapsed, killing process group");
                kill_process_group(pid);
                let _ = child.start_kill();
                if let Err(err) = child.wait().await {
                    tracing::warn!(pid = ?pid, error = %err, "failed to reap timed out process");
                }
                StreamReader::abort(stdout_reader);
                StreamReader::abort(stderr_reader);
                RawOutcome::TimedOut {
                    timeout: descriptor.timeout,
                }
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for ProcessSupervisor {
    async fn run(&self, descriptor: &RuntimeDescriptor, workspace: &Workspace) -> RawOutcome {
        ProcessSupervisor::run(self, descriptor, workspace).await
    }
}

/// Background reader for one pipe. It can be told to stop and hand back what it has.
struct StreamReader {
    task: JoinHandle<CapturedStream>,
    stop: Option<oneshot::Sender<()>>,
}

impl StreamReader {
    fn spawn<R>(reader: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(read_limited(reader, limit, stopped));
        Self {
            task,
            stop: Some(stop),
        }
    }

    /// Waits up to `grace` for EOF. A pipe held open by an escaped descendant
    /// keeps whatever was read before the grace ran out.
    async fn finish(reader: Option<Self>, grace: Duration) -> CapturedStream {
        let Some(mut reader) = reader else {
            return CapturedStream::default();
        };
        match tokio::time::timeout(grace, &mut reader.task).await {
            Ok(joined) => joined_stream(joined),
            Err(_) => {
                tracing::warn!("output pipe still open after process exit, keeping partial stream");
                if let Some(stop) = reader.stop.take() {
                    let _ = stop.send(());
                }
                joined_stream(reader.task.await)
            }
        }
    }

    fn abort(reader: Option<Self>) {
        if let Some(reader) = reader {
            reader.task.abort();
        }
    }
}

fn joined_stream(joined: Result<CapturedStream, tokio::task::JoinError>) -> CapturedStream {
    joined.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "output reader failed");
        CapturedStream::default()
    })
}

/// Shell conventions: 127 when the program is missing, 126 when it cannot be executed.
fn spawn_exit_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => 127,
        io::ErrorKind::PermissionDenied => 126,
        _ => 1,
    }
}

#[cfg(unix)]
fn termination_message(status: &std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signal) => format!("Process terminated by signal {signal}"),
        None => "Process terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn termination_message(_status: &std::process::ExitStatus) -> String {
    "Process terminated abnormally".to_string()
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid = pid, error = %err, "failed to signal process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn read_limited<R>(
    mut reader: R,
    limit: usize,
    mut stop: oneshot::Receiver<()>,
) -> CapturedStream
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::with_capacity(limit.min(8192));
    let mut total = 0u64;
    let mut chunk = [0u8; 4096];
    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    total += n as u64;
                    if out.len() < limit {
                        let remaining = limit - out.len();
                        out.extend_from_slice(&chunk[..remaining.min(n)]);
                    }
                }
            },
            _ = &mut stop => break,
        }
    }
    CapturedStream {
        bytes: out,
        total_bytes: total,
    }
}
