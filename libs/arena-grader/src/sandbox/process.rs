use super::{Sandbox, SandboxError, Workspace};
use arena_common::config::{Config, BINARY_PLACEHOLDER, SOURCE_PLACEHOLDER};
use arena_common::types::{ExecutionResult, FailureKind};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error};

const BINARY_FILE_NAME: &str = "main";
const READ_CHUNK: usize = 8192;

/// Local-process sandbox
///
/// **Execution Rules:**
/// 1. Fresh workspace per invocation (random name under `workspace_root`)
/// 2. Compile with `compile_command`, bounded by the compile budget
/// 3. Run the artifact in its own process group, input piped and closed
/// 4. On run timeout the whole process group is killed and reaped
/// 5. stdout kept up to `max_output_bytes`, the rest drained and dropped
/// 6. Workspace removed whatever the outcome
///
/// A shared semaphore caps simultaneous invocations across all callers.
pub struct ProcessSandbox {
    compile_command: Vec<String>,
    source_file_name: String,
    workspace_root: PathBuf,
    compile_timeout: Duration,
    run_timeout: Duration,
    max_output_bytes: usize,
    permits: Arc<Semaphore>,
}

impl ProcessSandbox {
    pub fn new(config: &Config) -> Self {
        Self {
            compile_command: config.compile_command.clone(),
            source_file_name: config.source_file_name.clone(),
            workspace_root: config.workspace_root.clone(),
            compile_timeout: config.compile_timeout(),
            run_timeout: config.run_timeout(),
            max_output_bytes: config.max_output_bytes,
            permits: Arc::new(Semaphore::new(config.max_concurrent_executions.max(1))),
        }
    }

    async fn run_invocation(
        &self,
        workspace: &Workspace,
        source_code: &str,
        stdin: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        let source = workspace.file(&self.source_file_name);
        let binary = workspace.file(BINARY_FILE_NAME);

        tokio::fs::write(&source, source_code)
            .await
            .map_err(SandboxError::WriteSource)?;

        if let Some(failure) = self.compile(workspace.path(), &source, &binary).await? {
            return Ok(failure);
        }

        self.run(workspace.path(), &binary, stdin).await
    }

    /// Returns `Some(result)` when compilation failed and the run phase must be skipped
    async fn compile(
        &self,
        dir: &Path,
        source: &Path,
        binary: &Path,
    ) -> Result<Option<ExecutionResult>, SandboxError> {
        let source = source.to_string_lossy();
        let binary = binary.to_string_lossy();
        let mut args = self.compile_command.iter().map(|arg| {
            arg.replace(SOURCE_PLACEHOLDER, &source)
                .replace(BINARY_PLACEHOLDER, &binary)
        });
        let program = args.next().ok_or(SandboxError::EmptyCompileCommand)?;

        let mut command = Command::new(&program);
        command
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut command);

        let start = Instant::now();
        let child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        let output = match tokio::time::timeout(self.compile_timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(SandboxError::Wait)?,
            Err(_) => {
                // the child itself is killed when the dropped future releases it
                kill_process_group(pid);
                return Ok(Some(ExecutionResult::failed(
                    FailureKind::Compile,
                    format!(
                        "Compilation timed out ({}s limit)",
                        self.compile_timeout.as_secs_f64()
                    ),
                    elapsed_ms(start),
                )));
            }
        };

        if output.status.success() {
            return Ok(None);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if !stderr.trim().is_empty() {
            stderr.into_owned()
        } else if !stdout.trim().is_empty() {
            stdout.into_owned()
        } else {
            describe_exit(&output.status)
        };

        debug!(execution_time_ms = elapsed_ms(start), "Compilation failed");
        Ok(Some(ExecutionResult::failed(
            FailureKind::Compile,
            message,
            elapsed_ms(start),
        )))
    }

    async fn run(
        &self,
        dir: &Path,
        binary: &Path,
        input: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        let mut command = Command::new(binary);
        command
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut command);

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: binary.display().to_string(),
            source,
        })?;
        let pid = child.id();

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let input = input.as_bytes().to_vec();
        let cap = self.max_output_bytes;

        let outcome = tokio::time::timeout(self.run_timeout, async {
            let feed = async move {
                if let Some(mut pipe) = stdin_pipe {
                    // the program may exit without reading; a broken pipe is not a fault
                    let _ = pipe.write_all(&input).await;
                    let _ = pipe.shutdown().await;
                }
            };
            let (_, stdout, stderr, status) = tokio::join!(
                feed,
                read_capped(stdout_pipe, cap),
                read_capped(stderr_pipe, cap),
                child.wait()
            );
            (stdout, stderr, status)
        })
        .await;

        let execution_time_ms = elapsed_ms(start);

        match outcome {
            Err(_) => {
                kill_process_group(pid);
                let _ = child.kill().await;
                debug!(execution_time_ms, "Execution timed out");
                Ok(ExecutionResult::failed(
                    FailureKind::Timeout,
                    format!(
                        "Execution timed out ({}s limit)",
                        self.run_timeout.as_secs_f64()
                    ),
                    execution_time_ms,
                ))
            }
            Ok((_, _, Err(e))) => Err(SandboxError::Wait(e)),
            Ok((stdout, _, Ok(status))) if status.success() => {
                Ok(ExecutionResult::succeeded(stdout, execution_time_ms))
            }
            Ok((_, stderr, Ok(status))) => {
                let message = if stderr.trim().is_empty() {
                    describe_exit(&status)
                } else {
                    stderr
                };
                debug!(execution_time_ms, "Runtime error");
                Ok(ExecutionResult::failed(
                    FailureKind::Runtime,
                    message,
                    execution_time_ms,
                ))
            }
        }
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(&self, source_code: &str, stdin: &str) -> ExecutionResult {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Sandbox invocation refused: worker pool closed");
                return ExecutionResult::failed(FailureKind::Error, SandboxError::PoolClosed.to_string(), 0);
            }
        };

        let start = Instant::now();
        let workspace = match Workspace::create(&self.workspace_root).await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(error = %e, "Sandbox infrastructure failure");
                return ExecutionResult::failed(FailureKind::Error, e.to_string(), 0);
            }
        };

        let result = match self.run_invocation(&workspace, source_code, stdin).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, workspace = %workspace.path().display(), "Sandbox infrastructure failure");
                ExecutionResult::failed(FailureKind::Error, e.to_string(), elapsed_ms(start))
            }
        };

        workspace.cleanup().await;
        result
    }
}

/// Read a pipe to EOF, keeping at most `cap` bytes
async fn read_capped<R>(reader: Option<R>, cap: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut captured = Vec::with_capacity(cap.min(READ_CHUNK));
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }

    String::from_utf8_lossy(&captured).into_owned()
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Process exited with code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Process terminated by signal {}", signal);
        }
    }

    "Process terminated abnormally".to_string()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(unix)]
fn isolate_process_group(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        // ESRCH just means the group is already gone
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
