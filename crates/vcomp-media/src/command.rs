//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::compiler::CompiledProgram;
use crate::error::{MediaError, MediaResult};

/// How long to wait for the output readers once the process is gone.
const CAPTURE_GRACE: Duration = Duration::from_secs(5);

/// Builder for FFmpeg commands with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file paths, in `-i` order
    inputs: Vec<PathBuf>,
    /// Output file path
    output: PathBuf,
    /// `-filter_complex` program, if any
    filter_complex: Option<String>,
    /// Output arguments (after the inputs)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            filter_complex: None,
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Command for a compiled program over staged input files.
    pub fn for_program(program: &CompiledProgram, inputs: &[PathBuf], output: impl AsRef<Path>) -> Self {
        Self::new(output)
            .inputs(inputs.iter().cloned())
            .filter_complex(program.filter_graph())
            .output_args(program.extra_args().iter().cloned())
    }

    /// Add an input file.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add multiple input files.
    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.inputs
            .extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Set filter complex. An empty graph is omitted.
    pub fn filter_complex(mut self, graph: impl Into<String>) -> Self {
        let graph = graph.into();
        self.filter_complex = (!graph.is_empty()).then_some(graph);
        self
    }

    /// Add output arguments.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Map a stream into the output.
    pub fn map(self, target: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(target)
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn input_paths(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        if let Some(graph) = &self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(graph.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    /// Diagnostic output, verbatim
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runner for FFmpeg commands with a deadline and cancellation.
///
/// The child process is owned by the running future and killed on every
/// exit path: timeout, cancellation, or the future being dropped.
pub struct FfmpegRunner {
    /// Binary to execute
    program: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Hard deadline for the process
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a runner for the given binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cancel_rx: None,
            timeout: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<RunOutput> {
        self.run_args(cmd.build_args()).await
    }

    /// Run the binary with raw arguments.
    pub async fn run_args(&self, args: Vec<String>) -> MediaResult<RunOutput> {
        let program = self.program.display().to_string();
        debug!("Running: {} {}", program, args.join(" "));

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::spawn(&program, e.to_string()))?;

        let stdout_task = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(read_lines(err)));

        let status = match self.wait_for_completion(&mut child).await {
            WaitOutcome::Exited(status) => status,
            WaitOutcome::TimedOut(timeout) => {
                warn!(
                    "{} timed out after {:.1}s, killing process",
                    program,
                    timeout.as_secs_f64()
                );
                terminate(&mut child).await;
                abort(stdout_task);
                abort(stderr_task);
                return Err(MediaError::Timeout(timeout));
            }
            WaitOutcome::Cancelled => {
                info!("{} cancelled, killing process", program);
                terminate(&mut child).await;
                abort(stdout_task);
                abort(stderr_task);
                return Err(MediaError::Cancelled);
            }
            WaitOutcome::Failed(e) => {
                terminate(&mut child).await;
                abort(stdout_task);
                abort(stderr_task);
                return Err(e.into());
            }
        };

        let stdout = collect(stdout_task).await;
        let stderr = String::from_utf8_lossy(&collect(stderr_task).await).into_owned();
        let elapsed = started.elapsed();

        if !status.success() {
            return Err(MediaError::engine_failed(
                format!("{} exited with {}", program, status),
                stderr,
                status.code(),
            ));
        }

        debug!(elapsed_ms = elapsed.as_millis() as u64, "{} finished", program);
        Ok(RunOutput {
            stdout,
            stderr,
            elapsed,
        })
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> WaitOutcome {
        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => WaitOutcome::Exited(status),
                Err(e) => WaitOutcome::Failed(e),
            },
            _ = deadline => WaitOutcome::TimedOut(self.timeout.unwrap_or_default()),
            _ = cancelled(self.cancel_rx.clone()) => WaitOutcome::Cancelled,
        }
    }
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut(Duration),
    Cancelled,
    Failed(std::io::Error),
}

/// Resolves once the signal reads `true`; never if the sender goes away.
async fn cancelled(cancel_rx: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel_rx {
        if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Kill the child and reap it.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill process {:?}: {}", child.id(), e);
    }
}

async fn read_all<R>(mut reader: R) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!("Stopped reading process output: {}", e);
    }
    buf
}

/// Read diagnostics line by line, tracing each as it arrives.
async fn read_lines<R>(reader: R) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                trace!(target: "ffmpeg", "{}", String::from_utf8_lossy(&line).trim_end());
                captured.extend_from_slice(&line);
            }
            Err(e) => {
                debug!("Stopped reading process diagnostics: {}", e);
                break;
            }
        }
    }

    captured
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };

    match tokio::time::timeout(CAPTURE_GRACE, &mut task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!("Output capture task failed: {}", e);
            Vec::new()
        }
        Err(_) => {
            // A grandchild can keep the pipe open after the process exits.
            warn!("Output capture still open after process exit, dropping it");
            task.abort();
            Vec::new()
        }
    }
}

fn abort(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

/// Resolve an engine binary on PATH (or check an explicit path).
pub fn check_engine(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program)
        .map_err(|e| MediaError::spawn(program.display().to_string(), e.to_string()))
}
