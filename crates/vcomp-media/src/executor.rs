//! Execution engine.
//!
//! One call to [`Executor::execute`] is one request:
//! `Idle -> StagingInputs -> Running -> ExtractingMetadata -> Done | Failed`.
//! The staging directory is removed on every terminal transition.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::Instrument;

use vcomp_models::{AssetMetadata, AssetRef};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::compiler::{compile, CompiledProgram};
use crate::composition::CompositionState;
use crate::config::EngineConfig;
use crate::delegation::{build_delegated_program, can_delegate};
use crate::error::MediaResult;
use crate::logging::{RequestLogger, RequestPhase};
use crate::probe::probe_file;
use crate::staging::StagingArea;

/// Deadline for the metadata probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful composition output.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: AssetRef,
    pub processing_time_ms: u64,
}

/// Validate a composition and turn it into a program, taking the
/// single-pass overlay path when the composition allows it.
pub fn plan(state: &CompositionState) -> MediaResult<CompiledProgram> {
    state.validate()?;
    if can_delegate(state) {
        build_delegated_program(state)
    } else {
        compile(state)
    }
}

/// Runs compiled programs through FFmpeg.
#[derive(Debug, Clone)]
pub struct Executor {
    config: EngineConfig,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Executor {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel_rx: None,
        }
    }

    /// Executor configured from `VCOMP_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    /// Kill the running engine as soon as the signal turns `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plan and execute a composition.
    ///
    /// Validation and compile errors are returned before anything touches
    /// the filesystem.
    pub async fn compose(&self, state: &CompositionState) -> MediaResult<ExecutionResult> {
        let program = plan(state)?;
        self.execute(&program).await
    }

    /// Execute a compiled program.
    pub async fn execute(&self, program: &CompiledProgram) -> MediaResult<ExecutionResult> {
        let logger = RequestLogger::new("compose");
        let span = logger.create_span();
        self.execute_logged(program, &logger).instrument(span).await
    }

    async fn execute_logged(
        &self,
        program: &CompiledProgram,
        logger: &RequestLogger,
    ) -> MediaResult<ExecutionResult> {
        let started = Instant::now();
        logger.log_phase(
            RequestPhase::Idle,
            &format!(
                "Accepted request: {} inputs, {} statements, delegated={}",
                program.inputs().len(),
                program.statements().len(),
                program.is_delegated()
            ),
        );

        let staging = match StagingArea::create(&self.config.work_dir, logger.request_id()).await {
            Ok(staging) => staging,
            Err(e) => {
                logger.log_failure(&e);
                return Err(e);
            }
        };

        let result = self.run_staged(program, &staging, logger).await;

        if let Err(e) = staging.close() {
            logger.log_warning(&format!("Staging cleanup failed: {}", e));
        }

        match result {
            Ok(output) => {
                let processing_time_ms = started.elapsed().as_millis() as u64;
                logger.log_phase(
                    RequestPhase::Done,
                    &format!(
                        "Produced {} bytes of {} in {}ms",
                        output.len(),
                        output.kind(),
                        processing_time_ms
                    ),
                );
                Ok(ExecutionResult {
                    output,
                    processing_time_ms,
                })
            }
            Err(e) => {
                logger.log_failure(&e);
                Err(e)
            }
        }
    }

    async fn run_staged(
        &self,
        program: &CompiledProgram,
        staging: &StagingArea,
        logger: &RequestLogger,
    ) -> MediaResult<AssetRef> {
        logger.log_phase(
            RequestPhase::StagingInputs,
            &format!("Staging {} inputs in {}", program.inputs().len(), staging.path().display()),
        );
        let inputs = staging.stage_all(program.inputs()).await?;
        let output_path = staging.output_path(program.output_format());

        let command = FfmpegCommand::for_program(program, &inputs, &output_path)
            .log_level(self.config.log_level.clone());

        let mut runner = FfmpegRunner::new(&self.config.ffmpeg_path).with_timeout(self.config.timeout);
        if let Some(cancel_rx) = &self.cancel_rx {
            runner = runner.with_cancel(cancel_rx.clone());
        }

        logger.log_phase(RequestPhase::Running, "Running FFmpeg");
        let run = runner
            .run(&command)
            .await
            .map_err(|e| e.with_filter_graph(program.filter_graph()))?;
        tracing::debug!(
            elapsed_ms = run.elapsed.as_millis() as u64,
            stderr_bytes = run.stderr.len(),
            "FFmpeg finished"
        );

        logger.log_phase(RequestPhase::ExtractingMetadata, "Probing output");
        let fallback = AssetMetadata {
            has_audio: Some(program.final_audio_label().is_some()),
            ..Default::default()
        };
        let metadata = if self.config.probe_output {
            match probe_file(&self.config.ffprobe_path, &output_path, PROBE_TIMEOUT).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    logger.log_warning(&format!("Returning output without metadata: {}", e));
                    fallback
                }
            }
        } else {
            fallback
        };
        let metadata = AssetMetadata {
            format: Some(program.output_format().to_string()),
            ..metadata
        };

        let bytes = tokio::fs::read(&output_path).await?;
        Ok(AssetRef::new(bytes, program.output_kind()).with_metadata(metadata))
    }
}
