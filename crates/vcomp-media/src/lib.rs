#![deny(unreachable_patterns)]
//! Composition filter-graph engine.
//!
//! This crate provides:
//! - A composition accumulator (sequence, overlays, raw fragments, output options)
//! - A pure filter-graph compiler with structured, label-checked statements
//! - A single-pass overlay path for compositions that need no advanced features
//! - FFmpeg execution with staging, timeout, cancellation and guaranteed cleanup
//! - FFprobe metadata extraction

pub mod command;
pub mod compiler;
pub mod composition;
pub mod config;
pub mod delegation;
pub mod error;
pub mod executor;
pub mod filters;
pub mod graph;
pub mod logging;
pub mod probe;
pub mod staging;

pub use command::{check_engine, FfmpegCommand, FfmpegRunner, RunOutput};
pub use compiler::{compile, CompiledProgram};
pub use composition::{CompositionState, OverlayLayer};
pub use config::EngineConfig;
pub use delegation::{build_delegated_program, can_delegate};
pub use error::{MediaError, MediaResult};
pub use executor::{plan, ExecutionResult, Executor};
pub use graph::{FilterGraph, FilterKind, Statement};
pub use logging::{RequestLogger, RequestPhase};
pub use probe::{parse_probe_output, probe_file};
pub use staging::StagingArea;
