//! Per-message command pipeline: parse → moderate → generate → reply.

pub mod command;
pub mod pipeline;

pub use {
    command::{Command, parse},
    pipeline::{CommandPipeline, PipelineConfig},
};
