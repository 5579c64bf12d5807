//! tailflux Pipeline
//!
//! Supervises the reader, extractor and sink stages and reports how they
//! stopped.

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineSummary, RunningPipeline};
