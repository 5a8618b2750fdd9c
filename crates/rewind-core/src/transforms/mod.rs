pub mod checkpoint;
pub mod util;

pub use checkpoint::{CheckpointInjection, Diagnostic, InjectionOutcome};

use crate::analysis::{LivenessByName, TrackedValuesByName};
use crate::pipeline::TransformPipeline;

/// Build the standard pipeline: currently the checkpoint-injection pass.
pub fn default_pipeline(
    tracked: TrackedValuesByName,
    liveness: LivenessByName,
) -> TransformPipeline {
    let mut pipeline = TransformPipeline::new();
    pipeline.add(Box::new(CheckpointInjection::new(tracked, liveness)));
    pipeline
}
