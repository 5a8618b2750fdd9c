pub mod transform;

pub use transform::{Transform, TransformPipeline, TransformResult};
