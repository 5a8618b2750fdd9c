use crate::error::CoreError;
use crate::ir::Module;

/// Result of applying a transform: the (possibly rewritten) module and
/// whether anything changed.
pub struct TransformResult {
    pub module: Module,
    pub changed: bool,
}

/// Transform trait — a pass that rewrites IR modules.
pub trait Transform {
    /// Name of this transform pass.
    fn name(&self) -> &str;

    /// Apply this transform to a module.
    fn apply(&self, module: Module) -> Result<TransformResult, CoreError>;
}

/// An ordered sequence of transforms to apply.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    pub fn add(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Run all transforms in order on the given module. The returned
    /// `changed` flag is the OR over all passes.
    pub fn run(&self, mut module: Module) -> Result<TransformResult, CoreError> {
        let mut changed = false;
        for transform in &self.transforms {
            let result = transform.apply(module)?;
            module = result.module;
            changed |= result.changed;
        }
        Ok(TransformResult { module, changed })
    }
}
