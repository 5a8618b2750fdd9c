/// Core error type for the rewind framework.
///
/// Per-function and per-site failures of the checkpoint pass are surfaced as
/// these values and downgraded to diagnostics by the pass driver; only I/O
/// and JSON failures escape a whole run.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("no tracked-values or liveness data for function '{function}'")]
    MissingAnalysis { function: String },

    #[error("function '{function}' has no memory-segment parameter '{param}'")]
    NoMemorySegment { function: String, param: String },

    #[error("entry of function '{function}' has no successor edge to split")]
    InvalidEntry { function: String },

    #[error("checkpoint site '{block}' in function '{function}' has an unsupported terminator")]
    UnsupportedSite { function: String, block: String },

    #[error("cannot split edge '{from}' -> '{to}'")]
    EdgeSplit { from: String, to: String },

    #[error("operand name '{name}' is ambiguous in function '{function}'")]
    AmbiguousName { function: String, name: String },

    #[error("invalid IR: {0}")]
    InvalidIr(String),

    #[error("evaluation error: {0}")]
    Eval(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
