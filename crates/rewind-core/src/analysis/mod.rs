pub mod binder;
pub mod loader;

pub use binder::{bind_liveness, bind_tracked, LiveSets};
pub use loader::{
    liveness_from_path, liveness_from_str, strip_sigil, tracked_values_from_path,
    tracked_values_from_str, BlockLivenessJson, LivenessByName, TrackedValuesByName,
};
