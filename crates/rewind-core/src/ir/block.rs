use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::inst::InstId;

define_entity!(BlockId);

/// A basic block in the IR. Phi instructions, if any, come first; the last
/// instruction is the terminator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub insts: Vec<InstId>,
}
