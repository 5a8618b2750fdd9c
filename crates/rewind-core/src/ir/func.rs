use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::define_entity;
use crate::entity::PrimaryMap;

use super::block::{Block, BlockId};
use super::inst::{Inst, InstId, Op};
use super::ty::{FunctionSig, Type};
use super::value::ValueId;

define_entity!(FuncId);

/// A function in the IR.
///
/// Arguments are `ValueId`s listed in `params`; their types come from
/// `value_types` like any other value. Values and blocks carry optional
/// stable names — analysis results reference them by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub sig: FunctionSig,
    /// Argument values, in signature order.
    pub params: Vec<ValueId>,
    pub blocks: PrimaryMap<BlockId, Block>,
    pub insts: PrimaryMap<InstId, Inst>,
    pub value_types: PrimaryMap<ValueId, Type>,
    /// Entry block — always the first block.
    pub entry: BlockId,
    /// Debug names for values (from source-level variable names).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub value_names: HashMap<ValueId, String>,
    /// Names for blocks.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub block_names: HashMap<BlockId, String>,
}

impl Function {
    pub fn value_name(&self, v: ValueId) -> Option<&str> {
        self.value_names.get(&v).map(|s| s.as_str())
    }

    /// The value's name, or a positional fallback for display.
    pub fn value_label(&self, v: ValueId) -> String {
        use crate::entity::EntityRef;
        self.value_names
            .get(&v)
            .cloned()
            .unwrap_or_else(|| format!("v{}", v.index()))
    }

    /// The block's name, or a positional fallback for display.
    pub fn block_label(&self, b: BlockId) -> String {
        use crate::entity::EntityRef;
        self.block_names
            .get(&b)
            .cloned()
            .unwrap_or_else(|| format!("bb{}", b.index()))
    }

    pub fn set_block_name(&mut self, b: BlockId, name: impl Into<String>) {
        self.block_names.insert(b, name.into());
    }

    pub fn set_value_name(&mut self, v: ValueId, name: impl Into<String>) {
        self.value_names.insert(v, name.into());
    }

    /// Attach a debug name, appending a numeric suffix if the base name is
    /// already taken by another value. Keeps the per-function name-uniqueness
    /// invariant the analysis binder relies on.
    pub fn set_unique_value_name(&mut self, v: ValueId, base: impl Into<String>) {
        let base = base.into();
        if !self.value_names.values().any(|n| *n == base) {
            self.value_names.insert(v, base);
            return;
        }
        let mut k = 1usize;
        loop {
            let candidate = format!("{base}.{k}");
            if !self.value_names.values().any(|n| *n == candidate) {
                self.value_names.insert(v, candidate);
                return;
            }
            k += 1;
        }
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.block_names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(&b, _)| b)
    }

    /// Look up a function argument by its debug name.
    pub fn param_named(&self, name: &str) -> Option<ValueId> {
        self.params
            .iter()
            .copied()
            .find(|&p| self.value_name(p) == Some(name))
    }

    /// Allocate a fresh value of the given type.
    pub fn new_value(&mut self, ty: Type) -> ValueId {
        self.value_types.push(ty)
    }

    /// Create an empty named block.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let b = self.blocks.push(Block::default());
        self.block_names.insert(b, name.into());
        b
    }

    /// Push an instruction into the arena without placing it in a block.
    pub fn add_inst(&mut self, op: Op, result: Option<ValueId>) -> InstId {
        self.insts.push(Inst { op, result })
    }

    /// Insert an instruction immediately before the block's terminator.
    pub fn insert_before_terminator(&mut self, block: BlockId, inst: InstId) {
        let insts = &mut self.blocks[block].insts;
        let pos = insts.len().saturating_sub(1);
        insts.insert(pos, inst);
    }

    /// Insert an instruction after any existing phi prefix of the block.
    pub fn insert_after_phis(&mut self, block: BlockId, inst: InstId) {
        let pos = self.blocks[block]
            .insts
            .iter()
            .position(|&id| !self.insts[id].op.is_phi())
            .unwrap_or(self.blocks[block].insts.len());
        self.blocks[block].insts.insert(pos, inst);
    }

    /// Insert an instruction at the very head of the block.
    pub fn insert_at_head(&mut self, block: BlockId, inst: InstId) {
        self.blocks[block].insts.insert(0, inst);
    }

    /// Remove dead instructions from the arena.
    ///
    /// Instructions removed from blocks (e.g. erased sentinel calls) remain
    /// in the `insts` arena. This compacts the arena so only placed
    /// instructions remain, allowing downstream consumers to safely iterate
    /// it.
    pub fn compact_insts(&mut self) {
        let mut live: HashSet<InstId> = HashSet::new();
        for block in self.blocks.values() {
            for &inst_id in &block.insts {
                live.insert(inst_id);
            }
        }

        if live.len() == self.insts.len() {
            return;
        }

        let mut new_insts = PrimaryMap::new();
        let mut remap: HashMap<InstId, InstId> = HashMap::new();
        for (old_id, inst) in self.insts.iter() {
            if live.contains(&old_id) {
                let new_id = new_insts.push(inst.clone());
                remap.insert(old_id, new_id);
            }
        }

        for block in self.blocks.values_mut() {
            for inst_id in &mut block.insts {
                *inst_id = remap[inst_id];
            }
        }

        self.insts = new_insts;
    }
}
