//! Checkpoint-site selection.
//!
//! Selection is directive-driven: a block becomes a site only if it carries a
//! call to the `checkpoint` sentinel AND survives the eligibility filters
//! (single successor, at least one tracked value that is not a nested
//! pointer). Sentinel calls are erased during selection — they are pure
//! markers.

use std::collections::HashMap;

use crate::ir::cfg::successors;
use crate::ir::{BlockId, Function, InstId, Op, ValueId};

use super::{Diagnostic, SENTINEL};

/// A block selected for checkpointing, with its eligible tracked values in
/// analysis order.
#[derive(Debug)]
pub struct SelectedSite {
    pub block: BlockId,
    pub tracked: Vec<ValueId>,
}

/// Apply the selection filters and the directive scan to one function.
///
/// Erases every sentinel call encountered; sentinel blocks that fail the
/// filters surface a diagnostic and are skipped.
pub fn select_sites(
    func: &mut Function,
    tracked: &HashMap<BlockId, Vec<ValueId>>,
    diags: &mut Vec<Diagnostic>,
) -> Vec<SelectedSite> {
    // Filters, in order: one successor, no nested-pointer values, non-empty.
    let mut eligible: HashMap<BlockId, Vec<ValueId>> = HashMap::new();
    for (&block, vals) in tracked {
        if successors(func, block).len() != 1 {
            continue;
        }
        let vals: Vec<ValueId> = vals
            .iter()
            .copied()
            .filter(|&v| !func.value_types[v].is_nested_ptr())
            .collect();
        if vals.is_empty() {
            continue;
        }
        eligible.insert(block, vals);
    }

    // Directive scan, in block layout order.
    let mut sites = Vec::new();
    for block in func.blocks.keys().collect::<Vec<_>>() {
        let markers: Vec<InstId> = func.blocks[block]
            .insts
            .iter()
            .copied()
            .filter(|&id| {
                matches!(&func.insts[id].op, Op::Call { func: name, .. } if name.contains(SENTINEL))
            })
            .collect();
        if markers.is_empty() {
            continue;
        }
        func.blocks[block]
            .insts
            .retain(|id| !markers.contains(id));

        if let Some(vals) = eligible.remove(&block) {
            sites.push(SelectedSite {
                block,
                tracked: vals,
            });
        } else {
            let detail = if !tracked.contains_key(&block) {
                format!(
                    "checkpoint directive in block '{}' has no tracked-values data",
                    func.block_label(block)
                )
            } else if successors(func, block).len() != 1 {
                format!(
                    "checkpoint site '{}' has an unsupported terminator",
                    func.block_label(block)
                )
            } else {
                format!(
                    "checkpoint directive in block '{}' has no eligible tracked values",
                    func.block_label(block)
                )
            };
            diags.push(Diagnostic {
                function: func.name.clone(),
                detail,
            });
        }
    }
    sites
}
