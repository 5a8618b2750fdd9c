//! Structural verifier for transformed functions.
//!
//! Checks the invariants a CFG-mutating pass must preserve: SSA dominance of
//! every use, terminator well-formedness, and phi shape (one incoming per
//! predecessor, phis only at the block head). Runs over reachable blocks.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;
use crate::transforms::util::{branch_targets, value_operands};

use super::block::BlockId;
use super::cfg::{dominates, immediate_dominators, predecessors, reachable_from};
use super::func::Function;
use super::inst::Op;
use super::module::Module;
use super::value::ValueId;

pub fn verify_module(module: &Module) -> Result<(), CoreError> {
    for func in module.functions.values() {
        verify_function(func)?;
    }
    Ok(())
}

pub fn verify_function(func: &Function) -> Result<(), CoreError> {
    let reachable = reachable_from(func, func.entry);

    check_terminators(func, &reachable)?;
    check_phi_shape(func, &reachable)?;
    check_ssa(func, &reachable)?;
    Ok(())
}

fn err(func: &Function, message: String) -> CoreError {
    CoreError::InvalidIr(format!("function '{}': {}", func.name, message))
}

/// Every reachable block ends in exactly one terminator, terminators appear
/// nowhere else, and every successor reference resolves to a real block.
fn check_terminators(func: &Function, reachable: &HashSet<BlockId>) -> Result<(), CoreError> {
    for &b in reachable {
        let insts = &func.blocks[b].insts;
        let Some((&last, body)) = insts.split_last() else {
            return Err(err(func, format!("block '{}' is empty", func.block_label(b))));
        };
        if !func.insts[last].op.is_terminator() {
            return Err(err(
                func,
                format!("block '{}' does not end in a terminator", func.block_label(b)),
            ));
        }
        for &id in body {
            if func.insts[id].op.is_terminator() {
                return Err(err(
                    func,
                    format!(
                        "block '{}' has a terminator before its last instruction",
                        func.block_label(b)
                    ),
                ));
            }
        }
        for t in branch_targets(&func.insts[last].op) {
            if !func.blocks.contains_key(t) {
                return Err(err(
                    func,
                    format!("block '{}' branches to a nonexistent block", func.block_label(b)),
                ));
            }
        }
    }
    Ok(())
}

/// Phis form a prefix of their block and carry exactly one incoming per
/// distinct predecessor.
fn check_phi_shape(func: &Function, reachable: &HashSet<BlockId>) -> Result<(), CoreError> {
    for &b in reachable {
        let preds: HashSet<BlockId> = predecessors(func, b).into_iter().collect();
        let mut seen_non_phi = false;
        for &id in &func.blocks[b].insts {
            let op = &func.insts[id].op;
            if !op.is_phi() {
                seen_non_phi = true;
                continue;
            }
            if seen_non_phi {
                return Err(err(
                    func,
                    format!("phi after non-phi in block '{}'", func.block_label(b)),
                ));
            }
            let Op::Phi { incomings } = op else { unreachable!() };
            let mut incoming_blocks = HashSet::new();
            for &(_, p) in incomings {
                if !incoming_blocks.insert(p) {
                    return Err(err(
                        func,
                        format!(
                            "phi in block '{}' has duplicate incomings for '{}'",
                            func.block_label(b),
                            func.block_label(p)
                        ),
                    ));
                }
            }
            if incoming_blocks != preds {
                return Err(err(
                    func,
                    format!(
                        "phi in block '{}' does not cover its predecessors exactly",
                        func.block_label(b)
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Every value has one definition, and that definition dominates each use.
fn check_ssa(func: &Function, reachable: &HashSet<BlockId>) -> Result<(), CoreError> {
    let idom = immediate_dominators(func);
    let params: HashSet<ValueId> = func.params.iter().copied().collect();

    // Definition points of instruction results.
    let mut defs: HashMap<ValueId, (BlockId, usize)> = HashMap::new();
    for &b in reachable {
        for (i, &id) in func.blocks[b].insts.iter().enumerate() {
            if let Some(r) = func.insts[id].result {
                if params.contains(&r) || defs.insert(r, (b, i)).is_some() {
                    return Err(err(
                        func,
                        format!("value '{}' has multiple definitions", func.value_label(r)),
                    ));
                }
            }
        }
    }

    let def_ok_at_block_end = |v: ValueId, b: BlockId| -> bool {
        if params.contains(&v) {
            return true;
        }
        match defs.get(&v) {
            Some(&(db, _)) => db == b || dominates(db, b, &idom),
            None => false,
        }
    };

    for &b in reachable {
        for (i, &id) in func.blocks[b].insts.iter().enumerate() {
            let op = &func.insts[id].op;
            if let Op::Phi { incomings } = op {
                // A phi use must be available at the end of its incoming edge.
                for &(v, pred) in incomings {
                    if !def_ok_at_block_end(v, pred) {
                        return Err(err(
                            func,
                            format!(
                                "phi use of '{}' in block '{}' is not dominated by its \
                                 definition on the edge from '{}'",
                                func.value_label(v),
                                func.block_label(b),
                                func.block_label(pred)
                            ),
                        ));
                    }
                }
                continue;
            }
            for v in value_operands(op) {
                if params.contains(&v) {
                    continue;
                }
                let ok = match defs.get(&v) {
                    Some(&(db, di)) => {
                        if db == b {
                            di < i
                        } else {
                            dominates(db, b, &idom)
                        }
                    }
                    None => false,
                };
                if !ok {
                    return Err(err(
                        func,
                        format!(
                            "use of '{}' in block '{}' is not dominated by its definition",
                            func.value_label(v),
                            func.block_label(b)
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}
