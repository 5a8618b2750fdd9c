//! CFG queries and edge splitting over the block-based IR.
//!
//! All queries are computed on demand from the function's terminators; the
//! checkpoint pass mutates the graph as it goes, so nothing here is cached.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::CoreError;
use crate::transforms::util::{branch_targets, retarget_phi_incomings};

use super::block::BlockId;
use super::func::Function;
use super::inst::{InstId, Op};

/// The block's terminator instruction. A placed block without one is
/// malformed.
pub fn terminator(func: &Function, block: BlockId) -> Result<InstId, CoreError> {
    let last = func.blocks[block]
        .insts
        .last()
        .copied()
        .ok_or_else(|| CoreError::InvalidIr(format!("block '{}' is empty", func.block_label(block))))?;
    if !func.insts[last].op.is_terminator() {
        return Err(CoreError::InvalidIr(format!(
            "block '{}' does not end in a terminator",
            func.block_label(block)
        )));
    }
    Ok(last)
}

/// Distinct successors of a block, in terminator order. Empty for exit
/// blocks and for blocks still under construction.
pub fn successors(func: &Function, block: BlockId) -> Vec<BlockId> {
    let mut out = Vec::new();
    if let Some(&last) = func.blocks[block].insts.last() {
        for t in branch_targets(&func.insts[last].op) {
            if !out.contains(&t) {
                out.push(t);
            }
        }
    }
    out
}

/// Distinct predecessors of a block, in block order.
pub fn predecessors(func: &Function, block: BlockId) -> Vec<BlockId> {
    let mut out = Vec::new();
    for b in func.blocks.keys() {
        if successors(func, b).contains(&block) && !out.contains(&b) {
            out.push(b);
        }
    }
    out
}

/// All blocks reachable from `start` via BFS.
pub fn reachable_from(func: &Function, start: BlockId) -> HashSet<BlockId> {
    let mut reachable = HashSet::new();
    let mut worklist = VecDeque::new();
    reachable.insert(start);
    worklist.push_back(start);
    while let Some(b) = worklist.pop_front() {
        for s in successors(func, b) {
            if reachable.insert(s) {
                worklist.push_back(s);
            }
        }
    }
    reachable
}

/// Reverse postorder traversal from the entry block.
pub fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();

    fn dfs(
        func: &Function,
        b: BlockId,
        visited: &mut HashSet<BlockId>,
        postorder: &mut Vec<BlockId>,
    ) {
        if !visited.insert(b) {
            return;
        }
        for s in successors(func, b) {
            dfs(func, s, visited, postorder);
        }
        postorder.push(b);
    }

    dfs(func, func.entry, &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}

/// Immediate dominators (Cooper-Harvey-Kennedy) over the reachable CFG.
pub fn immediate_dominators(func: &Function) -> HashMap<BlockId, BlockId> {
    let entry = func.entry;
    let rpo = reverse_postorder(func);
    let rpo_number: HashMap<BlockId, usize> =
        rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let intersect = |mut a: BlockId, mut b: BlockId, idom: &HashMap<BlockId, BlockId>| -> BlockId {
        while a != b {
            while rpo_number[&a] > rpo_number[&b] {
                a = idom[&a];
            }
            while rpo_number[&b] > rpo_number[&a] {
                b = idom[&b];
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo {
            if b == entry {
                continue;
            }
            let mut new_idom: Option<BlockId> = None;
            for p in predecessors(func, b) {
                if !idom.contains_key(&p) || !rpo_number.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(current) => intersect(p, current, &idom),
                });
            }
            if let Some(new) = new_idom {
                if idom.get(&b) != Some(&new) {
                    idom.insert(b, new);
                    changed = true;
                }
            }
        }
    }

    idom
}

/// Check if `a` dominates `b`.
pub fn dominates(a: BlockId, b: BlockId, idom: &HashMap<BlockId, BlockId>) -> bool {
    let mut cur = b;
    loop {
        if cur == a {
            return true;
        }
        match idom.get(&cur) {
            Some(&parent) if parent != cur => cur = parent,
            _ => return false,
        }
    }
}

/// Split the edge `from -> to`: insert a new block carrying only an
/// unconditional branch to `to`, retarget `from`'s terminator, and rewrite
/// phi incomings in `to` that referenced `from`.
pub fn split_edge(
    func: &mut Function,
    from: BlockId,
    to: BlockId,
    name: impl Into<String>,
) -> Result<BlockId, CoreError> {
    let term = terminator(func, from)?;
    if !branch_targets(&func.insts[term].op).contains(&to) {
        return Err(CoreError::EdgeSplit {
            from: func.block_label(from),
            to: func.block_label(to),
        });
    }

    let mid = func.add_block(name);
    let br = func.add_inst(Op::Br { target: to }, None);
    func.blocks[mid].insts.push(br);

    // Retarget every edge from `from` to `to` through the new block.
    match &mut func.insts[term].op {
        Op::Br { target } => {
            if *target == to {
                *target = mid;
            }
        }
        Op::BrIf {
            then_target,
            else_target,
            ..
        } => {
            if *then_target == to {
                *then_target = mid;
            }
            if *else_target == to {
                *else_target = mid;
            }
        }
        Op::Switch { cases, default, .. } => {
            for (_, t) in cases {
                if *t == to {
                    *t = mid;
                }
            }
            if *default == to {
                *default = mid;
            }
        }
        _ => unreachable!("terminator checked above"),
    }

    let to_insts: Vec<InstId> = func.blocks[to].insts.clone();
    for inst_id in to_insts {
        retarget_phi_incomings(&mut func.insts[inst_id].op, from, mid);
    }

    Ok(mid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
    use crate::ir::{FunctionSig, Type};

    fn linear_func() -> Function {
        // entry -> a -> exit
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let a = fb.create_block("a");
        let exit = fb.create_block("exit");
        fb.br(a);
        fb.switch_to_block(a);
        fb.br(exit);
        fb.switch_to_block(exit);
        fb.ret(None);
        fb.build()
    }

    #[test]
    fn successors_and_predecessors() {
        let func = linear_func();
        let a = func.block_by_name("a").unwrap();
        let exit = func.block_by_name("exit").unwrap();
        assert_eq!(successors(&func, func.entry), vec![a]);
        assert_eq!(predecessors(&func, exit), vec![a]);
        assert!(successors(&func, exit).is_empty());
    }

    #[test]
    fn split_edge_inserts_forwarder() {
        let mut func = linear_func();
        let a = func.block_by_name("a").unwrap();
        let exit = func.block_by_name("exit").unwrap();

        let mid = split_edge(&mut func, a, exit, "a.mid").unwrap();

        assert_eq!(successors(&func, a), vec![mid]);
        assert_eq!(successors(&func, mid), vec![exit]);
        assert_eq!(predecessors(&func, exit), vec![mid]);
    }

    #[test]
    fn split_edge_rejects_non_edge() {
        let mut func = linear_func();
        let exit = func.block_by_name("exit").unwrap();
        let entry = func.entry;
        let err = split_edge(&mut func, entry, exit, "bad").unwrap_err();
        assert!(matches!(err, CoreError::EdgeSplit { .. }));
    }

    #[test]
    fn split_edge_retargets_phis() {
        // entry -> (l | r) -> merge, with a phi in merge.
        let sig = FunctionSig {
            params: vec![Type::Bool],
            return_ty: Type::Int(32),
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let cond = fb.param(0);
        let l = fb.create_block("l");
        let r = fb.create_block("r");
        let merge = fb.create_block("merge");

        fb.br_if(cond, l, r);

        fb.switch_to_block(l);
        let one = fb.const_int(1);
        fb.br(merge);

        fb.switch_to_block(r);
        let two = fb.const_int(2);
        fb.br(merge);

        fb.switch_to_block(merge);
        let phi = fb.phi(&[(one, l), (two, r)], Type::Int(32));
        fb.ret(Some(phi));

        let mut func = fb.build();
        let mid = split_edge(&mut func, l, merge, "l.mid").unwrap();

        let phi_inst = func.blocks[merge].insts[0];
        match &func.insts[phi_inst].op {
            Op::Phi { incomings } => {
                assert!(incomings.contains(&(one, mid)));
                assert!(incomings.contains(&(two, r)));
            }
            other => panic!("expected phi, got {other:?}"),
        }
    }

    #[test]
    fn dominators_of_diamond() {
        let sig = FunctionSig {
            params: vec![Type::Bool],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let cond = fb.param(0);
        let l = fb.create_block("l");
        let r = fb.create_block("r");
        let merge = fb.create_block("merge");
        fb.br_if(cond, l, r);
        fb.switch_to_block(l);
        fb.br(merge);
        fb.switch_to_block(r);
        fb.br(merge);
        fb.switch_to_block(merge);
        fb.ret(None);
        let func = fb.build();

        let idom = immediate_dominators(&func);
        assert_eq!(idom[&merge], func.entry);
        assert!(dominates(func.entry, merge, &idom));
        assert!(!dominates(l, merge, &idom));
    }
}
