//! SSA repair after save/restore injection.
//!
//! The junction phi is the correct post-checkpoint version of a tracked
//! value, but downstream instructions still reference the original. A BFS
//! from the resume block rewrites those uses, inserting fresh phis wherever
//! the value arrives over more than one live-out edge.
//!
//! Cycle safety rests on two mechanisms: a per-block history of the value
//! versions observed there (a path stops once its version set matches the
//! history exactly), and the rule that updating an existing phi's incoming
//! halts the path — a second pass around a loop merely fixes up the back
//! edge of the phi inserted on the first pass.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::analysis::LiveSets;
use crate::ir::cfg::{predecessors, successors};
use crate::ir::{BlockId, Function, Op, ValueId};
use crate::transforms::util::{replace_value_uses, set_incoming_value};

/// Read-only surroundings of one propagation run.
pub struct PropagationCtx<'a> {
    /// Precomputed liveness for the original blocks.
    pub liveness: &'a HashMap<BlockId, LiveSets>,
    /// Emitter-recorded live-out sets for save/restore/junction blocks.
    pub live_out_overrides: &'a HashMap<BlockId, HashSet<ValueId>>,
    /// Synthetic blocks are never treated as merge points.
    pub synthetic: &'a HashSet<BlockId>,
}

/// One scheduled visit. `versions` is the set of all versions of the tracked
/// value seen on this traversal path, the original included.
struct UpdateRequest {
    current: BlockId,
    previous: BlockId,
    old_value: ValueId,
    new_value: ValueId,
    versions: HashSet<ValueId>,
}

/// Rewrite downstream uses of `old_value` with `new_value` (the junction
/// phi), starting from the resume block.
pub fn propagate_restored_value(
    func: &mut Function,
    start: BlockId,
    junction: BlockId,
    old_value: ValueId,
    new_value: ValueId,
    ctx: &PropagationCtx<'_>,
) {
    let mut block_versions: HashMap<BlockId, HashSet<ValueId>> = HashMap::new();
    let mut queue: VecDeque<UpdateRequest> = VecDeque::new();
    queue.push_back(UpdateRequest {
        current: start,
        previous: junction,
        old_value,
        new_value,
        versions: HashSet::from([old_value, new_value]),
    });

    while let Some(req) = queue.pop_front() {
        process_request(func, start, req, &mut queue, &mut block_versions, ctx);
    }
}

/// How many predecessors of `block` carry `value` in their live-out set.
fn live_out_pred_count(
    func: &Function,
    block: BlockId,
    value: ValueId,
    ctx: &PropagationCtx<'_>,
) -> usize {
    predecessors(func, block)
        .into_iter()
        .filter(|pred| {
            if let Some(set) = ctx.live_out_overrides.get(pred) {
                set.contains(&value)
            } else if let Some(sets) = ctx.liveness.get(pred) {
                sets.live_out.contains(&value)
            } else {
                false
            }
        })
        .count()
}

/// Does any phi in `block` have an incoming from `previous` whose value is a
/// known version? If so, a prior traversal path already owns this merge.
fn phi_has_version_incoming(
    func: &Function,
    block: BlockId,
    previous: BlockId,
    versions: &HashSet<ValueId>,
) -> bool {
    for &inst_id in &func.blocks[block].insts {
        let Op::Phi { incomings } = &func.insts[inst_id].op else {
            break;
        };
        if incomings
            .iter()
            .any(|&(v, b)| b == previous && versions.contains(&v))
        {
            return true;
        }
    }
    false
}

fn process_request(
    func: &mut Function,
    start: BlockId,
    req: UpdateRequest,
    queue: &mut VecDeque<UpdateRequest>,
    block_versions: &mut HashMap<BlockId, HashSet<ValueId>>,
    ctx: &PropagationCtx<'_>,
) {
    let UpdateRequest {
        current,
        previous,
        old_value,
        new_value,
        mut versions,
    } = req;

    // Stop after looping back to the start block.
    let mut stop = current == start && block_versions.contains_key(&current);

    let succs = successors(func, current);
    if succs.is_empty() {
        stop = true;
    }

    // Marks the block visited; a path whose versions exactly match the
    // accumulated history has nothing new to contribute.
    let history = block_versions.entry(current).or_default().clone();
    if history == versions {
        stop = true;
    }

    let is_merge = !ctx.synthetic.contains(&current)
        && predecessors(func, current).len() >= 2
        && live_out_pred_count(func, current, old_value, ctx) >= 2;

    if is_merge && phi_has_version_incoming(func, current, previous, &versions) {
        // A prior path already placed (and propagated) the merge phi here;
        // fix its incoming for our edge and halt this path.
        let inst_ids: Vec<_> = func.blocks[current].insts.clone();
        for inst_id in inst_ids {
            let Op::Phi { incomings } = &func.insts[inst_id].op else {
                break;
            };
            let needs_update = incomings
                .iter()
                .any(|&(v, b)| b == previous && versions.contains(&v) && v != new_value);
            if needs_update {
                set_incoming_value(&mut func.insts[inst_id].op, previous, new_value)
                    .expect("matched incoming must exist");
            }
        }
        block_versions
            .get_mut(&current)
            .expect("visited above")
            .extend(versions);
        return;
    }

    if is_merge {
        // Fresh merge phi at the block head: our edge contributes the new
        // version, every other edge still carries the original.
        let preds = predecessors(func, current);
        let phi_ty = func.value_types[old_value].clone();
        let phi = func.new_value(phi_ty);
        let phi_name = format!("{}.phi", func.value_label(new_value));
        func.set_unique_value_name(phi, phi_name);
        let incomings: Vec<(ValueId, BlockId)> = preds
            .iter()
            .map(|&p| {
                let v = if p == previous { new_value } else { old_value };
                versions.insert(v);
                (v, p)
            })
            .collect();
        let phi_inst = func.add_inst(Op::Phi { incomings }, Some(phi));
        func.insert_at_head(current, phi_inst);

        let inst_ids: Vec<_> = func.blocks[current].insts.clone();
        for inst_id in inst_ids {
            if inst_id == phi_inst {
                continue;
            }
            if !func.insts[inst_id].op.is_phi() {
                replace_value_uses(&mut func.insts[inst_id].op, old_value, phi);
            }
            // A redefinition of a known version rebinds everything below it.
            if let Some(r) = func.insts[inst_id].result {
                if versions.contains(&r) {
                    stop = true;
                }
            }
        }
        versions.insert(phi);
        block_versions
            .get_mut(&current)
            .expect("visited above")
            .extend(versions.iter().copied());

        if !stop {
            for succ in succs {
                if succ != current {
                    queue.push_back(UpdateRequest {
                        current: succ,
                        previous: current,
                        old_value,
                        new_value: phi,
                        versions: versions.clone(),
                    });
                }
            }
        }
        return;
    }

    // Plain propagation: rewrite uses and keep walking. Phi incomings count
    // as uses here — this is what hands a loop header's back edge the
    // post-checkpoint version. A block that merges the value over two
    // live-out edges never reaches this arm.
    let inst_ids: Vec<_> = func.blocks[current].insts.clone();
    for inst_id in inst_ids {
        replace_value_uses(&mut func.insts[inst_id].op, old_value, new_value);
        if let Some(r) = func.insts[inst_id].result {
            if versions.contains(&r) {
                stop = true;
            }
        }
    }
    versions.insert(new_value);
    block_versions
        .get_mut(&current)
        .expect("visited above")
        .extend(versions.iter().copied());

    if !stop {
        for succ in succs {
            if succ != current {
                queue.push_back(UpdateRequest {
                    current: succ,
                    previous: current,
                    old_value,
                    new_value,
                    versions: versions.clone(),
                });
            }
        }
    }
}
