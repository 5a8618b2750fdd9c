//! Checkpoint id assignment and the restore-controller dispatch switch.

use crate::ir::cfg::terminator;
use crate::ir::{BlockId, Function, Op, Type, ValueId};

use super::emit::{emit_heartbeat, seg_const, EmittedSite, CKPT_ID};

/// Assign dense ids (from 1, in site order), tag the per-site blocks with
/// `.id<N>` names, store the id and bump the heartbeat on each save/restore
/// path, and finally replace the restore controller's terminator with the
/// dispatch switch: id 0 falls through to the original successor, every
/// other id jumps to its restore block.
pub fn assign_ids_and_dispatch(
    func: &mut Function,
    sites: &[EmittedSite],
    rc: BlockId,
    rc_succ: BlockId,
    seg: ValueId,
    elem_ty: &Type,
) {
    let mut cases = Vec::with_capacity(sites.len());

    for (k, site) in sites.iter().enumerate() {
        let id = (k + 1) as i64;
        for block in [
            site.topo.save_block,
            site.topo.restore_block,
            site.topo.junction_block,
        ] {
            let label = func.block_label(block);
            func.set_block_name(block, format!("{label}.id{id}"));
        }

        // Persist the id on the save path.
        let idx = func.new_value(Type::Int(32));
        let idx_inst = func.add_inst(Op::Const(crate::ir::Constant::Int(CKPT_ID)), Some(idx));
        func.insert_before_terminator(site.topo.save_block, idx_inst);
        let seg_ty = func.value_types[seg].clone();
        let p = func.new_value(seg_ty);
        func.set_unique_value_name(p, "idx_ckpt_id");
        let p_inst = func.add_inst(Op::ElemPtr { base: seg, index: idx }, Some(p));
        func.insert_before_terminator(site.topo.save_block, p_inst);
        let id_val = func.new_value(elem_ty.clone());
        let id_inst = func.add_inst(Op::Const(seg_const(elem_ty, id)), Some(id_val));
        func.insert_before_terminator(site.topo.save_block, id_inst);
        let store = func.add_inst(Op::Store { ptr: p, value: id_val }, None);
        func.insert_before_terminator(site.topo.save_block, store);

        emit_heartbeat(func, site.topo.save_block, seg, elem_ty);
        emit_heartbeat(func, site.topo.restore_block, seg, elem_ty);

        cases.push((seg_const(elem_ty, id), site.topo.restore_block));
    }

    // Load the persisted id in the controller and dispatch on it.
    let idx = func.new_value(Type::Int(32));
    let idx_inst = func.add_inst(Op::Const(crate::ir::Constant::Int(CKPT_ID)), Some(idx));
    func.insert_before_terminator(rc, idx_inst);
    let seg_ty = func.value_types[seg].clone();
    let p = func.new_value(seg_ty);
    func.set_unique_value_name(p, "idx_ckpt_id_load");
    let p_inst = func.add_inst(Op::ElemPtr { base: seg, index: idx }, Some(p));
    func.insert_before_terminator(rc, p_inst);
    let loaded = func.new_value(elem_ty.clone());
    func.set_unique_value_name(loaded, "load.ckpt_id");
    let load_inst = func.add_inst(Op::Load(p), Some(loaded));
    func.insert_before_terminator(rc, load_inst);

    let term = terminator(func, rc).expect("controller has a terminator");
    func.insts[term].op = Op::Switch {
        value: loaded,
        cases,
        default: rc_succ,
    };
}
