//! Save / restore / junction code emission.
//!
//! Tracked values occupy contiguous cells starting at [`VALUES_START`], in
//! the iteration order of the tracked set. Reserved-cell traffic is typed by
//! the segment's element type; value slots are typed by each tracked value's
//! own contained type.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Constant, Function, Op, Type, ValueId};

use super::topology::CheckpointTopo;

/// Monotonic counter; incremented on save and restore.
pub const HEARTBEAT: i64 = 0;
/// Last persisted checkpoint id (0 means none).
pub const CKPT_ID: i64 = 1;
/// Set to 1 upon entering a save block.
pub const IS_COMPLETE: i64 = 2;
/// Set by the wrapping workload, not by the pass.
pub const COMPLETED: i64 = 3;
/// First cell available for tracked values.
pub const VALUES_START: i64 = 4;

/// One emitted site: its topology, its tracked values in slot order, and the
/// junction phi for each tracked value.
pub struct EmittedSite {
    pub topo: CheckpointTopo,
    pub tracked: Vec<ValueId>,
    pub junction_phis: HashMap<ValueId, ValueId>,
}

/// A constant of the segment's element type.
pub(crate) fn seg_const(elem_ty: &Type, n: i64) -> Constant {
    match elem_ty {
        Type::Float(_) => Constant::Float(n as f64),
        _ => Constant::Int(n),
    }
}

fn emit_value(
    func: &mut Function,
    block: BlockId,
    op: Op,
    ty: Type,
    name: Option<String>,
) -> ValueId {
    let v = func.new_value(ty);
    if let Some(n) = name {
        func.set_unique_value_name(v, n);
    }
    let inst = func.add_inst(op, Some(v));
    func.insert_before_terminator(block, inst);
    v
}

fn emit_void(func: &mut Function, block: BlockId, op: Op) {
    let inst = func.add_inst(op, None);
    func.insert_before_terminator(block, inst);
}

/// `slot = gep(seg, index)` before the block's terminator.
fn emit_slot_ptr(
    func: &mut Function,
    block: BlockId,
    seg: ValueId,
    index: i64,
    name: Option<String>,
) -> ValueId {
    let idx = emit_value(
        func,
        block,
        Op::Const(Constant::Int(index)),
        Type::Int(32),
        None,
    );
    let seg_ty = func.value_types[seg].clone();
    emit_value(func, block, Op::ElemPtr { base: seg, index: idx }, seg_ty, name)
}

/// Load-increment-store of the heartbeat cell.
pub(crate) fn emit_heartbeat(func: &mut Function, block: BlockId, seg: ValueId, elem_ty: &Type) {
    let p = emit_slot_ptr(func, block, seg, HEARTBEAT, Some("idx_heartbeat".into()));
    let h = emit_value(
        func,
        block,
        Op::Load(p),
        elem_ty.clone(),
        Some("load.heartbeat".into()),
    );
    let one = emit_value(
        func,
        block,
        Op::Const(seg_const(elem_ty, 1)),
        elem_ty.clone(),
        None,
    );
    let h2 = emit_value(
        func,
        block,
        Op::Add(h, one),
        elem_ty.clone(),
        Some("heartbeat_incr".into()),
    );
    emit_void(func, block, Op::Store { ptr: p, value: h2 });
}

/// Populate one site's save and restore blocks and place the junction phis.
///
/// Records the live-out override sets for the three synthetic blocks — always
/// in terms of the *original* tracked value, so the propagation phase can
/// reason uniformly with the precomputed liveness.
pub fn emit_site(
    func: &mut Function,
    topo: CheckpointTopo,
    tracked: &[ValueId],
    seg: ValueId,
    elem_ty: &Type,
    live_out_overrides: &mut HashMap<BlockId, HashSet<ValueId>>,
) -> EmittedSite {
    let mut junction_phis = HashMap::new();

    for (k, &v) in tracked.iter().enumerate() {
        let slot = VALUES_START + k as i64;
        let v_ty = func.value_types[v].clone();
        let contained = v_ty.pointee().cloned().unwrap_or_else(|| v_ty.clone());
        let label = func.value_label(v);

        // Save path: dereference pointers, then store into the slot.
        let to_save = if v_ty.is_ptr() {
            emit_value(
                func,
                topo.save_block,
                Op::Load(v),
                contained.clone(),
                Some(format!("deref_{label}")),
            )
        } else {
            v
        };
        let p = emit_slot_ptr(func, topo.save_block, seg, slot, Some(format!("idx_{label}")));
        emit_void(func, topo.save_block, Op::Store { ptr: p, value: to_save });

        // Restore path: reload the slot; pointers get a fresh cell.
        let p_r = emit_slot_ptr(
            func,
            topo.restore_block,
            seg,
            slot,
            Some(format!("idx_{label}")),
        );
        let loaded = emit_value(
            func,
            topo.restore_block,
            Op::Load(p_r),
            contained.clone(),
            Some(format!("load.{label}")),
        );
        let restored = if v_ty.is_ptr() {
            let cell = emit_value(
                func,
                topo.restore_block,
                Op::Alloc(contained.clone()),
                Type::ptr_to(contained.clone()),
                Some(format!("alloca.{label}")),
            );
            emit_void(
                func,
                topo.restore_block,
                Op::Store {
                    ptr: cell,
                    value: loaded,
                },
            );
            cell
        } else {
            loaded
        };

        // Junction phi merging the two paths.
        let phi = func.new_value(v_ty.clone());
        func.set_unique_value_name(phi, format!("new.{label}"));
        let phi_inst = func.add_inst(
            Op::Phi {
                incomings: vec![(v, topo.save_block), (restored, topo.restore_block)],
            },
            Some(phi),
        );
        func.insert_after_phis(topo.junction_block, phi_inst);
        junction_phis.insert(v, phi);

        for block in [topo.save_block, topo.restore_block, topo.junction_block] {
            live_out_overrides.entry(block).or_default().insert(v);
        }
    }

    // Completion flag on the save path.
    let p = emit_slot_ptr(
        func,
        topo.save_block,
        seg,
        IS_COMPLETE,
        Some("idx_is_complete".into()),
    );
    let one = emit_value(
        func,
        topo.save_block,
        Op::Const(seg_const(elem_ty, 1)),
        elem_ty.clone(),
        None,
    );
    emit_void(func, topo.save_block, Op::Store { ptr: p, value: one });

    EmittedSite {
        topo,
        tracked: tracked.to_vec(),
        junction_phis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::{FunctionSig, Type};
    use crate::transforms::checkpoint::topology::build_site;

    fn site_fixture(value_ty: Type) -> (Function, ValueId, CheckpointTopo) {
        let sig = FunctionSig {
            params: vec![value_ty, Type::ptr_to(Type::Int(32))],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let v = fb.param(0);
        fb.name_value(v, "x");
        let seg = fb.param(1);
        fb.name_value(seg, "ckpt_mem");
        let a = fb.create_block("a");
        let b = fb.create_block("b");
        fb.br(a);
        fb.switch_to_block(a);
        fb.br(b);
        fb.switch_to_block(b);
        fb.ret(None);
        let mut func = fb.build();
        let a = func.block_by_name("a").unwrap();
        let topo = build_site(&mut func, a).unwrap();
        (func, v, topo)
    }

    fn ops_of(func: &Function, block: BlockId) -> Vec<&Op> {
        func.blocks[block]
            .insts
            .iter()
            .map(|&id| &func.insts[id].op)
            .collect()
    }

    #[test]
    fn scalar_save_restore_shapes() {
        let (mut func, v, topo) = site_fixture(Type::Int(32));
        let seg = func.param_named("ckpt_mem").unwrap();
        let mut overrides = HashMap::new();

        let es = emit_site(&mut func, topo, &[v], seg, &Type::Int(32), &mut overrides);

        // Save: slot const, elem_ptr, store x; is_complete const, elem_ptr,
        // const 1, store; then the original Br.
        let save_ops = ops_of(&func, es.topo.save_block);
        assert!(save_ops
            .iter()
            .any(|op| matches!(op, Op::Store { value, .. } if *value == v)));
        assert!(matches!(save_ops.last().unwrap(), Op::Br { .. }));

        // Restore: elem_ptr + load, no alloc for scalars.
        let restore_ops = ops_of(&func, es.topo.restore_block);
        assert!(restore_ops.iter().any(|op| matches!(op, Op::Load(_))));
        assert!(!restore_ops.iter().any(|op| matches!(op, Op::Alloc(_))));

        // Junction: exactly one phi with incomings from save and restore.
        let junction_ops = ops_of(&func, es.topo.junction_block);
        match junction_ops[0] {
            Op::Phi { incomings } => {
                assert_eq!(incomings.len(), 2);
                assert!(incomings.contains(&(v, es.topo.save_block)));
            }
            other => panic!("expected junction phi, got {other:?}"),
        }

        // Overrides speak in the original value.
        assert!(overrides[&es.topo.junction_block].contains(&v));
        assert!(overrides[&es.topo.save_block].contains(&v));
        assert!(overrides[&es.topo.restore_block].contains(&v));
    }

    #[test]
    fn pointer_values_deref_on_save_and_realloc_on_restore() {
        let (mut func, v, topo) = site_fixture(Type::ptr_to(Type::Int(32)));
        let seg = func.param_named("ckpt_mem").unwrap();
        let mut overrides = HashMap::new();

        let es = emit_site(&mut func, topo, &[v], seg, &Type::Int(32), &mut overrides);

        // Save dereferences the pointer before storing.
        let save_ops = ops_of(&func, es.topo.save_block);
        assert!(save_ops.iter().any(|op| matches!(op, Op::Load(p) if *p == v)));

        // Restore allocates a fresh cell and stores the loaded value into it.
        let restore_ops = ops_of(&func, es.topo.restore_block);
        assert!(restore_ops.iter().any(|op| matches!(op, Op::Alloc(_))));

        // The junction phi's restore incoming is the fresh allocation (a
        // pointer), matching the original value's type.
        let phi = es.junction_phis[&v];
        assert_eq!(func.value_types[phi], Type::ptr_to(Type::Int(32)));
    }

    #[test]
    fn slot_assignment_is_deterministic() {
        let sig = FunctionSig {
            params: vec![Type::Int(32), Type::Int(32), Type::ptr_to(Type::Int(32))],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let x = fb.param(0);
        fb.name_value(x, "x");
        let y = fb.param(1);
        fb.name_value(y, "y");
        let seg = fb.param(2);
        fb.name_value(seg, "ckpt_mem");
        let a = fb.create_block("a");
        let b = fb.create_block("b");
        fb.br(a);
        fb.switch_to_block(a);
        fb.br(b);
        fb.switch_to_block(b);
        fb.ret(None);
        let mut func = fb.build();
        let a = func.block_by_name("a").unwrap();
        let topo = build_site(&mut func, a).unwrap();

        let mut overrides = HashMap::new();
        let es = emit_site(&mut func, topo, &[x, y], seg, &Type::Int(32), &mut overrides);

        // Slots are assigned in tracked order: x at VALUES_START, y next.
        // Both the save and restore blocks must agree.
        let slot_consts = |block: BlockId| -> Vec<i64> {
            func.blocks[block]
                .insts
                .iter()
                .filter_map(|&id| match &func.insts[id].op {
                    Op::Const(Constant::Int(n)) if *n >= VALUES_START => Some(*n),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(
            slot_consts(es.topo.save_block),
            vec![VALUES_START, VALUES_START + 1]
        );
        assert_eq!(
            slot_consts(es.topo.restore_block),
            vec![VALUES_START, VALUES_START + 1]
        );
    }
}
