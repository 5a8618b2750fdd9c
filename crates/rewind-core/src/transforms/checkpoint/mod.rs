//! Checkpoint subroutine injection.
//!
//! Rewrites functions annotated with `checkpoint` sentinel calls so they can
//! persist their tracked live state into a caller-owned memory segment and
//! resume from it on a later invocation. Per site, a save block and a
//! restore block are spliced around the marked block, merged at a junction;
//! a per-function restore controller dispatches on the persisted checkpoint
//! id at entry. A BFS repair pass then rewrites downstream uses so the IR
//! stays in SSA form on both the save and the restore path.

pub mod dispatch;
pub mod emit;
pub mod propagate;
pub mod select;
pub mod topology;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::analysis::loader::{strip_sigil, BlockLivenessJson, LivenessByName, TrackedValuesByName};
use crate::analysis::binder;
use crate::error::CoreError;
use crate::ir::cfg::successors;
use crate::ir::{BlockId, Function, Module, Type, ValueId};
use crate::pipeline::{Transform, TransformResult};

pub use emit::{CKPT_ID, COMPLETED, HEARTBEAT, IS_COMPLETE, VALUES_START};
pub use topology::CheckpointTopo;

/// Conventional name of the memory-segment parameter.
pub const SEGMENT_PARAM: &str = "ckpt_mem";
/// Substring that marks a call as a checkpoint directive.
pub const SENTINEL: &str = "checkpoint";

/// A non-fatal per-function or per-site notice.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub function: String,
    pub detail: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.function, self.detail)
    }
}

/// What a run did to the module.
pub struct InjectionOutcome {
    pub changed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// The pass. Holds the by-name analysis results; binding to value and block
/// ids happens per function at run time.
pub struct CheckpointInjection {
    tracked: TrackedValuesByName,
    liveness: LivenessByName,
    segment_param: String,
}

impl CheckpointInjection {
    pub fn new(tracked: TrackedValuesByName, liveness: LivenessByName) -> Self {
        Self {
            tracked,
            liveness,
            segment_param: SEGMENT_PARAM.to_string(),
        }
    }

    /// Run over every function in module order. Failed functions are left
    /// untouched; failures become diagnostics.
    pub fn run(&self, module: &mut Module) -> InjectionOutcome {
        let tracked_by_fn: HashMap<&str, &BTreeMap<String, Vec<String>>> = self
            .tracked
            .iter()
            .map(|(k, v)| (strip_sigil(k), v))
            .collect();
        let liveness_by_fn: HashMap<&str, &BTreeMap<String, BlockLivenessJson>> = self
            .liveness
            .iter()
            .map(|(k, v)| (strip_sigil(k), v))
            .collect();

        let mut changed = false;
        let mut diagnostics = Vec::new();

        for fid in module.functions.keys().collect::<Vec<_>>() {
            let func = &mut module.functions[fid];
            let fname = func.name.clone();

            let (Some(tracked), Some(liveness)) = (
                tracked_by_fn.get(fname.as_str()),
                liveness_by_fn.get(fname.as_str()),
            ) else {
                diagnostics.push(Diagnostic {
                    function: fname.clone(),
                    detail: CoreError::MissingAnalysis { function: fname }.to_string(),
                });
                continue;
            };

            match inject_function(func, tracked, liveness, &self.segment_param, &mut diagnostics)
            {
                Ok(true) => changed = true,
                Ok(false) => {}
                Err(e) => diagnostics.push(Diagnostic {
                    function: fname,
                    detail: e.to_string(),
                }),
            }
        }

        InjectionOutcome {
            changed,
            diagnostics,
        }
    }
}

impl Transform for CheckpointInjection {
    fn name(&self) -> &str {
        "checkpoint-injection"
    }

    fn apply(&self, mut module: Module) -> Result<TransformResult, CoreError> {
        let outcome = self.run(&mut module);
        for d in &outcome.diagnostics {
            eprintln!("warning: {d}");
        }
        Ok(TransformResult {
            module,
            changed: outcome.changed,
        })
    }
}

/// Transform one function. Works on a clone and commits it only when at
/// least one site was injected, so a failed function really is untouched.
fn inject_function(
    func: &mut Function,
    tracked_by_name: &BTreeMap<String, Vec<String>>,
    liveness_by_name: &BTreeMap<String, BlockLivenessJson>,
    segment_param: &str,
    diags: &mut Vec<Diagnostic>,
) -> Result<bool, CoreError> {
    let tracked_map = binder::bind_tracked(func, tracked_by_name)?;
    let liveness_map = binder::bind_liveness(func, liveness_by_name)?;

    let seg = func
        .param_named(segment_param)
        .ok_or_else(|| CoreError::NoMemorySegment {
            function: func.name.clone(),
            param: segment_param.to_string(),
        })?;
    let elem_ty = match &func.value_types[seg] {
        Type::Ptr(inner) if !inner.is_ptr() && !inner.is_aggregate() => (**inner).clone(),
        _ => {
            return Err(CoreError::NoMemorySegment {
                function: func.name.clone(),
                param: segment_param.to_string(),
            })
        }
    };

    if successors(func, func.entry).is_empty() {
        return Err(CoreError::InvalidEntry {
            function: func.name.clone(),
        });
    }

    let mut work = func.clone();

    let sites = select::select_sites(&mut work, &tracked_map, diags);
    if sites.is_empty() {
        diags.push(Diagnostic {
            function: func.name.clone(),
            detail: "no viable checkpoint directive found".into(),
        });
        return Ok(false);
    }

    let (rc, rc_succ) = topology::insert_restore_controller(&mut work)?;
    let mut synthetic: HashSet<BlockId> = HashSet::from([rc]);
    let mut overrides: HashMap<BlockId, HashSet<ValueId>> = HashMap::new();
    // The controller is a pass-through on the entry edge: everything live out
    // of entry is live out of it. Without this, a loop header whose other
    // predecessor is the controller is never seen as a merge.
    if let Some(sets) = liveness_map.get(&work.entry) {
        overrides.insert(rc, sets.live_out.clone());
    }
    let mut emitted: Vec<emit::EmittedSite> = Vec::new();

    for site in sites {
        let topo = match topology::build_site(&mut work, site.block) {
            Ok(t) => t,
            Err(e) => {
                diags.push(Diagnostic {
                    function: func.name.clone(),
                    detail: e.to_string(),
                });
                continue;
            }
        };
        synthetic.extend([topo.save_block, topo.junction_block, topo.restore_block]);
        emitted.push(emit::emit_site(
            &mut work,
            topo,
            &site.tracked,
            seg,
            &elem_ty,
            &mut overrides,
        ));
    }

    if emitted.is_empty() {
        diags.push(Diagnostic {
            function: func.name.clone(),
            detail: "no checkpoints were inserted".into(),
        });
        return Ok(false);
    }

    let ctx = propagate::PropagationCtx {
        liveness: &liveness_map,
        live_out_overrides: &overrides,
        synthetic: &synthetic,
    };
    for site in &emitted {
        for &v in &site.tracked {
            let phi = site.junction_phis[&v];
            propagate::propagate_restored_value(
                &mut work,
                site.topo.resume_block,
                site.topo.junction_block,
                v,
                phi,
                &ctx,
            );
        }
    }

    dispatch::assign_ids_and_dispatch(&mut work, &emitted, rc, rc_succ, seg, &elem_ty);

    // Erased sentinel calls would otherwise linger in the arena.
    work.compact_insts();

    *func = work;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::loader::{liveness_from_str, tracked_values_from_str};
    use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
    use crate::ir::verify::verify_module;
    use crate::ir::{FuncId, FunctionSig, Op};
    use crate::entity::EntityRef;

    /// entry -> A -> B -> exit, sentinel in A tracking {x}.
    fn linear_module() -> Module {
        let sig = FunctionSig {
            params: vec![Type::Int(32), Type::ptr_to(Type::Int(32))],
            return_ty: Type::Int(32),
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let x = fb.param(0);
        fb.name_value(x, "x");
        let seg = fb.param(1);
        fb.name_value(seg, "ckpt_mem");

        let a = fb.create_block("A");
        let b = fb.create_block("B");
        let exit = fb.create_block("exit");

        fb.br(a);
        fb.switch_to_block(a);
        fb.call_void("checkpoint", &[]);
        fb.br(b);
        fb.switch_to_block(b);
        let one = fb.const_int(1);
        let y = fb.add(x, one);
        fb.name_value(y, "y");
        fb.br(exit);
        fb.switch_to_block(exit);
        fb.ret(Some(y));

        let mut mb = ModuleBuilder::new("m");
        mb.add_function(fb.build());
        mb.build()
    }

    fn analyses() -> (TrackedValuesByName, LivenessByName) {
        let tracked = tracked_values_from_str(r#"{ "f": { "A": ["x"] } }"#).unwrap();
        let live = liveness_from_str(
            r#"{ "f": {
                "entry": { "in": ["x"], "out": ["x"] },
                "A":     { "in": ["x"], "out": ["x"] },
                "B":     { "in": ["x"], "out": ["y"] },
                "exit":  { "in": ["y"], "out": [] }
            } }"#,
        )
        .unwrap();
        (tracked, live)
    }

    #[test]
    fn linear_function_gains_subroutines() {
        let mut module = linear_module();
        let (tracked, live) = analyses();
        let pass = CheckpointInjection::new(tracked, live);

        let outcome = pass.run(&mut module);
        assert!(outcome.changed);

        let func = &module.functions[FuncId::new(0)];
        verify_module(&module).unwrap();

        for name in [
            "f.restore_ctl",
            "A.save.id1",
            "A.junction.id1",
            "A.restore.id1",
        ] {
            assert!(
                func.block_by_name(name).is_some(),
                "missing block '{name}'"
            );
        }

        // No sentinel calls remain.
        let any_sentinel = func
            .insts
            .values()
            .any(|i| matches!(&i.op, Op::Call { func, .. } if func.contains(SENTINEL)));
        assert!(!any_sentinel);

        // The controller dispatches on the loaded id with default A.
        let rc = func.block_by_name("f.restore_ctl").unwrap();
        let a = func.block_by_name("A").unwrap();
        let restore = func.block_by_name("A.restore.id1").unwrap();
        let term = *func.blocks[rc].insts.last().unwrap();
        match &func.insts[term].op {
            Op::Switch { cases, default, .. } => {
                assert_eq!(*default, a);
                assert_eq!(cases.len(), 1);
                assert_eq!(cases[0].1, restore);
            }
            other => panic!("expected dispatch switch, got {other:?}"),
        }
    }

    #[test]
    fn missing_analysis_skips_function() {
        let mut module = linear_module();
        let pass = CheckpointInjection::new(Default::default(), Default::default());
        let before = module.functions[FuncId::new(0)].blocks.len();

        let outcome = pass.run(&mut module);
        assert!(!outcome.changed);
        assert_eq!(module.functions[FuncId::new(0)].blocks.len(), before);
        assert!(outcome.diagnostics[0]
            .detail
            .contains("no tracked-values or liveness data"));
    }

    #[test]
    fn missing_segment_param_skips_function() {
        let sig = FunctionSig {
            params: vec![Type::Int(32)],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let x = fb.param(0);
        fb.name_value(x, "x");
        let a = fb.create_block("A");
        fb.br(a);
        fb.switch_to_block(a);
        fb.call_void("checkpoint", &[]);
        fb.ret(None);
        let mut mb = ModuleBuilder::new("m");
        mb.add_function(fb.build());
        let mut module = mb.build();

        let (tracked, live) = analyses();
        let pass = CheckpointInjection::new(tracked, live);
        let outcome = pass.run(&mut module);

        assert!(!outcome.changed);
        assert!(outcome.diagnostics[0].detail.contains("memory-segment"));
        // The sentinel call survives — the function was left untouched.
        let func = &module.functions[FuncId::new(0)];
        let any_sentinel = func
            .insts
            .values()
            .any(|i| matches!(&i.op, Op::Call { func, .. } if func.contains(SENTINEL)));
        assert!(any_sentinel);
    }

    #[test]
    fn modified_flag_false_without_directives() {
        // Analysis data exists but no block carries the sentinel.
        let sig = FunctionSig {
            params: vec![Type::Int(32), Type::ptr_to(Type::Int(32))],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let x = fb.param(0);
        fb.name_value(x, "x");
        let seg = fb.param(1);
        fb.name_value(seg, "ckpt_mem");
        let a = fb.create_block("A");
        fb.br(a);
        fb.switch_to_block(a);
        fb.ret(None);
        let mut mb = ModuleBuilder::new("m");
        mb.add_function(fb.build());
        let mut module = mb.build();

        let (tracked, live) = analyses();
        let pass = CheckpointInjection::new(tracked, live);
        let outcome = pass.run(&mut module);

        assert!(!outcome.changed);
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.detail.contains("no viable checkpoint directive")));
    }
}
