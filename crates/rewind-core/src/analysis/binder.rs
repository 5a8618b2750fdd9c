//! Rebuilds pointer-level analysis maps from the name-level JSON maps.
//!
//! The JSON speaks in printer names; the pass needs `ValueId`s and
//! `BlockId`s. Within one function every named value reachable as a
//! parameter, result, or operand must have a unique name — two distinct
//! values sharing a name make the function untransformable.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::CoreError;
use crate::ir::{BlockId, Function, ValueId};
use crate::transforms::util::value_operands;

use super::loader::{strip_sigil, BlockLivenessJson};

/// Live-in / live-out sets for one block, bound to value ids.
#[derive(Debug, Clone, Default)]
pub struct LiveSets {
    pub live_in: HashSet<ValueId>,
    pub live_out: HashSet<ValueId>,
}

/// Map every named value in the function to its id.
///
/// Collects parameters, instruction results, and instruction operands.
/// Returns `AmbiguousName` if two distinct values share a name.
pub fn function_value_index(func: &Function) -> Result<HashMap<String, ValueId>, CoreError> {
    let mut index: HashMap<String, ValueId> = HashMap::new();

    let mut add = |v: ValueId| -> Result<(), CoreError> {
        let Some(name) = func.value_name(v) else {
            return Ok(());
        };
        match index.get(name) {
            Some(&existing) if existing != v => Err(CoreError::AmbiguousName {
                function: func.name.clone(),
                name: name.to_string(),
            }),
            _ => {
                index.insert(name.to_string(), v);
                Ok(())
            }
        }
    };

    for &p in &func.params {
        add(p)?;
    }
    for block in func.blocks.values() {
        for &inst_id in &block.insts {
            let inst = &func.insts[inst_id];
            if let Some(r) = inst.result {
                add(r)?;
            }
            for v in value_operands(&inst.op) {
                add(v)?;
            }
        }
    }
    Ok(index)
}

/// Map every named block in the function to its id.
pub fn function_block_index(func: &Function) -> HashMap<String, BlockId> {
    func.block_names
        .iter()
        .map(|(&b, n)| (n.clone(), b))
        .collect()
}

/// Bind one function's tracked-values map. Unknown block or value names are
/// reported on stderr and dropped; value order within a block is preserved.
pub fn bind_tracked(
    func: &Function,
    by_name: &BTreeMap<String, Vec<String>>,
) -> Result<HashMap<BlockId, Vec<ValueId>>, CoreError> {
    let values = function_value_index(func)?;
    let blocks = function_block_index(func);

    let mut bound: HashMap<BlockId, Vec<ValueId>> = HashMap::new();
    for (block_name, val_names) in by_name {
        let Some(&block) = blocks.get(strip_sigil(block_name)) else {
            eprintln!(
                "warning: tracked-values block '{}' not found in function '{}'",
                block_name, func.name
            );
            continue;
        };
        let mut vals = Vec::new();
        for val_name in val_names {
            match values.get(strip_sigil(val_name)) {
                Some(&v) if !vals.contains(&v) => vals.push(v),
                Some(_) => {}
                None => eprintln!(
                    "warning: tracked value '{}' not found in function '{}'",
                    val_name, func.name
                ),
            }
        }
        bound.insert(block, vals);
    }
    Ok(bound)
}

/// Bind one function's liveness map.
pub fn bind_liveness(
    func: &Function,
    by_name: &BTreeMap<String, BlockLivenessJson>,
) -> Result<HashMap<BlockId, LiveSets>, CoreError> {
    let values = function_value_index(func)?;
    let blocks = function_block_index(func);

    let resolve = |names: &[String]| -> HashSet<ValueId> {
        names
            .iter()
            .filter_map(|n| {
                let v = values.get(strip_sigil(n)).copied();
                if v.is_none() {
                    eprintln!(
                        "warning: live value '{}' not found in function '{}'",
                        n, func.name
                    );
                }
                v
            })
            .collect()
    };

    let mut bound: HashMap<BlockId, LiveSets> = HashMap::new();
    for (block_name, sets) in by_name {
        let Some(&block) = blocks.get(strip_sigil(block_name)) else {
            eprintln!(
                "warning: liveness block '{}' not found in function '{}'",
                block_name, func.name
            );
            continue;
        };
        bound.insert(
            block,
            LiveSets {
                live_in: resolve(&sets.live_in),
                live_out: resolve(&sets.live_out),
            },
        );
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::{FunctionSig, Type};

    fn named_func() -> Function {
        let sig = FunctionSig {
            params: vec![Type::Int(32)],
            return_ty: Type::Int(32),
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let n = fb.param(0);
        fb.name_value(n, "n");
        let one = fb.const_int(1);
        let next = fb.add(n, one);
        fb.name_value(next, "next");
        fb.ret(Some(next));
        fb.build()
    }

    #[test]
    fn binds_tracked_values_in_order() {
        let func = named_func();
        let mut by_name = BTreeMap::new();
        by_name.insert("entry".to_string(), vec!["%next".to_string(), "%n".to_string()]);

        let bound = bind_tracked(&func, &by_name).unwrap();
        let vals = &bound[&func.entry];
        assert_eq!(vals.len(), 2);
        assert_eq!(func.value_name(vals[0]), Some("next"));
        assert_eq!(func.value_name(vals[1]), Some("n"));
    }

    #[test]
    fn unknown_names_are_dropped() {
        let func = named_func();
        let mut by_name = BTreeMap::new();
        by_name.insert("entry".to_string(), vec!["%ghost".to_string()]);
        by_name.insert("nowhere".to_string(), vec!["%n".to_string()]);

        let bound = bind_tracked(&func, &by_name).unwrap();
        assert!(bound[&func.entry].is_empty());
        assert_eq!(bound.len(), 1);
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let mut func = named_func();
        // Give a second value the name "n".
        let ghost = func.new_value(Type::Int(32));
        func.set_value_name(ghost, "n");
        let inst = func.add_inst(crate::ir::Op::Neg(ghost), Some(ghost));
        // Place it so the index walk sees it.
        let entry = func.entry;
        func.insert_before_terminator(entry, inst);

        let err = function_value_index(&func).unwrap_err();
        assert!(matches!(err, CoreError::AmbiguousName { .. }));
    }

    #[test]
    fn binds_liveness_sets() {
        let func = named_func();
        let mut by_name = BTreeMap::new();
        by_name.insert(
            "entry".to_string(),
            BlockLivenessJson {
                live_in: vec!["%n".into()],
                live_out: vec!["%n".into(), "%next".into()],
            },
        );
        let bound = bind_liveness(&func, &by_name).unwrap();
        let sets = &bound[&func.entry];
        assert_eq!(sets.live_in.len(), 1);
        assert_eq!(sets.live_out.len(), 2);
    }
}
