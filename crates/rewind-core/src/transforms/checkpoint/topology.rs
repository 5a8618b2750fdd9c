//! Subroutine topology: the restore controller and the per-site
//! save / junction / restore block arrangement.

use crate::error::CoreError;
use crate::ir::cfg::{split_edge, successors};
use crate::ir::{BlockId, Function, Op};

/// The five-block tuple produced for each checkpoint site.
#[derive(Debug, Clone)]
pub struct CheckpointTopo {
    /// The original site (sentinel already removed).
    pub checkpoint_block: BlockId,
    /// Inserted on the edge from the site to its successor.
    pub save_block: BlockId,
    /// Reachable only from the restore controller; branches to the junction.
    pub restore_block: BlockId,
    /// Where the save path and restore path merge.
    pub junction_block: BlockId,
    /// The original successor, now downstream of the junction.
    pub resume_block: BlockId,
}

/// Insert the restore controller on the edge from entry to its first
/// successor. Returns the controller and its (sole) successor — the
/// fall-through target of the eventual dispatch switch.
pub fn insert_restore_controller(func: &mut Function) -> Result<(BlockId, BlockId), CoreError> {
    let entry = func.entry;
    let succs = successors(func, entry);
    let Some(&target) = succs.first() else {
        return Err(CoreError::InvalidEntry {
            function: func.name.clone(),
        });
    };
    let name = format!("{}.restore_ctl", func.name);
    let rc = split_edge(func, entry, target, name).map_err(|_| CoreError::InvalidEntry {
        function: func.name.clone(),
    })?;
    Ok((rc, target))
}

/// Build the save/junction/restore blocks for one site.
pub fn build_site(func: &mut Function, site: BlockId) -> Result<CheckpointTopo, CoreError> {
    let succs = successors(func, site);
    if succs.len() != 1 {
        return Err(CoreError::UnsupportedSite {
            function: func.name.clone(),
            block: func.block_label(site),
        });
    }
    let label = func.block_label(site);

    let save_block = split_edge(func, site, succs[0], format!("{label}.save"))?;
    let resume_block = successors(func, save_block)[0];
    let junction_block = split_edge(func, save_block, resume_block, format!("{label}.junction"))?;

    let restore_block = func.add_block(format!("{label}.restore"));
    let br = func.add_inst(
        Op::Br {
            target: junction_block,
        },
        None,
    );
    func.blocks[restore_block].insts.push(br);

    Ok(CheckpointTopo {
        checkpoint_block: site,
        save_block,
        restore_block,
        junction_block,
        resume_block,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::cfg::predecessors;
    use crate::ir::{FunctionSig, Type};

    fn linear() -> Function {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("f", sig);
        let a = fb.create_block("a");
        let b = fb.create_block("b");
        fb.br(a);
        fb.switch_to_block(a);
        fb.br(b);
        fb.switch_to_block(b);
        fb.ret(None);
        fb.build()
    }

    #[test]
    fn controller_lands_between_entry_and_successor() {
        let mut func = linear();
        let a = func.block_by_name("a").unwrap();
        let (rc, rc_succ) = insert_restore_controller(&mut func).unwrap();
        assert_eq!(rc_succ, a);
        assert_eq!(successors(&func, func.entry), vec![rc]);
        assert_eq!(successors(&func, rc), vec![a]);
    }

    #[test]
    fn single_block_function_is_rejected() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("tiny", sig);
        fb.ret(None);
        let mut func = fb.build();
        let err = insert_restore_controller(&mut func).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEntry { .. }));
    }

    #[test]
    fn site_quintuple_shape() {
        let mut func = linear();
        let a = func.block_by_name("a").unwrap();
        let b = func.block_by_name("b").unwrap();

        let topo = build_site(&mut func, a).unwrap();

        assert_eq!(topo.checkpoint_block, a);
        assert_eq!(topo.resume_block, b);
        assert_eq!(successors(&func, a), vec![topo.save_block]);
        assert_eq!(successors(&func, topo.save_block), vec![topo.junction_block]);
        assert_eq!(successors(&func, topo.junction_block), vec![b]);
        assert_eq!(successors(&func, topo.restore_block), vec![topo.junction_block]);
        // The junction merges the save and restore paths.
        let mut preds = predecessors(&func, topo.junction_block);
        preds.sort();
        let mut expected = vec![topo.save_block, topo.restore_block];
        expected.sort();
        assert_eq!(preds, expected);
        assert_eq!(func.block_label(topo.save_block), "a.save");
        assert_eq!(func.block_label(topo.junction_block), "a.junction");
        assert_eq!(func.block_label(topo.restore_block), "a.restore");
    }
}
