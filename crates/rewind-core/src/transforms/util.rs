use crate::error::CoreError;
use crate::ir::{BlockId, Op, ValueId};

/// Extract branch targets from a control-flow instruction.
pub fn branch_targets(op: &Op) -> Vec<BlockId> {
    match op {
        Op::Br { target } => vec![*target],
        Op::BrIf {
            then_target,
            else_target,
            ..
        } => vec![*then_target, *else_target],
        Op::Switch { cases, default, .. } => {
            let mut targets: Vec<BlockId> = cases.iter().map(|(_, t)| *t).collect();
            targets.push(*default);
            targets
        }
        _ => vec![],
    }
}

/// Extract all ValueId operands from an Op.
pub fn value_operands(op: &Op) -> Vec<ValueId> {
    match op {
        Op::Const(_) | Op::Alloc(_) => vec![],
        Op::Add(a, b)
        | Op::Sub(a, b)
        | Op::Mul(a, b)
        | Op::Div(a, b)
        | Op::Rem(a, b) => vec![*a, *b],
        Op::Neg(a) => vec![*a],
        Op::Cmp(_, a, b) => vec![*a, *b],
        Op::Phi { incomings } => incomings.iter().map(|(v, _)| *v).collect(),
        Op::Br { .. } => vec![],
        Op::BrIf { cond, .. } => vec![*cond],
        Op::Switch { value, .. } => vec![*value],
        Op::Return(v) => v.iter().copied().collect(),
        Op::Load(ptr) => vec![*ptr],
        Op::Store { ptr, value } => vec![*ptr, *value],
        Op::ElemPtr { base, index } => vec![*base, *index],
        Op::Call { args, .. } => args.clone(),
    }
}

/// Replace every use of `old` in the operation's operand list with `new`.
/// Returns whether any replacement occurred. Phi incomings count as operands.
pub fn replace_value_uses(op: &mut Op, old: ValueId, new: ValueId) -> bool {
    let mut replaced = false;
    let mut sub = |v: &mut ValueId| {
        if *v == old {
            *v = new;
            replaced = true;
        }
    };

    match op {
        Op::Const(_) | Op::Alloc(_) | Op::Br { .. } => {}
        Op::Add(a, b)
        | Op::Sub(a, b)
        | Op::Mul(a, b)
        | Op::Div(a, b)
        | Op::Rem(a, b) => {
            sub(a);
            sub(b);
        }
        Op::Neg(a) => sub(a),
        Op::Cmp(_, a, b) => {
            sub(a);
            sub(b);
        }
        Op::Phi { incomings } => {
            for (v, _) in incomings {
                sub(v);
            }
        }
        Op::BrIf { cond, .. } => sub(cond),
        Op::Switch { value, .. } => sub(value),
        Op::Return(v) => {
            if let Some(v) = v {
                sub(v);
            }
        }
        Op::Load(ptr) => sub(ptr),
        Op::Store { ptr, value } => {
            sub(ptr);
            sub(value);
        }
        Op::ElemPtr { base, index } => {
            sub(base);
            sub(index);
        }
        Op::Call { args, .. } => {
            for a in args {
                sub(a);
            }
        }
    }
    replaced
}

/// Set every incoming of a phi whose predecessor equals `pred` to `value`.
/// At least one incoming must match.
pub fn set_incoming_value(op: &mut Op, pred: BlockId, value: ValueId) -> Result<(), CoreError> {
    let Op::Phi { incomings } = op else {
        return Err(CoreError::InvalidIr(
            "set_incoming_value on a non-phi instruction".into(),
        ));
    };
    let mut found = false;
    for (v, b) in incomings {
        if *b == pred {
            *v = value;
            found = true;
        }
    }
    if found {
        Ok(())
    } else {
        Err(CoreError::InvalidIr(format!(
            "phi has no incoming for predecessor {pred:?}"
        )))
    }
}

/// Retarget a phi's incoming edges: predecessors equal to `old` become `new`.
pub fn retarget_phi_incomings(op: &mut Op, old: BlockId, new: BlockId) {
    if let Op::Phi { incomings } = op {
        for (_, b) in incomings {
            if *b == old {
                *b = new;
            }
        }
    }
}
