//! Human-readable IR printing, used by diagnostics and the CLI.

use std::fmt::Write;

use super::func::Function;
use super::inst::{CmpKind, Op};
use super::module::Module;
use super::ty::Type;
use super::value::{Constant, ValueId};

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module {}", module.name);
    for func in module.functions.values() {
        out.push('\n');
        out.push_str(&print_function(func));
    }
    out
}

pub fn print_function(func: &Function) -> String {
    let mut out = String::new();
    let params = func
        .params
        .iter()
        .map(|&p| format!("%{}: {}", func.value_label(p), fmt_ty(&func.value_types[p])))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "fn @{}({}) -> {} {{",
        func.name,
        params,
        fmt_ty(&func.sig.return_ty)
    );

    for (block_id, block) in func.blocks.iter() {
        if block.insts.is_empty() && block_id != func.entry {
            continue;
        }
        let _ = writeln!(out, "{}:", func.block_label(block_id));
        for &inst_id in &block.insts {
            let inst = &func.insts[inst_id];
            let rhs = fmt_op(func, &inst.op);
            match inst.result {
                Some(r) => {
                    let _ = writeln!(out, "  %{} = {}", func.value_label(r), rhs);
                }
                None => {
                    let _ = writeln!(out, "  {}", rhs);
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

fn fmt_ty(ty: &Type) -> String {
    match ty {
        Type::Void => "void".into(),
        Type::Bool => "bool".into(),
        Type::Int(w) => format!("i{w}"),
        Type::Float(w) => format!("f{w}"),
        Type::Ptr(inner) => format!("{}*", fmt_ty(inner)),
        Type::Array(inner) => format!("[{}]", fmt_ty(inner)),
    }
}

fn fmt_const(c: &Constant) -> String {
    match c {
        Constant::Bool(b) => b.to_string(),
        Constant::Int(i) => i.to_string(),
        Constant::Float(f) => format!("{f:?}"),
    }
}

fn fmt_val(func: &Function, v: ValueId) -> String {
    format!("%{}", func.value_label(v))
}

fn fmt_cmp(kind: CmpKind) -> &'static str {
    match kind {
        CmpKind::Eq => "eq",
        CmpKind::Ne => "ne",
        CmpKind::Lt => "lt",
        CmpKind::Le => "le",
        CmpKind::Gt => "gt",
        CmpKind::Ge => "ge",
    }
}

fn fmt_op(func: &Function, op: &Op) -> String {
    let v = |id: ValueId| fmt_val(func, id);
    match op {
        Op::Const(c) => format!("const {}", fmt_const(c)),
        Op::Add(a, b) => format!("add {}, {}", v(*a), v(*b)),
        Op::Sub(a, b) => format!("sub {}, {}", v(*a), v(*b)),
        Op::Mul(a, b) => format!("mul {}, {}", v(*a), v(*b)),
        Op::Div(a, b) => format!("div {}, {}", v(*a), v(*b)),
        Op::Rem(a, b) => format!("rem {}, {}", v(*a), v(*b)),
        Op::Neg(a) => format!("neg {}", v(*a)),
        Op::Cmp(kind, a, b) => format!("cmp {} {}, {}", fmt_cmp(*kind), v(*a), v(*b)),
        Op::Phi { incomings } => {
            let entries = incomings
                .iter()
                .map(|&(val, b)| format!("[{}, {}]", v(val), func.block_label(b)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("phi {entries}")
        }
        Op::Br { target } => format!("br {}", func.block_label(*target)),
        Op::BrIf {
            cond,
            then_target,
            else_target,
        } => format!(
            "br_if {}, {}, {}",
            v(*cond),
            func.block_label(*then_target),
            func.block_label(*else_target)
        ),
        Op::Switch {
            value,
            cases,
            default,
        } => {
            let arms = cases
                .iter()
                .map(|(c, b)| format!("{} -> {}", fmt_const(c), func.block_label(*b)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "switch {}, [{}], default {}",
                v(*value),
                arms,
                func.block_label(*default)
            )
        }
        Op::Return(None) => "ret".into(),
        Op::Return(Some(val)) => format!("ret {}", v(*val)),
        Op::Alloc(ty) => format!("alloc {}", fmt_ty(ty)),
        Op::Load(ptr) => format!("load {}", v(*ptr)),
        Op::Store { ptr, value } => format!("store {}, {}", v(*value), v(*ptr)),
        Op::ElemPtr { base, index } => format!("elem_ptr {}, {}", v(*base), v(*index)),
        Op::Call { func: name, args } => {
            let args = args.iter().map(|&a| v(a)).collect::<Vec<_>>().join(", ");
            format!("call @{name}({args})")
        }
    }
}
