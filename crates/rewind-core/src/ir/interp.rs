//! Reference interpreter for the IR.
//!
//! Executes one function at a time against a flat cell heap. Pointer values
//! are cell indices into that heap, so a caller can hand a function a
//! pre-populated memory segment and inspect it afterwards. Used by tests to
//! run kernels before and after transformation.

use std::collections::HashMap;

use crate::error::CoreError;

use super::block::BlockId;
use super::func::Function;
use super::inst::{CmpKind, Op};
use super::value::{Constant, ValueId};

/// A runtime cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Unit,
    Undef,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Index into the machine heap.
    Ptr(usize),
}

/// Single-function execution machine with a flat heap and a step budget.
pub struct Machine {
    pub heap: Vec<Cell>,
    steps_left: usize,
}

impl Machine {
    pub fn new(step_budget: usize) -> Self {
        Self {
            heap: Vec::new(),
            steps_left: step_budget,
        }
    }

    /// Reserve `n` cells initialised to `init`; returns the base index.
    pub fn alloc_cells(&mut self, n: usize, init: Cell) -> usize {
        let base = self.heap.len();
        self.heap.extend(std::iter::repeat(init).take(n));
        base
    }

    fn read(&self, addr: usize) -> Result<Cell, CoreError> {
        self.heap
            .get(addr)
            .copied()
            .ok_or_else(|| CoreError::Eval(format!("heap read out of bounds at {addr}")))
    }

    fn write(&mut self, addr: usize, cell: Cell) -> Result<(), CoreError> {
        match self.heap.get_mut(addr) {
            Some(slot) => {
                *slot = cell;
                Ok(())
            }
            None => Err(CoreError::Eval(format!(
                "heap write out of bounds at {addr}"
            ))),
        }
    }

    /// Run the function with the given arguments. Returns the return value.
    pub fn run(&mut self, func: &Function, args: &[Cell]) -> Result<Option<Cell>, CoreError> {
        if args.len() != func.params.len() {
            return Err(CoreError::Eval(format!(
                "function '{}' expects {} arguments, got {}",
                func.name,
                func.params.len(),
                args.len()
            )));
        }
        let mut env: HashMap<ValueId, Cell> = HashMap::new();
        for (&p, &a) in func.params.iter().zip(args) {
            env.insert(p, a);
        }

        let mut block = func.entry;
        let mut prev: Option<BlockId> = None;

        'blocks: loop {
            let insts = func.blocks[block].insts.clone();

            // Phi prefix: evaluate simultaneously against the incoming edge.
            let mut cursor = 0;
            let mut phi_writes: Vec<(ValueId, Cell)> = Vec::new();
            while cursor < insts.len() {
                let inst = &func.insts[insts[cursor]];
                let Op::Phi { incomings } = &inst.op else {
                    break;
                };
                let from = prev.ok_or_else(|| {
                    CoreError::Eval(format!("phi in entry block of '{}'", func.name))
                })?;
                let &(v, _) = incomings
                    .iter()
                    .find(|&&(_, b)| b == from)
                    .ok_or_else(|| {
                        CoreError::Eval(format!(
                            "phi in '{}' has no incoming for '{}'",
                            func.block_label(block),
                            func.block_label(from)
                        ))
                    })?;
                let result = inst
                    .result
                    .ok_or_else(|| CoreError::Eval("phi without result".into()))?;
                phi_writes.push((result, self.value(&env, v)?));
                cursor += 1;
            }
            for (r, c) in phi_writes {
                env.insert(r, c);
            }

            for &inst_id in &insts[cursor..] {
                if self.steps_left == 0 {
                    return Err(CoreError::Eval(format!(
                        "step budget exhausted in '{}'",
                        func.name
                    )));
                }
                self.steps_left -= 1;

                let inst = &func.insts[inst_id];
                match &inst.op {
                    Op::Phi { .. } => {
                        return Err(CoreError::Eval(format!(
                            "phi after non-phi in block '{}'",
                            func.block_label(block)
                        )))
                    }
                    Op::Const(c) => {
                        self.assign(&mut env, inst.result, const_cell(c))?;
                    }
                    Op::Add(a, b) => {
                        let c = arith(self.value(&env, *a)?, self.value(&env, *b)?, "add")?;
                        self.assign(&mut env, inst.result, c)?;
                    }
                    Op::Sub(a, b) => {
                        let c = arith(self.value(&env, *a)?, self.value(&env, *b)?, "sub")?;
                        self.assign(&mut env, inst.result, c)?;
                    }
                    Op::Mul(a, b) => {
                        let c = arith(self.value(&env, *a)?, self.value(&env, *b)?, "mul")?;
                        self.assign(&mut env, inst.result, c)?;
                    }
                    Op::Div(a, b) => {
                        let c = arith(self.value(&env, *a)?, self.value(&env, *b)?, "div")?;
                        self.assign(&mut env, inst.result, c)?;
                    }
                    Op::Rem(a, b) => {
                        let c = arith(self.value(&env, *a)?, self.value(&env, *b)?, "rem")?;
                        self.assign(&mut env, inst.result, c)?;
                    }
                    Op::Neg(a) => {
                        let c = match self.value(&env, *a)? {
                            Cell::Int(i) => Cell::Int(-i),
                            Cell::Float(f) => Cell::Float(-f),
                            other => {
                                return Err(CoreError::Eval(format!("neg on {other:?}")))
                            }
                        };
                        self.assign(&mut env, inst.result, c)?;
                    }
                    Op::Cmp(kind, a, b) => {
                        let c = compare(*kind, self.value(&env, *a)?, self.value(&env, *b)?)?;
                        self.assign(&mut env, inst.result, Cell::Bool(c))?;
                    }
                    Op::Alloc(_) => {
                        let addr = self.alloc_cells(1, Cell::Undef);
                        self.assign(&mut env, inst.result, Cell::Ptr(addr))?;
                    }
                    Op::Load(ptr) => {
                        let addr = self.addr(&env, *ptr)?;
                        let c = self.read(addr)?;
                        self.assign(&mut env, inst.result, c)?;
                    }
                    Op::Store { ptr, value } => {
                        let addr = self.addr(&env, *ptr)?;
                        let c = self.value(&env, *value)?;
                        self.write(addr, c)?;
                    }
                    Op::ElemPtr { base, index } => {
                        let addr = self.addr(&env, *base)?;
                        let off = match self.value(&env, *index)? {
                            Cell::Int(i) if i >= 0 => i as usize,
                            other => {
                                return Err(CoreError::Eval(format!(
                                    "elem_ptr index {other:?}"
                                )))
                            }
                        };
                        self.assign(&mut env, inst.result, Cell::Ptr(addr + off))?;
                    }
                    Op::Call { func: name, .. } => {
                        // Sentinel markers execute as no-ops; anything else is
                        // outside the single-function machine.
                        if !name.contains("checkpoint") {
                            return Err(CoreError::Eval(format!(
                                "call to unresolved function '{name}'"
                            )));
                        }
                        self.assign(&mut env, inst.result, Cell::Unit)?;
                    }
                    Op::Br { target } => {
                        prev = Some(block);
                        block = *target;
                        continue 'blocks;
                    }
                    Op::BrIf {
                        cond,
                        then_target,
                        else_target,
                    } => {
                        let taken = match self.value(&env, *cond)? {
                            Cell::Bool(b) => b,
                            other => {
                                return Err(CoreError::Eval(format!(
                                    "br_if condition {other:?}"
                                )))
                            }
                        };
                        prev = Some(block);
                        block = if taken { *then_target } else { *else_target };
                        continue 'blocks;
                    }
                    Op::Switch {
                        value,
                        cases,
                        default,
                    } => {
                        let scrutinee = self.value(&env, *value)?;
                        let mut target = *default;
                        for (c, b) in cases {
                            if cell_matches(scrutinee, c) {
                                target = *b;
                                break;
                            }
                        }
                        prev = Some(block);
                        block = target;
                        continue 'blocks;
                    }
                    Op::Return(v) => {
                        return match v {
                            Some(v) => Ok(Some(self.value(&env, *v)?)),
                            None => Ok(None),
                        };
                    }
                }
            }

            return Err(CoreError::Eval(format!(
                "block '{}' fell through without a terminator",
                func.block_label(block)
            )));
        }
    }

    fn value(&self, env: &HashMap<ValueId, Cell>, v: ValueId) -> Result<Cell, CoreError> {
        match env.get(&v) {
            Some(Cell::Undef) | None => {
                Err(CoreError::Eval(format!("read of undefined value {v:?}")))
            }
            Some(&c) => Ok(c),
        }
    }

    fn addr(&self, env: &HashMap<ValueId, Cell>, v: ValueId) -> Result<usize, CoreError> {
        match self.value(env, v)? {
            Cell::Ptr(a) => Ok(a),
            other => Err(CoreError::Eval(format!("expected pointer, got {other:?}"))),
        }
    }

    fn assign(
        &self,
        env: &mut HashMap<ValueId, Cell>,
        result: Option<ValueId>,
        cell: Cell,
    ) -> Result<(), CoreError> {
        if let Some(r) = result {
            env.insert(r, cell);
        }
        Ok(())
    }
}

fn const_cell(c: &Constant) -> Cell {
    match c {
        Constant::Bool(b) => Cell::Bool(*b),
        Constant::Int(i) => Cell::Int(*i),
        Constant::Float(f) => Cell::Float(*f),
    }
}

fn cell_matches(cell: Cell, c: &Constant) -> bool {
    match (cell, c) {
        (Cell::Bool(a), Constant::Bool(b)) => a == *b,
        (Cell::Int(a), Constant::Int(b)) => a == *b,
        (Cell::Float(a), Constant::Float(b)) => a == *b,
        _ => false,
    }
}

fn arith(a: Cell, b: Cell, op: &str) -> Result<Cell, CoreError> {
    match (a, b) {
        (Cell::Int(x), Cell::Int(y)) => Ok(Cell::Int(match op {
            "add" => x.wrapping_add(y),
            "sub" => x.wrapping_sub(y),
            "mul" => x.wrapping_mul(y),
            "div" => {
                if y == 0 {
                    return Err(CoreError::Eval("integer division by zero".into()));
                }
                x / y
            }
            "rem" => {
                if y == 0 {
                    return Err(CoreError::Eval("integer remainder by zero".into()));
                }
                x % y
            }
            _ => unreachable!(),
        })),
        (Cell::Float(x), Cell::Float(y)) => Ok(Cell::Float(match op {
            "add" => x + y,
            "sub" => x - y,
            "mul" => x * y,
            "div" => x / y,
            "rem" => x % y,
            _ => unreachable!(),
        })),
        _ => Err(CoreError::Eval(format!(
            "{op} on mismatched operands {a:?} and {b:?}"
        ))),
    }
}

fn compare(kind: CmpKind, a: Cell, b: Cell) -> Result<bool, CoreError> {
    use std::cmp::Ordering;
    let ord = match (a, b) {
        (Cell::Int(x), Cell::Int(y)) => x.cmp(&y),
        (Cell::Float(x), Cell::Float(y)) => x
            .partial_cmp(&y)
            .ok_or_else(|| CoreError::Eval("NaN comparison".into()))?,
        (Cell::Bool(x), Cell::Bool(y)) => x.cmp(&y),
        _ => {
            return Err(CoreError::Eval(format!(
                "compare on mismatched operands {a:?} and {b:?}"
            )))
        }
    };
    Ok(match kind {
        CmpKind::Eq => ord == Ordering::Equal,
        CmpKind::Ne => ord != Ordering::Equal,
        CmpKind::Lt => ord == Ordering::Less,
        CmpKind::Le => ord != Ordering::Greater,
        CmpKind::Gt => ord == Ordering::Greater,
        CmpKind::Ge => ord != Ordering::Less,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::{FunctionSig, Type};

    /// Counting loop with a loop-carried phi: sum 0..n.
    #[test]
    fn loop_with_phi() {
        let sig = FunctionSig {
            params: vec![Type::Int(32)],
            return_ty: Type::Int(32),
        };
        let mut fb = FunctionBuilder::new("sum_to", sig);
        let n = fb.param(0);

        let header = fb.create_block("header");
        let body = fb.create_block("body");
        let exit = fb.create_block("exit");

        let zero = fb.const_int(0);
        fb.br(header);

        let entry = fb.entry_block();
        fb.switch_to_block(header);
        // Incomings are patched below once the body values exist.
        let i = fb.phi(&[(zero, entry)], Type::Int(32));
        let acc = fb.phi(&[(zero, entry)], Type::Int(32));
        let done = fb.cmp(CmpKind::Ge, i, n);
        fb.br_if(done, exit, body);

        fb.switch_to_block(body);
        let acc2 = fb.add(acc, i);
        let one = fb.const_int(1);
        let i2 = fb.add(i, one);
        fb.br(header);

        fb.switch_to_block(exit);
        fb.ret(Some(acc));

        let mut func = fb.build();
        // Patch the loop-carried incomings.
        let header_insts = func.blocks[header].insts.clone();
        if let Op::Phi { incomings } = &mut func.insts[header_insts[0]].op {
            incomings.push((i2, body));
        }
        if let Op::Phi { incomings } = &mut func.insts[header_insts[1]].op {
            incomings.push((acc2, body));
        }

        let mut m = Machine::new(10_000);
        let out = m.run(&func, &[Cell::Int(5)]).unwrap();
        assert_eq!(out, Some(Cell::Int(10)));
    }

    #[test]
    fn memory_round_trip() {
        // store through a pointer parameter, reload, return.
        let sig = FunctionSig {
            params: vec![Type::ptr_to(Type::Int(32))],
            return_ty: Type::Int(32),
        };
        let mut fb = FunctionBuilder::new("poke", sig);
        let p = fb.param(0);
        let idx = fb.const_int(2);
        let slot = fb.elem_ptr(p, idx);
        let v = fb.const_int(99);
        fb.store(slot, v);
        let back = fb.load(slot, Type::Int(32));
        fb.ret(Some(back));
        let func = fb.build();

        let mut m = Machine::new(100);
        let base = m.alloc_cells(4, Cell::Int(0));
        let out = m.run(&func, &[Cell::Ptr(base)]).unwrap();
        assert_eq!(out, Some(Cell::Int(99)));
        assert_eq!(m.heap[base + 2], Cell::Int(99));
    }

    #[test]
    fn step_budget_trips_on_infinite_loop() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
        };
        let mut fb = FunctionBuilder::new("spin", sig);
        let b = fb.create_block("b");
        fb.br(b);
        fb.switch_to_block(b);
        fb.br(b);
        let func = fb.build();

        let mut m = Machine::new(50);
        let err = m.run(&func, &[]).unwrap_err();
        assert!(err.to_string().contains("step budget"));
    }

    #[test]
    fn sentinel_call_is_noop() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Int(32),
        };
        let mut fb = FunctionBuilder::new("marked", sig);
        fb.call_void("checkpoint", &[]);
        let v = fb.const_int(7);
        fb.ret(Some(v));
        let func = fb.build();

        let mut m = Machine::new(100);
        assert_eq!(m.run(&func, &[]).unwrap(), Some(Cell::Int(7)));
    }
}
