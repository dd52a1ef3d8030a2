//! The IR interpreter.
//!
//! Runs the entry function of a module. Every call gets a frame holding the
//! instruction results of its function; the frame's stack allocations are freed
//! when it returns.

use std::io::{BufRead, Write};

use log::trace;

use crate::{
    compiler::ir::{
        BinOp, BlockId, CastOp, FuncId, Function, InstKind, Instruction, Module, Predicate, UnOp,
        Value,
    },
    runtime::{self, cells, Io, Memory, Pointer, RtValue, RuntimeError},
};

/// Deepest call nesting before the program is stopped.
pub const MAX_CALL_DEPTH: usize = 400;

/// Runs `module` with the given standard streams.
pub fn run<R: BufRead, W: Write>(
    module: &Module,
    mut input: R,
    mut output: W,
) -> Result<(), RuntimeError> {
    let entry = module.entry.ok_or(RuntimeError::MissingEntry)?;
    let mut vm = Vm::new(
        module,
        Io {
            input: &mut input,
            output: &mut output,
        },
    );
    let result = vm.call(entry, Vec::new()).map(|_| ());
    vm.io.output.flush()?;
    result
}

struct Frame {
    args: Vec<RtValue>,
    values: Vec<RtValue>,
    allocas: Vec<Pointer>,
}

struct Vm<'m, 'io> {
    module: &'m Module,
    memory: Memory,
    globals: Vec<Pointer>,
    strings: Vec<Pointer>,
    io: Io<'io>,
    depth: usize,
}

impl<'m, 'io> Vm<'m, 'io> {
    fn new(module: &'m Module, io: Io<'io>) -> Self {
        let mut memory = Memory::new();
        let globals = module
            .globals
            .iter()
            .map(|global| {
                let contents = match constant(global.init) {
                    Some(init) => vec![init; cells(&global.ty)],
                    None => RtValue::zeroed(&global.ty),
                };
                memory.allocate(contents)
            })
            .collect();
        let strings = module
            .strings
            .iter()
            .map(|s| memory.allocate_string(s))
            .collect();
        Vm {
            module,
            memory,
            globals,
            strings,
            io,
            depth: 0,
        }
    }

    fn call(&mut self, id: FuncId, args: Vec<RtValue>) -> Result<RtValue, RuntimeError> {
        let module = self.module;
        let function = module.function(id);
        if function.is_declaration() {
            trace!("call builtin {}", function.name);
            return runtime::call_builtin(&function.name, &args, &mut self.memory, &mut self.io);
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow);
        }
        trace!("call {}", function.name);

        self.depth += 1;
        let mut frame = Frame {
            args,
            values: vec![RtValue::Void; function.insts.len()],
            allocas: Vec::new(),
        };
        let result = self.execute(function, &mut frame);
        for ptr in frame.allocas {
            self.memory.free(ptr);
        }
        self.depth -= 1;
        trace!(
            "return from {}, {} live allocations",
            function.name,
            self.memory.live()
        );
        result
    }

    fn execute(
        &mut self,
        function: &'m Function,
        frame: &mut Frame,
    ) -> Result<RtValue, RuntimeError> {
        let mut block = BlockId(0);
        loop {
            let mut next = None;
            for &id in &function.block(block).insts {
                let inst = function.inst(id);
                match &inst.kind {
                    InstKind::Br(target) => {
                        next = Some(*target);
                        break;
                    }
                    InstKind::CondBr {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        let cond = self.eval(frame, *cond)?.as_bool()?;
                        next = Some(if cond { *then_block } else { *else_block });
                        break;
                    }
                    InstKind::Ret(value) => {
                        return match value {
                            Some(value) => self.eval(frame, *value),
                            None => Ok(RtValue::Void),
                        };
                    }
                    InstKind::Unreachable => return Err(RuntimeError::Unreachable),
                    _ => {
                        let value = self.step(frame, inst)?;
                        frame.values[id.index()] = value;
                    }
                }
            }
            block = next.ok_or(RuntimeError::Unreachable)?;
        }
    }

    fn eval(&self, frame: &Frame, value: Value) -> Result<RtValue, RuntimeError> {
        if let Some(value) = constant(value) {
            return Ok(value);
        }
        match value {
            Value::Param(i) => frame
                .args
                .get(i as usize)
                .cloned()
                .ok_or(RuntimeError::InvalidMemoryAccess),
            Value::Inst(id) => frame
                .values
                .get(id.index())
                .cloned()
                .ok_or(RuntimeError::InvalidMemoryAccess),
            Value::Global(id) => Ok(RtValue::Ptr(self.globals.get(id.index()).copied())),
            Value::Str(id) => Ok(RtValue::Ptr(self.strings.get(id.index()).copied())),
            _ => Ok(RtValue::Ptr(None)),
        }
    }

    fn step(&mut self, frame: &mut Frame, inst: &Instruction) -> Result<RtValue, RuntimeError> {
        Ok(match &inst.kind {
            InstKind::Alloca(ty) => {
                let ptr = self.memory.allocate(RtValue::zeroed(ty));
                frame.allocas.push(ptr);
                RtValue::Ptr(Some(ptr))
            }
            InstKind::Load { ptr } => {
                let ptr = self.eval(frame, *ptr)?.as_ptr()?;
                self.memory.load(ptr, &inst.ty)?
            }
            InstKind::Store { value, ptr } => {
                let value = self.eval(frame, *value)?;
                let ptr = self.eval(frame, *ptr)?.as_ptr()?;
                self.memory.store(ptr, value)?;
                RtValue::Void
            }
            InstKind::Binary { op, lhs, rhs } => {
                binary(*op, &self.eval(frame, *lhs)?, &self.eval(frame, *rhs)?)?
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                let lhs = self.eval(frame, *lhs)?.as_int()?;
                let rhs = self.eval(frame, *rhs)?.as_int()?;
                RtValue::Bool(compare(*pred, &lhs, &rhs))
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                let lhs = self.eval(frame, *lhs)?.as_float()?;
                let rhs = self.eval(frame, *rhs)?.as_float()?;
                RtValue::Bool(compare(*pred, &lhs, &rhs))
            }
            InstKind::Unary { op, value } => {
                let value = self.eval(frame, *value)?;
                match (op, value) {
                    (UnOp::Neg, value) => RtValue::Int(value.as_int()?.wrapping_neg()),
                    (UnOp::FNeg, value) => RtValue::Float(-value.as_float()?),
                    (UnOp::Not, RtValue::Bool(v)) => RtValue::Bool(!v),
                    (UnOp::Not, value) => RtValue::Int(!value.as_int()?),
                }
            }
            #[allow(
                clippy::as_conversions,
                clippy::cast_possible_truncation,
                clippy::cast_precision_loss
            )]
            InstKind::Cast { op, value } => {
                let value = self.eval(frame, *value)?;
                match op {
                    CastOp::SIToFP => RtValue::Float(value.as_int()? as f32),
                    CastOp::FPToSI => RtValue::Int(value.as_float()? as i32),
                    CastOp::ZExt => RtValue::Int(value.as_int()?),
                }
            }
            InstKind::Gep { elem, ptr, index } => {
                let ptr = self.eval(frame, *ptr)?.as_ptr()?;
                let index = i64::from(self.eval(frame, *index)?.as_int()?);
                let stride =
                    i64::try_from(cells(elem)).map_err(|_| RuntimeError::InvalidMemoryAccess)?;
                match ptr {
                    Some(ptr) => RtValue::Ptr(Some(ptr.offset_by(index * stride)?)),
                    None => RtValue::Ptr(None),
                }
            }
            InstKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(frame, *arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(*callee, args)?
            }
            InstKind::Br(_)
            | InstKind::CondBr { .. }
            | InstKind::Ret(_)
            | InstKind::Unreachable => return Err(RuntimeError::Unreachable),
        })
    }
}

/// The runtime value of a constant operand.
fn constant(value: Value) -> Option<RtValue> {
    match value {
        Value::Int(v) => Some(RtValue::Int(v)),
        Value::Float(v) => Some(RtValue::Float(v)),
        Value::Bool(v) => Some(RtValue::Bool(v)),
        Value::Byte(v) => Some(RtValue::Byte(v)),
        Value::Null => Some(RtValue::Ptr(None)),
        _ => None,
    }
}

fn compare<T: PartialOrd>(pred: Predicate, lhs: &T, rhs: &T) -> bool {
    match pred {
        Predicate::Eq => lhs == rhs,
        Predicate::Ne => lhs != rhs,
        Predicate::Lt => lhs < rhs,
        Predicate::Le => lhs <= rhs,
        Predicate::Gt => lhs > rhs,
        Predicate::Ge => lhs >= rhs,
    }
}

fn binary(op: BinOp, lhs: &RtValue, rhs: &RtValue) -> Result<RtValue, RuntimeError> {
    if let (RtValue::Bool(l), RtValue::Bool(r)) = (lhs, rhs) {
        return match op {
            BinOp::And => Ok(RtValue::Bool(*l && *r)),
            BinOp::Or => Ok(RtValue::Bool(*l || *r)),
            BinOp::Xor => Ok(RtValue::Bool(*l != *r)),
            _ => Err(RuntimeError::InvalidOperand("an integer")),
        };
    }
    if op.is_float() {
        let (l, r) = (lhs.as_float()?, rhs.as_float()?);
        return Ok(RtValue::Float(match op {
            BinOp::FAdd => l + r,
            BinOp::FSub => l - r,
            BinOp::FMul => l * r,
            _ => l / r,
        }));
    }
    let (l, r) = (lhs.as_int()?, rhs.as_int()?);
    Ok(RtValue::Int(match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::SDiv => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        BinOp::And => l & r,
        BinOp::Or => l | r,
        _ => l ^ r,
    }))
}
