//! The typed intermediate representation emitted by the code generator.
//!
//! A [`Module`] holds functions, globals and string constants. Function bodies are
//! a list of basic blocks, each a sequence of instructions ending in exactly one
//! terminator. Instructions are created through a [`Builder`], which owns the
//! module under construction and tracks the insertion point.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::Join;

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                $name(u32::try_from(value).unwrap_or(u32::MAX))
            }
        }
    )*};
}

define_id! {
    /// Index of a function in [`Module::functions`].
    FuncId,
    /// Index of a basic block in [`Function::blocks`].
    BlockId,
    /// Index of an instruction in [`Function::insts`].
    InstId,
    /// Index of a global in [`Module::globals`].
    GlobalId,
    /// Index of a string constant in [`Module::strings`].
    StringId,
}

/// The target types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    I1,
    I8,
    I32,
    F32,
    /// An opaque pointer. Strings are pointers to NUL-terminated `i8` data.
    Ptr,
    Array(Box<Type>, u32),
}

impl Type {
    pub fn array(elem: Type, len: u32) -> Type {
        Type::Array(Box::new(elem), len)
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Type::I1 | Type::I8 | Type::I32)
    }

    /// The element type of an array type, or the type itself.
    pub fn element(&self) -> &Type {
        match self {
            Type::Array(elem, _) => elem,
            ty => ty,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::I1 => f.write_str("i1"),
            Type::I8 => f.write_str("i8"),
            Type::I32 => f.write_str("i32"),
            Type::F32 => f.write_str("float"),
            Type::Ptr => f.write_str("ptr"),
            Type::Array(elem, len) => write!(f, "[{len} x {elem}]"),
        }
    }
}

/// An opaque handle to a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    Byte(u8),
    /// The null pointer.
    Null,
    /// The n-th parameter of the current function.
    Param(u32),
    /// The result of an instruction in the current function.
    Inst(InstId),
    /// The address of a global.
    Global(GlobalId),
    /// The address of the first byte of a string constant.
    Str(StringId),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Null => f.write_str("null"),
            Value::Param(i) => write!(f, "%arg{i}"),
            Value::Inst(id) => write!(f, "%{}", id.0),
            Value::Global(id) => write!(f, "@g{}", id.0),
            Value::Str(id) => write!(f, "@.str.{}", id.0),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    FAdd,
    FSub,
    FMul,
    FDiv,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub const fn is_float(self) -> bool {
        matches!(self, BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv)
    }

    pub const fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        }
    }
}

/// Comparison predicates, shared by `icmp` (signed) and `fcmp` (ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Predicate {
    pub const fn int_name(self) -> &'static str {
        match self {
            Predicate::Eq => "eq",
            Predicate::Ne => "ne",
            Predicate::Lt => "slt",
            Predicate::Le => "sle",
            Predicate::Gt => "sgt",
            Predicate::Ge => "sge",
        }
    }

    pub const fn float_name(self) -> &'static str {
        match self {
            Predicate::Eq => "oeq",
            Predicate::Ne => "one",
            Predicate::Lt => "olt",
            Predicate::Le => "ole",
            Predicate::Gt => "ogt",
            Predicate::Ge => "oge",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    FNeg,
    /// Bitwise not.
    Not,
}

/// Conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    SIToFP,
    FPToSI,
    ZExt,
}

impl CastOp {
    pub const fn name(self) -> &'static str {
        match self {
            CastOp::SIToFP => "sitofp",
            CastOp::FPToSI => "fptosi",
            CastOp::ZExt => "zext",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    /// Allocates stack storage for one value of the type.
    Alloca(Type),
    Load {
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: Predicate,
        lhs: Value,
        rhs: Value,
    },
    FCmp {
        pred: Predicate,
        lhs: Value,
        rhs: Value,
    },
    Unary {
        op: UnOp,
        value: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
    },
    /// Computes `ptr + index * sizeof(elem)`.
    Gep {
        elem: Type,
        ptr: Value,
        index: Value,
    },
    Call {
        callee: FuncId,
        args: Vec<Value>,
    },
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Option<Value>),
    Unreachable,
}

impl InstKind {
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br(_) | InstKind::CondBr { .. } | InstKind::Ret(_) | InstKind::Unreachable
        )
    }

    /// The blocks this terminator may transfer control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br(target) => vec![*target],
            InstKind::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }
}

/// An instruction together with its result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub ty: Type,
    pub kind: InstKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: CompactString,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl FunctionType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        FunctionType { params, ret }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    /// Provided by the runtime library.
    External,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: CompactString,
    pub ty: FunctionType,
    pub linkage: Linkage,
    pub blocks: Vec<BasicBlock>,
    pub insts: Vec<Instruction>,
}

impl Function {
    /// A function without blocks is a declaration.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()]
    }

    /// The terminator of a block, if it has one.
    pub fn terminator(&self, id: BlockId) -> Option<&InstKind> {
        self.block(id)
            .insts
            .last()
            .map(|inst| &self.inst(*inst).kind)
            .filter(|kind| kind.is_terminator())
    }

    /// Blocks reachable from the entry block, in discovery order.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack = Vec::new();
        if !self.blocks.is_empty() {
            stack.push(BlockId(0));
        }
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut visited[id.index()], true) {
                continue;
            }
            order.push(id);
            for inst in &self.block(id).insts {
                stack.extend(self.inst(*inst).kind.successors().into_iter().rev());
            }
        }
        order
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub name: CompactString,
    pub ty: Type,
    /// The initial value of every scalar cell, so an array starts with each
    /// element set to it.
    pub init: Value,
}

/// A translation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: CompactString,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub strings: Vec<CompactString>,
    /// The function run when the program starts.
    pub entry: Option<FuncId>,
}

/// Errors reported by [`Module::verify_function`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("procedure `{function}` does not return a value on every path")]
    MissingReturn { function: CompactString },
    #[error("block `{block}` in `{function}` has no terminator")]
    MissingTerminator {
        function: CompactString,
        block: CompactString,
    },
    #[error("terminator in the middle of block `{block}` in `{function}`")]
    MisplacedTerminator {
        function: CompactString,
        block: CompactString,
    },
    #[error("type mismatch in `{function}` at %{inst}: {message}")]
    TypeMismatch {
        function: CompactString,
        inst: u32,
        message: String,
    },
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.into(),
            ..Module::default()
        }
    }

    /// Declares a function. Names are made unique with a `.N` suffix.
    pub fn add_function(&mut self, name: &str, ty: FunctionType, linkage: Linkage) -> FuncId {
        let mut unique = CompactString::from(name);
        let mut n = 0;
        while self.functions.iter().any(|f| f.name == unique) {
            n += 1;
            unique = compact_str::format_compact!("{name}.{n}");
        }
        self.functions.push(Function {
            name: unique,
            ty,
            linkage,
            blocks: Vec::new(),
            insts: Vec::new(),
        });
        FuncId::from(self.functions.len() - 1)
    }

    pub fn add_global(&mut self, name: &str, ty: Type, init: Value) -> Value {
        self.globals.push(Global {
            name: name.into(),
            ty,
            init,
        });
        Value::Global(GlobalId::from(self.globals.len() - 1))
    }

    /// Adds a NUL-terminated string constant and returns its address.
    pub fn add_string(&mut self, text: &str) -> Value {
        let id = match self.strings.iter().position(|s| s == text) {
            Some(i) => i,
            None => {
                self.strings.push(text.into());
                self.strings.len() - 1
            }
        };
        Value::Str(StringId::from(id))
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// The type of `value` when used inside `func`.
    pub fn type_of(&self, func: FuncId, value: Value) -> Type {
        match value {
            Value::Int(_) => Type::I32,
            Value::Float(_) => Type::F32,
            Value::Bool(_) => Type::I1,
            Value::Byte(_) => Type::I8,
            Value::Null | Value::Global(_) | Value::Str(_) => Type::Ptr,
            Value::Param(i) => self
                .function(func)
                .ty
                .params
                .get(i as usize)
                .cloned()
                .unwrap_or(Type::Void),
            Value::Inst(id) => self
                .function(func)
                .insts
                .get(id.index())
                .map_or(Type::Void, |inst| inst.ty.clone()),
        }
    }

    /// Checks the structural and type invariants of a function body.
    ///
    /// Only blocks reachable from the entry block are checked.
    pub fn verify_function(&self, id: FuncId) -> Result<(), VerifyError> {
        let function = self.function(id);
        for block_id in function.reachable_blocks() {
            let block = function.block(block_id);
            let label = || compact_str::format_compact!("{}{}", block.label, block_id.0);
            let Some((last, body)) = block.insts.split_last() else {
                return Err(self.missing_terminator(function, label()));
            };
            if body
                .iter()
                .any(|inst| function.inst(*inst).kind.is_terminator())
            {
                return Err(VerifyError::MisplacedTerminator {
                    function: function.name.clone(),
                    block: label(),
                });
            }
            if !function.inst(*last).kind.is_terminator() {
                return Err(self.missing_terminator(function, label()));
            }
            for inst in &block.insts {
                self.verify_inst(id, *inst)?;
            }
        }
        Ok(())
    }

    fn missing_terminator(&self, function: &Function, block: CompactString) -> VerifyError {
        if function.ty.ret == Type::Void {
            VerifyError::MissingTerminator {
                function: function.name.clone(),
                block,
            }
        } else {
            VerifyError::MissingReturn {
                function: function.name.clone(),
            }
        }
    }

    fn verify_inst(&self, func: FuncId, id: InstId) -> Result<(), VerifyError> {
        let function = self.function(func);
        let inst = function.inst(id);
        let ty = |value: &Value| self.type_of(func, *value);
        let mismatch = |message: String| VerifyError::TypeMismatch {
            function: function.name.clone(),
            inst: id.0,
            message,
        };
        match &inst.kind {
            InstKind::Alloca(_) | InstKind::Br(_) | InstKind::Unreachable => {}
            InstKind::Load { ptr } | InstKind::Store { ptr, .. } if ty(ptr) != Type::Ptr => {
                return Err(mismatch(format!("expected pointer, found {}", ty(ptr))));
            }
            InstKind::Load { .. } | InstKind::Store { .. } => {}
            InstKind::Binary { op, lhs, rhs } => {
                let (l, r) = (ty(lhs), ty(rhs));
                let operand_ok = if op.is_float() {
                    l == Type::F32
                } else if matches!(op, BinOp::And | BinOp::Or | BinOp::Xor) {
                    l.is_int()
                } else {
                    l == Type::I32
                };
                if l != r || !operand_ok || inst.ty != l {
                    return Err(mismatch(format!("`{}` on {l} and {r}", op.name())));
                }
            }
            InstKind::ICmp { lhs, rhs, .. } => {
                let (l, r) = (ty(lhs), ty(rhs));
                if l != r || !(l.is_int() || l == Type::Ptr) {
                    return Err(mismatch(format!("icmp on {l} and {r}")));
                }
            }
            InstKind::FCmp { lhs, rhs, .. } => {
                let (l, r) = (ty(lhs), ty(rhs));
                if l != Type::F32 || r != Type::F32 {
                    return Err(mismatch(format!("fcmp on {l} and {r}")));
                }
            }
            InstKind::Unary { op, value } => {
                let t = ty(value);
                let ok = match op {
                    UnOp::Neg => t == Type::I32,
                    UnOp::FNeg => t == Type::F32,
                    UnOp::Not => t.is_int(),
                };
                if !ok {
                    return Err(mismatch(format!("{op:?} on {t}")));
                }
            }
            InstKind::Cast { op, value } => {
                let from = ty(value);
                let ok = match op {
                    CastOp::SIToFP => from == Type::I32 && inst.ty == Type::F32,
                    CastOp::FPToSI => from == Type::F32 && inst.ty == Type::I32,
                    CastOp::ZExt => from.is_int() && inst.ty.is_int(),
                };
                if !ok {
                    return Err(mismatch(format!("{} {from} to {}", op.name(), inst.ty)));
                }
            }
            InstKind::Gep { ptr, index, .. } => {
                if ty(ptr) != Type::Ptr || ty(index) != Type::I32 {
                    return Err(mismatch(format!(
                        "getelementptr on {} with {} index",
                        ty(ptr),
                        ty(index)
                    )));
                }
            }
            InstKind::Call { callee, args } => {
                let callee = self.function(*callee);
                let arg_types: Vec<Type> = args.iter().map(ty).collect();
                if arg_types != callee.ty.params {
                    return Err(mismatch(format!(
                        "call to `{}` with ({}), expected ({})",
                        callee.name,
                        arg_types.iter().join(", "),
                        callee.ty.params.iter().join(", "),
                    )));
                }
            }
            InstKind::CondBr { cond, .. } => {
                if ty(cond) != Type::I1 {
                    return Err(mismatch(format!("branch on {}", ty(cond))));
                }
            }
            InstKind::Ret(value) => {
                let found = value.as_ref().map_or(Type::Void, ty);
                if found != function.ty.ret {
                    return Err(mismatch(format!(
                        "returning {found} from a function returning {}",
                        function.ty.ret
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serializes the module into the output artifact.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for (i, s) in self.strings.iter().enumerate() {
            writeln!(f, "@.str.{i} = constant [{} x i8] c\"{}\\00\"", s.len() + 1, s)?;
        }
        for (i, global) in self.globals.iter().enumerate() {
            writeln!(
                f,
                "@g{i} = global {} {} ; {}",
                global.ty, global.init, global.name
            )?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{}", DisplayFunction(self, function))?;
        }
        Ok(())
    }
}

struct DisplayFunction<'a>(&'a Module, &'a Function);

impl fmt::Display for DisplayFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let DisplayFunction(module, function) = *self;
        let params = function
            .ty
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("{ty} %arg{i}"))
            .join(", ");
        if function.is_declaration() {
            return writeln!(
                f,
                "declare {} @{}({})",
                function.ty.ret, function.name, params
            );
        }
        writeln!(
            f,
            "define {} @{}({}) {{",
            function.ty.ret, function.name, params
        )?;
        for (i, block) in function.blocks.iter().enumerate() {
            writeln!(f, "{}{}:", block.label, i)?;
            for id in &block.insts {
                let inst = DisplayInst(module, function, function.inst(*id));
                if function.inst(*id).ty == Type::Void {
                    writeln!(f, "  {inst}")?;
                } else {
                    writeln!(f, "  %{} = {inst}", id.0)?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

struct DisplayInst<'a>(&'a Module, &'a Function, &'a Instruction);

impl fmt::Display for DisplayInst<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let DisplayInst(module, function, inst) = *self;
        let label = |id: &BlockId| format!("%{}{}", function.block(*id).label, id.0);
        match &inst.kind {
            InstKind::Alloca(ty) => write!(f, "alloca {ty}"),
            InstKind::Load { ptr } => write!(f, "load {}, ptr {ptr}", inst.ty),
            InstKind::Store { value, ptr } => write!(f, "store {value}, ptr {ptr}"),
            InstKind::Binary { op, lhs, rhs } => {
                write!(f, "{} {} {lhs}, {rhs}", op.name(), inst.ty)
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                write!(f, "icmp {} {lhs}, {rhs}", pred.int_name())
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                write!(f, "fcmp {} {lhs}, {rhs}", pred.float_name())
            }
            InstKind::Unary { op, value } => match op {
                UnOp::Neg => write!(f, "sub {} 0, {value}", inst.ty),
                UnOp::FNeg => write!(f, "fneg {} {value}", inst.ty),
                UnOp::Not => write!(f, "xor {} {value}, -1", inst.ty),
            },
            InstKind::Cast { op, value } => write!(f, "{} {value} to {}", op.name(), inst.ty),
            InstKind::Gep { elem, ptr, index } => {
                write!(f, "getelementptr {elem}, ptr {ptr}, i32 {index}")
            }
            InstKind::Call { callee, args } => {
                let callee = &module.function(*callee).name;
                write!(f, "call {} @{callee}({})", inst.ty, args.iter().join(", "))
            }
            InstKind::Br(target) => write!(f, "br label {}", label(target)),
            InstKind::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br i1 {cond}, label {}, label {}",
                label(then_block),
                label(else_block)
            ),
            InstKind::Ret(Some(value)) => write!(f, "ret {value}"),
            InstKind::Ret(None) => f.write_str("ret void"),
            InstKind::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Builds instructions into a [`Module`].
#[derive(Debug, Default)]
pub struct Builder {
    module: Module,
    position: Option<(FuncId, BlockId)>,
}

impl Builder {
    pub fn new(module: Module) -> Self {
        Builder {
            module,
            position: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    /// The function and block instructions are appended to.
    pub fn position(&self) -> Option<(FuncId, BlockId)> {
        self.position
    }

    pub fn current_function(&self) -> Option<FuncId> {
        self.position.map(|(func, _)| func)
    }

    pub fn append_block(&mut self, func: FuncId, label: &str) -> BlockId {
        let function = self.module.function_mut(func);
        function.blocks.push(BasicBlock {
            label: label.into(),
            insts: Vec::new(),
        });
        BlockId::from(function.blocks.len() - 1)
    }

    pub fn position_at_end(&mut self, func: FuncId, block: BlockId) {
        self.position = Some((func, block));
    }

    /// Appends a block to the current function and moves to its end.
    pub fn append_and_position(&mut self, label: &str) -> BlockId {
        let func = self.func();
        let block = self.append_block(func, label);
        self.position_at_end(func, block);
        block
    }

    /// True if the current block already ends with a terminator.
    pub fn has_terminator(&self) -> bool {
        self.position.is_some_and(|(func, block)| {
            self.module.function(func).terminator(block).is_some()
        })
    }

    pub fn type_of(&self, value: Value) -> Type {
        self.module.type_of(self.func(), value)
    }

    fn func(&self) -> FuncId {
        self.current_function()
            .expect("builder is not positioned in a function")
    }

    fn insert(&mut self, ty: Type, kind: InstKind) -> Value {
        let (func, block) = self
            .position
            .expect("builder is not positioned in a function");
        let function = self.module.function_mut(func);
        let id = InstId::from(function.insts.len());
        function.insts.push(Instruction { ty, kind });
        function.blocks[block.index()].insts.push(id);
        Value::Inst(id)
    }

    /// Allocates storage at the start of the entry block of the current function,
    /// so that it is allocated once per call.
    pub fn build_entry_alloca(&mut self, ty: Type) -> Value {
        let func = self.func();
        let function = self.module.function_mut(func);
        let id = InstId::from(function.insts.len());
        function.insts.push(Instruction {
            ty: Type::Ptr,
            kind: InstKind::Alloca(ty),
        });
        function.blocks[0].insts.insert(0, id);
        Value::Inst(id)
    }

    pub fn build_load(&mut self, ty: Type, ptr: Value) -> Value {
        self.insert(ty, InstKind::Load { ptr })
    }

    pub fn build_store(&mut self, value: Value, ptr: Value) {
        self.insert(Type::Void, InstKind::Store { value, ptr });
    }

    pub fn build_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.type_of(lhs);
        self.insert(ty, InstKind::Binary { op, lhs, rhs })
    }

    pub fn build_icmp(&mut self, pred: Predicate, lhs: Value, rhs: Value) -> Value {
        self.insert(Type::I1, InstKind::ICmp { pred, lhs, rhs })
    }

    pub fn build_fcmp(&mut self, pred: Predicate, lhs: Value, rhs: Value) -> Value {
        self.insert(Type::I1, InstKind::FCmp { pred, lhs, rhs })
    }

    pub fn build_unary(&mut self, op: UnOp, value: Value) -> Value {
        let ty = self.type_of(value);
        self.insert(ty, InstKind::Unary { op, value })
    }

    pub fn build_cast(&mut self, op: CastOp, value: Value, to: Type) -> Value {
        self.insert(to, InstKind::Cast { op, value })
    }

    pub fn build_gep(&mut self, elem: Type, ptr: Value, index: Value) -> Value {
        self.insert(Type::Ptr, InstKind::Gep { elem, ptr, index })
    }

    pub fn build_call(&mut self, callee: FuncId, args: Vec<Value>) -> Value {
        let ty = self.module.function(callee).ty.ret.clone();
        self.insert(ty, InstKind::Call { callee, args })
    }

    pub fn build_br(&mut self, target: BlockId) {
        self.insert(Type::Void, InstKind::Br(target));
    }

    pub fn build_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.insert(
            Type::Void,
            InstKind::CondBr {
                cond,
                then_block,
                else_block,
            },
        );
    }

    pub fn build_ret(&mut self, value: Value) {
        self.insert(Type::Void, InstKind::Ret(Some(value)));
    }

    pub fn build_ret_void(&mut self) {
        self.insert(Type::Void, InstKind::Ret(None));
    }

    pub fn build_unreachable(&mut self) {
        self.insert(Type::Void, InstKind::Unreachable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_function(builder: &mut Builder, name: &str) -> FuncId {
        let func = builder.module_mut().add_function(
            name,
            FunctionType::new(vec![Type::I32], Type::I32),
            Linkage::Internal,
        );
        let entry = builder.append_block(func, "entry");
        builder.position_at_end(func, entry);
        func
    }

    #[test]
    fn test_function_names_are_unique() {
        let mut module = Module::new("test");
        let ty = FunctionType::new(Vec::new(), Type::Void);
        module.add_function("f", ty.clone(), Linkage::Internal);
        module.add_function("f", ty.clone(), Linkage::Internal);
        let id = module.add_function("f", ty, Linkage::Internal);
        assert_eq!(module.function(id).name, "f.2");
    }

    #[test]
    fn test_verify_accepts_well_formed_function() {
        let mut builder = Builder::new(Module::new("test"));
        let func = int_function(&mut builder, "double");
        let doubled = builder.build_binary(BinOp::Add, Value::Param(0), Value::Param(0));
        builder.build_ret(doubled);
        assert_eq!(builder.module().verify_function(func), Ok(()));
    }

    #[test]
    fn test_verify_reports_missing_return() {
        let mut builder = Builder::new(Module::new("test"));
        let func = int_function(&mut builder, "f");
        let then_block = builder.append_block(func, "then");
        let else_block = builder.append_block(func, "else");
        let cond = builder.build_icmp(Predicate::Gt, Value::Param(0), Value::Int(0));
        builder.build_cond_br(cond, then_block, else_block);
        builder.position_at_end(func, then_block);
        builder.build_ret(Value::Int(1));
        builder.position_at_end(func, else_block);
        builder.build_binary(BinOp::Add, Value::Int(1), Value::Int(2));
        assert_eq!(
            builder.module().verify_function(func),
            Err(VerifyError::MissingReturn {
                function: "f".into()
            })
        );
    }

    #[test]
    fn test_verify_ignores_unreachable_blocks() {
        let mut builder = Builder::new(Module::new("test"));
        let func = int_function(&mut builder, "f");
        builder.build_ret(Value::Int(0));
        builder.append_and_position("dead");
        builder.build_binary(BinOp::Add, Value::Int(1), Value::Int(2));
        assert_eq!(builder.module().verify_function(func), Ok(()));
    }

    #[test]
    fn test_verify_reports_type_mismatch() {
        let mut builder = Builder::new(Module::new("test"));
        let func = int_function(&mut builder, "f");
        builder.build_ret(Value::Float(1.0));
        assert!(matches!(
            builder.module().verify_function(func),
            Err(VerifyError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_module_bytes_round_trip() {
        let mut builder = Builder::new(Module::new("test"));
        builder.module_mut().add_string("hello");
        let func = int_function(&mut builder, "f");
        builder.build_ret(Value::Param(0));
        builder.module_mut().entry = Some(func);
        let module = builder.into_module();
        let bytes = module.to_bytes().unwrap();
        assert_eq!(Module::from_bytes(&bytes).unwrap(), module);
    }
}
