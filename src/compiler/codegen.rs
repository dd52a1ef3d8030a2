//! Code generation helpers driven by the parser.
//!
//! Every method emits at the builder's current position. Loops are emitted as a
//! header block testing the counter, a body block and an exit block; the builder
//! is left positioned at the exit block.

use log::debug;

use super::{
    analyzer::BOUNDS_TRAP,
    ir::{
        BinOp, BlockId, Builder, CastOp, FuncId, FunctionType, Linkage, Module, Predicate, Type,
        UnOp, Value,
    },
    symbol::{Symbol, ValueType},
    token::TokenKind,
    typing::{is_relational, Coercion, Operands},
};

/// The code generator of one compilation.
#[derive(Debug)]
pub struct CodeGen {
    builder: Builder,
    bounds_trap: Option<FuncId>,
}

impl CodeGen {
    pub fn new(module_name: &str) -> Self {
        CodeGen {
            builder: Builder::new(Module::new(module_name)),
            bounds_trap: None,
        }
    }

    pub fn module(&self) -> &Module {
        self.builder.module()
    }

    pub fn set_module_name(&mut self, name: &str) {
        self.builder.module_mut().name = name.into();
    }

    pub fn into_module(self) -> Module {
        self.builder.into_module()
    }

    fn signature(symbol: &Symbol) -> FunctionType {
        FunctionType::new(
            symbol.params.iter().map(Symbol::storage_type).collect(),
            symbol.ty.ir_type(),
        )
    }

    /// Declares a runtime library routine.
    pub fn declare_builtin(&mut self, symbol: &Symbol) -> FuncId {
        let func = self.builder.module_mut().add_function(
            &symbol.name,
            Self::signature(symbol),
            Linkage::External,
        );
        if symbol.name == BOUNDS_TRAP {
            self.bounds_trap = Some(func);
        }
        func
    }

    /// Declares the function of a procedure. Array parameters are passed by value.
    pub fn declare_procedure(&mut self, symbol: &Symbol) -> FuncId {
        let func = self.builder.module_mut().add_function(
            &symbol.name,
            Self::signature(symbol),
            Linkage::Internal,
        );
        debug!(target: "bp_lang::compiler::ir", "declare {}", self.module().function(func).name);
        func
    }

    /// Declares the function holding the program body and marks it as the entry point.
    pub fn declare_entry(&mut self, name: &str) -> FuncId {
        let module = self.builder.module_mut();
        let func = module.add_function(
            name,
            FunctionType::new(Vec::new(), Type::Void),
            Linkage::Internal,
        );
        module.entry = Some(func);
        func
    }

    /// Creates the entry block of `func` and moves to it.
    pub fn begin_body(&mut self, func: FuncId) {
        let entry = self.builder.append_block(func, "entry");
        self.builder.position_at_end(func, entry);
    }

    /// Starts a fresh block if the current one is already terminated, so that
    /// code following a `return` still forms valid, if unreachable, blocks.
    pub fn ensure_open_block(&mut self) {
        if self.builder.has_terminator() {
            self.builder.append_and_position("dead");
        }
    }

    pub fn global_storage(&mut self, symbol: &Symbol) -> Value {
        self.builder
            .module_mut()
            .add_global(&symbol.name, symbol.storage_type(), symbol.ty.zero())
    }

    pub fn local_storage(&mut self, symbol: &Symbol) -> Value {
        self.builder.build_entry_alloca(symbol.storage_type())
    }

    /// Copies the incoming parameter `index` into the local storage of `param`.
    pub fn bind_param(&mut self, index: u32, param: &Symbol) {
        let address = address_of(param);
        if param.is_array {
            let spill = self.builder.build_entry_alloca(param.storage_type());
            self.builder.build_store(Value::Param(index), spill);
            self.copy_array(address, param.ty, spill, param.ty, param.array_size);
        } else {
            self.builder.build_store(Value::Param(index), address);
        }
    }

    pub fn string_literal(&mut self, text: &str) -> Value {
        self.builder.module_mut().add_string(text)
    }

    pub fn load(&mut self, ty: ValueType, address: Value) -> Value {
        self.builder.build_load(ty.ir_type(), address)
    }

    /// Loads a whole array as one aggregate value.
    pub fn load_aggregate(&mut self, array: &Symbol) -> Value {
        let address = address_of(array);
        self.builder.build_load(array.storage_type(), address)
    }

    pub fn store(&mut self, value: Value, address: Value) {
        self.builder.build_store(value, address);
    }

    fn element(&mut self, ty: ValueType, array: Value, index: Value) -> Value {
        self.builder.build_gep(ty.ir_type(), array, index)
    }

    /// Emits `0 <= index < size`, trapping when it does not hold, and returns the
    /// address of the element.
    pub fn checked_element(&mut self, array: &Symbol, index: Value) -> Value {
        let lower = self.builder.build_icmp(Predicate::Ge, index, Value::Int(0));
        let upper = self.builder.build_icmp(
            Predicate::Lt,
            index,
            Value::Int(i32::try_from(array.array_size).unwrap_or(i32::MAX)),
        );
        let in_bounds = self.builder.build_binary(BinOp::And, lower, upper);
        let func = self.func();
        let trap = self.builder.append_block(func, "outofbounds");
        let cont = self.builder.append_block(func, "inbounds");
        self.builder.build_cond_br(in_bounds, cont, trap);

        self.builder.position_at_end(func, trap);
        if let Some(trap_func) = self.bounds_trap {
            self.builder.build_call(trap_func, Vec::new());
        }
        self.builder.build_unreachable();

        self.builder.position_at_end(func, cont);
        self.element(array.ty, address_of(array), index)
    }

    fn func(&self) -> FuncId {
        self.builder
            .current_function()
            .expect("code is emitted inside a function")
    }

    /// Emits `for i in 0..size { body(i) }`.
    fn counted_loop(&mut self, size: u32, mut body: impl FnMut(&mut Self, Value)) {
        let func = self.func();
        let counter = self.builder.build_entry_alloca(Type::I32);
        self.builder.build_store(Value::Int(0), counter);
        let header = self.builder.append_block(func, "loop.header");
        let body_block = self.builder.append_block(func, "loop.body");
        let exit = self.builder.append_block(func, "loop.exit");
        self.builder.build_br(header);

        self.builder.position_at_end(func, header);
        let i = self.builder.build_load(Type::I32, counter);
        let more = self.builder.build_icmp(
            Predicate::Lt,
            i,
            Value::Int(i32::try_from(size).unwrap_or(i32::MAX)),
        );
        self.builder.build_cond_br(more, body_block, exit);

        self.builder.position_at_end(func, body_block);
        body(self, i);
        let next = self.builder.build_binary(BinOp::Add, i, Value::Int(1));
        self.builder.build_store(next, counter);
        self.builder.build_br(header);

        self.builder.position_at_end(func, exit);
    }

    /// Copies `size` elements from `src` to `dest`, converting each element.
    pub fn copy_array(
        &mut self,
        dest: Value,
        dest_ty: ValueType,
        src: Value,
        src_ty: ValueType,
        size: u32,
    ) {
        let coercion = Coercion::assign(dest_ty, src_ty).unwrap_or(Coercion::Identity);
        self.counted_loop(size, |cg, i| {
            let from = cg.element(src_ty, src, i);
            let value = cg.load(src_ty, from);
            let value = cg.coerce(value, coercion);
            let to = cg.element(dest_ty, dest, i);
            cg.store(value, to);
        });
    }

    /// Applies `op` element-wise. Either side may be a scalar, which is reused for
    /// every element. Returns the address of the result array.
    pub fn broadcast(
        &mut self,
        op: TokenKind,
        lhs: &Symbol,
        rhs: &Symbol,
        operands: Operands,
        size: u32,
    ) -> Value {
        let result_ty = operands.result(op);
        let result = self
            .builder
            .build_entry_alloca(Type::array(result_ty.ir_type(), size));
        self.counted_loop(size, |cg, i| {
            let l = cg.broadcast_operand(lhs, i);
            let r = cg.broadcast_operand(rhs, i);
            let value = cg.scalar_binary(op, l, r, operands);
            let to = cg.element(result_ty, result, i);
            cg.store(value, to);
        });
        result
    }

    fn broadcast_operand(&mut self, operand: &Symbol, i: Value) -> Value {
        if operand.is_unindexed_array() {
            let address = address_of(operand);
            let element = self.element(operand.ty, address, i);
            self.load(operand.ty, element)
        } else {
            operand.handle.value.unwrap_or(Value::Null)
        }
    }

    /// Emits the instruction for a representation change.
    pub fn coerce(&mut self, value: Value, coercion: Coercion) -> Value {
        match coercion {
            Coercion::Identity => value,
            Coercion::IntToFloat => self.builder.build_cast(CastOp::SIToFP, value, Type::F32),
            Coercion::FloatToInt => self.builder.build_cast(CastOp::FPToSI, value, Type::I32),
            Coercion::BoolToInt => self.builder.build_cast(CastOp::ZExt, value, Type::I32),
            Coercion::IntToBool => self.builder.build_icmp(Predicate::Ne, value, Value::Int(0)),
        }
    }

    /// Applies a binary operator to two scalars.
    pub fn scalar_binary(
        &mut self,
        op: TokenKind,
        lhs: Value,
        rhs: Value,
        operands: Operands,
    ) -> Value {
        let lhs = self.coerce(lhs, operands.lhs);
        let rhs = self.coerce(rhs, operands.rhs);
        if operands.ty == ValueType::String {
            let equal = self.string_equality(lhs, rhs);
            return if op == TokenKind::NotEq {
                self.builder.build_unary(UnOp::Not, equal)
            } else {
                equal
            };
        }
        let is_float = operands.ty == ValueType::Float;
        if is_relational(op) {
            let pred = predicate(op);
            return if is_float {
                self.builder.build_fcmp(pred, lhs, rhs)
            } else {
                self.builder.build_icmp(pred, lhs, rhs)
            };
        }
        let bin_op = match (op, is_float) {
            (TokenKind::Add, false) => BinOp::Add,
            (TokenKind::Sub, false) => BinOp::Sub,
            (TokenKind::Mul, false) => BinOp::Mul,
            (TokenKind::Div, false) => BinOp::SDiv,
            (TokenKind::Add, true) => BinOp::FAdd,
            (TokenKind::Sub, true) => BinOp::FSub,
            (TokenKind::Mul, true) => BinOp::FMul,
            (TokenKind::Div, true) => BinOp::FDiv,
            (TokenKind::Or, _) => BinOp::Or,
            _ => BinOp::And,
        };
        self.builder.build_binary(bin_op, lhs, rhs)
    }

    /// Compares two NUL-terminated strings byte by byte.
    fn string_equality(&mut self, lhs: Value, rhs: Value) -> Value {
        let func = self.func();
        let counter = self.builder.build_entry_alloca(Type::I32);
        let equal = self.builder.build_entry_alloca(Type::I1);
        self.builder.build_store(Value::Int(0), counter);
        self.builder.build_store(Value::Bool(true), equal);
        let header = self.builder.append_block(func, "streq.header");
        let same = self.builder.append_block(func, "streq.same");
        let next = self.builder.append_block(func, "streq.next");
        let differ = self.builder.append_block(func, "streq.differ");
        let done = self.builder.append_block(func, "streq.done");
        self.builder.build_br(header);

        self.builder.position_at_end(func, header);
        let i = self.builder.build_load(Type::I32, counter);
        let a = self.builder.build_gep(Type::I8, lhs, i);
        let a = self.builder.build_load(Type::I8, a);
        let b = self.builder.build_gep(Type::I8, rhs, i);
        let b = self.builder.build_load(Type::I8, b);
        let is_same = self.builder.build_icmp(Predicate::Eq, a, b);
        self.builder.build_cond_br(is_same, same, differ);

        self.builder.position_at_end(func, same);
        let at_end = self.builder.build_icmp(Predicate::Eq, a, Value::Byte(0));
        self.builder.build_cond_br(at_end, done, next);

        self.builder.position_at_end(func, next);
        let i = self.builder.build_binary(BinOp::Add, i, Value::Int(1));
        self.builder.build_store(i, counter);
        self.builder.build_br(header);

        self.builder.position_at_end(func, differ);
        self.builder.build_store(Value::Bool(false), equal);
        self.builder.build_br(done);

        self.builder.position_at_end(func, done);
        self.builder.build_load(Type::I1, equal)
    }

    pub fn negate(&mut self, value: Value, ty: ValueType) -> Value {
        let op = if ty == ValueType::Float {
            UnOp::FNeg
        } else {
            UnOp::Neg
        };
        self.builder.build_unary(op, value)
    }

    /// Logical not of a bool, bitwise not of an integer.
    pub fn not(&mut self, value: Value) -> Value {
        self.builder.build_unary(UnOp::Not, value)
    }

    pub fn call(&mut self, func: FuncId, args: Vec<Value>) -> Value {
        self.builder.build_call(func, args)
    }

    /// Emits a conditional branch on `cond`, coerced to bool.
    pub fn branch(
        &mut self,
        cond: Value,
        coercion: Coercion,
        then_label: &str,
        else_label: &str,
    ) -> (BlockId, BlockId) {
        let cond = self.coerce(cond, coercion);
        let func = self.func();
        let then_block = self.builder.append_block(func, then_label);
        let else_block = self.builder.append_block(func, else_label);
        self.builder.build_cond_br(cond, then_block, else_block);
        (then_block, else_block)
    }

    pub fn append_block(&mut self, label: &str) -> BlockId {
        let func = self.func();
        self.builder.append_block(func, label)
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        let func = self.func();
        self.builder.position_at_end(func, block);
    }

    /// Jumps to `target` unless the current block is already terminated.
    pub fn fall_through(&mut self, target: BlockId) {
        if !self.builder.has_terminator() {
            self.builder.build_br(target);
        }
    }

    pub fn ret(&mut self, value: Value) {
        self.builder.build_ret(value);
    }

    pub fn ret_void(&mut self) {
        if !self.builder.has_terminator() {
            self.builder.build_ret_void();
        }
    }
}

fn address_of(symbol: &Symbol) -> Value {
    symbol.handle.address.unwrap_or(Value::Null)
}

const fn predicate(op: TokenKind) -> Predicate {
    match op {
        TokenKind::Lt => Predicate::Lt,
        TokenKind::LtEq => Predicate::Le,
        TokenKind::Gt => Predicate::Gt,
        TokenKind::GtEq => Predicate::Ge,
        TokenKind::NotEq => Predicate::Ne,
        _ => Predicate::Eq,
    }
}
