//! The parser.
//!
//! A recursive-descent parser with one token of lookahead. Each production checks
//! types and emits code as soon as it recognizes its construct; there is no syntax
//! tree. Declaration and statement lists recover from errors by skipping to the next
//! `;` or list terminator, so that one run reports as many errors as possible.

use std::mem;

use compact_str::CompactString;
use log::trace;
use text_size::{TextRange, TextSize};

use super::{
    analyzer::SemanticAnalyzer,
    codegen::CodeGen,
    error::CompilerError,
    ir::{BlockId, FuncId, Module, Value},
    lexer::Lexer,
    symbol::{Symbol, SymbolKind, ValueType},
    token::{Token, TokenKind, TokenValue},
    typing::{self, Coercion},
    CompileOptions,
};

/// Name of the function holding the program body.
const ENTRY_NAME: &str = "main";

/// Parses the input and generates its module.
///
/// The module is only meaningful if no errors were returned.
pub fn parse(input: &str, options: &CompileOptions) -> (Module, Vec<CompilerError>) {
    Parser::new(input, options.clone()).parse()
}

/// An lvalue: the symbol assigned to and the address written.
struct Destination {
    symbol: Symbol,
    address: Value,
}

pub struct Parser<'input> {
    lexer: Lexer<'input>,
    lookahead: Token,
    prev_token_end: TextSize,
    expected_kinds: Vec<TokenKind>,
    analyzer: SemanticAnalyzer,
    codegen: CodeGen,
    options: CompileOptions,
    errors: Vec<CompilerError>,
}

impl<'input> Parser<'input> {
    pub fn new(input: &'input str, options: CompileOptions) -> Self {
        let mut lexer = Lexer::new(input);
        let lookahead = lexer.next_token();
        Parser {
            lexer,
            lookahead,
            prev_token_end: TextSize::default(),
            expected_kinds: Vec::new(),
            analyzer: SemanticAnalyzer::new(),
            codegen: CodeGen::new(options.module_name.as_deref().unwrap_or_default()),
            options,
            errors: Vec::new(),
        }
    }

    /// Parses the whole program.
    pub fn parse(mut self) -> (Module, Vec<CompilerError>) {
        if let Err(e) = self.program() {
            self.report(e);
        }
        (self.codegen.into_module(), self.errors)
    }

    /// Moves to the next token.
    fn bump(&mut self) {
        trace!("matched {}", self.lookahead);
        self.expected_kinds.clear();
        self.prev_token_end = self.lookahead.range.end();
        self.lookahead = self.lexer.next_token();
    }

    /// Checks the current token without recording it as expected.
    fn at(&self, t: TokenKind) -> bool {
        self.lookahead.kind == t
    }

    /// Checks if the current token is `t`, and returns `true` if so.
    /// This method will automatically add `t` to `expected_kinds` if `t` is not encountered.
    fn check(&mut self, t: TokenKind) -> bool {
        let is_present = self.at(t);
        if !is_present {
            self.expected_kinds.push(t);
        }
        is_present
    }

    /// Consumes a token 't' if it exists. Returns whether the given token was present.
    fn eat(&mut self, t: TokenKind) -> bool {
        let is_present = self.check(t);
        if is_present {
            self.bump();
        }
        is_present
    }

    /// Expects and consumes the token `t`. Signals an error without consuming
    /// anything if the next token is not `t`.
    fn expect(&mut self, t: TokenKind) -> Result<(), CompilerError> {
        if !self.eat(t) {
            return Err(self.unexpected());
        }
        Ok(())
    }

    /// Returns an error for an unexpected token.
    fn unexpected(&mut self) -> CompilerError {
        let range = self.lookahead.range;
        if let TokenValue::Error(error) = &self.lookahead.value {
            return CompilerError::Lexical {
                error: error.clone(),
                range,
            };
        }
        CompilerError::UnexpectedToken {
            expected: mem::take(&mut self.expected_kinds),
            found: self.lookahead.kind,
            range,
        }
    }

    fn report(&mut self, error: CompilerError) {
        trace!("error: {error}");
        self.errors.push(error);
    }

    /// Discards tokens until one in `stops`. Reaching the end of the input is fatal.
    fn resync(&mut self, stops: &[TokenKind]) -> Result<(), CompilerError> {
        while !stops.contains(&self.lookahead.kind) {
            if self.at(TokenKind::Eof) {
                return Err(CompilerError::UnexpectedEof {
                    range: self.lookahead.range,
                });
            }
            self.bump();
        }
        Ok(())
    }

    /// Reports a non-fatal error in the header of an `if` or `for` and skips to
    /// `stop`, so that the body is still checked.
    fn recover_header(
        &mut self,
        error: CompilerError,
        stop: TokenKind,
    ) -> Result<(), CompilerError> {
        if error.is_fatal() {
            return Err(error);
        }
        self.report(error);
        self.resync(&[stop, TokenKind::End])?;
        self.eat(stop);
        Ok(())
    }

    /// Start a new range.
    fn start_range(&self) -> TextSize {
        self.lookahead.range.start()
    }

    /// End a new range.
    fn end_range(&self, start: TextSize) -> TextRange {
        TextRange::new(start, self.prev_token_end.max(start))
    }

    fn identifier(&mut self) -> Result<(CompactString, TextRange), CompilerError> {
        if !self.check(TokenKind::Ident) {
            return Err(self.unexpected());
        }
        let name = CompactString::from(self.lookahead.text());
        let range = self.lookahead.range;
        self.bump();
        Ok((name, range))
    }

    /// program ::= program_header program_body '.'
    fn program(&mut self) -> Result<(), CompilerError> {
        trace!("program");
        self.program_header()?;
        self.program_body()?;
        self.expect(TokenKind::Eof)
    }

    /// program_header ::= 'program' identifier 'is'
    fn program_header(&mut self) -> Result<(), CompilerError> {
        trace!("program_header");
        self.expect(TokenKind::Program)?;
        let (name, range) = self.identifier()?;
        self.expect(TokenKind::Is)?;

        if self.options.module_name.is_none() {
            self.codegen.set_module_name(&name);
        }
        for mut builtin in SemanticAnalyzer::builtin_symbols() {
            builtin.handle.function = Some(self.codegen.declare_builtin(&builtin));
            let builtin_name = builtin.name.clone();
            self.analyzer.declare(&builtin_name, builtin, true);
        }

        if self.analyzer.exists_scoped(&name, true) {
            self.report(CompilerError::DuplicateDeclaration { name, range });
        } else {
            let program = Symbol {
                name: name.clone(),
                token_kind: Some(TokenKind::Ident),
                kind: Some(SymbolKind::Program),
                ty: ValueType::Void,
                is_global: true,
                range,
                ..Symbol::default()
            };
            self.analyzer.declare(&name, program, true);
        }
        Ok(())
    }

    /// program_body ::= ( declaration ';' )* 'begin' ( statement ';' )* 'end' 'program'
    fn program_body(&mut self) -> Result<(), CompilerError> {
        trace!("program_body");
        self.declaration_list()?;
        self.expect(TokenKind::Begin)?;

        let entry = self.codegen.declare_entry(ENTRY_NAME);
        self.codegen.begin_body(entry);
        self.allocate_locals();

        self.statement_list(&[TokenKind::End])?;
        self.expect(TokenKind::End)?;
        self.expect(TokenKind::Program)?;
        self.codegen.ret_void();
        self.verify(entry, TextRange::empty(self.prev_token_end))?;

        self.analyzer.dump_global();
        Ok(())
    }

    /// Allocates storage for the local variables of the current scope.
    fn allocate_locals(&mut self) {
        for symbol in self.analyzer.current_mut().table.values_mut() {
            if symbol.kind == Some(SymbolKind::Variable)
                && !symbol.is_global
                && symbol.handle.address.is_none()
            {
                symbol.handle.address = Some(self.codegen.local_storage(symbol));
            }
        }
    }

    /// Runs the backend verifier on a finished function, unless errors were
    /// already reported.
    fn verify(&self, func: FuncId, range: TextRange) -> Result<(), CompilerError> {
        if !self.options.verify || !self.errors.is_empty() {
            return Ok(());
        }
        self.codegen
            .module()
            .verify_function(func)
            .map_err(|error| CompilerError::Verify { error, range })
    }

    /// ( declaration ';' )*, up to 'begin'.
    fn declaration_list(&mut self) -> Result<(), CompilerError> {
        while !self.at(TokenKind::Begin) && !self.at(TokenKind::Eof) {
            let result = self
                .declaration()
                .and_then(|()| self.expect(TokenKind::SemiColon));
            if let Err(e) = result {
                if e.is_fatal() {
                    return Err(e);
                }
                self.report(e);
                self.resync(&[TokenKind::SemiColon, TokenKind::Begin])?;
                self.eat(TokenKind::SemiColon);
            }
        }
        Ok(())
    }

    /// declaration ::= [ 'global' ] ( procedure_declaration | variable_declaration )
    ///
    /// Without `global`, a declaration is global exactly when it appears in the
    /// global scope.
    fn declaration(&mut self) -> Result<(), CompilerError> {
        trace!("declaration");
        let is_global = self.eat(TokenKind::Global) || self.analyzer.is_global_scope();
        if self.check(TokenKind::Procedure) {
            self.procedure_declaration(is_global)
        } else if self.check(TokenKind::Variable) {
            self.variable_declaration(is_global).map(|_| ())
        } else {
            Err(self.unexpected())
        }
    }

    /// procedure_declaration ::= procedure_header procedure_body
    ///
    /// A local procedure becomes visible in the enclosing scope only once its
    /// declaration is complete.
    fn procedure_declaration(&mut self, is_global: bool) -> Result<(), CompilerError> {
        trace!("procedure_declaration");
        let depth = self.analyzer.depth();
        let result = self.procedure_definition(is_global);
        while self.analyzer.depth() > depth {
            self.analyzer.pop_scope();
        }
        let (procedure, installed) = result?;
        if !is_global && installed {
            if self.analyzer.exists_scoped(&procedure.name, false) {
                return Err(CompilerError::DuplicateDeclaration {
                    name: procedure.name,
                    range: procedure.range,
                });
            }
            let name = procedure.name.clone();
            self.analyzer.declare(&name, procedure, false);
        }
        Ok(())
    }

    /// Parses the header and body. Returns the procedure and whether its name was
    /// free.
    fn procedure_definition(&mut self, is_global: bool) -> Result<(Symbol, bool), CompilerError> {
        let mut procedure = self.procedure_header(is_global)?;

        let func = self.codegen.declare_procedure(&procedure);
        procedure.handle.function = Some(func);
        let installed = !self.analyzer.exists_scoped(&procedure.name, is_global);
        if installed {
            self.analyzer
                .declare(&procedure.name.clone(), procedure.clone(), is_global);
        } else {
            self.report(CompilerError::DuplicateDeclaration {
                name: procedure.name.clone(),
                range: procedure.range,
            });
        }
        self.analyzer.set_current_procedure(procedure.clone());

        self.procedure_body(&procedure)?;
        Ok((procedure, installed))
    }

    /// procedure_header ::= 'procedure' identifier ':' type_mark '(' [ parameter_list ] ')'
    ///
    /// Enters the procedure's scope before the parameters.
    fn procedure_header(&mut self, is_global: bool) -> Result<Symbol, CompilerError> {
        trace!("procedure_header");
        self.expect(TokenKind::Procedure)?;
        let (name, range) = self.identifier()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.type_mark()?;
        self.analyzer.push_scope();
        self.expect(TokenKind::OpenParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::CloseParen) {
            loop {
                params.push(self.variable_declaration(false)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen)?;
        let mut procedure = Symbol::procedure(&name, ty, params, range);
        procedure.is_global = is_global;
        Ok(procedure)
    }

    /// procedure_body ::= ( declaration ';' )* 'begin' ( statement ';' )* 'end' 'procedure'
    fn procedure_body(&mut self, procedure: &Symbol) -> Result<(), CompilerError> {
        trace!("procedure_body");
        self.declaration_list()?;
        self.expect(TokenKind::Begin)?;

        let Some(func) = procedure.handle.function else {
            return Err(CompilerError::NotAProcedure {
                name: procedure.name.clone(),
                range: procedure.range,
            });
        };
        self.codegen.begin_body(func);
        self.allocate_locals();
        for (index, param) in (0u32..).zip(&procedure.params) {
            if let Some(local) = self.analyzer.resolve_scoped(&param.name, false) {
                let local = local.clone();
                self.codegen.bind_param(index, &local);
            }
        }

        self.statement_list(&[TokenKind::End])?;
        self.expect(TokenKind::End)?;
        self.expect(TokenKind::Procedure)?;
        self.verify(func, procedure.range)
    }

    /// variable_declaration ::= 'variable' identifier ':' type_mark [ '[' bound ']' ]
    ///
    /// A duplicate name is reported and the declaration is parsed but not entered.
    fn variable_declaration(&mut self, is_global: bool) -> Result<Symbol, CompilerError> {
        trace!("variable_declaration");
        self.expect(TokenKind::Variable)?;
        let (name, range) = self.identifier()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.type_mark()?;
        let mut symbol = Symbol::variable(&name, ty, range);
        symbol.is_global = is_global;
        if self.eat(TokenKind::OpenBracket) {
            symbol.is_array = true;
            symbol.array_size = self.bound()?;
            self.expect(TokenKind::CloseBracket)?;
        }

        if self.analyzer.exists_scoped(&name, is_global) {
            self.report(CompilerError::DuplicateDeclaration { name, range });
            return Ok(symbol);
        }
        if is_global {
            symbol.handle.address = Some(self.codegen.global_storage(&symbol));
        }
        self.analyzer.declare(&name, symbol.clone(), is_global);
        Ok(symbol)
    }

    /// type_mark ::= 'integer' | 'float' | 'string' | 'bool'
    fn type_mark(&mut self) -> Result<ValueType, CompilerError> {
        if let Some(ty) = ValueType::from_type_mark(self.lookahead.kind) {
            self.bump();
            return Ok(ty);
        }
        self.expected_kinds.extend([
            TokenKind::IntegerType,
            TokenKind::FloatType,
            TokenKind::StringType,
            TokenKind::BoolType,
        ]);
        Err(self.unexpected())
    }

    /// bound ::= a positive integer literal
    fn bound(&mut self) -> Result<u32, CompilerError> {
        let range = self.lookahead.range;
        match self.lookahead.value {
            TokenValue::Int(n) if n > 0 => {
                self.bump();
                Ok(n.unsigned_abs())
            }
            TokenValue::Int(_) | TokenValue::Float(_) => {
                self.bump();
                Err(CompilerError::InvalidArrayBound { range })
            }
            _ => {
                self.expected_kinds.push(TokenKind::Int);
                Err(self.unexpected())
            }
        }
    }

    /// ( statement ';' )*, up to one of `stops`.
    fn statement_list(&mut self, stops: &[TokenKind]) -> Result<(), CompilerError> {
        while !stops.contains(&self.lookahead.kind) && !self.at(TokenKind::Eof) {
            let result = self
                .statement()
                .and_then(|()| self.expect(TokenKind::SemiColon));
            if let Err(e) = result {
                if e.is_fatal() {
                    return Err(e);
                }
                self.report(e);
                let mut sync = vec![TokenKind::SemiColon];
                sync.extend_from_slice(stops);
                self.resync(&sync)?;
                self.eat(TokenKind::SemiColon);
            }
        }
        Ok(())
    }

    /// statement ::= if_statement | loop_statement | return_statement | assignment_statement
    fn statement(&mut self) -> Result<(), CompilerError> {
        trace!("statement");
        self.codegen.ensure_open_block();
        if self.check(TokenKind::If) {
            self.if_statement()
        } else if self.check(TokenKind::For) {
            self.loop_statement()
        } else if self.check(TokenKind::Return) {
            self.return_statement()
        } else {
            self.assignment_statement()
        }
    }

    /// assignment_statement ::= destination ':=' expression
    fn assignment_statement(&mut self) -> Result<(), CompilerError> {
        trace!("assignment_statement");
        let destination = self.destination()?;
        self.expect(TokenKind::Assign)?;
        let value = self.expression()?;
        self.assign(&destination, &value)
    }

    /// destination ::= identifier [ '[' expression ']' ]
    fn destination(&mut self) -> Result<Destination, CompilerError> {
        let (name, range) = self.identifier()?;
        let mut symbol = self.resolve(&name, range)?;
        if symbol.kind != Some(SymbolKind::Variable) {
            return Err(CompilerError::NotAVariable { name, range });
        }
        let address = if self.eat(TokenKind::OpenBracket) {
            let address = self.index(&symbol, range)?;
            symbol.is_indexed = true;
            address
        } else {
            symbol.handle.address.unwrap_or(Value::Null)
        };
        Ok(Destination { symbol, address })
    }

    fn assign(&mut self, destination: &Destination, value: &Symbol) -> Result<(), CompilerError> {
        let dest = &destination.symbol;
        let mismatch = || CompilerError::TypeMismatch {
            expected: dest.type_name(),
            found: value.type_name(),
            range: value.range,
        };
        if dest.is_unindexed_array() {
            if !value.is_unindexed_array() {
                return Err(mismatch());
            }
            if dest.array_size != value.array_size {
                return Err(CompilerError::ArraySizeMismatch {
                    lhs: dest.array_size,
                    rhs: value.array_size,
                    range: value.range,
                });
            }
            if Coercion::assign(dest.ty, value.ty).is_none() {
                return Err(mismatch());
            }
            self.codegen.copy_array(
                destination.address,
                dest.ty,
                value.handle.address.unwrap_or(Value::Null),
                value.ty,
                dest.array_size,
            );
            return Ok(());
        }

        if value.is_unindexed_array() {
            return Err(CompilerError::ArrayNotIndexed { range: value.range });
        }
        let coercion = Coercion::assign(dest.ty, value.ty).ok_or_else(mismatch)?;
        let stored = self.codegen.coerce(value_of(value), coercion);
        self.codegen.store(stored, destination.address);
        if !dest.is_indexed {
            if let Some(symbol) = self.analyzer.resolve_local_then_global_mut(&dest.name) {
                symbol.handle.value = Some(stored);
            }
        }
        Ok(())
    }

    /// if_statement ::= 'if' '(' expression ')' 'then' ( statement ';' )*
    ///                  [ 'else' ( statement ';' )* ] 'end' 'if'
    fn if_statement(&mut self) -> Result<(), CompilerError> {
        trace!("if_statement");
        let range = self.lookahead.range;
        self.expect(TokenKind::If)?;
        let header = self.expect(TokenKind::OpenParen).and_then(|()| {
            let cond = self.expression()?;
            self.expect(TokenKind::CloseParen)?;
            self.expect(TokenKind::Then)?;
            Ok(cond)
        });
        let cond = match header {
            Ok(cond) => cond,
            Err(e) => {
                self.recover_header(e, TokenKind::Then)?;
                Symbol::temporary(ValueType::Bool, Value::Bool(false), range)
            }
        };
        let coercion = self.condition(&cond);

        let (then_block, else_block) =
            self.codegen
                .branch(value_of(&cond), coercion, "if.then", "if.else");
        let merge = self.codegen.append_block("if.end");

        self.codegen.position_at_end(then_block);
        self.statement_list(&[TokenKind::Else, TokenKind::End])?;
        self.codegen.fall_through(merge);

        self.codegen.position_at_end(else_block);
        if self.eat(TokenKind::Else) {
            self.statement_list(&[TokenKind::End])?;
        }
        self.codegen.fall_through(merge);

        self.codegen.position_at_end(merge);
        self.expect(TokenKind::End)?;
        self.expect(TokenKind::If)
    }

    /// loop_statement ::= 'for' '(' assignment_statement ';' expression ')'
    ///                    ( statement ';' )* 'end' 'for'
    ///
    /// The condition is evaluated in the loop header on every iteration.
    fn loop_statement(&mut self) -> Result<(), CompilerError> {
        trace!("loop_statement");
        let range = self.lookahead.range;
        self.expect(TokenKind::For)?;
        let header = self.codegen.append_block("for.header");
        let cond = match self.loop_header(header) {
            Ok(cond) => cond,
            Err(e) => {
                self.recover_header(e, TokenKind::CloseParen)?;
                self.codegen.fall_through(header);
                self.codegen.position_at_end(header);
                Symbol::temporary(ValueType::Bool, Value::Bool(false), range)
            }
        };
        let coercion = self.condition(&cond);
        let (body, exit) = self
            .codegen
            .branch(value_of(&cond), coercion, "for.body", "for.end");

        self.codegen.position_at_end(body);
        self.statement_list(&[TokenKind::End])?;
        self.codegen.fall_through(header);

        self.codegen.position_at_end(exit);
        self.expect(TokenKind::End)?;
        self.expect(TokenKind::For)
    }

    /// '(' assignment_statement ';' expression ')', with the condition emitted
    /// into `header`.
    fn loop_header(&mut self, header: BlockId) -> Result<Symbol, CompilerError> {
        self.expect(TokenKind::OpenParen)?;
        self.assignment_statement()?;
        self.expect(TokenKind::SemiColon)?;
        self.codegen.fall_through(header);
        self.codegen.position_at_end(header);
        let cond = self.expression()?;
        self.expect(TokenKind::CloseParen)?;
        Ok(cond)
    }

    /// return_statement ::= 'return' expression
    fn return_statement(&mut self) -> Result<(), CompilerError> {
        trace!("return_statement");
        let start = self.start_range();
        self.expect(TokenKind::Return)?;
        let value = self.expression()?;
        let range = self.end_range(start);

        let procedure = self.analyzer.get_current_procedure();
        if procedure.ty == ValueType::Unknown {
            return Err(CompilerError::ReturnOutsideProcedure { range });
        }
        if value.is_unindexed_array() {
            return Err(CompilerError::ArrayNotIndexed { range: value.range });
        }
        let coercion =
            Coercion::assign(procedure.ty, value.ty).ok_or_else(|| CompilerError::TypeMismatch {
                expected: procedure.ty.to_string(),
                found: value.type_name(),
                range: value.range,
            })?;
        let returned = self.codegen.coerce(value_of(&value), coercion);
        self.codegen.ret(returned);
        Ok(())
    }

    /// Checks an `if` or `for` condition. An invalid condition is reported and the
    /// statement is parsed to its end anyway.
    fn condition(&mut self, cond: &Symbol) -> Coercion {
        let coercion = if cond.is_unindexed_array() {
            None
        } else {
            Coercion::condition(cond.ty)
        };
        coercion.unwrap_or_else(|| {
            self.report(CompilerError::InvalidCondition {
                found: cond.type_name(),
                range: cond.range,
            });
            Coercion::Identity
        })
    }

    /// expression ::= [ 'not' ] arith_op ( ( '&' | '|' ) arith_op )*
    fn expression(&mut self) -> Result<Symbol, CompilerError> {
        trace!("expression");
        let start = self.start_range();
        let not = self.eat(TokenKind::Not);
        let mut lhs = self.arith_op()?;
        if not {
            lhs = self.not(lhs, start)?;
        }
        while self.at(TokenKind::And) || self.at(TokenKind::Or) {
            let op = self.lookahead.kind;
            self.bump();
            let rhs = self.arith_op()?;
            lhs = self.binary(op, lhs, rhs, start)?;
        }
        Ok(lhs)
    }

    /// arith_op ::= relation ( ( '+' | '-' ) relation )*
    fn arith_op(&mut self) -> Result<Symbol, CompilerError> {
        self.fold(&[TokenKind::Add, TokenKind::Sub], Self::relation)
    }

    /// relation ::= term ( ( '<' | '<=' | '>' | '>=' | '==' | '!=' ) term )*
    fn relation(&mut self) -> Result<Symbol, CompilerError> {
        self.fold(
            &[
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::Eq,
                TokenKind::NotEq,
            ],
            Self::term,
        )
    }

    /// term ::= factor ( ( '*' | '/' ) factor )*
    fn term(&mut self) -> Result<Symbol, CompilerError> {
        self.fold(&[TokenKind::Mul, TokenKind::Div], Self::factor)
    }

    /// Parses a left-associative chain of `operand`s joined by `ops`.
    fn fold(
        &mut self,
        ops: &[TokenKind],
        operand: fn(&mut Self) -> Result<Symbol, CompilerError>,
    ) -> Result<Symbol, CompilerError> {
        let start = self.start_range();
        let mut lhs = operand(self)?;
        while ops.contains(&self.lookahead.kind) {
            let op = self.lookahead.kind;
            self.bump();
            let rhs = operand(self)?;
            lhs = self.binary(op, lhs, rhs, start)?;
        }
        Ok(lhs)
    }

    /// Type checks and emits one binary operator. Unindexed arrays are combined
    /// element-wise.
    fn binary(
        &mut self,
        op: TokenKind,
        lhs: Symbol,
        rhs: Symbol,
        start: TextSize,
    ) -> Result<Symbol, CompilerError> {
        let range = self.end_range(start);
        let operands = typing::binary(op, lhs.ty, rhs.ty).ok_or_else(|| {
            CompilerError::IncompatibleOperands {
                op,
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
                range,
            }
        })?;
        let result_ty = operands.result(op);

        if lhs.is_unindexed_array() || rhs.is_unindexed_array() {
            let size = match (lhs.is_unindexed_array(), rhs.is_unindexed_array()) {
                (true, true) if lhs.array_size != rhs.array_size => {
                    return Err(CompilerError::ArraySizeMismatch {
                        lhs: lhs.array_size,
                        rhs: rhs.array_size,
                        range,
                    });
                }
                (true, _) => lhs.array_size,
                _ => rhs.array_size,
            };
            let address = self.codegen.broadcast(op, &lhs, &rhs, operands, size);
            return Ok(Symbol::temporary_array(result_ty, size, address, range));
        }

        let value = self
            .codegen
            .scalar_binary(op, value_of(&lhs), value_of(&rhs), operands);
        Ok(Symbol::temporary(result_ty, value, range))
    }

    fn not(&mut self, operand: Symbol, start: TextSize) -> Result<Symbol, CompilerError> {
        let range = self.end_range(start);
        if operand.is_unindexed_array() || !matches!(operand.ty, ValueType::Bool | ValueType::Int)
        {
            return Err(CompilerError::InvalidUnaryOperand {
                op: TokenKind::Not,
                operand: operand.type_name(),
                range,
            });
        }
        let value = self.codegen.not(value_of(&operand));
        Ok(Symbol::temporary(operand.ty, value, range))
    }

    fn negate(&mut self, operand: Symbol, start: TextSize) -> Result<Symbol, CompilerError> {
        let range = self.end_range(start);
        if operand.is_unindexed_array()
            || !matches!(operand.ty, ValueType::Int | ValueType::Float)
        {
            return Err(CompilerError::InvalidUnaryOperand {
                op: TokenKind::Sub,
                operand: operand.type_name(),
                range,
            });
        }
        let value = match value_of(&operand) {
            Value::Int(v) => Value::Int(v.wrapping_neg()),
            Value::Float(v) => Value::Float(-v),
            value => self.codegen.negate(value, operand.ty),
        };
        Ok(Symbol::temporary(operand.ty, value, range))
    }

    /// factor ::= '(' expression ')' | procedure_call | [ '-' ] name | [ '-' ] number
    ///          | string | 'true' | 'false'
    fn factor(&mut self) -> Result<Symbol, CompilerError> {
        trace!("factor");
        let start = self.start_range();
        let range = self.lookahead.range;
        match self.lookahead.kind {
            TokenKind::OpenParen => {
                self.bump();
                let mut inner = self.expression()?;
                self.expect(TokenKind::CloseParen)?;
                inner.range = self.end_range(start);
                Ok(inner)
            }
            TokenKind::Ident => self.procedure_call_or_name(),
            TokenKind::Sub => {
                self.bump();
                let operand = if self.at(TokenKind::Ident) {
                    self.name()?
                } else if self.at(TokenKind::Int) || self.at(TokenKind::Float) {
                    self.number()?
                } else {
                    self.expected_kinds
                        .extend([TokenKind::Ident, TokenKind::Int, TokenKind::Float]);
                    return Err(self.unexpected());
                };
                self.negate(operand, start)
            }
            TokenKind::Int | TokenKind::Float => self.number(),
            TokenKind::Str => {
                let value = self.codegen.string_literal(self.lookahead.text());
                self.bump();
                Ok(Symbol::temporary(ValueType::String, value, range))
            }
            TokenKind::True | TokenKind::False => {
                let value = Value::Bool(self.at(TokenKind::True));
                self.bump();
                Ok(Symbol::temporary(ValueType::Bool, value, range))
            }
            _ => {
                self.expected_kinds.extend([
                    TokenKind::OpenParen,
                    TokenKind::Ident,
                    TokenKind::Sub,
                    TokenKind::Int,
                    TokenKind::Float,
                    TokenKind::Str,
                    TokenKind::True,
                    TokenKind::False,
                ]);
                Err(self.unexpected())
            }
        }
    }

    fn number(&mut self) -> Result<Symbol, CompilerError> {
        let range = self.lookahead.range;
        let symbol = match self.lookahead.value {
            TokenValue::Int(v) => Symbol::temporary(ValueType::Int, Value::Int(v), range),
            TokenValue::Float(v) => Symbol::temporary(ValueType::Float, Value::Float(v), range),
            _ => {
                self.expected_kinds.extend([TokenKind::Int, TokenKind::Float]);
                return Err(self.unexpected());
            }
        };
        self.bump();
        Ok(symbol)
    }

    fn resolve(&self, name: &str, range: TextRange) -> Result<Symbol, CompilerError> {
        self.analyzer
            .resolve_local_then_global(name)
            .cloned()
            .ok_or_else(|| CompilerError::UndeclaredIdentifier {
                name: name.into(),
                range,
            })
    }

    /// An identifier followed by `(` is a call, anything else is a name.
    fn procedure_call_or_name(&mut self) -> Result<Symbol, CompilerError> {
        let start = self.start_range();
        let (name, range) = self.identifier()?;
        let symbol = self.resolve(&name, range)?;
        if self.at(TokenKind::OpenParen) {
            if !symbol.is_procedure() {
                return Err(CompilerError::NotAProcedure { name, range });
            }
            self.procedure_call(symbol, start)
        } else {
            self.name_of(symbol, range)
        }
    }

    /// name ::= identifier [ '[' expression ']' ]
    fn name(&mut self) -> Result<Symbol, CompilerError> {
        let (name, range) = self.identifier()?;
        let symbol = self.resolve(&name, range)?;
        self.name_of(symbol, range)
    }

    /// Loads a variable or one of its elements. A whole array is not loaded; only
    /// its address is kept.
    fn name_of(&mut self, mut symbol: Symbol, range: TextRange) -> Result<Symbol, CompilerError> {
        if symbol.kind != Some(SymbolKind::Variable) {
            return Err(CompilerError::NotAVariable {
                name: symbol.name,
                range,
            });
        }
        if self.eat(TokenKind::OpenBracket) {
            let address = self.index(&symbol, range)?;
            symbol.handle.value = Some(self.codegen.load(symbol.ty, address));
            symbol.is_indexed = true;
            symbol.range = self.end_range(range.start());
        } else if symbol.is_array {
            symbol.handle.value = None;
            symbol.range = range;
        } else {
            let address = symbol.handle.address.unwrap_or(Value::Null);
            symbol.handle.value = Some(self.codegen.load(symbol.ty, address));
            symbol.range = range;
        }
        Ok(symbol)
    }

    /// Parses `expression ']'` after a `[` and returns the bounds-checked element address.
    fn index(&mut self, array: &Symbol, range: TextRange) -> Result<Value, CompilerError> {
        if !array.is_array {
            return Err(CompilerError::NotAnArray {
                name: array.name.clone(),
                range,
            });
        }
        let index = self.expression()?;
        if index.is_unindexed_array() || index.ty != ValueType::Int {
            return Err(CompilerError::InvalidIndex {
                found: index.type_name(),
                range: index.range,
            });
        }
        self.expect(TokenKind::CloseBracket)?;
        Ok(self.codegen.checked_element(array, value_of(&index)))
    }

    /// procedure_call ::= identifier '(' [ argument_list ] ')'
    fn procedure_call(&mut self, callee: Symbol, start: TextSize) -> Result<Symbol, CompilerError> {
        trace!("procedure_call {}", callee.name);
        self.expect(TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::CloseParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen)?;
        let range = self.end_range(start);

        if args.len() != callee.params.len() {
            return Err(CompilerError::ArityMismatch {
                name: callee.name,
                expected: callee.params.len(),
                found: args.len(),
                range,
            });
        }
        let mut values = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&callee.params) {
            values.push(self.argument(arg, param)?);
        }
        let Some(func) = callee.handle.function else {
            return Err(CompilerError::NotAProcedure {
                name: callee.name,
                range,
            });
        };
        let value = self.codegen.call(func, values);
        Ok(Symbol::temporary(callee.ty, value, range))
    }

    /// Binds one argument to its parameter. Arrays must match exactly and are
    /// passed by value.
    fn argument(&mut self, arg: &Symbol, param: &Symbol) -> Result<Value, CompilerError> {
        let mismatch = || CompilerError::TypeMismatch {
            expected: param.type_name(),
            found: arg.type_name(),
            range: arg.range,
        };
        if param.is_array {
            if !arg.is_unindexed_array()
                || arg.ty != param.ty
                || arg.array_size != param.array_size
            {
                return Err(mismatch());
            }
            return Ok(self.codegen.load_aggregate(arg));
        }
        if arg.is_unindexed_array() {
            return Err(mismatch());
        }
        let coercion = Coercion::assign(param.ty, arg.ty).ok_or_else(mismatch)?;
        Ok(self.codegen.coerce(value_of(arg), coercion))
    }
}

/// The computed value of a scalar expression.
fn value_of(symbol: &Symbol) -> Value {
    symbol.handle.value.unwrap_or(Value::Null)
}
