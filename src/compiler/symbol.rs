//! Symbols: the named entities a program declares.

use std::fmt;

use compact_str::CompactString;
use text_size::TextRange;

use super::{
    ir::{FuncId, Type, Value},
    token::TokenKind,
};

/// The semantic type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueType {
    Int,
    Float,
    String,
    Bool,
    Void,
    #[default]
    Unknown,
}

impl ValueType {
    /// The type named by a type mark token.
    pub const fn from_type_mark(kind: TokenKind) -> Option<ValueType> {
        match kind {
            TokenKind::IntegerType => Some(ValueType::Int),
            TokenKind::FloatType => Some(ValueType::Float),
            TokenKind::StringType => Some(ValueType::String),
            TokenKind::BoolType => Some(ValueType::Bool),
            _ => None,
        }
    }

    /// The target type of a scalar of this type.
    pub const fn ir_type(self) -> Type {
        match self {
            ValueType::Int => Type::I32,
            ValueType::Float => Type::F32,
            ValueType::String => Type::Ptr,
            ValueType::Bool => Type::I1,
            ValueType::Void | ValueType::Unknown => Type::Void,
        }
    }

    /// The zero value used to initialize globals.
    pub const fn zero(self) -> Value {
        match self {
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Bool => Value::Bool(false),
            ValueType::String | ValueType::Void | ValueType::Unknown => Value::Null,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Int => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Void => "void",
            ValueType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Keyword,
    Variable,
    Procedure,
    /// The name of the program itself.
    Program,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SymbolKind::Keyword => "keyword",
            SymbolKind::Variable => "variable",
            SymbolKind::Procedure => "procedure",
            SymbolKind::Program => "program",
        })
    }
}

/// Target-side references attached to a symbol by code generation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Handle {
    /// The most recently computed value.
    pub value: Option<Value>,
    /// The storage location.
    pub address: Option<Value>,
    /// The callable of a procedure.
    pub function: Option<FuncId>,
}

/// A named entity, or the result of an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Symbol {
    pub name: CompactString,
    pub token_kind: Option<TokenKind>,
    pub kind: Option<SymbolKind>,
    pub ty: ValueType,
    pub is_global: bool,
    pub is_array: bool,
    pub array_size: u32,
    /// Set on the result of an expression that indexed this array.
    pub is_indexed: bool,
    /// Procedure parameters, in declaration order.
    pub params: Vec<Symbol>,
    pub handle: Handle,
    pub range: TextRange,
}

impl Symbol {
    pub fn keyword(kind: TokenKind) -> Self {
        Symbol {
            name: kind.name().into(),
            token_kind: Some(kind),
            kind: Some(SymbolKind::Keyword),
            is_global: true,
            ..Symbol::default()
        }
    }

    pub fn variable(name: &str, ty: ValueType, range: TextRange) -> Self {
        Symbol {
            name: name.into(),
            token_kind: Some(TokenKind::Ident),
            kind: Some(SymbolKind::Variable),
            ty,
            range,
            ..Symbol::default()
        }
    }

    pub fn procedure(name: &str, ty: ValueType, params: Vec<Symbol>, range: TextRange) -> Self {
        Symbol {
            name: name.into(),
            token_kind: Some(TokenKind::Ident),
            kind: Some(SymbolKind::Procedure),
            ty,
            params,
            range,
            ..Symbol::default()
        }
    }

    /// An anonymous expression result.
    pub fn temporary(ty: ValueType, value: Value, range: TextRange) -> Self {
        Symbol {
            ty,
            range,
            handle: Handle {
                value: Some(value),
                ..Handle::default()
            },
            ..Symbol::default()
        }
    }

    /// An anonymous array-valued expression result stored at `address`.
    pub fn temporary_array(ty: ValueType, size: u32, address: Value, range: TextRange) -> Self {
        Symbol {
            ty,
            is_array: true,
            array_size: size,
            range,
            handle: Handle {
                address: Some(address),
                ..Handle::default()
            },
            ..Symbol::default()
        }
    }

    pub fn is_procedure(&self) -> bool {
        self.kind == Some(SymbolKind::Procedure)
    }

    /// True if this refers to a whole array rather than one element.
    pub const fn is_unindexed_array(&self) -> bool {
        self.is_array && !self.is_indexed
    }

    /// The target type of the declared storage.
    pub fn storage_type(&self) -> Type {
        if self.is_array {
            Type::array(self.ty.ir_type(), self.array_size)
        } else {
            self.ty.ir_type()
        }
    }

    /// The type as written in source, e.g. `integer[5]`.
    pub fn type_name(&self) -> String {
        if self.is_unindexed_array() {
            format!("{}[{}]", self.ty, self.array_size)
        } else {
            self.ty.to_string()
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind.map_or_else(|| "value".to_owned(), |k| k.to_string());
        write!(f, "{:<12} {:<10} {}", self.name, kind, self.type_name())?;
        if self.is_global {
            f.write_str(" global")?;
        }
        if self.is_procedure() {
            write!(f, " (")?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {}", param.name, param.type_name())?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
