//! The runtime: memory and the runtime library.
//!
//! Memory is a list of allocations, each a flat sequence of scalar cells. An array
//! of `n` elements occupies `n` consecutive cells, a string one cell per byte
//! including the terminating NUL.

use std::{
    fmt,
    io::{self, BufRead, Write},
};

use compact_str::CompactString;
use thiserror::Error;

use crate::compiler::{analyzer::BOUNDS_TRAP, ir::Type};

/// Longest line accepted by `getstring`, in bytes.
pub const MAX_INPUT_STRING: usize = 255;

/// Errors raised while running a program.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("index out of bounds")]
    IndexOutOfBounds,
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid input (expected {expected}, found {found:?})")]
    InvalidInput {
        expected: &'static str,
        found: String,
    },
    #[error("call stack overflow")]
    StackOverflow,
    #[error("module has no entry point")]
    MissingEntry,
    #[error("invalid memory access")]
    InvalidMemoryAccess,
    #[error("unknown runtime routine `{0}`")]
    UnknownBuiltin(CompactString),
    #[error("operand is not {0}")]
    InvalidOperand(&'static str),
    #[error("reached unreachable code")]
    Unreachable,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// An address: an allocation and a cell offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub alloc: usize,
    pub offset: usize,
}

impl Pointer {
    /// Moves the pointer by `cells`, which may be negative.
    pub fn offset_by(self, cells: i64) -> Result<Pointer, RuntimeError> {
        let offset = i64::try_from(self.offset)
            .ok()
            .and_then(|offset| offset.checked_add(cells))
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or(RuntimeError::InvalidMemoryAccess)?;
        Ok(Pointer {
            alloc: self.alloc,
            offset,
        })
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RtValue {
    #[default]
    Void,
    Int(i32),
    Float(f32),
    Bool(bool),
    Byte(u8),
    /// `None` is the null pointer.
    Ptr(Option<Pointer>),
    /// The cells of a whole array.
    Aggregate(Vec<RtValue>),
}

impl RtValue {
    /// The zeroed cells of a value of type `ty`.
    pub fn zeroed(ty: &Type) -> Vec<RtValue> {
        let zero = match ty.element() {
            Type::I1 => RtValue::Bool(false),
            Type::I8 => RtValue::Byte(0),
            Type::F32 => RtValue::Float(0.0),
            Type::Ptr => RtValue::Ptr(None),
            Type::Void => RtValue::Void,
            _ => RtValue::Int(0),
        };
        vec![zero; cells(ty)]
    }

    /// Integer view of a value. Bools are 0 or 1.
    pub fn as_int(&self) -> Result<i32, RuntimeError> {
        match self {
            RtValue::Int(v) => Ok(*v),
            RtValue::Bool(v) => Ok(i32::from(*v)),
            RtValue::Byte(v) => Ok(i32::from(*v)),
            _ => Err(RuntimeError::InvalidOperand("an integer")),
        }
    }

    pub fn as_float(&self) -> Result<f32, RuntimeError> {
        match self {
            RtValue::Float(v) => Ok(*v),
            _ => Err(RuntimeError::InvalidOperand("a float")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            RtValue::Bool(v) => Ok(*v),
            _ => Err(RuntimeError::InvalidOperand("a bool")),
        }
    }

    pub fn as_ptr(&self) -> Result<Option<Pointer>, RuntimeError> {
        match self {
            RtValue::Ptr(v) => Ok(*v),
            _ => Err(RuntimeError::InvalidOperand("a pointer")),
        }
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtValue::Void => f.write_str("void"),
            RtValue::Int(v) => write!(f, "{v}"),
            RtValue::Float(v) => write!(f, "{v:.6}"),
            RtValue::Bool(v) => write!(f, "{}", i32::from(*v)),
            RtValue::Byte(v) => write!(f, "{v}"),
            RtValue::Ptr(Some(p)) => write!(f, "{}+{}", p.alloc, p.offset),
            RtValue::Ptr(None) => f.write_str("null"),
            RtValue::Aggregate(cells) => write!(f, "[{} cells]", cells.len()),
        }
    }
}

/// Number of cells a value of type `ty` occupies.
pub fn cells(ty: &Type) -> usize {
    match ty {
        Type::Array(elem, len) => cells(elem) * (*len as usize),
        _ => 1,
    }
}

#[derive(Debug, Default)]
pub struct Memory {
    allocations: Vec<Option<Vec<RtValue>>>,
    /// Slots released by [`Memory::free`], reused before growing.
    vacant: Vec<usize>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, cells: Vec<RtValue>) -> Pointer {
        let alloc = if let Some(alloc) = self.vacant.pop() {
            self.allocations[alloc] = Some(cells);
            alloc
        } else {
            self.allocations.push(Some(cells));
            self.allocations.len() - 1
        };
        Pointer { alloc, offset: 0 }
    }

    /// Releases an allocation. Its slot may be handed out again by a later
    /// [`Memory::allocate`].
    pub fn free(&mut self, ptr: Pointer) {
        if let Some(slot) = self.allocations.get_mut(ptr.alloc) {
            if slot.take().is_some() {
                self.vacant.push(ptr.alloc);
            }
        }
    }

    /// Number of allocations that have not been freed.
    pub fn live(&self) -> usize {
        self.allocations.iter().filter(|a| a.is_some()).count()
    }

    fn range(&self, ptr: Pointer, len: usize) -> Result<&[RtValue], RuntimeError> {
        self.allocations
            .get(ptr.alloc)
            .and_then(Option::as_ref)
            .and_then(|cells| cells.get(ptr.offset..ptr.offset.checked_add(len)?))
            .ok_or(RuntimeError::InvalidMemoryAccess)
    }

    fn range_mut(&mut self, ptr: Pointer, len: usize) -> Result<&mut [RtValue], RuntimeError> {
        self.allocations
            .get_mut(ptr.alloc)
            .and_then(Option::as_mut)
            .and_then(|cells| cells.get_mut(ptr.offset..ptr.offset.checked_add(len)?))
            .ok_or(RuntimeError::InvalidMemoryAccess)
    }

    /// Reads a value of type `ty`. Arrays are read as an aggregate.
    ///
    /// A byte read through the null pointer yields the terminating NUL, so that an
    /// unassigned string compares like the empty string.
    pub fn load(&self, ptr: Option<Pointer>, ty: &Type) -> Result<RtValue, RuntimeError> {
        let ptr = match (ptr, ty) {
            (Some(ptr), _) => ptr,
            (None, Type::I8) => return Ok(RtValue::Byte(0)),
            (None, _) => return Err(RuntimeError::InvalidMemoryAccess),
        };
        let cells = self.range(ptr, cells(ty))?;
        match ty {
            Type::Array(..) => Ok(RtValue::Aggregate(cells.to_vec())),
            _ => Ok(cells[0].clone()),
        }
    }

    pub fn store(&mut self, ptr: Option<Pointer>, value: RtValue) -> Result<(), RuntimeError> {
        let ptr = ptr.ok_or(RuntimeError::InvalidMemoryAccess)?;
        match value {
            RtValue::Aggregate(values) => {
                self.range_mut(ptr, values.len())?.clone_from_slice(&values);
            }
            value => self.range_mut(ptr, 1)?[0] = value,
        }
        Ok(())
    }

    /// Allocates a NUL-terminated copy of `text`.
    pub fn allocate_string(&mut self, text: &str) -> Pointer {
        let cells = text
            .bytes()
            .chain([0])
            .map(RtValue::Byte)
            .collect();
        self.allocate(cells)
    }

    /// Reads a NUL-terminated string. The null pointer reads as an empty string.
    pub fn read_string(&self, ptr: Option<Pointer>) -> Result<String, RuntimeError> {
        let Some(ptr) = ptr else {
            return Ok(String::new());
        };
        let cells = self
            .allocations
            .get(ptr.alloc)
            .and_then(Option::as_ref)
            .and_then(|cells| cells.get(ptr.offset..))
            .ok_or(RuntimeError::InvalidMemoryAccess)?;
        let mut bytes = Vec::new();
        for cell in cells {
            match cell {
                RtValue::Byte(0) => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
                RtValue::Byte(b) => bytes.push(*b),
                _ => return Err(RuntimeError::InvalidMemoryAccess),
            }
        }
        Err(RuntimeError::InvalidMemoryAccess)
    }
}

/// The standard streams of a running program.
pub struct Io<'a> {
    pub input: &'a mut dyn BufRead,
    pub output: &'a mut dyn Write,
}

impl fmt::Debug for Io<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Io").finish_non_exhaustive()
    }
}

impl Io<'_> {
    fn read_line(&mut self, expected: &'static str) -> Result<String, RuntimeError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(RuntimeError::InvalidInput {
                expected,
                found: "end of input".to_owned(),
            });
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }

    fn read_int(&mut self) -> Result<i32, RuntimeError> {
        let line = self.read_line("an integer")?;
        line.trim()
            .parse()
            .map_err(|_| RuntimeError::InvalidInput {
                expected: "an integer",
                found: line,
            })
    }

    fn read_float(&mut self) -> Result<f32, RuntimeError> {
        let line = self.read_line("a float")?;
        line.trim()
            .parse()
            .map_err(|_| RuntimeError::InvalidInput {
                expected: "a float",
                found: line,
            })
    }
}

fn arg(args: &[RtValue], index: usize) -> Result<&RtValue, RuntimeError> {
    args.get(index).ok_or(RuntimeError::InvalidOperand("an argument"))
}

/// Runs the runtime library routine `name`.
pub fn call_builtin(
    name: &str,
    args: &[RtValue],
    memory: &mut Memory,
    io: &mut Io<'_>,
) -> Result<RtValue, RuntimeError> {
    match name {
        "getbool" => Ok(RtValue::Bool(io.read_int()? != 0)),
        "getinteger" => Ok(RtValue::Int(io.read_int()?)),
        "getfloat" => Ok(RtValue::Float(io.read_float()?)),
        "getstring" => {
            let mut line = io.read_line("a string")?;
            if line.len() > MAX_INPUT_STRING {
                let mut end = MAX_INPUT_STRING;
                while !line.is_char_boundary(end) {
                    end -= 1;
                }
                line.truncate(end);
            }
            Ok(RtValue::Ptr(Some(memory.allocate_string(&line))))
        }
        "putbool" => {
            writeln!(io.output, "{}", i32::from(arg(args, 0)?.as_bool()?))?;
            Ok(RtValue::Bool(true))
        }
        "putinteger" => {
            writeln!(io.output, "{}", arg(args, 0)?.as_int()?)?;
            Ok(RtValue::Bool(true))
        }
        "putfloat" => {
            writeln!(io.output, "{:.6}", arg(args, 0)?.as_float()?)?;
            Ok(RtValue::Bool(true))
        }
        "putstring" => {
            let text = memory.read_string(arg(args, 0)?.as_ptr()?)?;
            writeln!(io.output, "{text}")?;
            Ok(RtValue::Bool(true))
        }
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        "sqrt" => Ok(RtValue::Float((arg(args, 0)?.as_int()? as f32).sqrt())),
        BOUNDS_TRAP => {
            writeln!(io.output, "Error: Index out of bounds")?;
            Err(RuntimeError::IndexOutOfBounds)
        }
        _ => Err(RuntimeError::UnknownBuiltin(name.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_builtin(name: &str, args: &[RtValue], input: &str) -> (RtValue, String) {
        let mut memory = Memory::new();
        let mut input = input.as_bytes();
        let mut output = Vec::new();
        let mut io = Io {
            input: &mut input,
            output: &mut output,
        };
        let value = call_builtin(name, args, &mut memory, &mut io).unwrap();
        (value, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_put_formats() {
        assert_eq!(
            run_builtin("putbool", &[RtValue::Bool(true)], ""),
            (RtValue::Bool(true), "1\n".to_owned())
        );
        assert_eq!(run_builtin("putinteger", &[RtValue::Int(-7)], "").1, "-7\n");
        assert_eq!(run_builtin("putfloat", &[RtValue::Float(3.0)], "").1, "3.000000\n");
    }

    #[test]
    fn test_get_values() {
        assert_eq!(run_builtin("getinteger", &[], "42\n").0, RtValue::Int(42));
        assert_eq!(run_builtin("getbool", &[], "0\n").0, RtValue::Bool(false));
        assert_eq!(run_builtin("getfloat", &[], "2.5\n").0, RtValue::Float(2.5));
        assert_eq!(run_builtin("sqrt", &[RtValue::Int(16)], "").0, RtValue::Float(4.0));
    }

    #[test]
    fn test_invalid_input() {
        let mut memory = Memory::new();
        let mut input = "abc\n".as_bytes();
        let mut output = Vec::new();
        let mut io = Io {
            input: &mut input,
            output: &mut output,
        };
        assert!(matches!(
            call_builtin("getinteger", &[], &mut memory, &mut io),
            Err(RuntimeError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_strings() {
        let mut memory = Memory::new();
        let ptr = memory.allocate_string("hello");
        assert_eq!(memory.read_string(Some(ptr)).unwrap(), "hello");
        assert_eq!(memory.read_string(None).unwrap(), "");
        assert_eq!(
            memory.load(Some(ptr.offset_by(5).unwrap()), &Type::I8).unwrap(),
            RtValue::Byte(0)
        );
    }

    #[test]
    fn test_aggregate_store_and_free() {
        let mut memory = Memory::new();
        let ty = Type::array(Type::I32, 3);
        let ptr = memory.allocate(RtValue::zeroed(&ty));
        let values = RtValue::Aggregate(vec![RtValue::Int(1), RtValue::Int(2), RtValue::Int(3)]);
        memory.store(Some(ptr), values.clone()).unwrap();
        assert_eq!(memory.load(Some(ptr), &ty).unwrap(), values);
        assert!(memory.load(Some(ptr.offset_by(3).unwrap()), &Type::I32).is_err());
        memory.free(ptr);
        assert_eq!(memory.live(), 0);
        assert!(memory.load(Some(ptr), &Type::I32).is_err());
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut memory = Memory::new();
        let global = memory.allocate(vec![RtValue::Int(7)]);
        for _ in 0..10_000 {
            let frame = memory.allocate(RtValue::zeroed(&Type::array(Type::F32, 4)));
            let scratch = memory.allocate(vec![RtValue::Bool(false)]);
            memory.free(scratch);
            memory.free(frame);
            memory.free(frame);
        }
        assert_eq!(memory.live(), 1);
        assert!(memory.allocations.len() <= 3);
        assert_eq!(memory.load(Some(global), &Type::I32).unwrap(), RtValue::Int(7));
    }

    #[test]
    fn test_null_byte_reads_as_terminator() {
        let memory = Memory::new();
        assert_eq!(memory.load(None, &Type::I8).unwrap(), RtValue::Byte(0));
        assert!(memory.load(None, &Type::I32).is_err());
    }
}
