//! Code blocks and the bytecode they carry
//!
//! A `CodeBlock` is a compiled unit: its argument counts, locals layout,
//! constant pool, referenced-name pool and a raw bytecode payload executed
//! by [`crate::interp::Interpreter`].
//!
//! # Instruction encoding
//!
//! Every instruction is exactly three bytes:
//!
//! ```text
//! [opcode: u8] [arg: u16 little-endian]
//! ```
//!
//! Jump targets are byte offsets into the payload. Instructions without an
//! operand carry a zero argument.

use crate::value::Value;
use indexmap::IndexSet;

/// Width of one encoded instruction in bytes
pub const INSTRUCTION_WIDTH: usize = 3;

/// Code flag bits
pub mod flags {
    /// Locals live in a fast array
    pub const OPTIMIZED: u32 = 0x0001;
    /// A fresh locals namespace is created per call
    pub const NEWLOCALS: u32 = 0x0002;
    /// Defined inside another function
    pub const NESTED: u32 = 0x0010;
    /// Code of a generator function (preserved, not executed)
    pub const GENERATOR: u32 = 0x0020;
}

/// Opcodes understood by the interpreter
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Nop = 0,
    PopTop = 1,
    Dup = 2,
    LoadConst = 3,
    LoadFast = 4,
    StoreFast = 5,
    LoadGlobal = 6,
    StoreGlobal = 7,
    /// Read cell `arg` (cellvars first, then freevars)
    LoadDeref = 8,
    StoreDeref = 9,
    /// Push the cell object itself, for building nested closures
    LoadClosure = 10,
    LoadAttr = 11,
    /// TOS is the object, TOS1 the value
    StoreAttr = 12,
    /// `arg` is a [`BinaryOp`]
    BinaryOp = 13,
    /// `arg` is a [`CompareOp`]
    CompareOp = 14,
    UnaryNot = 15,
    BinarySubscr = 16,
    Jump = 17,
    PopJumpIfFalse = 18,
    PopJumpIfTrue = 19,
    /// `arg` is the positional argument count
    Call = 20,
    /// `arg` holds [`make_function`] flags
    MakeFunction = 21,
    BuildTuple = 22,
    BuildList = 23,
    ReturnValue = 24,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let op = match byte {
            0 => Opcode::Nop,
            1 => Opcode::PopTop,
            2 => Opcode::Dup,
            3 => Opcode::LoadConst,
            4 => Opcode::LoadFast,
            5 => Opcode::StoreFast,
            6 => Opcode::LoadGlobal,
            7 => Opcode::StoreGlobal,
            8 => Opcode::LoadDeref,
            9 => Opcode::StoreDeref,
            10 => Opcode::LoadClosure,
            11 => Opcode::LoadAttr,
            12 => Opcode::StoreAttr,
            13 => Opcode::BinaryOp,
            14 => Opcode::CompareOp,
            15 => Opcode::UnaryNot,
            16 => Opcode::BinarySubscr,
            17 => Opcode::Jump,
            18 => Opcode::PopJumpIfFalse,
            19 => Opcode::PopJumpIfTrue,
            20 => Opcode::Call,
            21 => Opcode::MakeFunction,
            22 => Opcode::BuildTuple,
            23 => Opcode::BuildList,
            24 => Opcode::ReturnValue,
            other => return Err(other),
        };
        Ok(op)
    }
}

impl Opcode {
    /// Net stack effect, used for the stack size hint
    fn stack_effect(self, raw: u16) -> i32 {
        let arg = i32::from(raw);
        match self {
            Opcode::Nop | Opcode::Jump | Opcode::UnaryNot | Opcode::LoadAttr => 0,
            Opcode::PopTop
            | Opcode::StoreFast
            | Opcode::StoreGlobal
            | Opcode::StoreDeref
            | Opcode::BinaryOp
            | Opcode::CompareOp
            | Opcode::BinarySubscr
            | Opcode::PopJumpIfFalse
            | Opcode::PopJumpIfTrue
            | Opcode::ReturnValue => -1,
            Opcode::StoreAttr => -2,
            Opcode::Dup
            | Opcode::LoadConst
            | Opcode::LoadFast
            | Opcode::LoadGlobal
            | Opcode::LoadDeref
            | Opcode::LoadClosure => 1,
            Opcode::Call => -arg,
            Opcode::MakeFunction => {
                -(i32::from(raw & make_function::DEFAULTS != 0)
                    + i32::from(raw & make_function::CLOSURE != 0))
            }
            Opcode::BuildTuple | Opcode::BuildList => 1 - arg,
        }
    }
}

/// Operand of [`Opcode::BinaryOp`]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    FloorDiv = 3,
    Mod = 4,
    TrueDiv = 5,
}

impl TryFrom<u16> for BinaryOp {
    type Error = u16;

    fn try_from(arg: u16) -> Result<Self, Self::Error> {
        match arg {
            0 => Ok(BinaryOp::Add),
            1 => Ok(BinaryOp::Sub),
            2 => Ok(BinaryOp::Mul),
            3 => Ok(BinaryOp::FloorDiv),
            4 => Ok(BinaryOp::Mod),
            5 => Ok(BinaryOp::TrueDiv),
            other => Err(other),
        }
    }
}

/// Operand of [`Opcode::CompareOp`]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
}

impl TryFrom<u16> for CompareOp {
    type Error = u16;

    fn try_from(arg: u16) -> Result<Self, Self::Error> {
        match arg {
            0 => Ok(CompareOp::Lt),
            1 => Ok(CompareOp::Le),
            2 => Ok(CompareOp::Eq),
            3 => Ok(CompareOp::Ne),
            4 => Ok(CompareOp::Gt),
            5 => Ok(CompareOp::Ge),
            other => Err(other),
        }
    }
}

/// Flag bits for [`Opcode::MakeFunction`]
///
/// Stack layout before the instruction, bottom to top:
/// `[defaults tuple]? [closure tuple of cells]? code`.
pub mod make_function {
    pub const DEFAULTS: u16 = 0x01;
    pub const CLOSURE: u16 = 0x08;
}

/// A compiled code block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeBlock {
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: u32,
    /// Raw bytecode payload
    pub code: Vec<u8>,
    pub consts: Vec<Value>,
    /// Global and attribute names the bytecode refers to
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub filename: String,
    pub name: String,
    pub firstlineno: u32,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
}

impl CodeBlock {
    /// The referenced-name pool: `names` of this block and of every code
    /// block nested in its constants
    pub fn referenced_names(&self) -> IndexSet<&str> {
        let mut out = IndexSet::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut IndexSet<&'a str>) {
        out.extend(self.names.iter().map(String::as_str));
        for constant in &self.consts {
            if let Value::Code(nested) = constant {
                nested.collect_names(out);
            }
        }
    }

    /// Number of closure cell slots a function over this code needs
    pub fn cell_slots(&self) -> usize {
        self.cellvars.len() + self.freevars.len()
    }
}

/// Assembler for code blocks
///
/// ```
/// use objgraph_core::code::{CodeBuilder, Opcode, BinaryOp};
///
/// let mut b = CodeBuilder::new("add", &["a", "b"]);
/// b.emit(Opcode::LoadFast, 0);
/// b.emit(Opcode::LoadFast, 1);
/// b.emit(Opcode::BinaryOp, BinaryOp::Add as u16);
/// b.emit(Opcode::ReturnValue, 0);
/// let code = b.build();
/// assert_eq!(code.argcount, 2);
/// ```
#[derive(Debug)]
pub struct CodeBuilder {
    block: CodeBlock,
    depth: i32,
    max_depth: i32,
}

impl CodeBuilder {
    /// Start a block whose positional parameters are `params`
    pub fn new(name: &str, params: &[&str]) -> Self {
        let block = CodeBlock {
            argcount: u32::try_from(params.len()).unwrap_or(u32::MAX),
            flags: flags::OPTIMIZED | flags::NEWLOCALS,
            varnames: params.iter().map(|p| p.to_string()).collect(),
            name: name.to_string(),
            filename: "<objgraph>".to_string(),
            firstlineno: 1,
            ..CodeBlock::default()
        };
        Self {
            block,
            depth: 0,
            max_depth: 0,
        }
    }

    pub fn filename(&mut self, filename: &str) -> &mut Self {
        self.block.filename = filename.to_string();
        self
    }

    pub fn firstlineno(&mut self, line: u32) -> &mut Self {
        self.block.firstlineno = line;
        self
    }

    pub fn set_flags(&mut self, bits: u32) -> &mut Self {
        self.block.flags |= bits;
        self
    }

    /// Declare cell variables (locals captured by nested closures)
    pub fn cellvars(&mut self, names: &[&str]) -> &mut Self {
        self.block.cellvars = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Declare free variables (captured from an enclosing scope)
    pub fn freevars(&mut self, names: &[&str]) -> &mut Self {
        self.block.freevars = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Add a constant, returning its index
    pub fn konst(&mut self, value: Value) -> u16 {
        self.block.consts.push(value);
        index_u16(self.block.consts.len() - 1)
    }

    /// Intern a referenced name, returning its index
    pub fn name(&mut self, name: &str) -> u16 {
        intern(&mut self.block.names, name)
    }

    /// Intern a local variable, returning its slot
    pub fn local(&mut self, name: &str) -> u16 {
        intern(&mut self.block.varnames, name)
    }

    /// Current offset, usable as a jump target
    pub fn label(&self) -> u16 {
        index_u16(self.block.code.len())
    }

    /// Append an instruction and return its offset
    pub fn emit(&mut self, op: Opcode, arg: u16) -> usize {
        let at = self.block.code.len();
        self.block.code.push(op as u8);
        self.block.code.extend_from_slice(&arg.to_le_bytes());
        self.depth += op.stack_effect(arg);
        self.max_depth = self.max_depth.max(self.depth);
        at
    }

    /// Rewrite the operand of the jump emitted at `at`
    pub fn patch_jump(&mut self, at: usize, target: u16) {
        if let Some(slot) = self.block.code.get_mut(at + 1..at + INSTRUCTION_WIDTH) {
            slot.copy_from_slice(&target.to_le_bytes());
        }
    }

    pub fn build(mut self) -> CodeBlock {
        self.block.nlocals = u32::try_from(self.block.varnames.len()).unwrap_or(u32::MAX);
        self.block.stacksize = u32::try_from(self.max_depth.max(1)).unwrap_or(1);
        if !self.block.freevars.is_empty() {
            self.block.flags |= flags::NESTED;
        }
        self.block
    }
}

fn intern(pool: &mut Vec<String>, name: &str) -> u16 {
    if let Some(pos) = pool.iter().position(|n| n == name) {
        return index_u16(pos);
    }
    pool.push(name.to_string());
    index_u16(pool.len() - 1)
}

fn index_u16(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_instruction_encoding() {
        let mut b = CodeBuilder::new("f", &[]);
        let at = b.emit(Opcode::LoadConst, 0x0102);
        assert_eq!(at, 0);
        let code = b.build();
        assert_eq!(code.code, vec![Opcode::LoadConst as u8, 0x02, 0x01]);
    }

    #[test]
    fn test_opcode_decoding_rejects_unknown() {
        assert_eq!(Opcode::try_from(24u8), Ok(Opcode::ReturnValue));
        assert_eq!(Opcode::try_from(200u8), Err(200u8));
    }

    #[test]
    fn test_names_are_interned() {
        let mut b = CodeBuilder::new("f", &[]);
        assert_eq!(b.name("fact"), 0);
        assert_eq!(b.name("other"), 1);
        assert_eq!(b.name("fact"), 0);
    }

    #[test]
    fn test_patch_jump() {
        let mut b = CodeBuilder::new("f", &[]);
        let jump = b.emit(Opcode::Jump, 0);
        let target = b.label();
        b.patch_jump(jump, target);
        let code = b.build();
        assert_eq!(&code.code[1..3], &3u16.to_le_bytes());
    }

    #[test]
    fn test_referenced_names_include_nested_code() {
        let mut inner = CodeBuilder::new("inner", &[]);
        inner.name("helper");
        let inner = inner.build();

        let mut outer = CodeBuilder::new("outer", &[]);
        outer.name("top");
        outer.konst(Value::Code(Rc::new(inner)));
        let outer = outer.build();

        let names = outer.referenced_names();
        assert!(names.contains("top"));
        assert!(names.contains("helper"));
    }

    #[test]
    fn test_stacksize_hint() {
        let mut b = CodeBuilder::new("f", &["a", "b"]);
        b.emit(Opcode::LoadFast, 0);
        b.emit(Opcode::LoadFast, 1);
        b.emit(Opcode::BinaryOp, BinaryOp::Add as u16);
        b.emit(Opcode::ReturnValue, 0);
        let code = b.build();
        assert_eq!(code.stacksize, 2);
        assert_eq!(code.nlocals, 2);
    }

    #[test]
    fn test_make_function_stack_effect() {
        let both = make_function::DEFAULTS | make_function::CLOSURE;
        assert_eq!(Opcode::MakeFunction.stack_effect(0), 0);
        assert_eq!(Opcode::MakeFunction.stack_effect(make_function::CLOSURE), -1);
        assert_eq!(Opcode::MakeFunction.stack_effect(both), -2);
        assert_eq!(Opcode::Call.stack_effect(3), -3);
        assert_eq!(Opcode::BuildTuple.stack_effect(2), -1);

        let mut b = CodeBuilder::new("outer", &["x"]);
        b.cellvars(&["x"]);
        b.emit(Opcode::LoadClosure, 0);
        b.emit(Opcode::BuildTuple, 1);
        b.emit(Opcode::LoadConst, 0);
        b.emit(Opcode::MakeFunction, make_function::CLOSURE);
        b.emit(Opcode::ReturnValue, 0);
        assert_eq!(b.build().stacksize, 2);
    }
}
