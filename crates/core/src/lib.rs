//! objgraph core: a small dynamic object model with a bytecode interpreter
//!
//! This crate provides the live values that the `objgraph` serializer walks
//! and rebuilds: primitives, containers, functions with closures and
//! globals, classes with inheritance, modules and one-shot generators.
//!
//! Key design principles:
//! - Value: a cheap-to-clone handle; composites are `Rc`-shared, so two
//!   handles can name the same object (`Value::same_object`)
//! - Cells and class attribute tables are interior-mutable, so a recursive
//!   function or class can be completed after it is built
//! - Code blocks carry real bytecode, so a rebuilt function can be called
//!
//! # Modules
//!
//! - `value`: the `Value` enum and hashable `Key`s
//! - `code`: code blocks, opcodes and the `CodeBuilder` assembler
//! - `function`: functions, closure cells, bound methods and natives
//! - `class`: classes (with MRO lookup) and instances
//! - `module`: modules and the `ModuleRegistry` import table
//! - `generator`: one-shot lazy sequences
//! - `interp`: the bytecode interpreter
//! - `error`: runtime errors

pub mod class;
pub mod code;
pub mod error;
pub mod function;
pub mod generator;
pub mod interp;
pub mod module;
pub mod value;

pub use class::{Attrs, Class, Instance};
pub use code::{BinaryOp, CodeBlock, CodeBuilder, CompareOp, Opcode};
pub use error::{Result, RuntimeError};
pub use function::{BoundMethod, Cell, Function, Globals, NativeFunction, new_globals};
pub use generator::Generator;
pub use interp::Interpreter;
pub use module::{Module, ModuleRegistry};
pub use value::{Dict, Key, Value, ValueSet};
