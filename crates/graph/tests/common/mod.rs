//! Object graphs shared by the integration tests

#![allow(dead_code)]

use objgraph_core::code::make_function;
use objgraph_core::{
    Attrs, BinaryOp, Class, CodeBlock, CodeBuilder, CompareOp, Function, Globals, Interpreter,
    Opcode, Value, new_globals,
};
use std::rc::Rc;
use std::thread;

/// Body of `fact(n)`, loading the recursive reference with `load`
fn factorial_code(load: Opcode, slot: u16, builder: CodeBuilder) -> CodeBlock {
    let mut b = builder;
    let two = b.konst(Value::Int(2));
    let one = b.konst(Value::Int(1));
    b.emit(Opcode::LoadFast, 0);
    b.emit(Opcode::LoadConst, two);
    b.emit(Opcode::CompareOp, CompareOp::Lt as u16);
    let jump = b.emit(Opcode::PopJumpIfFalse, 0);
    b.emit(Opcode::LoadConst, one);
    b.emit(Opcode::ReturnValue, 0);
    let target = b.label();
    b.patch_jump(jump, target);
    b.emit(Opcode::LoadFast, 0);
    b.emit(load, slot);
    b.emit(Opcode::LoadFast, 0);
    b.emit(Opcode::LoadConst, one);
    b.emit(Opcode::BinaryOp, BinaryOp::Sub as u16);
    b.emit(Opcode::Call, 1);
    b.emit(Opcode::BinaryOp, BinaryOp::Mul as u16);
    b.emit(Opcode::ReturnValue, 0);
    b.build()
}

/// Module-level `def fact(n)` that recurses through its globals
pub fn global_factorial() -> Value {
    let mut b = CodeBuilder::new("fact", &["n"]);
    b.filename("maths.py").firstlineno(3);
    let name = b.name("fact");
    let code = factorial_code(Opcode::LoadGlobal, name, b);
    let globals = new_globals();
    globals
        .borrow_mut()
        .insert("unrelated".to_string(), Value::str("not referenced"));
    Function::new(Rc::new(code), globals).define()
}

/// Nested `fact(n)` that recurses through a closure cell holding itself
pub fn closure_factorial() -> Value {
    let mut b = CodeBuilder::new("fact", &["n"]);
    b.freevars(&["fact"]);
    let code = factorial_code(Opcode::LoadDeref, 0, b);
    let cell = objgraph_core::Cell::empty();
    let fact = Value::function(
        Function::new(Rc::new(code), new_globals())
            .with_closure(vec![cell.clone()])
            .with_qualname("make.<locals>.fact"),
    );
    cell.set(fact.clone());
    fact
}

/// `is_even` / `is_odd`, each calling the other through shared globals
pub fn even_odd() -> (Value, Value) {
    fn parity(name: &str, other: &str, base: bool, globals: &Globals) -> Value {
        let mut b = CodeBuilder::new(name, &["n"]);
        let zero = b.konst(Value::Int(0));
        let one = b.konst(Value::Int(1));
        let answer = b.konst(Value::Bool(base));
        let other = b.name(other);
        b.emit(Opcode::LoadFast, 0);
        b.emit(Opcode::LoadConst, zero);
        b.emit(Opcode::CompareOp, CompareOp::Eq as u16);
        let jump = b.emit(Opcode::PopJumpIfFalse, 0);
        b.emit(Opcode::LoadConst, answer);
        b.emit(Opcode::ReturnValue, 0);
        let target = b.label();
        b.patch_jump(jump, target);
        b.emit(Opcode::LoadGlobal, other);
        b.emit(Opcode::LoadFast, 0);
        b.emit(Opcode::LoadConst, one);
        b.emit(Opcode::BinaryOp, BinaryOp::Sub as u16);
        b.emit(Opcode::Call, 1);
        b.emit(Opcode::ReturnValue, 0);
        Function::new(Rc::new(b.build()), globals.clone()).define()
    }
    let globals = new_globals();
    let even = parity("is_even", "is_odd", true, &globals);
    let odd = parity("is_odd", "is_even", false, &globals);
    (even, odd)
}

/// `def adder(a, b=10): return a + b`
pub fn adder() -> Value {
    let mut b = CodeBuilder::new("adder", &["a", "b"]);
    b.emit(Opcode::LoadFast, 0);
    b.emit(Opcode::LoadFast, 1);
    b.emit(Opcode::BinaryOp, BinaryOp::Add as u16);
    b.emit(Opcode::ReturnValue, 0);
    Value::function(
        Function::new(Rc::new(b.build()), new_globals()).with_defaults(vec![Value::Int(10)]),
    )
}

/// `def outer(x): def inner(y): return x + y; return inner` as code only
pub fn nested_code() -> CodeBlock {
    let mut inner = CodeBuilder::new("inner", &["y"]);
    inner.freevars(&["x"]);
    let helper = inner.name("helper");
    inner.emit(Opcode::LoadDeref, 0);
    inner.emit(Opcode::LoadFast, 0);
    inner.emit(Opcode::BinaryOp, BinaryOp::Add as u16);
    inner.emit(Opcode::LoadGlobal, helper);
    inner.emit(Opcode::PopTop, 0);
    inner.emit(Opcode::ReturnValue, 0);

    let mut outer = CodeBuilder::new("outer", &["x"]);
    outer.cellvars(&["x"]);
    let code = outer.konst(Value::Code(Rc::new(inner.build())));
    outer.emit(Opcode::LoadClosure, 0);
    outer.emit(Opcode::BuildTuple, 1);
    outer.emit(Opcode::LoadConst, code);
    outer.emit(Opcode::MakeFunction, make_function::CLOSURE);
    outer.emit(Opcode::ReturnValue, 0);
    outer.build()
}

/// A class whose methods refer back to it:
///
/// ```text
/// class Counter:
///     """Counts things"""
///     start = 0
///     def __init__(self, n): self.n = n
///     def bump(self): return Counter(self.n + 1)
///     current = property(lambda self: self.n)
///     @staticmethod
///     def zero(): return 0
///     @classmethod
///     def fresh(cls): return cls(0)
/// ```
pub fn counter_class(with_doc: bool) -> Value {
    let globals = new_globals();

    let mut init = CodeBuilder::new("__init__", &["self", "n"]);
    let n = init.name("n");
    let none = init.konst(Value::None);
    init.emit(Opcode::LoadFast, 1);
    init.emit(Opcode::LoadFast, 0);
    init.emit(Opcode::StoreAttr, n);
    init.emit(Opcode::LoadConst, none);
    init.emit(Opcode::ReturnValue, 0);

    let mut bump = CodeBuilder::new("bump", &["self"]);
    let counter = bump.name("Counter");
    let n = bump.name("n");
    let one = bump.konst(Value::Int(1));
    bump.emit(Opcode::LoadGlobal, counter);
    bump.emit(Opcode::LoadFast, 0);
    bump.emit(Opcode::LoadAttr, n);
    bump.emit(Opcode::LoadConst, one);
    bump.emit(Opcode::BinaryOp, BinaryOp::Add as u16);
    bump.emit(Opcode::Call, 1);
    bump.emit(Opcode::ReturnValue, 0);

    let mut current = CodeBuilder::new("<lambda>", &["self"]);
    let n = current.name("n");
    current.emit(Opcode::LoadFast, 0);
    current.emit(Opcode::LoadAttr, n);
    current.emit(Opcode::ReturnValue, 0);

    let mut zero = CodeBuilder::new("zero", &[]);
    let z = zero.konst(Value::Int(0));
    zero.emit(Opcode::LoadConst, z);
    zero.emit(Opcode::ReturnValue, 0);

    let mut fresh = CodeBuilder::new("fresh", &["cls"]);
    let z = fresh.konst(Value::Int(0));
    fresh.emit(Opcode::LoadFast, 0);
    fresh.emit(Opcode::LoadConst, z);
    fresh.emit(Opcode::Call, 1);
    fresh.emit(Opcode::ReturnValue, 0);

    let method = |code: CodeBuilder, qualname: &str| {
        Value::function(Function::new(Rc::new(code.build()), globals.clone()).with_qualname(qualname))
    };

    let mut attrs = Attrs::new();
    if with_doc {
        attrs.insert("__doc__".to_string(), Value::str("Counts things"));
    }
    attrs.insert("start".to_string(), Value::Int(0));
    attrs.insert("__init__".to_string(), method(init, "Counter.__init__"));
    attrs.insert("bump".to_string(), method(bump, "Counter.bump"));
    attrs.insert(
        "current".to_string(),
        Value::property(method(current, "Counter.<lambda>")),
    );
    attrs.insert(
        "zero".to_string(),
        Value::static_method(method(zero, "Counter.zero")),
    );
    attrs.insert(
        "fresh".to_string(),
        Value::class_method(method(fresh, "Counter.fresh")),
    );
    let class = Value::Class(Class::new("Counter", vec![Class::root()], attrs));
    globals
        .borrow_mut()
        .insert("Counter".to_string(), class.clone());
    class
}

pub fn call(callee: &Value, args: Vec<Value>) -> Value {
    Interpreter::new()
        .call(callee, args)
        .unwrap_or_else(|e| panic!("call failed: {}", e))
}

pub fn attr(obj: &Value, name: &str) -> Value {
    Interpreter::new()
        .get_attr(obj, name)
        .unwrap_or_else(|e| panic!("attribute {} failed: {}", name, e))
}

/// Run `f` on a thread with a large stack (deep graphs drop recursively)
pub fn with_big_stack<F: FnOnce() + Send + 'static>(f: F) {
    thread::Builder::new()
        .stack_size(512 * 1024 * 1024)
        .spawn(f)
        .expect("spawn test thread")
        .join()
        .expect("test thread panicked");
}
