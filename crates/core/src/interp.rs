//! Bytecode interpreter
//!
//! Executes code blocks so that functions, methods and classes in an object
//! graph are live callables, before serialization and after rebuilding.
//!
//! The machine is a plain operand stack per frame. Each interpreted call is one
//! Rust-level recursion of [`Interpreter::call`], bounded by a call-depth
//! guard so runaway recursion reports [`RuntimeError::RecursionLimit`]
//! instead of overflowing the native stack.
//!
//! Supported calling convention: positional arguments only. Missing trailing
//! parameters are filled from the function's defaults.

use crate::class::{Class, Instance};
use crate::code::{BinaryOp, CompareOp, INSTRUCTION_WIDTH, Opcode, make_function};
use crate::error::{Result, RuntimeError};
use crate::function::{BoundMethod, Cell, Function};
use crate::value::{Key, Value};
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::trace;

/// Default maximum call depth
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Cap on sizes taken from code fields before anything is allocated
const MAX_PREALLOC: usize = 1024;

#[derive(Debug)]
pub struct Interpreter {
    max_depth: usize,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_CALL_DEPTH,
            depth: 0,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            depth: 0,
        }
    }

    /// Call any callable value with positional arguments
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Function(func) => self.call_function(func, args),
            Value::Method(method) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(method.receiver.clone());
                full.extend(args);
                self.call(&method.function, full)
            }
            Value::Native(native) => (native.func)(&args),
            Value::Class(class) => self.instantiate(class, args),
            Value::StaticMethod(inner) => self.call(inner, args),
            other => Err(RuntimeError::TypeError(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Attribute lookup with descriptor binding
    pub fn get_attr(&mut self, obj: &Value, name: &str) -> Result<Value> {
        match obj {
            Value::Object(instance) => {
                if let Some(value) = instance.get_attr(name) {
                    return Ok(value);
                }
                match instance.class.lookup(name) {
                    Some(attr) => self.bind(attr, obj, &instance.class),
                    None => Err(RuntimeError::AttributeError(format!(
                        "'{}' object has no attribute '{}'",
                        instance.class.name, name
                    ))),
                }
            }
            Value::Class(class) => match class.lookup(name) {
                Some(Value::StaticMethod(inner)) => Ok((*inner).clone()),
                Some(Value::ClassMethod(inner)) => Ok(BoundMethod::new((*inner).clone(), obj.clone())),
                Some(value) => Ok(value),
                None => Err(RuntimeError::AttributeError(format!(
                    "type object '{}' has no attribute '{}'",
                    class.name, name
                ))),
            },
            Value::Module(module) => module.get(name).ok_or_else(|| {
                RuntimeError::AttributeError(format!(
                    "module '{}' has no attribute '{}'",
                    module.name, name
                ))
            }),
            other => Err(RuntimeError::AttributeError(format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }

    pub fn set_attr(&mut self, obj: &Value, name: &str, value: Value) -> Result<()> {
        match obj {
            Value::Object(instance) => instance.set_attr(name, value),
            Value::Class(class) => class.set_attr(name, value),
            Value::Module(module) => module.set(name, value),
            other => {
                return Err(RuntimeError::AttributeError(format!(
                    "cannot set attribute '{}' on '{}' object",
                    name,
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    fn bind(&mut self, attr: Value, instance: &Value, class: &Rc<Class>) -> Result<Value> {
        match attr {
            Value::Function(_) | Value::Native(_) => Ok(BoundMethod::new(attr, instance.clone())),
            Value::StaticMethod(inner) => Ok((*inner).clone()),
            Value::ClassMethod(inner) => {
                Ok(BoundMethod::new((*inner).clone(), Value::Class(class.clone())))
            }
            Value::Property(getter) => self.call(&getter, vec![instance.clone()]),
            other => Ok(other),
        }
    }

    fn instantiate(&mut self, class: &Rc<Class>, args: Vec<Value>) -> Result<Value> {
        let obj = Value::Object(Instance::new_bare(class.clone()));
        match class.lookup("__init__") {
            Some(init) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(obj.clone());
                full.extend(args);
                self.call(&init, full)?;
            }
            None if !args.is_empty() => {
                return Err(RuntimeError::TypeError(format!(
                    "{}() takes no arguments",
                    class.name
                )));
            }
            None => {}
        }
        Ok(obj)
    }

    fn call_function(&mut self, func: &Rc<Function>, args: Vec<Value>) -> Result<Value> {
        if self.depth >= self.max_depth {
            return Err(RuntimeError::RecursionLimit(self.max_depth));
        }
        self.depth += 1;
        trace!(function = %func.qualname, depth = self.depth, "call");
        let result = self.run(func, args);
        self.depth -= 1;
        result
    }

    fn run(&mut self, func: &Rc<Function>, args: Vec<Value>) -> Result<Value> {
        let code = &func.code;
        let argcount = code.argcount as usize;
        let given = args.len();
        if given > argcount {
            return Err(RuntimeError::TypeError(format!(
                "{}() takes {} positional arguments but {} were given",
                func.name, argcount, given
            )));
        }
        let missing = argcount - given;
        if missing > func.defaults.len() {
            return Err(RuntimeError::TypeError(format!(
                "{}() missing {} required positional argument(s)",
                func.name,
                missing - func.defaults.len()
            )));
        }

        let slots = (code.nlocals as usize)
            .min(MAX_PREALLOC)
            .max(code.varnames.len())
            .max(argcount);
        let mut locals: Vec<Option<Value>> = vec![None; slots];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        let first_default = func.defaults.len() - missing;
        for (slot, default) in locals[given..argcount]
            .iter_mut()
            .zip(&func.defaults[first_default..])
        {
            *slot = Some(default.clone());
        }

        if func.closure.len() != code.freevars.len() {
            return Err(RuntimeError::TypeError(format!(
                "{}() requires a closure of length {}, not {}",
                func.name,
                code.freevars.len(),
                func.closure.len()
            )));
        }
        let mut cells: Vec<Rc<Cell>> = Vec::with_capacity(code.cell_slots());
        for name in &code.cellvars {
            let seeded = code
                .varnames
                .iter()
                .take(argcount)
                .position(|v| v == name)
                .and_then(|i| locals[i].clone());
            cells.push(match seeded {
                Some(value) => Cell::new(value),
                None => Cell::empty(),
            });
        }
        cells.extend(func.closure.iter().cloned());

        let capacity = (code.stacksize as usize).min(MAX_PREALLOC);
        let mut stack: Vec<Value> = Vec::with_capacity(capacity);
        let mut pc = 0usize;
        loop {
            let Some(instr) = code.code.get(pc..pc + INSTRUCTION_WIDTH) else {
                return Err(RuntimeError::InvalidBytecode(format!(
                    "{}: execution ran past the end of the code at offset {}",
                    func.name, pc
                )));
            };
            let op = Opcode::try_from(instr[0]).map_err(|byte| {
                RuntimeError::InvalidBytecode(format!("unknown opcode {} at offset {}", byte, pc))
            })?;
            let arg = u16::from_le_bytes([instr[1], instr[2]]);
            let index = usize::from(arg);
            pc += INSTRUCTION_WIDTH;

            match op {
                Opcode::Nop => {}
                Opcode::PopTop => {
                    pop(&mut stack)?;
                }
                Opcode::Dup => {
                    let top = stack.last().cloned().ok_or_else(underflow)?;
                    stack.push(top);
                }
                Opcode::LoadConst => stack.push(operand(&code.consts, index, "const")?.clone()),
                Opcode::LoadFast => match locals.get(index) {
                    Some(Some(value)) => stack.push(value.clone()),
                    Some(None) => {
                        let name = operand(&code.varnames, index, "local")?;
                        return Err(RuntimeError::UnboundLocal(name.clone()));
                    }
                    None => return Err(bad_operand("local", index)),
                },
                Opcode::StoreFast => {
                    let value = pop(&mut stack)?;
                    // Slots past the preallocated ones open on first store
                    if index >= locals.len() && index < code.nlocals as usize {
                        locals.resize(index + 1, None);
                    }
                    let slot = locals
                        .get_mut(index)
                        .ok_or_else(|| bad_operand("local", index))?;
                    *slot = Some(value);
                }
                Opcode::LoadGlobal => {
                    let name = operand(&code.names, index, "name")?;
                    let value = func.globals.borrow().get(name).cloned();
                    stack.push(value.ok_or_else(|| RuntimeError::NameError(name.clone()))?);
                }
                Opcode::StoreGlobal => {
                    let name = operand(&code.names, index, "name")?.clone();
                    let value = pop(&mut stack)?;
                    func.globals.borrow_mut().insert(name, value);
                }
                Opcode::LoadDeref => {
                    let cell = operand(&cells, index, "cell")?;
                    match cell.get() {
                        Some(value) => stack.push(value),
                        None => return Err(RuntimeError::UnboundCell(cell_name(func, index))),
                    }
                }
                Opcode::StoreDeref => {
                    let value = pop(&mut stack)?;
                    operand(&cells, index, "cell")?.set(value);
                }
                Opcode::LoadClosure => {
                    let cell = operand(&cells, index, "cell")?;
                    stack.push(Value::Cell(cell.clone()));
                }
                Opcode::LoadAttr => {
                    let name = operand(&code.names, index, "name")?;
                    let obj = pop(&mut stack)?;
                    let value = self.get_attr(&obj, name)?;
                    stack.push(value);
                }
                Opcode::StoreAttr => {
                    let name = operand(&code.names, index, "name")?;
                    let obj = pop(&mut stack)?;
                    let value = pop(&mut stack)?;
                    self.set_attr(&obj, name, value)?;
                }
                Opcode::BinaryOp => {
                    let op = BinaryOp::try_from(arg).map_err(|a| bad_operand("binary op", a.into()))?;
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    stack.push(binary_op(op, &lhs, &rhs)?);
                }
                Opcode::CompareOp => {
                    let op =
                        CompareOp::try_from(arg).map_err(|a| bad_operand("compare op", a.into()))?;
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    stack.push(Value::Bool(compare(op, &lhs, &rhs)?));
                }
                Opcode::UnaryNot => {
                    let value = pop(&mut stack)?;
                    stack.push(Value::Bool(!value.is_truthy()));
                }
                Opcode::BinarySubscr => {
                    let key = pop(&mut stack)?;
                    let container = pop(&mut stack)?;
                    stack.push(subscript(&container, &key)?);
                }
                Opcode::Jump => pc = index,
                Opcode::PopJumpIfFalse => {
                    if !pop(&mut stack)?.is_truthy() {
                        pc = index;
                    }
                }
                Opcode::PopJumpIfTrue => {
                    if pop(&mut stack)?.is_truthy() {
                        pc = index;
                    }
                }
                Opcode::Call => {
                    let args = take(&mut stack, index)?;
                    let callee = pop(&mut stack)?;
                    let result = self.call(&callee, args)?;
                    stack.push(result);
                }
                Opcode::MakeFunction => {
                    let made = build_function(func, arg, &mut stack)?;
                    stack.push(made);
                }
                Opcode::BuildTuple => {
                    let items = take(&mut stack, index)?;
                    stack.push(Value::tuple(items));
                }
                Opcode::BuildList => {
                    let items = take(&mut stack, index)?;
                    stack.push(Value::list(items));
                }
                Opcode::ReturnValue => return pop(&mut stack),
            }
        }
    }
}

fn build_function(parent: &Function, flags: u16, stack: &mut Vec<Value>) -> Result<Value> {
    let code = match pop(stack)? {
        Value::Code(code) => code,
        other => {
            return Err(RuntimeError::TypeError(format!(
                "MakeFunction expects code, got {}",
                other.type_name()
            )));
        }
    };
    let closure = if flags & make_function::CLOSURE != 0 {
        match pop(stack)? {
            Value::Tuple(items) => items
                .iter()
                .map(|item| match item {
                    Value::Cell(cell) => Ok(cell.clone()),
                    other => Err(RuntimeError::TypeError(format!(
                        "closure items must be cells, got {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(RuntimeError::TypeError(format!(
                    "closure must be a tuple, got {}",
                    other.type_name()
                )));
            }
        }
    } else {
        Vec::new()
    };
    let defaults = if flags & make_function::DEFAULTS != 0 {
        match pop(stack)? {
            Value::Tuple(items) => items.to_vec(),
            other => {
                return Err(RuntimeError::TypeError(format!(
                    "defaults must be a tuple, got {}",
                    other.type_name()
                )));
            }
        }
    } else {
        Vec::new()
    };
    let qualname = format!("{}.<locals>.{}", parent.qualname, code.name);
    let func = Function::new(code, parent.globals.clone())
        .with_closure(closure)
        .with_defaults(defaults)
        .with_qualname(&qualname);
    Ok(Value::function(func))
}

fn underflow() -> RuntimeError {
    RuntimeError::InvalidBytecode("operand stack underflow".to_string())
}

fn bad_operand(what: &str, index: usize) -> RuntimeError {
    RuntimeError::InvalidBytecode(format!("{} operand {} out of range", what, index))
}

fn pop(stack: &mut Vec<Value>) -> Result<Value> {
    stack.pop().ok_or_else(underflow)
}

fn take(stack: &mut Vec<Value>, count: usize) -> Result<Vec<Value>> {
    if stack.len() < count {
        return Err(underflow());
    }
    Ok(stack.split_off(stack.len() - count))
}

fn operand<'a, T>(pool: &'a [T], index: usize, what: &str) -> Result<&'a T> {
    pool.get(index).ok_or_else(|| bad_operand(what, index))
}

fn cell_name(func: &Function, index: usize) -> String {
    let code = &func.code;
    code.cellvars
        .iter()
        .chain(code.freevars.iter())
        .nth(index)
        .cloned()
        .unwrap_or_else(|| format!("<cell {}>", index))
}

enum Num {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Option<Num> {
    match value {
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

fn binary_op(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    match (number(lhs), number(rhs)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => int_op(op, a, b),
        (Some(a), Some(b)) => float_op(op, as_float(a), as_float(b)),
        _ => sequence_op(op, lhs, rhs),
    }
}

fn as_float(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(x) => x,
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            floor_div(a, b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            floor_mod(a, b)
        }
        BinaryOp::TrueDiv => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
    };
    result.map(Value::Int).ok_or(RuntimeError::Overflow)
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

fn float_op(op: BinaryOp, x: f64, y: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::FloorDiv | BinaryOp::Mod | BinaryOp::TrueDiv if y == 0.0 => {
            return Err(RuntimeError::ZeroDivision);
        }
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
        BinaryOp::TrueDiv => x / y,
    };
    Ok(Value::Float(result))
}

fn sequence_op(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinaryOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::Tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => Err(RuntimeError::TypeError(format!(
            "unsupported operand types for {:?}: '{}' and '{}'",
            op,
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    let ordering = match (number(lhs), number(rhs)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => Some(a.cmp(&b)),
        (Some(a), Some(b)) => as_float(a).partial_cmp(&as_float(b)),
        _ => match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => match op {
                CompareOp::Eq => return Ok(lhs == rhs),
                CompareOp::Ne => return Ok(lhs != rhs),
                _ => {
                    return Err(RuntimeError::TypeError(format!(
                        "'{:?}' not supported between '{}' and '{}'",
                        op,
                        lhs.type_name(),
                        rhs.type_name()
                    )));
                }
            },
        },
    };
    // NaN compares false with everything except through Ne
    let Some(ordering) = ordering else {
        return Ok(op == CompareOp::Ne);
    };
    Ok(match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) {
        usize::try_from(idx).ok()
    } else {
        None
    }
}

fn subscript(container: &Value, key: &Value) -> Result<Value> {
    let out_of_range = || RuntimeError::IndexError(format!("index {:?} out of range", key));
    match (container, key.as_int()) {
        (Value::List(items), Some(i)) => {
            let items = items.borrow();
            let idx = normalize_index(i, items.len()).ok_or_else(out_of_range)?;
            Ok(items[idx].clone())
        }
        (Value::Tuple(items), Some(i)) => {
            let idx = normalize_index(i, items.len()).ok_or_else(out_of_range)?;
            Ok(items[idx].clone())
        }
        (Value::Bytes(data), Some(i)) => {
            let idx = normalize_index(i, data.len()).ok_or_else(out_of_range)?;
            Ok(Value::Int(i64::from(data[idx])))
        }
        (Value::Str(s), Some(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(i, chars.len()).ok_or_else(out_of_range)?;
            Ok(Value::str(chars[idx].to_string()))
        }
        (Value::Dict(entries), _) => {
            let hashed = Key::from_value(key).ok_or_else(|| {
                RuntimeError::TypeError(format!("unhashable type: '{}'", key.type_name()))
            })?;
            entries
                .borrow()
                .get(&hashed)
                .cloned()
                .ok_or_else(|| RuntimeError::IndexError(format!("key {:?} not found", key)))
        }
        _ => Err(RuntimeError::TypeError(format!(
            "'{}' object is not subscriptable with '{}'",
            container.type_name(),
            key.type_name()
        ))),
    }
}
