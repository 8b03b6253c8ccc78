//! Graph Walker
//!
//! Classifies a live value and extracts its ordered fields, recursing into
//! every sub-value. The result is a tree: shared sub-objects are copied once
//! per reference (aliasing is not preserved).
//!
//! Cycles through a function or class are cut with placeholders. While a
//! function or class is being walked it sits on the in-progress stack; when
//! one of its patchable slots (a closure cell, a global entry or a class
//! attribute) holds an in-progress value, a `SelfRef` naming that value's
//! position on the stack is emitted instead of recursing. Any other cycle
//! runs into the depth guard.
//!
//! Walking a generator drains it.

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::kind::Kind;
use crate::raw::{Fields, Node, RawValue, SelfRef, field};
use objgraph_core::{Class, CodeBlock, Function, Key, Value};
use std::rc::Rc;
use tracing::{debug, trace};

/// Class attributes that are regenerated with every class and never walked
pub const FILTERED_CLASS_ATTRS: [&str; 3] = ["__dict__", "__weakref__", "__doc__"];

pub struct Walker<'c> {
    config: &'c GraphConfig,
    in_progress: Vec<Value>,
    depth: usize,
}

impl<'c> Walker<'c> {
    pub fn new(config: &'c GraphConfig) -> Self {
        Self {
            config,
            in_progress: Vec::new(),
            depth: 0,
        }
    }

    /// Kind tag and ordered fields of `value`
    ///
    /// Primitives come back as `(primitive, {value: <literal>})`.
    pub fn classify_and_extract(&mut self, value: &Value) -> Result<(Kind, Fields)> {
        match self.walk(value)? {
            RawValue::Node(node) => Ok((node.kind, node.fields)),
            literal => {
                let mut fields = Fields::new();
                fields.insert(field::VALUE.to_string(), literal);
                Ok((Kind::Primitive, fields))
            }
        }
    }

    /// Walk `value` into its raw form
    pub fn walk(&mut self, value: &Value) -> Result<RawValue> {
        if self.depth >= self.config.max_depth {
            return Err(GraphError::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        let result = self.walk_value(value);
        self.depth -= 1;
        result
    }

    fn walk_value(&mut self, value: &Value) -> Result<RawValue> {
        trace!(kind = value.type_name(), depth = self.depth, "walk");
        let raw = match value {
            Value::None => RawValue::None,
            Value::Ellipsis => RawValue::Ellipsis,
            Value::Bool(b) => RawValue::Bool(*b),
            Value::Int(n) => RawValue::Int(*n),
            Value::Float(x) => RawValue::Float(*x),
            Value::Complex { re, im } => RawValue::Complex { re: *re, im: *im },
            Value::Str(s) => RawValue::Str(s.to_string()),

            Value::Generator(generator) => {
                let values = generator.drain();
                debug!(
                    generator = %generator.name,
                    count = values.len(),
                    "drained generator"
                );
                Node::new(Kind::Generator)
                    .with(field::NAME, generator.name.as_str().into())
                    .with(field::VALUES, self.walk_all(values.iter())?)
                    .into()
            }

            Value::StaticMethod(inner) => self.walk_wrapper(Kind::StaticMethod, inner)?,
            Value::ClassMethod(inner) => self.walk_wrapper(Kind::ClassMethod, inner)?,
            Value::Property(inner) => self.walk_wrapper(Kind::Property, inner)?,

            Value::Function(func) => {
                self.in_progress.push(value.clone());
                let fields = self.walk_function(func);
                self.in_progress.pop();
                fields?.into()
            }
            Value::Method(method) => Node::new(Kind::Method)
                .with(field::FUNCTION, self.walk(&method.function)?)
                .with(field::RECEIVER, self.walk(&method.receiver)?)
                .into(),
            Value::Cell(cell) => self.walk_cell(cell.get().as_ref())?,
            Value::Code(code) => self.walk_code(code)?.into(),
            Value::Module(module) => Node::new(Kind::Module)
                .with(field::NAME, module.name.as_str().into())
                .into(),
            Value::Class(class) => {
                self.in_progress.push(value.clone());
                let fields = self.walk_class(class);
                self.in_progress.pop();
                fields?.into()
            }
            Value::Object(instance) => {
                let class = Value::Class(instance.class.clone());
                let attrs = instance
                    .attrs()
                    .iter()
                    .map(|(name, v)| (name.clone(), v.clone()))
                    .collect::<Vec<_>>();
                let mut entries = Vec::with_capacity(attrs.len());
                for (name, v) in &attrs {
                    entries.push(pair(RawValue::Str(name.clone()), self.walk(v)?));
                }
                Node::new(Kind::Object)
                    .with(field::CLASS, self.walk(&class)?)
                    .with(field::ATTRS, mapping(entries))
                    .into()
            }

            Value::List(items) => {
                let items = items.borrow().clone();
                sequence(Kind::Sequence, self.walk_all(items.iter())?)
            }
            Value::Tuple(items) => sequence(Kind::Tuple, self.walk_all(items.iter())?),
            Value::Dict(entries) => {
                let entries = entries.borrow().clone();
                let mut out = Vec::with_capacity(entries.len());
                for (key, v) in &entries {
                    out.push(pair(self.walk(&key.to_value())?, self.walk(v)?));
                }
                mapping(out)
            }
            Value::Set(items) => {
                let keys: Vec<Key> = items.borrow().iter().cloned().collect();
                sequence(Kind::Set, self.walk_keys(&keys)?)
            }
            Value::FrozenSet(items) => {
                let keys: Vec<Key> = items.iter().cloned().collect();
                sequence(Kind::FrozenSet, self.walk_keys(&keys)?)
            }
            Value::Bytes(data) => bytes(data),

            Value::Native(native) => {
                return Err(GraphError::UnsupportedValue(format!(
                    "built-in function '{}' has no code to serialize",
                    native.name
                )));
            }
        };
        Ok(raw)
    }

    fn walk_all<'v>(&mut self, values: impl Iterator<Item = &'v Value>) -> Result<RawValue> {
        let mut out = Vec::new();
        for value in values {
            out.push(self.walk(value)?);
        }
        Ok(RawValue::List(out))
    }

    fn walk_keys(&mut self, keys: &[Key]) -> Result<RawValue> {
        let values: Vec<Value> = keys.iter().map(Key::to_value).collect();
        self.walk_all(values.iter())
    }

    fn walk_wrapper(&mut self, kind: Kind, inner: &Value) -> Result<RawValue> {
        Ok(Node::new(kind)
            .with(field::FUNCTION, self.walk(inner)?)
            .into())
    }

    /// Walk a patchable slot: in-progress values become placeholders
    fn walk_slot(&mut self, value: &Value) -> Result<RawValue> {
        let position = self
            .in_progress
            .iter()
            .rev()
            .position(|pending| pending.same_object(value));
        match position {
            Some(depth) => {
                debug!(depth, kind = value.type_name(), "emitting self placeholder");
                Ok(RawValue::Placeholder(SelfRef { depth }))
            }
            None => self.walk(value),
        }
    }

    fn walk_cell(&mut self, contents: Option<&Value>) -> Result<RawValue> {
        let node = Node::new(Kind::Cell);
        Ok(match contents {
            Some(value) => node.with(field::VALUE, self.walk_slot(value)?),
            None => node,
        }
        .into())
    }

    fn walk_function(&mut self, func: &Function) -> Result<Node> {
        let code = self.walk_code(&func.code)?;

        // Only the globals the code can reach travel with the function
        let referenced = func.code.referenced_names();
        let bindings: Vec<(String, Value)> = {
            let globals = func.globals.borrow();
            referenced
                .iter()
                .filter_map(|name| globals.get(*name).map(|v| (name.to_string(), v.clone())))
                .collect()
        };
        let mut globals = Vec::with_capacity(bindings.len());
        for (name, value) in &bindings {
            globals.push(pair(RawValue::Str(name.clone()), self.walk_slot(value)?));
        }

        let defaults = self.walk_all(func.defaults.iter())?;
        let mut closure = Vec::with_capacity(func.closure.len());
        for cell in &func.closure {
            closure.push(self.walk_cell(cell.get().as_ref())?);
        }

        Ok(Node::new(Kind::Function)
            .with(field::NAME, func.name.as_str().into())
            .with(field::QUALNAME, func.qualname.as_str().into())
            .with(field::CODE, code.into())
            .with(field::GLOBALS, mapping(globals))
            .with(field::DEFAULTS, defaults)
            .with(field::CLOSURE, RawValue::List(closure)))
    }

    fn walk_class(&mut self, class: &Rc<Class>) -> Result<Node> {
        let node = Node::new(Kind::Class).with(field::NAME, class.name.as_str().into());
        // The universal root travels by name alone
        if class.is_root() {
            return Ok(node);
        }

        let mut bases = Vec::with_capacity(class.bases.len());
        for base in class.bases.iter().filter(|base| !base.is_root()) {
            bases.push(self.walk(&Value::Class(base.clone()))?);
        }

        let attrs: Vec<(String, Value)> = class
            .attrs()
            .iter()
            .map(|(name, v)| (name.clone(), v.clone()))
            .collect();
        let mut entries = Vec::with_capacity(attrs.len());
        for (name, value) in &attrs {
            if FILTERED_CLASS_ATTRS.contains(&name.as_str()) {
                continue;
            }
            if let Value::Native(native) = value {
                debug!(
                    class = %class.name,
                    attr = %name,
                    native = %native.name,
                    "dropping built-in class attribute"
                );
                continue;
            }
            entries.push(pair(RawValue::Str(name.clone()), self.walk_slot(value)?));
        }

        Ok(node
            .with(field::BASES, RawValue::List(bases))
            .with(field::ATTRS, mapping(entries)))
    }

    fn walk_code(&mut self, code: &CodeBlock) -> Result<Node> {
        let consts = self.walk_all(code.consts.iter())?;
        Ok(Node::new(Kind::Code)
            .with(field::ARGCOUNT, code.argcount.into())
            .with(field::POSONLYARGCOUNT, code.posonlyargcount.into())
            .with(field::KWONLYARGCOUNT, code.kwonlyargcount.into())
            .with(field::NLOCALS, code.nlocals.into())
            .with(field::STACKSIZE, code.stacksize.into())
            .with(field::FLAGS, code.flags.into())
            .with(field::CODESTRING, bytes(&code.code))
            .with(field::CONSTS, consts)
            .with(field::NAMES, strings(&code.names))
            .with(field::VARNAMES, strings(&code.varnames))
            .with(field::FILENAME, code.filename.as_str().into())
            .with(field::NAME, code.name.as_str().into())
            .with(field::FIRSTLINENO, code.firstlineno.into())
            .with(field::FREEVARS, strings(&code.freevars))
            .with(field::CELLVARS, strings(&code.cellvars)))
    }
}

fn pair(key: RawValue, value: RawValue) -> RawValue {
    RawValue::List(vec![key, value])
}

fn mapping(entries: Vec<RawValue>) -> RawValue {
    Node::new(Kind::Mapping)
        .with(field::ENTRIES, RawValue::List(entries))
        .into()
}

fn sequence(kind: Kind, items: RawValue) -> RawValue {
    Node::new(kind).with(field::ITEMS, items).into()
}

fn bytes(data: &[u8]) -> RawValue {
    let items = data.iter().map(|b| RawValue::Int(i64::from(*b))).collect();
    sequence(Kind::Bytes, RawValue::List(items))
}

fn strings(names: &[String]) -> RawValue {
    RawValue::List(names.iter().map(|n| RawValue::Str(n.clone())).collect())
}

/// Classify `value` with the default configuration
pub fn classify_and_extract(value: &Value) -> Result<(Kind, Fields)> {
    let config = GraphConfig::default();
    Walker::new(&config).classify_and_extract(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_core::{Attrs, Generator, NativeFunction, new_globals};
    use objgraph_core::{CodeBuilder, Opcode};

    fn walk(value: &Value) -> RawValue {
        let config = GraphConfig::default();
        Walker::new(&config).walk(value).unwrap()
    }

    #[test]
    fn test_primitive_at_top_level() {
        let (kind, fields) = classify_and_extract(&Value::Int(7)).unwrap();
        assert_eq!(kind, Kind::Primitive);
        assert_eq!(fields.get(field::VALUE), Some(&RawValue::Int(7)));
    }

    #[test]
    fn test_tuple_and_list_differ() {
        let items = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let (list_kind, list_fields) = classify_and_extract(&Value::list(items.clone())).unwrap();
        let (tuple_kind, tuple_fields) = classify_and_extract(&Value::tuple(items)).unwrap();
        assert_eq!(list_kind, Kind::Sequence);
        assert_eq!(tuple_kind, Kind::Tuple);
        assert_eq!(list_fields, tuple_fields);
    }

    #[test]
    fn test_generator_is_drained() {
        let g = Value::Generator(Generator::from_values(
            "count",
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        ));
        let (_, first) = classify_and_extract(&g).unwrap();
        assert_eq!(
            first.get(field::VALUES),
            Some(&RawValue::List(vec![
                RawValue::Int(1),
                RawValue::Int(2),
                RawValue::Int(3)
            ]))
        );
        let (_, second) = classify_and_extract(&g).unwrap();
        assert_eq!(second.get(field::VALUES), Some(&RawValue::List(vec![])));
    }

    #[test]
    fn test_class_attr_filtering() {
        let mut attrs = Attrs::new();
        attrs.insert("__doc__".to_string(), Value::str("A documented class"));
        attrs.insert("__weakref__".to_string(), Value::None);
        attrs.insert("limit".to_string(), Value::Int(3));
        attrs.insert("sqrt".to_string(), NativeFunction::new("sqrt", |_| Ok(Value::None)));
        let class = Value::Class(Class::new("Doc", vec![Class::root()], attrs));

        let (_, fields) = classify_and_extract(&class).unwrap();
        let entries = fields
            .get(field::ATTRS)
            .and_then(RawValue::as_node)
            .and_then(|n| n.get(field::ENTRIES))
            .and_then(RawValue::as_list)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0],
            RawValue::List(vec!["limit".into(), RawValue::Int(3)])
        );
        assert_eq!(fields.get(field::BASES), Some(&RawValue::List(vec![])));
    }

    #[test]
    fn test_native_outside_class_is_unsupported() {
        let native = NativeFunction::new("sqrt", |_| Ok(Value::None));
        let config = GraphConfig::default();
        let err = Walker::new(&config)
            .walk(&Value::list(vec![native]))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedValue(_)));
    }

    #[test]
    fn test_self_reference_through_global() {
        let mut b = CodeBuilder::new("loop_forever", &[]);
        let me = b.name("loop_forever");
        b.emit(Opcode::LoadGlobal, me);
        b.emit(Opcode::Call, 0);
        b.emit(Opcode::ReturnValue, 0);
        let globals = new_globals();
        globals
            .borrow_mut()
            .insert("unrelated".to_string(), Value::Int(99));
        let f = Function::new(Rc::new(b.build()), globals).define();

        let raw = walk(&f);
        let globals = raw
            .as_node()
            .and_then(|n| n.get(field::GLOBALS))
            .and_then(RawValue::as_node)
            .and_then(|n| n.get(field::ENTRIES))
            .unwrap();
        assert_eq!(
            globals,
            &RawValue::List(vec![RawValue::List(vec![
                "loop_forever".into(),
                RawValue::Placeholder(SelfRef::SELF)
            ])])
        );
    }

    #[test]
    fn test_same_name_different_object_is_not_self() {
        let code = Rc::new({
            let mut b = CodeBuilder::new("f", &[]);
            let name = b.name("f");
            b.emit(Opcode::LoadGlobal, name);
            b.emit(Opcode::ReturnValue, 0);
            b.build()
        });
        let globals = new_globals();
        let f = Value::function(Function::new(code, globals.clone()));
        globals.borrow_mut().insert("f".to_string(), Value::Int(5));
        let raw = walk(&f);
        assert_eq!(raw.placeholder_count(), 0);
    }

    #[test]
    fn test_depth_guard() {
        let mut value = Value::Int(0);
        for _ in 0..50 {
            value = Value::list(vec![value]);
        }
        let config = GraphConfig::default().with_max_depth(10);
        let err = Walker::new(&config).walk(&value).unwrap_err();
        assert!(matches!(err, GraphError::DepthExceeded { limit: 10 }));
    }

    #[test]
    fn test_unfilled_cell_has_no_value() {
        let raw = walk(&Value::Cell(objgraph_core::Cell::empty()));
        assert_eq!(raw, Node::new(Kind::Cell).into());
    }
}
