//! Graph Rebuilder
//!
//! Reconstructs live values from `(kind, fields)` nodes, children before
//! parents. `resolve` is the recursive callback: every nested raw value is
//! reconstructed through it.
//!
//! Self-references are closed in two phases. Building a function or class
//! opens a pending frame. A placeholder found in a patchable slot (closure
//! cell, global entry, class attribute) records a patch site against the
//! frame it names; the slot is left empty or provisional for now. As soon
//! as the frame's value exists, every site recorded against it is patched
//! to point at that value.
//!
//! Patched functions and classes form `Rc` cycles and are never freed.

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::kind::Kind;
use crate::raw::{Fields, RawValue, SelfRef, field};
use objgraph_core::class::ROOT_CLASS_NAME;
use objgraph_core::{
    Attrs, BoundMethod, Cell, Class, CodeBlock, Function, Generator, Globals, Instance, Key,
    ModuleRegistry, Value, new_globals,
};
use std::rc::Rc;
use tracing::{debug, trace};

/// A slot waiting for a value that is still being built
enum PatchSite {
    Cell(Rc<Cell>),
    Global(Globals, String),
    ClassAttr(Rc<Class>, String),
}

impl PatchSite {
    fn apply(self, target: &Value) {
        match self {
            PatchSite::Cell(cell) => cell.set(target.clone()),
            PatchSite::Global(globals, name) => {
                globals.borrow_mut().insert(name, target.clone());
            }
            PatchSite::ClassAttr(class, name) => class.set_attr(&name, target.clone()),
        }
    }
}

/// A function or class under construction
#[derive(Default)]
struct Frame {
    sites: Vec<PatchSite>,
    /// Attributes of this frame's class that refer to frame `.1`
    class_attrs: Vec<(String, usize)>,
    /// Whether anything below refers to a frame further out
    escapes: bool,
}

pub struct Rebuilder<'a> {
    config: &'a GraphConfig,
    modules: &'a ModuleRegistry,
    frames: Vec<Frame>,
    classes: Vec<(Fields, Rc<Class>)>,
    depth: usize,
}

impl<'a> Rebuilder<'a> {
    pub fn new(config: &'a GraphConfig, modules: &'a ModuleRegistry) -> Self {
        Self {
            config,
            modules,
            frames: Vec::new(),
            classes: Vec::new(),
            depth: 0,
        }
    }

    /// Reconstruct any raw value
    pub fn resolve(&mut self, raw: &RawValue) -> Result<Value> {
        match raw {
            RawValue::None => Ok(Value::None),
            RawValue::Ellipsis => Ok(Value::Ellipsis),
            RawValue::Bool(b) => Ok(Value::Bool(*b)),
            RawValue::Int(n) => Ok(Value::Int(*n)),
            RawValue::Float(x) => Ok(Value::Float(*x)),
            RawValue::Complex { re, im } => Ok(Value::Complex { re: *re, im: *im }),
            RawValue::Str(s) => Ok(Value::str(s)),
            RawValue::Node(node) => {
                if self.depth >= self.config.max_depth {
                    return Err(GraphError::DepthExceeded {
                        limit: self.config.max_depth,
                    });
                }
                self.depth += 1;
                let result = self.construct(node.kind, &node.fields);
                self.depth -= 1;
                result
            }
            RawValue::List(_) => Err(GraphError::MalformedGraph {
                kind: None,
                field: None,
                message: "bare list where a value was expected".to_string(),
            }),
            RawValue::Placeholder(_) => Err(GraphError::MalformedGraph {
                kind: None,
                field: None,
                message: "placeholder outside a cell, global or class attribute".to_string(),
            }),
        }
    }

    /// Reconstruct a value of kind `kind` from its fields
    pub fn construct(&mut self, kind: Kind, fields: &Fields) -> Result<Value> {
        trace!(%kind, depth = self.depth, "construct");
        match kind {
            Kind::Primitive => {
                let literal = required(kind, fields, field::VALUE)?;
                if !literal.is_literal() {
                    return Err(GraphError::malformed(
                        kind,
                        field::VALUE,
                        "primitive value must be a literal",
                    ));
                }
                self.resolve(literal)
            }
            Kind::Sequence => Ok(Value::list(self.resolve_list(kind, fields, field::ITEMS)?)),
            Kind::Tuple => Ok(Value::tuple(self.resolve_list(kind, fields, field::ITEMS)?)),
            Kind::Set => Ok(Value::set(self.resolve_keys(kind, fields)?)),
            Kind::FrozenSet => Ok(Value::frozenset(self.resolve_keys(kind, fields)?)),
            Kind::Bytes => Ok(Value::bytes(byte_items(fields)?)),
            Kind::Mapping => {
                let mut entries = Vec::new();
                for (key, value) in pairs(kind, fields)? {
                    let key = self.resolve(key)?;
                    let key = hashable(kind, field::ENTRIES, &key)?;
                    entries.push((key, self.resolve(value)?));
                }
                Ok(Value::dict(entries))
            }
            Kind::Generator => {
                let name = fields
                    .get(field::NAME)
                    .and_then(RawValue::as_str)
                    .unwrap_or("<generator>");
                let values = self.resolve_list(kind, fields, field::VALUES)?;
                Ok(Value::Generator(Generator::from_values(name, values)))
            }
            Kind::Code => Ok(Value::Code(Rc::new(self.build_code(fields)?))),
            Kind::Function => self.build_function(fields),
            Kind::Method => {
                let function = self.resolve(required(kind, fields, field::FUNCTION)?)?;
                let receiver = self.resolve(required(kind, fields, field::RECEIVER)?)?;
                Ok(BoundMethod::new(function, receiver))
            }
            Kind::Class => self.build_class(fields),
            Kind::Object => self.build_object(fields),
            Kind::Module => {
                let name = str_field(kind, fields, field::NAME)?;
                self.modules
                    .import(name)
                    .map(Value::Module)
                    .ok_or_else(|| {
                        GraphError::UnresolvableReference(format!("no module named '{}'", name))
                    })
            }
            Kind::Cell => Ok(Value::Cell(self.build_cell(fields)?)),
            Kind::StaticMethod => Ok(Value::static_method(self.resolve_wrapped(kind, fields)?)),
            Kind::ClassMethod => Ok(Value::class_method(self.resolve_wrapped(kind, fields)?)),
            Kind::Property => Ok(Value::property(self.resolve_wrapped(kind, fields)?)),
        }
    }

    fn resolve_list(&mut self, kind: Kind, fields: &Fields, name: &str) -> Result<Vec<Value>> {
        list_field(kind, fields, name)?
            .iter()
            .map(|raw| self.resolve(raw))
            .collect()
    }

    fn resolve_keys(&mut self, kind: Kind, fields: &Fields) -> Result<Vec<Key>> {
        let items = self.resolve_list(kind, fields, field::ITEMS)?;
        items
            .iter()
            .map(|item| hashable(kind, field::ITEMS, item))
            .collect()
    }

    fn resolve_wrapped(&mut self, kind: Kind, fields: &Fields) -> Result<Value> {
        self.resolve(required(kind, fields, field::FUNCTION)?)
    }

    /// Record a patch site against the frame `selfref` names
    fn register(&mut self, selfref: SelfRef, site: PatchSite) -> Result<()> {
        let target = self.target_frame(selfref)?;
        self.frames[target].sites.push(site);
        Ok(())
    }

    fn target_frame(&mut self, selfref: SelfRef) -> Result<usize> {
        let open = self.frames.len();
        if selfref.depth >= open {
            return Err(GraphError::MalformedGraph {
                kind: None,
                field: None,
                message: format!(
                    "placeholder refers {} levels out but only {} values are under construction",
                    selfref.depth, open
                ),
            });
        }
        let target = open - 1 - selfref.depth;
        for frame in &mut self.frames[target + 1..] {
            frame.escapes = true;
        }
        debug!(depth = selfref.depth, "deferring self reference");
        Ok(target)
    }

    /// Run `build` inside a fresh frame, returning the frame alongside
    fn in_frame<T>(
        &mut self,
        build: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(T, Frame)> {
        self.frames.push(Frame::default());
        let built = build(self);
        let frame = self.frames.pop().unwrap_or_default();
        Ok((built?, frame))
    }

    fn build_cell(&mut self, fields: &Fields) -> Result<Rc<Cell>> {
        match fields.get(field::VALUE) {
            None => Ok(Cell::empty()),
            Some(RawValue::Placeholder(selfref)) => {
                let cell = Cell::empty();
                self.register(*selfref, PatchSite::Cell(cell.clone()))?;
                Ok(cell)
            }
            Some(raw) => Ok(Cell::new(self.resolve(raw)?)),
        }
    }

    fn build_code(&mut self, fields: &Fields) -> Result<CodeBlock> {
        let kind = Kind::Code;
        let codestring = required(kind, fields, field::CODESTRING)?
            .as_node()
            .filter(|node| node.kind == Kind::Bytes)
            .ok_or_else(|| GraphError::malformed(kind, field::CODESTRING, "expected bytes"))?;
        Ok(CodeBlock {
            argcount: int_field(kind, fields, field::ARGCOUNT)?,
            posonlyargcount: int_field(kind, fields, field::POSONLYARGCOUNT)?,
            kwonlyargcount: int_field(kind, fields, field::KWONLYARGCOUNT)?,
            nlocals: int_field(kind, fields, field::NLOCALS)?,
            stacksize: int_field(kind, fields, field::STACKSIZE)?,
            flags: int_field(kind, fields, field::FLAGS)?,
            code: byte_items(&codestring.fields)?,
            consts: self.resolve_list(kind, fields, field::CONSTS)?,
            names: strings_field(kind, fields, field::NAMES)?,
            varnames: strings_field(kind, fields, field::VARNAMES)?,
            filename: str_field(kind, fields, field::FILENAME)?.to_string(),
            name: str_field(kind, fields, field::NAME)?.to_string(),
            firstlineno: int_field(kind, fields, field::FIRSTLINENO)?,
            freevars: strings_field(kind, fields, field::FREEVARS)?,
            cellvars: strings_field(kind, fields, field::CELLVARS)?,
        })
    }

    fn build_function(&mut self, fields: &Fields) -> Result<Value> {
        let (value, frame) = self.in_frame(|this| this.function_parts(fields))?;
        patch(frame.sites, &value);
        Ok(value)
    }

    fn function_parts(&mut self, fields: &Fields) -> Result<Value> {
        let kind = Kind::Function;
        let name = str_field(kind, fields, field::NAME)?;
        let qualname = fields
            .get(field::QUALNAME)
            .and_then(RawValue::as_str)
            .unwrap_or(name);

        let code = match self.resolve(required(kind, fields, field::CODE)?)? {
            Value::Code(code) => code,
            other => {
                return Err(GraphError::malformed(
                    kind,
                    field::CODE,
                    format!("expected code, got {}", other.type_name()),
                ));
            }
        };

        let globals = new_globals();
        for (key, raw) in entries_of(kind, fields, field::GLOBALS)? {
            let key = entry_name(kind, field::GLOBALS, key)?;
            let value = match raw {
                RawValue::Placeholder(selfref) => {
                    self.register(*selfref, PatchSite::Global(globals.clone(), key.to_string()))?;
                    // Provisional, keeps the entry's position
                    Value::None
                }
                other => self.resolve(other)?,
            };
            globals.borrow_mut().insert(key.to_string(), value);
        }

        let defaults = self.resolve_list(kind, fields, field::DEFAULTS)?;

        let mut closure = Vec::new();
        for item in list_field(kind, fields, field::CLOSURE)? {
            let cell = item
                .as_node()
                .filter(|node| node.kind == Kind::Cell)
                .ok_or_else(|| GraphError::malformed(kind, field::CLOSURE, "expected cells"))?;
            closure.push(self.build_cell(&cell.fields)?);
        }
        if closure.len() != code.freevars.len() {
            return Err(GraphError::malformed(
                kind,
                field::CLOSURE,
                format!(
                    "{} cells for {} free variables",
                    closure.len(),
                    code.freevars.len()
                ),
            ));
        }

        let func = Function::new(code, globals)
            .with_name(name)
            .with_qualname(qualname)
            .with_defaults(defaults)
            .with_closure(closure);
        Ok(Value::function(func))
    }

    fn build_class(&mut self, fields: &Fields) -> Result<Value> {
        let kind = Kind::Class;
        let name = str_field(kind, fields, field::NAME)?;
        if !fields.contains_key(field::BASES) && !fields.contains_key(field::ATTRS) {
            return if name == ROOT_CLASS_NAME {
                Ok(Value::Class(Class::root()))
            } else {
                Err(GraphError::missing_field(kind, field::BASES))
            };
        }

        if self.config.share_classes {
            if let Some((_, class)) = self.classes.iter().find(|(shape, _)| shape == fields) {
                trace!(class = %class.name, "reusing class");
                return Ok(Value::Class(class.clone()));
            }
        }

        let (class, frame) = self.in_frame(|this| this.class_parts(name, fields))?;
        let value = Value::Class(class.clone());
        let own = self.frames.len();
        for (attr, target) in frame.class_attrs {
            let site = PatchSite::ClassAttr(class.clone(), attr);
            if target == own {
                site.apply(&value);
            } else {
                self.frames[target].sites.push(site);
            }
        }
        patch(frame.sites, &value);

        if self.config.share_classes && !frame.escapes {
            self.classes.push((fields.clone(), class));
        }
        Ok(value)
    }

    fn class_parts(&mut self, name: &str, fields: &Fields) -> Result<Rc<Class>> {
        let kind = Kind::Class;
        let mut bases = Vec::new();
        for raw in list_field(kind, fields, field::BASES)? {
            match self.resolve(raw)? {
                Value::Class(base) => bases.push(base),
                other => {
                    return Err(GraphError::malformed(
                        kind,
                        field::BASES,
                        format!("base must be a class, got {}", other.type_name()),
                    ));
                }
            }
        }
        if bases.is_empty() {
            bases.push(Class::root());
        }

        let mut attrs = Attrs::new();
        for (key, raw) in entries_of(kind, fields, field::ATTRS)? {
            let key = entry_name(kind, field::ATTRS, key)?;
            let value = match raw {
                RawValue::Placeholder(selfref) => {
                    let target = self.target_frame(*selfref)?;
                    if let Some(frame) = self.frames.last_mut() {
                        frame.class_attrs.push((key.to_string(), target));
                    }
                    Value::None
                }
                other => self.resolve(other)?,
            };
            attrs.insert(key.to_string(), value);
        }
        Ok(Class::new(name, bases, attrs))
    }

    fn build_object(&mut self, fields: &Fields) -> Result<Value> {
        let kind = Kind::Object;
        let class = match self.resolve(required(kind, fields, field::CLASS)?)? {
            Value::Class(class) => class,
            other => {
                return Err(GraphError::UnresolvableReference(format!(
                    "object class resolved to a {} value",
                    other.type_name()
                )));
            }
        };
        // Bare allocation: __init__ is not run again
        let instance = Instance::new_bare(class);
        for (key, raw) in entries_of(kind, fields, field::ATTRS)? {
            let key = entry_name(kind, field::ATTRS, key)?;
            let value = self.resolve(raw)?;
            instance.set_attr(key, value);
        }
        Ok(Value::Object(instance))
    }
}

fn patch(sites: Vec<PatchSite>, target: &Value) {
    if !sites.is_empty() {
        debug!(sites = sites.len(), kind = target.type_name(), "patching self references");
    }
    for site in sites {
        site.apply(target);
    }
}

fn required<'f>(kind: Kind, fields: &'f Fields, name: &str) -> Result<&'f RawValue> {
    fields
        .get(name)
        .ok_or_else(|| GraphError::missing_field(kind, name))
}

fn list_field<'f>(kind: Kind, fields: &'f Fields, name: &str) -> Result<&'f [RawValue]> {
    required(kind, fields, name)?
        .as_list()
        .ok_or_else(|| GraphError::malformed(kind, name, "expected a list"))
}

fn str_field<'f>(kind: Kind, fields: &'f Fields, name: &str) -> Result<&'f str> {
    required(kind, fields, name)?
        .as_str()
        .ok_or_else(|| GraphError::malformed(kind, name, "expected a string"))
}

fn int_field<T: TryFrom<i64>>(kind: Kind, fields: &Fields, name: &str) -> Result<T> {
    match required(kind, fields, name)? {
        RawValue::Int(n) => T::try_from(*n)
            .map_err(|_| GraphError::malformed(kind, name, format!("{} is out of range", n))),
        _ => Err(GraphError::malformed(kind, name, "expected an integer")),
    }
}

fn strings_field(kind: Kind, fields: &Fields, name: &str) -> Result<Vec<String>> {
    list_field(kind, fields, name)?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| GraphError::malformed(kind, name, "expected a list of strings"))
        })
        .collect()
}

fn byte_items(fields: &Fields) -> Result<Vec<u8>> {
    let kind = Kind::Bytes;
    list_field(kind, fields, field::ITEMS)?
        .iter()
        .map(|item| match item {
            RawValue::Int(n) => u8::try_from(*n).map_err(|_| {
                GraphError::malformed(kind, field::ITEMS, format!("byte {} outside 0..=255", n))
            }),
            _ => Err(GraphError::malformed(kind, field::ITEMS, "expected integers")),
        })
        .collect()
}

/// Key/value pairs of a mapping node's fields
fn pairs(kind: Kind, fields: &Fields) -> Result<Vec<(&RawValue, &RawValue)>> {
    list_field(kind, fields, field::ENTRIES)?
        .iter()
        .map(|entry| match entry.as_list() {
            Some([key, value]) => Ok((key, value)),
            _ => Err(GraphError::malformed(
                kind,
                field::ENTRIES,
                "entries must be [key, value] pairs",
            )),
        })
        .collect()
}

/// Pairs of a mapping node stored in field `name`
fn entries_of<'f>(
    kind: Kind,
    fields: &'f Fields,
    name: &str,
) -> Result<Vec<(&'f RawValue, &'f RawValue)>> {
    let node = required(kind, fields, name)?
        .as_node()
        .filter(|node| node.kind == Kind::Mapping)
        .ok_or_else(|| GraphError::malformed(kind, name, "expected a mapping"))?;
    pairs(Kind::Mapping, &node.fields)
}

fn entry_name<'f>(kind: Kind, name: &str, key: &'f RawValue) -> Result<&'f str> {
    key.as_str()
        .ok_or_else(|| GraphError::malformed(kind, name, "names must be strings"))
}

fn hashable(kind: Kind, name: &str, value: &Value) -> Result<Key> {
    Key::from_value(value).ok_or_else(|| {
        GraphError::malformed(
            kind,
            name,
            format!("unhashable {} value", value.type_name()),
        )
    })
}

/// Reconstruct a `(kind, fields)` pair with the default configuration
pub fn construct(kind: Kind, fields: &Fields, modules: &ModuleRegistry) -> Result<Value> {
    let config = GraphConfig::default();
    Rebuilder::new(&config, modules).construct(kind, fields)
}
