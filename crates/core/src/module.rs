//! Modules and the registry of importable units
//!
//! Modules are referenced by name only. Whoever rebuilds a graph resolves
//! those names against a `ModuleRegistry`, which plays the part of the
//! host's import system.

use crate::error::{Result, RuntimeError};
use crate::function::{Globals, NativeFunction, new_globals};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// An importable unit
pub struct Module {
    pub name: String,
    pub namespace: Globals,
}

impl Module {
    pub fn new(name: &str) -> Rc<Module> {
        Rc::new(Module {
            name: name.to_string(),
            namespace: new_globals(),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.namespace.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.namespace.borrow_mut().insert(name.to_string(), value);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module '{}'>", self.name)
    }
}

/// Registry of modules available for import
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Rc<Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled `math` module
    pub fn with_stdlib() -> Self {
        let mut registry = Self::new();
        registry.register(math_module());
        registry
    }

    pub fn register(&mut self, module: Rc<Module>) {
        debug!(module = %module.name, "registering module");
        self.modules.insert(module.name.clone(), module);
    }

    /// Import a module by fully qualified name
    pub fn import(&self, name: &str) -> Option<Rc<Module>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }
}

fn math_module() -> Rc<Module> {
    let math = Module::new("math");
    math.set("pi", Value::Float(std::f64::consts::PI));
    math.set("e", Value::Float(std::f64::consts::E));
    math.set("sqrt", NativeFunction::new("sqrt", math_sqrt));
    math.set("floor", NativeFunction::new("floor", math_floor));
    math
}

fn float_arg(name: &str, args: &[Value]) -> Result<f64> {
    match args {
        [Value::Float(x)] => Ok(*x),
        [Value::Int(n)] => Ok(*n as f64),
        [other] => Err(RuntimeError::TypeError(format!(
            "{}() expects a number, got {}",
            name,
            other.type_name()
        ))),
        _ => Err(RuntimeError::TypeError(format!(
            "{}() takes exactly one argument ({} given)",
            name,
            args.len()
        ))),
    }
}

fn math_sqrt(args: &[Value]) -> Result<Value> {
    Ok(Value::Float(float_arg("sqrt", args)?.sqrt()))
}

fn math_floor(args: &[Value]) -> Result<Value> {
    let x = float_arg("floor", args)?.floor();
    if x.is_finite() && x >= i64::MIN as f64 && x <= i64::MAX as f64 {
        Ok(Value::Int(x as i64))
    } else {
        Err(RuntimeError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_registered_module() {
        let registry = ModuleRegistry::with_stdlib();
        let math = registry.import("math").unwrap();
        assert_eq!(math.get("pi"), Some(Value::Float(std::f64::consts::PI)));
        assert!(registry.import("definitely_not_a_real_module_xyz").is_none());
    }

    #[test]
    fn test_math_natives() {
        assert_eq!(math_sqrt(&[Value::Int(9)]), Ok(Value::Float(3.0)));
        assert_eq!(math_floor(&[Value::Float(2.7)]), Ok(Value::Int(2)));
        assert!(matches!(
            math_sqrt(&[Value::str("x")]),
            Err(RuntimeError::TypeError(_))
        ));
    }
}
