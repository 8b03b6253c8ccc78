//! Walk-then-rebuild behavior for values without self-reference

mod common;

use common::{adder, attr, call, counter_class, nested_code};
use objgraph::raw::field;
use objgraph::{Codec, Format, GraphConfig, Kind, RawValue, Walker, classify_and_extract};
use objgraph_core::{Attrs, Class, Generator, Instance, Key, ModuleRegistry, Value};
use std::rc::Rc;

fn sample_data() -> Value {
    Value::dict(vec![
        (Key::from("none"), Value::None),
        (Key::from("ellipsis"), Value::Ellipsis),
        (Key::from("flag"), Value::Bool(true)),
        (Key::from("count"), Value::Int(-42)),
        (Key::from("ratio"), Value::Float(0.25)),
        (
            Key::from("z"),
            Value::Complex {
                re: 1.0,
                im: -3.5,
            },
        ),
        (Key::from("text"), Value::str("héllo \"world\"\n")),
        (
            Key::from("list"),
            Value::list(vec![Value::Int(1), Value::list(vec![])]),
        ),
        (
            Key::Tuple(Rc::from(vec![Key::Int(1), Key::from("a")])),
            Value::tuple(vec![Value::Int(1), Value::str("a")]),
        ),
        (Key::Int(7), Value::set(vec![Key::Int(1), Key::Int(2)])),
        (
            Key::Bool(false),
            Value::frozenset(vec![Key::from("x"), Key::Float(2.5f64.to_bits())]),
        ),
        (Key::None, Value::bytes(vec![0u8, 127, 255])),
    ])
}

#[test]
fn test_data_round_trips_in_every_format() {
    let codec = Codec::default();
    let value = sample_data();
    for format in [Format::Json, Format::Binary] {
        let bytes = codec.dumps(&value, format).unwrap();
        let back = codec.loads(&bytes, format).unwrap();
        assert_eq!(back, value, "round trip through {}", format);
    }
}

#[test]
fn test_tuple_and_list_rebuild_to_their_own_kind() {
    let items = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
    let tuple = Value::tuple(items.clone());
    let list = Value::list(items);

    let (tuple_kind, tuple_fields) = classify_and_extract(&tuple).unwrap();
    let (list_kind, list_fields) = classify_and_extract(&list).unwrap();
    assert_eq!(tuple_kind, Kind::Tuple);
    assert_eq!(list_kind, Kind::Sequence);

    let modules = ModuleRegistry::new();
    let rebuilt_tuple = objgraph::construct(tuple_kind, &tuple_fields, &modules).unwrap();
    let rebuilt_list = objgraph::construct(list_kind, &list_fields, &modules).unwrap();
    assert!(matches!(rebuilt_tuple, Value::Tuple(_)));
    assert!(matches!(rebuilt_list, Value::List(_)));
    assert_eq!(rebuilt_tuple, tuple);
    assert_eq!(rebuilt_list, list);
    assert_ne!(rebuilt_tuple, rebuilt_list);
}

#[test]
fn test_primitive_construct() {
    let (kind, fields) = classify_and_extract(&Value::str("plain")).unwrap();
    assert_eq!(kind, Kind::Primitive);
    let back = objgraph::construct(kind, &fields, &ModuleRegistry::new()).unwrap();
    assert_eq!(back, Value::str("plain"));
}

#[test]
fn test_generator_drains_and_replays_once() {
    let generator = Generator::from_iter("count", (1..=3).map(Value::Int));
    let value = Value::Generator(generator.clone());

    let (kind, fields) = classify_and_extract(&value).unwrap();
    assert_eq!(kind, Kind::Generator);
    assert_eq!(
        fields.get(field::VALUES),
        Some(&RawValue::List(vec![
            RawValue::Int(1),
            RawValue::Int(2),
            RawValue::Int(3)
        ]))
    );
    // The original is exhausted
    assert!(generator.next_value().is_none());
    let (_, again) = classify_and_extract(&value).unwrap();
    assert_eq!(again.get(field::VALUES), Some(&RawValue::List(vec![])));

    let rebuilt = objgraph::construct(kind, &fields, &ModuleRegistry::new()).unwrap();
    let Value::Generator(rebuilt) = rebuilt else {
        panic!("expected a generator");
    };
    assert_eq!(
        rebuilt.drain(),
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
    assert!(rebuilt.next_value().is_none());
}

#[test]
fn test_class_doc_is_filtered_but_methods_kept() {
    let (kind, fields) = classify_and_extract(&counter_class(true)).unwrap();
    assert_eq!(kind, Kind::Class);
    let entries = fields
        .get(field::ATTRS)
        .and_then(RawValue::as_node)
        .and_then(|node| node.get(field::ENTRIES))
        .and_then(RawValue::as_list)
        .unwrap();
    let names: Vec<&str> = entries
        .iter()
        .filter_map(|entry| entry.as_list()?.first()?.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["start", "__init__", "bump", "current", "zero", "fresh"]
    );
}

#[test]
fn test_reclassification_is_idempotent() {
    let values = [sample_data(), counter_class(true), adder()];
    for value in &values {
        let first = classify_and_extract(value).unwrap();
        let second = classify_and_extract(value).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_function_with_defaults_is_callable() {
    let codec = Codec::default();
    let bytes = codec.dumps(&adder(), Format::Json).unwrap();
    let rebuilt = codec.loads(&bytes, Format::Json).unwrap();
    assert_eq!(rebuilt, adder());
    assert_eq!(call(&rebuilt, vec![Value::Int(5)]), Value::Int(15));
    assert_eq!(
        call(&rebuilt, vec![Value::Int(5), Value::Int(1)]),
        Value::Int(6)
    );
}

#[test]
fn test_nested_code_and_trimmed_globals() {
    let globals = objgraph_core::new_globals();
    globals
        .borrow_mut()
        .insert("helper".to_string(), Value::Int(1));
    globals
        .borrow_mut()
        .insert("noise".to_string(), Value::Int(2));
    let outer = Value::function(objgraph_core::Function::new(Rc::new(nested_code()), globals));

    let codec = Codec::default();
    let rebuilt = codec.loads(&codec.dumps(&outer, Format::Binary).unwrap(), Format::Binary).unwrap();
    let func = rebuilt.as_function().unwrap();
    // `helper` is only referenced by the nested code block
    let carried: Vec<String> = func.globals.borrow().keys().cloned().collect();
    assert_eq!(carried, vec!["helper".to_string()]);

    let inner = call(&rebuilt, vec![Value::Int(40)]);
    assert_eq!(call(&inner, vec![Value::Int(2)]), Value::Int(42));
}

#[test]
fn test_class_round_trip_is_usable() {
    let codec = Codec::default();
    let class = counter_class(false);
    let rebuilt = codec.from_raw(&codec.to_raw(&class).unwrap()).unwrap();
    assert_eq!(rebuilt, class);

    let obj = call(&rebuilt, vec![Value::Int(3)]);
    assert_eq!(attr(&obj, "current"), Value::Int(3));
    assert_eq!(call(&attr(&rebuilt, "zero"), vec![]), Value::Int(0));
    let fresh = call(&attr(&rebuilt, "fresh"), vec![]);
    assert_eq!(attr(&fresh, "n"), Value::Int(0));
}

#[test]
fn test_object_rebuilt_without_running_init() {
    let class = counter_class(false);
    let Value::Class(rc) = &class else {
        unreachable!()
    };
    // Bypass __init__ so the instance carries an attribute it never sets
    let instance = Instance::new_bare(rc.clone());
    instance.set_attr("n", Value::Int(9));
    instance.set_attr("label", Value::str("nine"));
    let obj = Value::Object(instance);

    let codec = Codec::default();
    let rebuilt = codec.loads(&codec.dumps(&obj, Format::Json).unwrap(), Format::Json).unwrap();
    assert_eq!(rebuilt, obj);
    let Value::Object(rebuilt) = rebuilt else {
        panic!("expected an object");
    };
    let names: Vec<String> = rebuilt.attrs().keys().cloned().collect();
    assert_eq!(names, vec!["n".to_string(), "label".to_string()]);
}

#[test]
fn test_bound_method_round_trip() {
    let obj = call(&counter_class(false), vec![Value::Int(3)]);
    let bump = attr(&obj, "bump");
    let (kind, _) = classify_and_extract(&bump).unwrap();
    assert_eq!(kind, Kind::Method);

    let codec = Codec::default();
    let rebuilt = codec
        .loads(&codec.dumps(&bump, Format::Json).unwrap(), Format::Json)
        .unwrap();
    let Value::Method(method) = &rebuilt else {
        panic!("expected a bound method, got {:?}", rebuilt);
    };
    assert_eq!(method.function.as_function().unwrap().qualname, "Counter.bump");
    assert_eq!(attr(&method.receiver, "n"), Value::Int(3));
    assert!(!method.receiver.same_object(&obj));

    let bumped = call(&rebuilt, vec![]);
    assert_eq!(attr(&bumped, "n"), Value::Int(4));
    assert_eq!(attr(&bumped, "current"), Value::Int(4));
}

#[test]
fn test_deeply_nested_list_round_trips() {
    let mut value = Value::Int(1);
    for _ in 0..100 {
        value = Value::list(vec![value]);
    }
    let codec = Codec::default();
    for format in [Format::Json, Format::Binary] {
        let bytes = codec.dumps(&value, format).unwrap();
        assert_eq!(codec.loads(&bytes, format).unwrap(), value);
    }
}

#[test]
fn test_module_reference_reimports() {
    let modules = ModuleRegistry::with_stdlib();
    let math = Value::Module(modules.import("math").unwrap());
    let codec = Codec::new(GraphConfig::default(), modules);
    let raw = codec.to_raw(&math).unwrap();
    assert_eq!(
        raw.as_node().and_then(|n| n.get(field::NAME)),
        Some(&RawValue::Str("math".to_string()))
    );
    let rebuilt = codec.from_raw(&raw).unwrap();
    assert!(rebuilt.same_object(&math));
    let sqrt = attr(&rebuilt, "sqrt");
    assert_eq!(call(&sqrt, vec![Value::Int(16)]), Value::Float(4.0));
}

#[test]
fn test_aliasing_is_not_preserved() {
    let shared = Value::list(vec![Value::Int(1)]);
    let outer = Value::list(vec![shared.clone(), shared]);
    let codec = Codec::default();
    let rebuilt = codec.from_raw(&codec.to_raw(&outer).unwrap()).unwrap();
    assert_eq!(rebuilt, outer);
    let Value::List(items) = rebuilt else {
        panic!("expected a list");
    };
    let items = items.borrow();
    assert!(!items[0].same_object(&items[1]));
}

#[test]
fn test_class_sharing_follows_config() {
    let mut attrs = Attrs::new();
    attrs.insert("dims".to_string(), Value::Int(2));
    let point = Class::new("Point", vec![Class::root()], attrs);
    let a = Value::Object(Instance::new_bare(point.clone()));
    let b = Value::Object(Instance::new_bare(point));
    let pair = Value::tuple(vec![a, b]);

    let class_of = |value: &Value, index: usize| match value {
        Value::Tuple(items) => match &items[index] {
            Value::Object(obj) => obj.class.clone(),
            other => panic!("expected object, got {:?}", other),
        },
        other => panic!("expected tuple, got {:?}", other),
    };

    let shared = Codec::default();
    let rebuilt = shared.from_raw(&shared.to_raw(&pair).unwrap()).unwrap();
    assert!(Rc::ptr_eq(&class_of(&rebuilt, 0), &class_of(&rebuilt, 1)));

    let separate = Codec::new(
        GraphConfig::default().with_share_classes(false),
        ModuleRegistry::new(),
    );
    let rebuilt = separate.from_raw(&separate.to_raw(&pair).unwrap()).unwrap();
    assert!(!Rc::ptr_eq(&class_of(&rebuilt, 0), &class_of(&rebuilt, 1)));
    assert_eq!(rebuilt, pair);
}

#[test]
fn test_walker_reports_unsupported_native() {
    let modules = ModuleRegistry::with_stdlib();
    let sqrt = modules.import("math").unwrap().get("sqrt").unwrap();
    let config = GraphConfig::default();
    let err = Walker::new(&config).walk(&sqrt).unwrap_err();
    assert!(matches!(err, objgraph::GraphError::UnsupportedValue(_)));
}
