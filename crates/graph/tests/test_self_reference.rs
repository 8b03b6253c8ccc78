//! Functions and classes that refer to themselves survive a round trip

mod common;

use common::{adder, attr, call, closure_factorial, counter_class, even_odd, global_factorial};
use objgraph::raw::field;
use objgraph::{Codec, Format, Kind, Node, RawValue, SelfRef, classify_and_extract};
use objgraph_core::{Attrs, Class, Value};
use std::rc::Rc;

fn round_trip(value: &Value, format: Format) -> Value {
    let codec = Codec::default();
    let bytes = codec.dumps(value, format).unwrap();
    codec.loads(&bytes, format).unwrap()
}

fn globals_entry<'n>(node: &'n Node, name: &str) -> Option<&'n RawValue> {
    node.get(field::GLOBALS)?
        .as_node()?
        .get(field::ENTRIES)?
        .as_list()?
        .iter()
        .filter_map(RawValue::as_list)
        .find(|pair| pair.first().and_then(RawValue::as_str) == Some(name))
        .and_then(|pair| pair.get(1))
}

#[test]
fn test_global_recursion_becomes_placeholder() {
    let (kind, fields) = classify_and_extract(&global_factorial()).unwrap();
    assert_eq!(kind, Kind::Function);
    let node = Node { kind, fields };
    assert_eq!(
        globals_entry(&node, "fact"),
        Some(&RawValue::Placeholder(SelfRef::SELF))
    );
    assert_eq!(globals_entry(&node, "unrelated"), None);
}

#[test]
fn test_same_name_different_object_is_walked() {
    let fact = global_factorial();
    let func = fact.as_function().unwrap();
    func.globals
        .borrow_mut()
        .insert("fact".to_string(), adder());

    let (kind, fields) = classify_and_extract(&fact).unwrap();
    let node = Node { kind, fields };
    let entry = globals_entry(&node, "fact").and_then(RawValue::as_node).unwrap();
    assert_eq!(entry.kind, Kind::Function);
    assert_eq!(entry.get(field::NAME), Some(&RawValue::Str("adder".to_string())));
    assert_eq!(RawValue::Node(node).placeholder_count(), 0);
}

#[test]
fn test_global_factorial_round_trip() {
    for format in [Format::Json, Format::Binary] {
        let fact = round_trip(&global_factorial(), format);
        assert_eq!(call(&fact, vec![Value::Int(5)]), Value::Int(120));

        let func = fact.as_function().unwrap();
        let globals = func.globals.borrow();
        assert!(globals["fact"].same_object(&fact));
        assert!(!globals.contains_key("unrelated"));
    }
}

#[test]
fn test_closure_factorial_round_trip() {
    for format in [Format::Json, Format::Binary] {
        let fact = round_trip(&closure_factorial(), format);
        assert_eq!(call(&fact, vec![Value::Int(6)]), Value::Int(720));

        let func = fact.as_function().unwrap();
        assert_eq!(func.qualname, "make.<locals>.fact");
        assert_eq!(func.closure.len(), 1);
        let held = func.closure[0].get().unwrap();
        assert!(held.same_object(&fact));
    }
}

#[test]
fn test_mutual_recursion_through_globals() {
    let (even, _odd) = even_odd();
    let (kind, fields) = classify_and_extract(&even).unwrap();
    let node = Node { kind, fields };
    // is_odd is walked inline and refers back one level out to is_even
    let odd = globals_entry(&node, "is_odd")
        .and_then(RawValue::as_node)
        .unwrap();
    assert_eq!(odd.kind, Kind::Function);
    assert_eq!(
        globals_entry(odd, "is_even"),
        Some(&RawValue::Placeholder(SelfRef { depth: 1 }))
    );

    let rebuilt = round_trip(&even, Format::Json);
    assert_eq!(call(&rebuilt, vec![Value::Int(10)]), Value::Bool(true));
    assert_eq!(call(&rebuilt, vec![Value::Int(7)]), Value::Bool(false));

    let func = rebuilt.as_function().unwrap();
    let globals = func.globals.borrow();
    let rebuilt_odd = globals["is_odd"].as_function().unwrap();
    let back = rebuilt_odd.globals.borrow()["is_even"].clone();
    assert!(back.same_object(&rebuilt));
}

#[test]
fn test_methods_refer_to_rebuilt_class() {
    for format in [Format::Json, Format::Binary] {
        let class = round_trip(&counter_class(true), format);
        let Value::Class(rc) = &class else {
            panic!("expected a class, got {:?}", class);
        };
        assert!(rc.get_own("__doc__").is_none());

        let one = call(&class, vec![Value::Int(1)]);
        let two = call(&attr(&one, "bump"), vec![]);
        assert_eq!(attr(&two, "current"), Value::Int(2));
        let Value::Object(two) = two else {
            panic!("expected an instance");
        };
        assert!(Rc::ptr_eq(&two.class, rc));

        let fresh = call(&attr(&class, "fresh"), vec![]);
        let Value::Object(fresh) = fresh else {
            panic!("expected an instance");
        };
        assert!(Rc::ptr_eq(&fresh.class, rc));
        assert_eq!(call(&attr(&class, "zero"), vec![]), Value::Int(0));
    }
}

#[test]
fn test_class_attribute_pointing_at_class() {
    let node = Class::new("Node", vec![Class::root()], Attrs::new());
    node.set_attr("kind", Value::str("leaf"));
    node.set_attr("me", Value::Class(node.clone()));
    let value = Value::Class(node);

    let (_, fields) = classify_and_extract(&value).unwrap();
    assert_eq!(RawValue::Node(Node { kind: Kind::Class, fields }).placeholder_count(), 1);

    let rebuilt = round_trip(&value, Format::Binary);
    let Value::Class(rc) = &rebuilt else {
        panic!("expected a class");
    };
    let me = rc.get_own("me").unwrap();
    assert!(me.same_object(&rebuilt));
    assert_eq!(rc.get_own("kind"), Some(Value::str("leaf")));
    // Attribute order survives the provisional slot
    let names: Vec<String> = rc.attrs().keys().cloned().collect();
    assert_eq!(names, vec!["kind".to_string(), "me".to_string()]);
}

#[test]
fn test_instance_of_self_referencing_class() {
    let class = counter_class(false);
    let obj = call(&class, vec![Value::Int(4)]);
    let rebuilt = round_trip(&obj, Format::Json);
    let bumped = call(&attr(&rebuilt, "bump"), vec![]);
    assert_eq!(attr(&bumped, "n"), Value::Int(5));

    let (Value::Object(rebuilt), Value::Object(bumped)) = (&rebuilt, &bumped) else {
        panic!("expected instances");
    };
    assert!(Rc::ptr_eq(&rebuilt.class, &bumped.class));
}
