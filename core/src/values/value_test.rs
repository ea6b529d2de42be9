use bumpalo::Bump;
use pretty_assertions::assert_eq;

use crate::String;
use crate::values::{Closure, Literal, Value};

#[test]
fn booleans_are_nullary_sums() {
    assert_eq!(Value::bool(false), Value::Sum(0, &Value::Nil));
    assert_eq!(Value::bool(true), Value::Sum(1, &Value::Nil));
    assert_eq!(Value::TRUE.as_bool(), Some(true));
    assert_eq!(Value::FALSE.as_bool(), Some(false));
}

#[test]
fn sum_with_payload_is_not_a_bool() {
    let arena = Bump::new();
    let some = Value::sum(&arena, 1, Value::Int(3));
    assert_eq!(some.as_bool(), None);
    assert_eq!(some.as_sum(), Some((1, Value::Int(3))));
}

#[test]
fn from_literal_copies_strings_into_arena() {
    let arena = Bump::new();
    let literal = Literal::Str(String::from("hello"));
    let value = Value::from_literal(&arena, &literal);
    assert_eq!(value.as_str(), Some("hello"));
    assert_eq!(Value::from_literal(&arena, &Literal::Int(7)), Value::Int(7));
    assert_eq!(Value::from_literal(&arena, &Literal::Nil), Value::Nil);
}

#[test]
fn display() {
    let arena = Bump::new();
    let pair = Value::tuple(&arena, &[Value::Int(1), Value::Int(2)]);
    assert_eq!(alloc::format!("{}", pair), "(1, 2)");

    let single = Value::tuple(&arena, &[Value::str(&arena, "a")]);
    assert_eq!(alloc::format!("{}", single), "(\"a\",)");

    let array = Value::array(&arena, &[Value::Float(1.5), Value::TRUE]);
    assert_eq!(alloc::format!("{}", array), "[1.5, #1]");

    let some = Value::sum(&arena, 2, pair);
    assert_eq!(alloc::format!("{}", some), "#2((1, 2))");
}

#[test]
fn closures_compare_by_content() {
    let arena = Bump::new();
    let context = arena.alloc_slice_copy(&[Value::Int(1)]);
    let a = Value::Closure(arena.alloc(Closure {
        function: 4,
        context,
        recursive: false,
    }));
    let b = Value::Closure(arena.alloc(Closure {
        function: 4,
        context,
        recursive: false,
    }));
    assert_eq!(a, b);
    assert!(a.is_callable());
    assert_eq!(a.kind(), "closure");
}
