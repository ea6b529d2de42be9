//! String Package
//!
//! Functions: string.len, string.concat, string.eq
//!
//! Design notes:
//! - string.len counts UTF-8 codepoints, not bytes

use super::{expect, pair};
use crate::{
    String,
    natives::RegistryBuilder,
    values::Value,
    vm::{ExecutionError, Vm},
};

fn strings<'a>(name: &str, argument: Value<'a>) -> Result<(&'a str, &'a str), ExecutionError> {
    let (a, b) = pair(name, argument)?;
    Ok((
        expect(name, "str", a, Value::as_str)?,
        expect(name, "str", b, Value::as_str)?,
    ))
}

fn string_len<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let s = expect("string.len", "str", argument, Value::as_str)?;
    Ok(Value::Int(s.chars().count() as i64))
}

fn string_concat<'a>(
    vm: &mut Vm<'_, 'a>,
    argument: Value<'a>,
) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = strings("string.concat", argument)?;
    let mut joined = String::with_capacity(a.len() + b.len());
    joined.push_str(a);
    joined.push_str(b);
    Ok(Value::str(vm.arena(), &joined))
}

fn string_eq<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = strings("string.eq", argument)?;
    Ok(Value::bool(a == b))
}

pub fn register(builder: &mut RegistryBuilder) {
    builder.register_function("string.len", string_len);
    builder.register_function("string.concat", string_concat);
    builder.register_function("string.eq", string_eq);
}
