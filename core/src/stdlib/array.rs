//! Array Package
//!
//! Functions: array.len, array.get, array.map, array.fold
//!
//! `map` and `fold` call their function argument back through the VM, so
//! the function may be a native, a top-level function or a closure.

use super::{expect, pair};
use crate::{
    Vec, format,
    natives::RegistryBuilder,
    values::Value,
    vm::{ExecutionError, Vm},
};

fn array_len<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let elements = expect("array.len", "array", argument, Value::as_array)?;
    Ok(Value::Int(elements.len() as i64))
}

/// `(array, index)`; fails when the index is out of range.
fn array_get<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (array, index) = pair("array.get", argument)?;
    let elements = expect("array.get", "array", array, Value::as_array)?;
    let index = expect("array.get", "int", index, Value::as_int)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| elements.get(i).copied())
        .ok_or_else(|| {
            ExecutionError::native(
                "array.get",
                format!("index {} out of range for length {}", index, elements.len()),
            )
        })
}

/// `(array, f)`
fn array_map<'a>(vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (array, function) = pair("array.map", argument)?;
    let elements = expect("array.map", "array", array, Value::as_array)?;
    let mut mapped = Vec::with_capacity(elements.len());
    for &element in elements {
        mapped.push(vm.call(function, element)?);
    }
    Ok(Value::array(vm.arena(), &mapped))
}

/// `(array, init, f)` where `f` takes `(accumulator, element)`.
fn array_fold<'a>(vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (array, init, function) = match argument.as_tuple() {
        Some(&[array, init, function]) => (array, init, function),
        _ => {
            return Err(ExecutionError::native(
                "array.fold",
                format!("expected a triple, found {}", argument.kind()),
            ));
        }
    };
    let elements = expect("array.fold", "array", array, Value::as_array)?;
    let mut accumulator = init;
    for &element in elements {
        let step = Value::tuple(vm.arena(), &[accumulator, element]);
        accumulator = vm.call(function, step)?;
    }
    Ok(accumulator)
}

pub fn register(builder: &mut RegistryBuilder) {
    builder.register_function("array.len", array_len);
    builder.register_function("array.get", array_get);
    builder.register_function("array.map", array_map);
    builder.register_function("array.fold", array_fold);
}
