//! Math Package
//!
//! Integer and float arithmetic for Tessel.
//!
//! Constants: float.pi, float.e
//! Functions: int.add, int.sub, int.mul, int.div, int.neg, int.lt, int.le,
//!            int.eq, float.add, float.mul, float.sqrt (with `std`), float.lt

use super::{expect, pair};
use crate::{
    natives::RegistryBuilder,
    values::{Literal, Value},
    vm::{ExecutionError, Vm},
};

fn ints(name: &str, argument: Value<'_>) -> Result<(i64, i64), ExecutionError> {
    let (a, b) = pair(name, argument)?;
    Ok((
        expect(name, "int", a, Value::as_int)?,
        expect(name, "int", b, Value::as_int)?,
    ))
}

fn floats(name: &str, argument: Value<'_>) -> Result<(f64, f64), ExecutionError> {
    let (a, b) = pair(name, argument)?;
    Ok((
        expect(name, "float", a, Value::as_float)?,
        expect(name, "float", b, Value::as_float)?,
    ))
}

// ============================================================================
// Integer Operations
// ============================================================================

/// Integer arithmetic wraps on overflow.
fn int_add<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = ints("int.add", argument)?;
    Ok(Value::Int(a.wrapping_add(b)))
}

fn int_sub<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = ints("int.sub", argument)?;
    Ok(Value::Int(a.wrapping_sub(b)))
}

fn int_mul<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = ints("int.mul", argument)?;
    Ok(Value::Int(a.wrapping_mul(b)))
}

fn int_div<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = ints("int.div", argument)?;
    a.checked_div(b)
        .map(Value::Int)
        .ok_or_else(|| ExecutionError::native("int.div", "division by zero"))
}

fn int_neg<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let value = expect("int.neg", "int", argument, Value::as_int)?;
    Ok(Value::Int(value.wrapping_neg()))
}

fn int_lt<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = ints("int.lt", argument)?;
    Ok(Value::bool(a < b))
}

fn int_le<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = ints("int.le", argument)?;
    Ok(Value::bool(a <= b))
}

fn int_eq<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = ints("int.eq", argument)?;
    Ok(Value::bool(a == b))
}

// ============================================================================
// Float Operations
// ============================================================================

fn float_add<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = floats("float.add", argument)?;
    Ok(Value::Float(a + b))
}

fn float_mul<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = floats("float.mul", argument)?;
    Ok(Value::Float(a * b))
}

/// Square root; negative input gives NaN. Needs `std` float intrinsics, so
/// `no_std` builds leave `float.sqrt` unregistered.
#[cfg(any(feature = "std", test))]
fn float_sqrt<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let value = expect("float.sqrt", "float", argument, Value::as_float)?;
    Ok(Value::Float(value.sqrt()))
}

fn float_lt<'a>(_vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
    let (a, b) = floats("float.lt", argument)?;
    Ok(Value::bool(a < b))
}

pub fn register(builder: &mut RegistryBuilder) {
    builder.register_function("int.add", int_add);
    builder.register_function("int.sub", int_sub);
    builder.register_function("int.mul", int_mul);
    builder.register_function("int.div", int_div);
    builder.register_function("int.neg", int_neg);
    builder.register_function("int.lt", int_lt);
    builder.register_function("int.le", int_le);
    builder.register_function("int.eq", int_eq);
    builder.register_function("float.add", float_add);
    builder.register_function("float.mul", float_mul);
    #[cfg(any(feature = "std", test))]
    builder.register_function("float.sqrt", float_sqrt);
    builder.register_function("float.lt", float_lt);
    builder.register_constant("float.pi", Literal::Float(core::f64::consts::PI));
    builder.register_constant("float.e", Literal::Float(core::f64::consts::E));
}
