use core::fmt;

use bumpalo::Bump;

use super::Literal;

/// A runtime value.
///
/// Values are `Copy`: scalars are stored inline and compound values point
/// into the arena the VM was created with. Nothing is ever mutated in place,
/// so sharing a payload between values is always safe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Nil,
    Int(i64),
    Float(f64),
    Str(&'a str),
    /// Tagged union: variant tag plus its payload.
    Sum(u8, &'a Value<'a>),
    Tuple(&'a [Value<'a>]),
    Array(&'a [Value<'a>]),
    /// Global address of a function (compiled or native) or closure template.
    Function(u32),
    Closure(&'a Closure<'a>),
}

/// A closure template bound to its captured context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Closure<'a> {
    /// Global address of the compiled body.
    pub function: u32,
    /// Captured values in context-slot order.
    pub context: &'a [Value<'a>],
    /// The closure itself fills the slot after `context` when invoked.
    pub recursive: bool,
}

impl Value<'static> {
    pub const FALSE: Value<'static> = Value::Sum(0, &Value::Nil);
    pub const TRUE: Value<'static> = Value::Sum(1, &Value::Nil);
}

impl<'a> Value<'a> {
    pub fn bool(value: bool) -> Value<'a> {
        if value { Value::TRUE } else { Value::FALSE }
    }

    pub fn str(arena: &'a Bump, value: &str) -> Value<'a> {
        Value::Str(arena.alloc_str(value))
    }

    pub fn sum(arena: &'a Bump, tag: u8, payload: Value<'a>) -> Value<'a> {
        match payload {
            Value::Nil if tag <= 1 => Value::bool(tag == 1),
            _ => Value::Sum(tag, arena.alloc(payload)),
        }
    }

    pub fn tuple(arena: &'a Bump, elements: &[Value<'a>]) -> Value<'a> {
        Value::Tuple(arena.alloc_slice_copy(elements))
    }

    pub fn array(arena: &'a Bump, elements: &[Value<'a>]) -> Value<'a> {
        Value::Array(arena.alloc_slice_copy(elements))
    }

    pub fn from_literal(arena: &'a Bump, literal: &Literal) -> Value<'a> {
        match literal {
            Literal::Nil => Value::Nil,
            Literal::Int(value) => Value::Int(*value),
            Literal::Float(value) => Value::Float(*value),
            Literal::Str(value) => Value::str(arena, value),
        }
    }

    /// Short name of the runtime representation, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Sum(..) => "sum",
            Value::Tuple(_) => "tuple",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
            Value::Closure(_) => "closure",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Str(value) => Some(*value),
            _ => None,
        }
    }

    /// `Some` for the two nullary variants 0 and 1.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Sum(tag @ (0 | 1), Value::Nil) => Some(*tag == 1),
            _ => None,
        }
    }

    pub fn as_sum(&self) -> Option<(u8, Value<'a>)> {
        match self {
            Value::Sum(tag, payload) => Some((*tag, **payload)),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&'a [Value<'a>]> {
        match self {
            Value::Tuple(elements) => Some(*elements),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&'a [Value<'a>]> {
        match self {
            Value::Array(elements) => Some(*elements),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Closure(_))
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, elements: &[Value<'_>]) -> fmt::Result {
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", element)?;
    }
    Ok(())
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Str(value) => write!(f, "{:?}", value),
            Value::Sum(tag, Value::Nil) => write!(f, "#{}", tag),
            Value::Sum(tag, payload) => write!(f, "#{}({})", tag, payload),
            Value::Tuple(elements) => {
                write!(f, "(")?;
                write_list(f, elements)?;
                if elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Array(elements) => {
                write!(f, "[")?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            Value::Function(address) => write!(f, "<function @{}>", address),
            Value::Closure(closure) => write!(f, "<closure @{}>", closure.function),
        }
    }
}
