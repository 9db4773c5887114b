//! Runtime values and the JavaScript-style coercions snippets rely on.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::ast::{BinaryOp, UnaryOp};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => {
                let trimmed = s.trim();
                match trimmed {
                    "" => 0.0,
                    "Infinity" | "+Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    _ if trimmed.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') => {
                        f64::NAN
                    }
                    _ => trimmed.parse().unwrap_or(f64::NAN),
                }
            }
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// `===`
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Undefined, Value::Undefined) => true,
            _ => false,
        }
    }

    /// `==`: numbers, strings and booleans compare numerically when their types differ.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Undefined, _) | (_, Value::Undefined) => false,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Number(n) if n.is_nan() => write!(f, "NaN"),
            Value::Number(n) if n.is_infinite() => {
                write!(f, "{}", if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) if *n == 0.0 => write!(f, "0"),
            Value::Number(n) => write!(f, "{n}"),
        }
    }
}

/// ECMAScript ToInt32.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() % 4_294_967_296.0) as i64 as u32 as i32
}

/// ECMAScript ToUint32.
pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

pub fn unary(op: UnaryOp, operand: &Value) -> Value {
    match op {
        UnaryOp::Neg => Value::Number(-operand.to_number()),
        UnaryOp::Plus => Value::Number(operand.to_number()),
        UnaryOp::Not => Value::Bool(!operand.truthy()),
        UnaryOp::BitNot => Value::Number(f64::from(!to_int32(operand.to_number()))),
    }
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if op == BinaryOp::Add {
        if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
            return Value::Str(Arc::from(format!("{left}{right}")));
        }
        return Value::Number(left.to_number() + right.to_number());
    }

    let ordered = |accept: fn(Ordering) -> bool| {
        Value::Bool(left.compare(right).is_some_and(accept))
    };
    match op {
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt => ordered(|o| o == Ordering::Less),
        BinaryOp::Gt => ordered(|o| o == Ordering::Greater),
        BinaryOp::LtEq => ordered(|o| o != Ordering::Greater),
        BinaryOp::GtEq => ordered(|o| o != Ordering::Less),
        _ => Value::Number(numeric(op, left.to_number(), right.to_number())),
    }
}

fn numeric(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::BitAnd => f64::from(to_int32(a) & to_int32(b)),
        BinaryOp::BitOr => f64::from(to_int32(a) | to_int32(b)),
        BinaryOp::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
        BinaryOp::Shl => f64::from(to_int32(a).wrapping_shl(to_uint32(b) & 31)),
        BinaryOp::Shr => f64::from(to_int32(a) >> (to_uint32(b) & 31)),
        BinaryOp::UShr => f64::from(to_uint32(a) >> (to_uint32(b) & 31)),
        _ => a + b,
    }
}
