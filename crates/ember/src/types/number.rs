//! Int, Float and Bool slots.
//!
//! The three numeric types share one slot set. Operands are coerced to [`Num`]: bools act
//! as 0 and 1, and an int meeting a float is promoted. A non-numeric operand makes the slot
//! report "unsupported" so binary dispatch can try the other side.

use std::cmp::Ordering;

use super::{hash::builtin_hash, slot, unsupported};
use crate::{
    bytecode::BinaryOp,
    exception::{ErrorKind, RunResult},
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::{Data, Value},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn of(value: &Value) -> Option<Self> {
        match value.data() {
            Data::Int(i) => Some(Self::Int(*i)),
            Data::Bool(b) => Some(Self::Int(i64::from(*b))),
            Data::Float(f) => Some(Self::Float(*f)),
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Int(i) => Value::int(i),
            Self::Float(f) => Value::float(f),
        }
    }

    pub fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Renders a float the way literals are written: always with a fractional part or exponent.
pub(crate) fn format_float(f: f64) -> String {
    format!("{f:?}")
}

/// Evaluates a binary operator on two numbers.
///
/// Returns `Unsupported` for operator and operand combinations numbers do not handle.
pub(crate) fn numeric_binary(op: BinaryOp, left: &Value, right: &Value) -> RunResult<Value> {
    let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
        return unsupported();
    };
    let result = match op {
        BinaryOp::Add => int_or_float(a, b, i64::checked_add, |x, y| x + y)?,
        BinaryOp::Sub => int_or_float(a, b, i64::checked_sub, |x, y| x - y)?,
        BinaryOp::Mul => int_or_float(a, b, i64::checked_mul, |x, y| x * y)?,
        BinaryOp::Div => {
            if b.as_f64() == 0.0 {
                return Err(ErrorKind::zero_division());
            }
            Num::Float(a.as_f64() / b.as_f64())
        }
        BinaryOp::FloorDiv => match (a, b) {
            (Num::Int(_), Num::Int(0)) => return Err(ErrorKind::zero_division()),
            (Num::Int(x), Num::Int(y)) => Num::Int(floor_div(x, y)?),
            _ if b.as_f64() == 0.0 => return Err(ErrorKind::zero_division()),
            _ => Num::Float((a.as_f64() / b.as_f64()).floor()),
        },
        BinaryOp::Mod => match (a, b) {
            (Num::Int(_), Num::Int(0)) => return Err(ErrorKind::zero_division()),
            (Num::Int(x), Num::Int(y)) => Num::Int(floor_mod(x, y)),
            _ if b.as_f64() == 0.0 => return Err(ErrorKind::zero_division()),
            _ => {
                let (x, y) = (a.as_f64(), b.as_f64());
                let mut r = x % y;
                if r != 0.0 && (r < 0.0) != (y < 0.0) {
                    r += y;
                }
                Num::Float(r)
            }
        },
        BinaryOp::Pow => power(a, b)?,
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            let (Num::Int(x), Num::Int(y)) = (a, b) else {
                return unsupported();
            };
            Num::Int(bitwise(op, x, y)?)
        }
        BinaryOp::Equals => return Ok(Value::bool(a.compare(b) == Some(Ordering::Equal))),
        BinaryOp::NotEquals => return Ok(Value::bool(a.compare(b) != Some(Ordering::Equal))),
        BinaryOp::LessThan => return Ok(Value::bool(a.compare(b) == Some(Ordering::Less))),
        BinaryOp::LessOrEqual => {
            return Ok(Value::bool(matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal))));
        }
        BinaryOp::GreaterThan => return Ok(Value::bool(a.compare(b) == Some(Ordering::Greater))),
        BinaryOp::GreaterOrEqual => {
            return Ok(Value::bool(matches!(
                a.compare(b),
                Some(Ordering::Greater | Ordering::Equal)
            )));
        }
        BinaryOp::Contains | BinaryOp::Is => return unsupported(),
    };
    Ok(result.into_value())
}

fn int_or_float(a: Num, b: Num, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> RunResult<Num> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(x, y).map(Num::Int).ok_or_else(ErrorKind::overflow),
        _ => Ok(Num::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn floor_div(x: i64, y: i64) -> RunResult<i64> {
    let q = x.checked_div(y).ok_or_else(ErrorKind::overflow)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_mod(x: i64, y: i64) -> i64 {
    // i64::MIN % -1 overflows but is mathematically zero
    let r = x.checked_rem(y).unwrap_or(0);
    if r != 0 && ((r < 0) != (y < 0)) {
        r + y
    } else {
        r
    }
}

fn power(a: Num, b: Num) -> RunResult<Num> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) if y >= 0 => {
            let exp = u32::try_from(y).map_err(|_| ErrorKind::overflow())?;
            x.checked_pow(exp).map(Num::Int).ok_or_else(ErrorKind::overflow)
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            if x == 0.0 && y < 0.0 {
                return Err(ErrorKind::ZeroDivisionError.err("zero cannot be raised to a negative power"));
            }
            Ok(Num::Float(x.powf(y)))
        }
    }
}

fn bitwise(op: BinaryOp, x: i64, y: i64) -> RunResult<i64> {
    Ok(match op {
        BinaryOp::BitAnd => x & y,
        BinaryOp::BitOr => x | y,
        BinaryOp::BitXor => x ^ y,
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight if y < 0 => {
            return Err(ErrorKind::value_error("negative shift count"));
        }
        BinaryOp::ShiftLeft => {
            if x == 0 {
                0
            } else {
                let shift = u32::try_from(y).ok().filter(|s| *s < 64).ok_or_else(ErrorKind::overflow)?;
                let shifted = x << shift;
                if shifted >> shift != x {
                    return Err(ErrorKind::overflow());
                }
                shifted
            }
        }
        BinaryOp::ShiftRight => match u32::try_from(y).ok().filter(|s| *s < 64) {
            Some(shift) => x >> shift,
            None if x < 0 => -1,
            None => 0,
        },
        _ => return unsupported(),
    })
}

macro_rules! binary_slots {
    ($($op:ident: $fwd:ident / $rev:ident => $fwd_slot:ident / $rev_slot:ident;)*) => {
        $(
            fn $fwd(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
                numeric_binary(BinaryOp::$op, this, &args[0])
            }

            fn $rev(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
                numeric_binary(BinaryOp::$op, &args[0], this)
            }
        )*

        fn install_binary(table: &Scope) {
            $(
                slot(table, Magic::$fwd_slot, Arity::Exact(1), $fwd);
                slot(table, Magic::$rev_slot, Arity::Exact(1), $rev);
            )*
        }
    };
}

binary_slots! {
    Add: add / right_add => Add / RightAdd;
    Sub: sub / right_sub => Sub / RightSub;
    Mul: mul / right_mul => Mul / RightMul;
    Div: div / right_div => Div / RightDiv;
    FloorDiv: floor_div_slot / right_floor_div => FloorDiv / RightFloorDiv;
    Mod: mod_slot / right_mod => Mod / RightMod;
    Pow: pow / right_pow => Pow / RightPow;
    BitAnd: bit_and / right_bit_and => BitAnd / RightBitAnd;
    BitOr: bit_or / right_bit_or => BitOr / RightBitOr;
    BitXor: bit_xor / right_bit_xor => BitXor / RightBitXor;
    ShiftLeft: shift_left / right_shift_left => ShiftLeft / RightShiftLeft;
    ShiftRight: shift_right / right_shift_right => ShiftRight / RightShiftRight;
    Equals: equals / right_equals => Equals / RightEquals;
    NotEquals: not_equals / right_not_equals => NotEquals / RightNotEquals;
    LessThan: less_than / right_less_than => LessThan / RightLessThan;
    LessOrEqual: less_or_equal / right_less_or_equal => LessOrEqual / RightLessOrEqual;
    GreaterThan: greater_than / right_greater_than => GreaterThan / RightGreaterThan;
    GreaterOrEqual: greater_or_equal / right_greater_or_equal => GreaterOrEqual / RightGreaterOrEqual;
}

fn num(this: &Value) -> RunResult<Num> {
    Num::of(this).ok_or_else(|| ErrorKind::type_error(format!("expected a number, got {}", this.type_name())))
}

fn negate(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    match num(this)? {
        Num::Int(i) => i.checked_neg().map(Value::int).ok_or_else(ErrorKind::overflow),
        Num::Float(f) => Ok(Value::float(-f)),
    }
}

fn positive(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(num(this)?.into_value())
}

fn invert(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    match num(this)? {
        Num::Int(i) => Ok(Value::int(!i)),
        Num::Float(_) => Err(ErrorKind::unary_type_error("~", "Float")),
    }
}

fn to_bool(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(match num(this)? {
        Num::Int(i) => i != 0,
        Num::Float(f) => f != 0.0,
    }))
}

fn to_string(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let text = match this.data() {
        Data::Bool(true) => "True".to_owned(),
        Data::Bool(false) => "False".to_owned(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        _ => return unsupported(),
    };
    Ok(Value::string(text))
}

const HASH_INT: u8 = 1;
const HASH_FLOAT: u8 = 2;
const HASH_BOOL: u8 = 3;

fn hash(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let h = match this.data() {
        Data::Int(i) => builtin_hash(HASH_INT, i),
        Data::Float(f) => builtin_hash(HASH_FLOAT, f.to_bits()),
        Data::Bool(b) => builtin_hash(HASH_BOOL, b),
        _ => return unsupported(),
    };
    Ok(Value::int(h as i64))
}

fn copy(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(this.clone())
}

pub(crate) fn install(table: &Scope) {
    install_binary(table);
    slot(table, Magic::Negate, Arity::Exact(0), negate);
    slot(table, Magic::Positive, Arity::Exact(0), positive);
    slot(table, Magic::Invert, Arity::Exact(0), invert);
    slot(table, Magic::Bool, Arity::Exact(0), to_bool);
    slot(table, Magic::String, Arity::Exact(0), to_string);
    slot(table, Magic::Repr, Arity::Exact(0), to_string);
    slot(table, Magic::Hash, Arity::Exact(0), hash);
    slot(table, Magic::Copy, Arity::Exact(0), copy);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(op: BinaryOp, a: Value, b: Value) -> RunResult<Value> {
        numeric_binary(op, &a, &b)
    }

    #[test]
    fn int_arithmetic() {
        assert_eq!(eval(BinaryOp::Add, Value::int(2), Value::int(3)).unwrap().as_int(), Some(5));
        assert_eq!(eval(BinaryOp::Div, Value::int(7), Value::int(2)).unwrap().as_float(), Some(3.5));
        assert_eq!(eval(BinaryOp::FloorDiv, Value::int(-7), Value::int(2)).unwrap().as_int(), Some(-4));
        assert_eq!(eval(BinaryOp::Mod, Value::int(-7), Value::int(3)).unwrap().as_int(), Some(2));
        assert_eq!(eval(BinaryOp::Pow, Value::int(2), Value::int(10)).unwrap().as_int(), Some(1024));
        assert_eq!(eval(BinaryOp::Pow, Value::int(2), Value::int(-1)).unwrap().as_float(), Some(0.5));
    }

    #[test]
    fn promotion_and_bools() {
        assert_eq!(eval(BinaryOp::Mul, Value::int(2), Value::float(1.5)).unwrap().as_float(), Some(3.0));
        assert_eq!(eval(BinaryOp::Add, Value::bool(true), Value::int(1)).unwrap().as_int(), Some(2));
        assert_eq!(
            eval(BinaryOp::Equals, Value::int(1), Value::float(1.0)).unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn errors() {
        assert!(matches!(
            eval(BinaryOp::Div, Value::int(1), Value::int(0)),
            Err(crate::exception::RunError::Exc(e)) if e.kind == ErrorKind::ZeroDivisionError
        ));
        assert!(matches!(
            eval(BinaryOp::Add, Value::int(i64::MAX), Value::int(1)),
            Err(crate::exception::RunError::Exc(e)) if e.kind == ErrorKind::OverflowError
        ));
        assert!(matches!(
            eval(BinaryOp::Add, Value::int(1), Value::string("a")),
            Err(crate::exception::RunError::Unsupported)
        ));
        assert!(matches!(
            eval(BinaryOp::BitAnd, Value::float(1.0), Value::int(1)),
            Err(crate::exception::RunError::Unsupported)
        ));
    }

    #[test]
    fn shifts() {
        assert_eq!(eval(BinaryOp::ShiftLeft, Value::int(1), Value::int(4)).unwrap().as_int(), Some(16));
        assert_eq!(eval(BinaryOp::ShiftRight, Value::int(-8), Value::int(100)).unwrap().as_int(), Some(-1));
        assert!(eval(BinaryOp::ShiftLeft, Value::int(1), Value::int(64)).is_err());
    }

    #[test]
    fn float_rendering() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(2.5e-7), "2.5e-7");
    }
}
