//! Binary and unary operators

use crate::compiler::ast::{BinaryOp, UnaryOp};
use crate::runtime::control::{check_string_length, ErrorKind, RtResult, RuntimeError};
use crate::runtime::object;
use crate::runtime::stdlib::Builtin;
use crate::runtime::value::{Callable, ObjectClass, Value};

/// ToInt32
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    if wrapped >= 2_147_483_648.0 {
        (wrapped - 4_294_967_296.0) as i32
    } else {
        wrapped as i32
    }
}

pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

/// Objects and arrays are converted to strings before `+` and comparisons
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Object(obj) if matches!(obj.class(), ObjectClass::Date(_)) => Value::Str(value.to_display()),
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_) => Value::Str(value.to_display()),
        other => other.clone(),
    }
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => a.same_ref(b),
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Num(_), Value::Str(_)) | (Value::Str(_), Value::Num(_)) => a.to_number() == b.to_number(),
        (Value::Bool(_), _) => loose_equals(&Value::Num(a.to_number()), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Num(b.to_number())),
        (Value::Num(_) | Value::Str(_), _) if !b.is_primitive() => loose_equals(a, &to_primitive(b)),
        (_, Value::Num(_) | Value::Str(_)) if !a.is_primitive() => loose_equals(&to_primitive(a), b),
        _ => strict_equals(a, b),
    }
}

/// Abstract relational comparison; `None` when either side is NaN
fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let pa = to_primitive(a);
    let pb = to_primitive(b);
    if let (Value::Str(x), Value::Str(y)) = (&pa, &pb) {
        return Some(x.cmp(y));
    }
    pa.to_number().partial_cmp(&pb.to_number())
}

pub fn add(a: &Value, b: &Value) -> RtResult<Value> {
    let pa = to_primitive(a);
    let pb = to_primitive(b);
    let (x, y) = match (&pa, &pb) {
        (Value::Str(_), _) | (_, Value::Str(_)) => (pa.to_display(), pb.to_display()),
        _ => return Ok(Value::Num(pa.to_number() + pb.to_number())),
    };
    check_string_length((x.len() + y.len()) as f64)?;
    Ok(Value::Str(x + &y))
}

fn js_mod(a: f64, b: f64) -> f64 {
    if b == 0.0 || !a.is_finite() || b.is_nan() {
        return f64::NAN;
    }
    if b.is_infinite() {
        return a;
    }
    a % b
}

pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> RtResult<Value> {
    use BinaryOp::*;
    let value = match op {
        Add => add(a, b)?,
        Sub => Value::Num(a.to_number() - b.to_number()),
        Mul => Value::Num(a.to_number() * b.to_number()),
        Div => Value::Num(a.to_number() / b.to_number()),
        Mod => Value::Num(js_mod(a.to_number(), b.to_number())),
        Pow => Value::Num(a.to_number().powf(b.to_number())),
        Eq => Value::Bool(loose_equals(a, b)),
        Ne => Value::Bool(!loose_equals(a, b)),
        StrictEq => Value::Bool(strict_equals(a, b)),
        StrictNe => Value::Bool(!strict_equals(a, b)),
        Lt => Value::Bool(compare(a, b) == Some(std::cmp::Ordering::Less)),
        Gt => Value::Bool(compare(a, b) == Some(std::cmp::Ordering::Greater)),
        Le => Value::Bool(matches!(
            compare(a, b),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        )),
        Ge => Value::Bool(matches!(
            compare(a, b),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )),
        BitAnd => Value::Num((to_int32(a.to_number()) & to_int32(b.to_number())) as f64),
        BitOr => Value::Num((to_int32(a.to_number()) | to_int32(b.to_number())) as f64),
        BitXor => Value::Num((to_int32(a.to_number()) ^ to_int32(b.to_number())) as f64),
        Shl => Value::Num(to_int32(a.to_number()).wrapping_shl(to_uint32(b.to_number()) & 31) as f64),
        Shr => Value::Num(to_int32(a.to_number()).wrapping_shr(to_uint32(b.to_number()) & 31) as f64),
        UShr => Value::Num(to_uint32(a.to_number()).wrapping_shr(to_uint32(b.to_number()) & 31) as f64),
        In => Value::Bool(object::has_property(b, &a.to_key())?),
        InstanceOf => Value::Bool(instance_of(a, b)?),
    };
    Ok(value)
}

fn instance_of(value: &Value, ctor: &Value) -> RtResult<bool> {
    let func = match ctor {
        Value::Function(f) => f,
        _ => {
            return Err(RuntimeError::type_error(
                "Right-hand side of 'instanceof' is not callable",
            ))
        }
    };
    let builtin = match &**func {
        Callable::Builtin(b) => b.func,
        _ => return Ok(false),
    };
    Ok(match (builtin, value) {
        (Builtin::ErrorCtor(kind), Value::Object(obj)) if obj.class() == ObjectClass::Error => {
            kind == ErrorKind::Error
                || obj
                    .get_data("name")
                    .map(|n| n.to_display() == kind.name())
                    .unwrap_or(false)
        }
        (Builtin::ArrayCtor, Value::Array(_)) => true,
        (Builtin::ObjectCtor, Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Promise(_)) => true,
        (Builtin::DateCtor, Value::Object(obj)) => matches!(obj.class(), ObjectClass::Date(_)),
        (Builtin::PromiseCtor, Value::Promise(_)) => true,
        _ => false,
    })
}

/// Unary operators other than `typeof` on identifiers and `delete`, which
/// the interpreter handles itself
pub fn unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!value.is_truthy()),
        UnaryOp::Neg => Value::Num(-value.to_number()),
        UnaryOp::Plus => Value::Num(value.to_number()),
        UnaryOp::BitNot => Value::Num(!to_int32(value.to_number()) as f64),
        UnaryOp::Typeof => Value::from(value.type_of()),
        UnaryOp::Void | UnaryOp::Delete => Value::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Num(n)
    }

    #[test]
    fn test_add_concatenates_strings() {
        assert_eq!(add(&Value::from("a"), &num(1.0)).unwrap().as_str(), Some("a1"));
        assert_eq!(add(&num(1.0), &num(2.0)).unwrap().as_f64(), Some(3.0));
        let arr = Value::array(vec![num(1.0), num(2.0)]);
        assert_eq!(add(&arr, &Value::from("")).unwrap().as_str(), Some("1,2"));
    }

    #[test]
    fn test_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!strict_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&num(1.0), &Value::from("1")));
        assert!(loose_equals(&Value::Bool(true), &num(1.0)));
        assert!(!strict_equals(&num(f64::NAN), &num(f64::NAN)));
        let obj = Value::object(Vec::<(String, Value)>::new());
        assert!(strict_equals(&obj, &obj.clone()));
        assert!(!strict_equals(&obj, &Value::object(Vec::<(String, Value)>::new())));
    }

    #[test]
    fn test_comparisons() {
        assert!(binary(BinaryOp::Lt, &Value::from("a"), &Value::from("b")).unwrap().is_truthy());
        assert!(!binary(BinaryOp::Ge, &num(f64::NAN), &num(1.0)).unwrap().is_truthy());
        assert!(binary(BinaryOp::Le, &num(2.0), &Value::from("2")).unwrap().is_truthy());
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(binary(BinaryOp::UShr, &num(-1.0), &num(0.0)).unwrap().as_f64(), Some(4_294_967_295.0));
        assert_eq!(binary(BinaryOp::Shl, &num(1.0), &num(3.0)).unwrap().as_f64(), Some(8.0));
    }

    #[test]
    fn test_modulo() {
        assert_eq!(binary(BinaryOp::Mod, &num(-7.0), &num(3.0)).unwrap().as_f64(), Some(-1.0));
        assert!(binary(BinaryOp::Mod, &num(1.0), &num(0.0)).unwrap().as_f64().unwrap().is_nan());
    }
}
