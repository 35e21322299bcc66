//! Global functions and the simpler constructors

use crate::runtime::control::{check_array_length, make_error, ErrorKind, RtResult, RuntimeError};
use crate::runtime::stdlib::arg;
use crate::runtime::value::{format_number, ObjectRef, Value};

/// `Object(value)` and `new Object()`
pub fn object_ctor(args: &[Value]) -> Value {
    match arg(args, 0) {
        v @ (Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Promise(_)) => v,
        _ => Value::Object(ObjectRef::new()),
    }
}

/// `Array(n)` makes `n` empty slots, anything else lists the arguments
pub fn array_ctor(args: &[Value]) -> RtResult<Value> {
    match args {
        [Value::Num(n)] => {
            if *n < 0.0 || n.fract() != 0.0 || *n > u32::MAX as f64 {
                return Err(RuntimeError::range_error("Invalid array length"));
            }
            check_array_length(*n)?;
            Ok(Value::array(vec![Value::Undefined; *n as usize]))
        }
        _ => Ok(Value::array(args.iter().cloned())),
    }
}

pub fn error_ctor(kind: ErrorKind, args: &[Value]) -> Value {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => other.to_display(),
    };
    let error = make_error(kind, &message);
    if let (Some(obj), Some(options)) = (error.as_object(), arg(args, 1).as_object()) {
        if let Some(cause) = options.get_data("cause") {
            obj.define("cause", crate::runtime::value::Property::hidden(cause));
        }
    }
    error
}

pub fn parse_int(args: &[Value]) -> Value {
    let text = arg(args, 0).to_display();
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let mut radix = match arg(args, 1) {
        Value::Undefined => 0,
        other => {
            let r = other.to_number();
            if r.is_nan() {
                0
            } else {
                r as u32
            }
        }
    };
    if radix != 0 && !(2..=36).contains(&radix) {
        return Value::Num(f64::NAN);
    }
    if (radix == 0 || radix == 16) && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Value::Num(f64::NAN);
    }
    let n = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    Value::Num(if negative { -n } else { n })
}

/// Longest prefix that reads as a decimal number
pub fn parse_float(args: &[Value]) -> Value {
    let text = arg(args, 0).to_display();
    let s = text.trim_start();
    for prefix in ["Infinity", "+Infinity", "-Infinity"] {
        if s.starts_with(prefix) {
            return Value::Num(if prefix.starts_with('-') {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            });
        }
    }
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let ok = match c {
            b'0'..=b'9' => true,
            b'+' | b'-' => i == 0 || matches!(bytes[i - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        i += 1;
        if s[..i].parse::<f64>().is_ok() {
            end = i;
        }
    }
    Value::Num(s[..end].parse::<f64>().unwrap_or(f64::NAN))
}

pub fn to_fixed(this: &Value, args: &[Value]) -> RtResult<Value> {
    let digits = arg(args, 0).to_number();
    let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
    if !(0.0..=100.0).contains(&digits) {
        return Err(RuntimeError::range_error("toFixed() digits argument must be between 0 and 100"));
    }
    let n = this.to_number();
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::Str(format_number(n)));
    }
    Ok(Value::Str(format!("{:.*}", digits as usize, n)))
}

/// Integer part of `n` in `radix`, followed by up to 20 fraction digits
fn number_to_radix(n: f64, radix: u32) -> String {
    let negative = n < 0.0;
    let mut int = n.abs().trunc();
    let mut frac = n.abs() - int;
    let mut digits = Vec::new();
    if int == 0.0 {
        digits.push('0');
    }
    while int >= 1.0 {
        let d = (int % radix as f64) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('0'));
        int = (int / radix as f64).trunc();
    }
    digits.reverse();
    let mut out: String = digits.into_iter().collect();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= radix as f64;
            let d = frac.trunc() as u32;
            out.push(std::char::from_digit(d, radix).unwrap_or('0'));
            frac -= d as f64;
            if frac == 0.0 {
                break;
            }
        }
    }
    if negative {
        format!("-{}", out)
    } else {
        out
    }
}

pub fn to_string(this: &Value, args: &[Value]) -> RtResult<Value> {
    match (this, arg(args, 0)) {
        (Value::Num(n), Value::Num(radix)) if radix != 10.0 => {
            if !(2.0..=36.0).contains(&radix) {
                return Err(RuntimeError::range_error("toString() radix must be between 2 and 36"));
            }
            if !n.is_finite() {
                return Ok(Value::Str(format_number(*n)));
            }
            Ok(Value::Str(number_to_radix(*n, radix as u32)))
        }
        (other, _) => Ok(Value::Str(other.to_display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: Value) -> f64 {
        v.as_f64().unwrap()
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(num(parse_int(&[Value::from("42px")])), 42.0);
        assert_eq!(num(parse_int(&[Value::from("  -17")])), -17.0);
        assert_eq!(num(parse_int(&[Value::from("0x1f")])), 31.0);
        assert_eq!(num(parse_int(&[Value::from("101"), Value::from(2)])), 5.0);
        assert!(num(parse_int(&[Value::from("abc")])).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(num(parse_float(&[Value::from("3.14abc")])), 3.14);
        assert_eq!(num(parse_float(&[Value::from("1e3")])), 1000.0);
        assert_eq!(num(parse_float(&[Value::from("1e")])), 1.0);
        assert!(num(parse_float(&[Value::from(".")])).is_nan());
    }

    #[test]
    fn test_to_fixed() {
        let out = to_fixed(&Value::from(3.14159), &[Value::from(2)]).unwrap();
        assert_eq!(out.as_str(), Some("3.14"));
        assert!(to_fixed(&Value::from(1), &[Value::from(101)]).is_err());
    }

    #[test]
    fn test_to_string_radix() {
        assert_eq!(to_string(&Value::from(255), &[Value::from(16)]).unwrap().as_str(), Some("ff"));
        assert_eq!(to_string(&Value::from(-5), &[Value::from(2)]).unwrap().as_str(), Some("-101"));
        assert_eq!(to_string(&Value::from(true), &[]).unwrap().as_str(), Some("true"));
    }

    #[test]
    fn test_array_ctor() {
        assert_eq!(array_ctor(&[Value::from(3)]).unwrap().as_array().unwrap().len(), 3);
        assert!(array_ctor(&[Value::from(-1)]).is_err());
        assert_eq!(array_ctor(&[Value::from("a")]).unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_error_ctor_message() {
        let err = error_ctor(ErrorKind::TypeError, &[Value::from("bad")]);
        assert_eq!(err.to_display(), "TypeError: bad");
    }
}
