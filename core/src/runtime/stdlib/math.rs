//! Math functions

use crate::runtime::stdlib::arg;
use crate::runtime::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Floor,
    Ceil,
    Round,
    Abs,
    Min,
    Max,
    Pow,
    Sqrt,
    Random,
    Trunc,
    Sign,
    Log,
}

impl MathFn {
    pub const ALL: [MathFn; 12] = [
        MathFn::Floor,
        MathFn::Ceil,
        MathFn::Round,
        MathFn::Abs,
        MathFn::Min,
        MathFn::Max,
        MathFn::Pow,
        MathFn::Sqrt,
        MathFn::Random,
        MathFn::Trunc,
        MathFn::Sign,
        MathFn::Log,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Round => "round",
            MathFn::Abs => "abs",
            MathFn::Min => "min",
            MathFn::Max => "max",
            MathFn::Pow => "pow",
            MathFn::Sqrt => "sqrt",
            MathFn::Random => "random",
            MathFn::Trunc => "trunc",
            MathFn::Sign => "sign",
            MathFn::Log => "log",
        }
    }
}

fn num(args: &[Value], i: usize) -> f64 {
    arg(args, i).to_number()
}

/// Uniform in [0, 1), drawn from the low random bits of a v4 UUID
fn random() -> f64 {
    let bits = uuid::Uuid::new_v4().as_u128() & ((1u128 << 53) - 1);
    bits as f64 / (1u64 << 53) as f64
}

pub fn call(func: MathFn, args: &[Value]) -> Value {
    let result = match func {
        MathFn::Floor => num(args, 0).floor(),
        MathFn::Ceil => num(args, 0).ceil(),
        // Halves round towards +Infinity
        MathFn::Round => (num(args, 0) + 0.5).floor(),
        MathFn::Abs => num(args, 0).abs(),
        MathFn::Min => args
            .iter()
            .map(|v| v.to_number())
            .fold(f64::INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) }),
        MathFn::Max => args
            .iter()
            .map(|v| v.to_number())
            .fold(f64::NEG_INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) }),
        MathFn::Pow => num(args, 0).powf(num(args, 1)),
        MathFn::Sqrt => num(args, 0).sqrt(),
        MathFn::Random => random(),
        MathFn::Trunc => num(args, 0).trunc(),
        MathFn::Sign => {
            let n = num(args, 0);
            if n.is_nan() || n == 0.0 {
                n
            } else {
                n.signum()
            }
        }
        MathFn::Log => num(args, 0).ln(),
    };
    Value::Num(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_n(func: MathFn, args: &[f64]) -> f64 {
        let args: Vec<Value> = args.iter().map(|n| Value::Num(*n)).collect();
        call(func, &args).as_f64().unwrap()
    }

    #[test]
    fn test_floor() {
        assert_eq!(call_n(MathFn::Floor, &[3.7]), 3.0);
        assert_eq!(call_n(MathFn::Floor, &[-3.2]), -4.0);
    }

    #[test]
    fn test_round_halves_up() {
        assert_eq!(call_n(MathFn::Round, &[2.5]), 3.0);
        assert_eq!(call_n(MathFn::Round, &[-2.5]), -2.0);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(call_n(MathFn::Max, &[1.0, 5.0, 3.0]), 5.0);
        assert_eq!(call_n(MathFn::Min, &[]), f64::INFINITY);
        assert!(call_n(MathFn::Max, &[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn test_random_range() {
        for _ in 0..100 {
            let r = call_n(MathFn::Random, &[]);
            assert!((0.0..1.0).contains(&r));
        }
    }
}
