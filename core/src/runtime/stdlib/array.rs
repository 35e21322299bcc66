//! Array methods
//!
//! Methods that take a callback run on the VM so the callback can be a
//! script closure; the rest work directly on the array table.

use std::cmp::Ordering;

use crate::compiler::ast::Span;
use crate::runtime::control::{check_array_length, check_string_length, EvalResult, RtResult, RuntimeError, Unwind};
use crate::runtime::operators::strict_equals;
use crate::runtime::scope::Env;
use crate::runtime::stdlib::{arg, relative_index};
use crate::runtime::value::{ArrayRef, Value};
use crate::runtime::vm::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayMethod {
    Push,
    Pop,
    Shift,
    Unshift,
    Slice,
    Splice,
    Concat,
    Join,
    Reverse,
    IndexOf,
    LastIndexOf,
    Includes,
    At,
    Fill,
    Flat,
    // Callback methods
    Map,
    Filter,
    Reduce,
    ForEach,
    Find,
    FindIndex,
    Some,
    Every,
    Sort,
    FlatMap,
}

const METHODS: &[(&str, ArrayMethod)] = &[
    ("push", ArrayMethod::Push),
    ("pop", ArrayMethod::Pop),
    ("shift", ArrayMethod::Shift),
    ("unshift", ArrayMethod::Unshift),
    ("slice", ArrayMethod::Slice),
    ("splice", ArrayMethod::Splice),
    ("concat", ArrayMethod::Concat),
    ("join", ArrayMethod::Join),
    ("reverse", ArrayMethod::Reverse),
    ("indexOf", ArrayMethod::IndexOf),
    ("lastIndexOf", ArrayMethod::LastIndexOf),
    ("includes", ArrayMethod::Includes),
    ("at", ArrayMethod::At),
    ("fill", ArrayMethod::Fill),
    ("flat", ArrayMethod::Flat),
    ("map", ArrayMethod::Map),
    ("filter", ArrayMethod::Filter),
    ("reduce", ArrayMethod::Reduce),
    ("forEach", ArrayMethod::ForEach),
    ("find", ArrayMethod::Find),
    ("findIndex", ArrayMethod::FindIndex),
    ("some", ArrayMethod::Some),
    ("every", ArrayMethod::Every),
    ("sort", ArrayMethod::Sort),
    ("flatMap", ArrayMethod::FlatMap),
];

impl ArrayMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        METHODS.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
    }

    pub fn name(&self) -> &'static str {
        METHODS
            .iter()
            .find(|(_, m)| m == self)
            .map(|(n, _)| *n)
            .unwrap_or("")
    }

    pub fn takes_callback(&self) -> bool {
        matches!(
            self,
            ArrayMethod::Map
                | ArrayMethod::Filter
                | ArrayMethod::Reduce
                | ArrayMethod::ForEach
                | ArrayMethod::Find
                | ArrayMethod::FindIndex
                | ArrayMethod::Some
                | ArrayMethod::Every
                | ArrayMethod::Sort
                | ArrayMethod::FlatMap
        )
    }

    fn mutates(&self) -> bool {
        matches!(
            self,
            ArrayMethod::Push
                | ArrayMethod::Pop
                | ArrayMethod::Shift
                | ArrayMethod::Unshift
                | ArrayMethod::Splice
                | ArrayMethod::Reverse
                | ArrayMethod::Fill
                | ArrayMethod::Sort
        )
    }
}

fn receiver(method: ArrayMethod, this: &Value) -> RtResult<ArrayRef> {
    let arr = match this {
        Value::Array(arr) => arr.clone(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "Array.prototype.{} called on {}",
                method.name(),
                other.to_display()
            )))
        }
    };
    if method.mutates() && arr.is_frozen() {
        return Err(RuntimeError::type_error(format!(
            "Cannot {} on a frozen array",
            method.name()
        )));
    }
    Ok(arr)
}

/// SameValueZero, used by `includes`
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

fn flatten_into(items: Vec<Value>, depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => flatten_into(inner.items(), depth - 1.0, out),
            other => out.push(other),
        }
    }
}

/// `Array.from`: arrays, strings, and `{ length }` objects
pub fn from(args: &[Value]) -> RtResult<Value> {
    match arg(args, 0) {
        Value::Array(arr) => Ok(Value::array(arr.items())),
        Value::Str(s) => Ok(Value::array(s.chars().map(|c| Value::Str(c.to_string())))),
        Value::Object(obj) => {
            let len = obj.get_data("length").map(|v| v.to_number()).unwrap_or(0.0);
            let len = if len.is_finite() && len > 0.0 { len.trunc() } else { 0.0 };
            check_array_length(len)?;
            let len = len as usize;
            Ok(Value::array((0..len).map(|i| obj.get_data(&i.to_string()).unwrap_or_default())))
        }
        Value::Undefined | Value::Null => Err(RuntimeError::type_error("undefined is not iterable")),
        _ => Ok(Value::array(vec![])),
    }
}

pub fn call_sync(method: ArrayMethod, this: &Value, args: &[Value]) -> RtResult<Value> {
    let arr = receiver(method, this)?;
    let value = match method {
        ArrayMethod::Push => {
            let mut data = arr.lock();
            check_array_length((data.items.len() + args.len()) as f64)?;
            data.items.extend(args.iter().cloned());
            Value::from(data.items.len())
        }
        ArrayMethod::Pop => arr.lock().items.pop().unwrap_or_default(),
        ArrayMethod::Shift => {
            let mut data = arr.lock();
            if data.items.is_empty() {
                Value::Undefined
            } else {
                data.items.remove(0)
            }
        }
        ArrayMethod::Unshift => {
            let mut data = arr.lock();
            check_array_length((data.items.len() + args.len()) as f64)?;
            data.items.splice(0..0, args.iter().cloned());
            Value::from(data.items.len())
        }
        ArrayMethod::Slice => {
            let items = arr.items();
            let start = relative_index(&arg(args, 0), items.len(), 0);
            let end = relative_index(&arg(args, 1), items.len(), items.len());
            Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() })
        }
        ArrayMethod::Splice => {
            let mut data = arr.lock();
            let len = data.items.len();
            let start = relative_index(&arg(args, 0), len, 0);
            let count = match args.len() {
                0 => 0,
                1 => len - start,
                _ => {
                    let n = arg(args, 1).to_number();
                    if n.is_nan() {
                        0
                    } else {
                        n.clamp(0.0, (len - start) as f64) as usize
                    }
                }
            };
            let inserted: Vec<Value> = args.iter().skip(2).cloned().collect();
            let removed: Vec<Value> = data.items.splice(start..start + count, inserted).collect();
            Value::array(removed)
        }
        ArrayMethod::Concat => {
            let mut items = arr.items();
            for a in args {
                match a {
                    Value::Array(other) => items.extend(other.items()),
                    other => items.push(other.clone()),
                }
                check_array_length(items.len() as f64)?;
            }
            Value::array(items)
        }
        ArrayMethod::Join => {
            let sep = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display(),
            };
            let parts: Vec<String> = arr
                .items()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                .collect();
            let total: usize = parts.iter().map(String::len).sum::<usize>() + sep.len() * parts.len();
            check_string_length(total as f64)?;
            Value::Str(parts.join(&sep))
        }
        ArrayMethod::Reverse => {
            arr.lock().items.reverse();
            this.clone()
        }
        ArrayMethod::IndexOf => {
            let items = arr.items();
            let needle = arg(args, 0);
            let from = relative_index(&arg(args, 1), items.len(), 0);
            let found = items.iter().skip(from).position(|v| strict_equals(v, &needle));
            Value::Num(found.map(|i| (i + from) as f64).unwrap_or(-1.0))
        }
        ArrayMethod::LastIndexOf => {
            let needle = arg(args, 0);
            let found = arr.items().iter().rposition(|v| strict_equals(v, &needle));
            Value::Num(found.map(|i| i as f64).unwrap_or(-1.0))
        }
        ArrayMethod::Includes => {
            let needle = arg(args, 0);
            Value::Bool(arr.items().iter().any(|v| same_value_zero(v, &needle)))
        }
        ArrayMethod::At => {
            let len = arr.len() as f64;
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i.trunc() };
            let i = if i < 0.0 { len + i } else { i };
            if i < 0.0 || i >= len {
                Value::Undefined
            } else {
                arr.get(i as usize)
            }
        }
        ArrayMethod::Fill => {
            let mut data = arr.lock();
            let len = data.items.len();
            let start = relative_index(&arg(args, 1), len, 0);
            let end = relative_index(&arg(args, 2), len, len);
            let fill = arg(args, 0);
            for slot in data.items.iter_mut().take(end).skip(start) {
                *slot = fill.clone();
            }
            drop(data);
            this.clone()
        }
        ArrayMethod::Flat => {
            let depth = match arg(args, 0) {
                Value::Undefined => 1.0,
                other => other.to_number(),
            };
            let mut out = Vec::new();
            flatten_into(arr.items(), depth, &mut out);
            Value::array(out)
        }
        _ => {
            return Err(RuntimeError::type_error(format!(
                "{} requires a callback",
                method.name()
            )))
        }
    };
    Ok(value)
}

/// Default sort order: by string form, `undefined` last
fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => Ordering::Equal,
        (Value::Undefined, _) => Ordering::Greater,
        (_, Value::Undefined) => Ordering::Less,
        _ => a.to_display().cmp(&b.to_display()),
    }
}

impl VM {
    async fn call_back(&mut self, callback: &Value, args: Vec<Value>, site: Span, env: &Env) -> EvalResult {
        self.call_function(callback.clone(), args, site, env).await
    }

    /// Array methods that call back into the script
    pub(crate) async fn array_with_callback(
        &mut self,
        method: ArrayMethod,
        this: Value,
        args: Vec<Value>,
        site: Span,
        env: &Env,
    ) -> EvalResult {
        let arr = receiver(method, &this).map_err(|e| self.throw_error(e, site))?;
        let callback = arg(&args, 0);

        if method == ArrayMethod::Sort {
            return self.sort(arr, this, callback, site, env).await;
        }
        if !matches!(callback, Value::Function(_)) {
            return Err(self.type_error(format!("{} is not a function", callback.to_display()), site));
        }

        // Callbacks see the items present when the call started
        let items = arr.items();
        let call_args = |item: &Value, i: usize| vec![item.clone(), Value::from(i), this.clone()];

        match method {
            ArrayMethod::Map => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.call_back(&callback, call_args(item, i), site, env).await?);
                }
                Ok(Value::array(out))
            }
            ArrayMethod::FlatMap => {
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    match self.call_back(&callback, call_args(item, i), site, env).await? {
                        Value::Array(inner) => out.extend(inner.items()),
                        other => out.push(other),
                    }
                }
                Ok(Value::array(out))
            }
            ArrayMethod::Filter => {
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if self.call_back(&callback, call_args(item, i), site, env).await?.is_truthy() {
                        out.push(item.clone());
                    }
                }
                Ok(Value::array(out))
            }
            ArrayMethod::ForEach => {
                for (i, item) in items.iter().enumerate() {
                    self.call_back(&callback, call_args(item, i), site, env).await?;
                }
                Ok(Value::Undefined)
            }
            ArrayMethod::Reduce => {
                let mut iter = items.iter().enumerate();
                let mut acc = if args.len() >= 2 {
                    args[1].clone()
                } else {
                    match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(self.type_error("Reduce of empty array with no initial value", site));
                        }
                    }
                };
                for (i, item) in iter {
                    let call = vec![acc, item.clone(), Value::from(i), this.clone()];
                    acc = self.call_back(&callback, call, site, env).await?;
                }
                Ok(acc)
            }
            ArrayMethod::Find | ArrayMethod::FindIndex => {
                for (i, item) in items.iter().enumerate() {
                    if self.call_back(&callback, call_args(item, i), site, env).await?.is_truthy() {
                        return Ok(if method == ArrayMethod::Find {
                            item.clone()
                        } else {
                            Value::from(i)
                        });
                    }
                }
                Ok(if method == ArrayMethod::Find {
                    Value::Undefined
                } else {
                    Value::Num(-1.0)
                })
            }
            ArrayMethod::Some => {
                for (i, item) in items.iter().enumerate() {
                    if self.call_back(&callback, call_args(item, i), site, env).await?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            ArrayMethod::Every => {
                for (i, item) in items.iter().enumerate() {
                    if !self.call_back(&callback, call_args(item, i), site, env).await?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            _ => call_sync(method, &this, &args).map_err(|e| self.throw_error(e, site)),
        }
    }

    /// Stable merge sort; a script comparator is awaited between merges
    async fn sort(&mut self, arr: ArrayRef, this: Value, comparator: Value, site: Span, env: &Env) -> EvalResult {
        let mut items = arr.items();
        match &comparator {
            Value::Undefined => items.sort_by(default_order),
            Value::Function(_) => {
                let mut width = 1;
                while width < items.len() {
                    let mut merged = Vec::with_capacity(items.len());
                    for chunk in items.chunks(width * 2) {
                        let (left, right) = chunk.split_at(width.min(chunk.len()));
                        self.merge(left, right, &comparator, &mut merged, site, env).await?;
                    }
                    items = merged;
                    width *= 2;
                }
            }
            other => {
                return Err(self.type_error(
                    format!(
                        "The comparison function must be either a function or undefined: {}",
                        other.to_display()
                    ),
                    site,
                ));
            }
        }
        arr.lock().items = items;
        Ok(this)
    }

    async fn merge(
        &mut self,
        left: &[Value],
        right: &[Value],
        comparator: &Value,
        out: &mut Vec<Value>,
        site: Span,
        env: &Env,
    ) -> Result<(), Unwind> {
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            let order = self
                .call_back(comparator, vec![left[i].clone(), right[j].clone()], site, env)
                .await?
                .to_number();
            if order > 0.0 {
                out.push(right[j].clone());
                j += 1;
            } else {
                out.push(left[i].clone());
                i += 1;
            }
        }
        out.extend_from_slice(&left[i..]);
        out.extend_from_slice(&right[j..]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Value {
        Value::array(values.iter().map(|n| Value::Num(*n)))
    }

    fn as_nums(value: &Value) -> Vec<f64> {
        value.as_array().unwrap().items().iter().map(|v| v.to_number()).collect()
    }

    #[test]
    fn test_push_pop_mutate_in_place() {
        let arr = nums(&[1.0, 2.0]);
        let len = call_sync(ArrayMethod::Push, &arr, &[Value::from(3)]).unwrap();
        assert_eq!(len.as_f64(), Some(3.0));
        let last = call_sync(ArrayMethod::Pop, &arr, &[]).unwrap();
        assert_eq!(last.as_f64(), Some(3.0));
        assert_eq!(as_nums(&arr), vec![1.0, 2.0]);
    }

    #[test]
    fn test_splice_removes_and_inserts() {
        let arr = nums(&[1.0, 2.0, 3.0, 4.0]);
        let removed = call_sync(ArrayMethod::Splice, &arr, &[Value::from(1), Value::from(2), Value::from(9)]).unwrap();
        assert_eq!(as_nums(&removed), vec![2.0, 3.0]);
        assert_eq!(as_nums(&arr), vec![1.0, 9.0, 4.0]);
    }

    #[test]
    fn test_join_skips_nullish() {
        let arr = Value::array(vec![Value::from(1), Value::Null, Value::from("x")]);
        assert_eq!(call_sync(ArrayMethod::Join, &arr, &[Value::from("-")]).unwrap().as_str(), Some("1--x"));
    }

    #[test]
    fn test_includes_finds_nan() {
        let arr = nums(&[f64::NAN]);
        assert!(call_sync(ArrayMethod::Includes, &arr, &[Value::Num(f64::NAN)]).unwrap().is_truthy());
        assert_eq!(call_sync(ArrayMethod::IndexOf, &arr, &[Value::Num(f64::NAN)]).unwrap().as_f64(), Some(-1.0));
    }

    #[test]
    fn test_flat_depth() {
        let arr = Value::array(vec![Value::from(1), Value::array(vec![Value::from(2), nums(&[3.0])])]);
        let flat = call_sync(ArrayMethod::Flat, &arr, &[]).unwrap();
        assert_eq!(flat.as_array().unwrap().len(), 3);
        let deep = call_sync(ArrayMethod::Flat, &arr, &[Value::Num(f64::INFINITY)]).unwrap();
        assert_eq!(as_nums(&deep), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_frozen_array_rejects_push() {
        let arr = nums(&[1.0]);
        arr.as_array().unwrap().lock().frozen = true;
        assert!(call_sync(ArrayMethod::Push, &arr, &[Value::from(2)]).is_err());
        assert!(call_sync(ArrayMethod::Slice, &arr, &[]).is_ok());
    }

    #[test]
    fn test_default_order_sorts_as_strings() {
        let mut items = vec![Value::from(10), Value::Undefined, Value::from(9), Value::from(1)];
        items.sort_by(default_order);
        let shown: Vec<String> = items.iter().map(|v| v.to_display()).collect();
        assert_eq!(shown, vec!["1", "10", "9", "undefined"]);
    }

    #[test]
    fn test_from_string_and_length_object() {
        assert_eq!(from(&[Value::from("ab")]).unwrap().as_array().unwrap().len(), 2);
        let like = Value::object([("length", Value::from(2))]);
        assert_eq!(from(&[like]).unwrap().as_array().unwrap().len(), 2);
    }
}
