//! Promise statics and `then`/`catch`/`finally`
//!
//! Promises settle eagerly: chaining a handler drives the promise to
//! completion first, then runs the handler. Host failures are never handed
//! to a rejection handler; they end the run.

use crate::compiler::ast::Span;
use crate::runtime::control::{EvalResult, Thrown, Unwind};
use crate::runtime::scope::Env;
use crate::runtime::stdlib::{arg, Builtin};
use crate::runtime::value::{PromiseCell, Value};
use crate::runtime::vm::VM;

/// `Promise.resolve(v)`; an existing promise is returned unchanged
pub fn resolve(args: &[Value]) -> Value {
    match arg(args, 0) {
        p @ Value::Promise(_) => p,
        other => Value::Promise(PromiseCell::fulfilled(other)),
    }
}

pub fn reject(args: &[Value]) -> Value {
    Value::Promise(PromiseCell::rejected(Thrown::new(arg(args, 0), Vec::new())))
}

/// Script throws become rejected promises, everything else keeps unwinding
fn into_promise(result: EvalResult) -> EvalResult {
    match result {
        Ok(p @ Value::Promise(_)) => Ok(p),
        Ok(value) => Ok(Value::Promise(PromiseCell::fulfilled(value))),
        Err(Unwind::Throw(thrown)) if !thrown.from_host => Ok(Value::Promise(PromiseCell::rejected(thrown))),
        Err(other) => Err(other),
    }
}

impl VM {
    /// `Promise.all`: awaits each entry in order
    pub(crate) async fn promise_all(&mut self, args: Vec<Value>, site: Span, env: &Env) -> EvalResult {
        let items = match arg(&args, 0) {
            Value::Array(arr) => arr.items(),
            other => {
                return Err(self.type_error(format!("{} is not iterable", other.to_display()), site));
            }
        };
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match self.await_value(item, site, env).await {
                Ok(value) => results.push(value),
                Err(unwind) => return into_promise(Err(unwind)),
            }
        }
        Ok(Value::Promise(PromiseCell::fulfilled(Value::array(results))))
    }

    pub(crate) async fn promise_chain(
        &mut self,
        func: Builtin,
        this: Value,
        args: Vec<Value>,
        site: Span,
        env: &Env,
    ) -> EvalResult {
        if !matches!(this, Value::Promise(_)) {
            return Err(self.type_error(format!("{} called on a non-promise", func.name()), site));
        }
        let outcome = self.await_value(this, site, env).await;
        let outcome = match outcome {
            Err(Unwind::Throw(thrown)) if !thrown.from_host => Err(thrown),
            Err(other) => return Err(other),
            Ok(value) => Ok(value),
        };

        let (on_fulfilled, on_rejected) = match func {
            Builtin::PromiseThen => (arg(&args, 0), arg(&args, 1)),
            Builtin::PromiseCatch => (Value::Undefined, arg(&args, 0)),
            _ => {
                let handler = arg(&args, 0);
                if matches!(handler, Value::Function(_)) {
                    let result = self.call_function(handler, Vec::new(), site, env).await;
                    let result = match result {
                        Ok(value) => self.await_value(value, site, env).await,
                        err => err,
                    };
                    if let Err(unwind) = result {
                        return into_promise(Err(unwind));
                    }
                }
                return Ok(Value::Promise(match outcome {
                    Ok(value) => PromiseCell::fulfilled(value),
                    Err(thrown) => PromiseCell::rejected(thrown),
                }));
            }
        };

        let (handler, input) = match outcome {
            Ok(value) => (on_fulfilled, Ok(value)),
            Err(thrown) => (on_rejected, Err(thrown)),
        };
        if !matches!(handler, Value::Function(_)) {
            return Ok(Value::Promise(match input {
                Ok(value) => PromiseCell::fulfilled(value),
                Err(thrown) => PromiseCell::rejected(thrown),
            }));
        }
        let handler_arg = match input {
            Ok(value) => value,
            Err(thrown) => thrown.value,
        };
        let result = match self.call_function(handler, vec![handler_arg], site, env).await {
            Ok(value) => self.await_value(value, site, env).await,
            err => err,
        };
        into_promise(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::PromiseState;

    #[test]
    fn test_resolve_wraps_plain_values() {
        let p = resolve(&[Value::from(1)]);
        let Value::Promise(cell) = p else { panic!("expected a promise") };
        assert!(matches!(&*cell.state(), PromiseState::Fulfilled(Value::Num(n)) if *n == 1.0));
    }

    #[test]
    fn test_resolve_keeps_promise_identity() {
        let p = reject(&[Value::from("nope")]);
        assert!(resolve(&[p.clone()]).same_ref(&p));
    }
}
