//! Expression evaluation

use crate::compiler::ast::{
    AssignOp, BinaryOp, Expr, LogicalOp, Prop, PropKey, Span, TagAttr, TagChild, TagLiteral, UnaryOp, UpdateOp,
};
use crate::runtime::control::{check_array_length, check_string_length, EvalResult, RuntimeError, Unwind};
use crate::runtime::object::{self, Lookup, SetOutcome};
use crate::runtime::operators;
use crate::runtime::scope::{BindingKind, Env, Scope};
use crate::runtime::stdlib::{self, intrinsics};
use crate::runtime::value::{BoxFuture, Callable, ObjectRef, Property, Value};
use crate::runtime::vm::{make_closure, VM};
use crate::trace::{Snapshot, Trace};

/// Assignable location, evaluated once for compound assignment
enum Reference {
    Name(String),
    Member(Value, String),
}

/// `None` when an optional chain short-circuited
type ChainResult = Result<Option<Value>, Unwind>;

impl VM {
    pub(crate) fn eval<'a>(&'a mut self, expr: &'a Expr, env: &'a Env) -> BoxFuture<'a, EvalResult> {
        Box::pin(async move {
            match expr {
                Expr::LitNum { v, .. } => Ok(Value::Num(*v)),
                Expr::LitStr { v, .. } => Ok(Value::Str(v.clone())),
                Expr::LitBool { v, .. } => Ok(Value::Bool(*v)),
                Expr::LitNull { .. } => Ok(Value::Null),
                Expr::Template { quasis, exprs, .. } => {
                    let mut out = String::new();
                    for (i, quasi) in quasis.iter().enumerate() {
                        out.push_str(quasi);
                        if let Some(sub) = exprs.get(i) {
                            out.push_str(&self.eval(sub, env).await?.to_display());
                        }
                    }
                    check_string_length(out.len() as f64).map_err(|e| self.throw_error(e, expr.span()))?;
                    Ok(Value::Str(out))
                }
                Expr::Ident { name, span } => self.resolve(name, *span, env),
                Expr::Array { items, .. } => Ok(Value::array(self.eval_list(items, env).await?)),
                Expr::Object { props, span } => self.eval_object(props, *span, env).await,
                Expr::Function { func, .. } => match (&func.name, func.is_arrow) {
                    (Some(name), false) => {
                        let named_env = Scope::child(env);
                        let closure = make_closure(func, &named_env);
                        named_env.declare(name, closure.clone(), BindingKind::Function);
                        Ok(closure)
                    }
                    _ => Ok(make_closure(func, env)),
                },
                Expr::Unary { op, arg, span } => self.eval_unary(*op, arg, *span, env).await,
                Expr::Update { op, prefix, arg, span } => {
                    let reference = self.reference(arg, env).await?;
                    let old = self.read_reference(&reference, *span, env).await?.to_number();
                    let new = match op {
                        UpdateOp::Inc => old + 1.0,
                        UpdateOp::Dec => old - 1.0,
                    };
                    self.write_reference(&reference, Value::Num(new), *span, env).await?;
                    Ok(Value::Num(if *prefix { new } else { old }))
                }
                Expr::Binary { op, left, right, span } => {
                    let left = self.eval(left, env).await?;
                    let right = self.eval(right, env).await?;
                    operators::binary(*op, &left, &right).map_err(|e| self.throw_error(e, *span))
                }
                Expr::Logical { op, left, right, .. } => {
                    let left = self.eval(left, env).await?;
                    let short_circuit = match op {
                        LogicalOp::And => !left.is_truthy(),
                        LogicalOp::Or => left.is_truthy(),
                        LogicalOp::Nullish => !left.is_nullish(),
                    };
                    if short_circuit {
                        Ok(left)
                    } else {
                        self.eval(right, env).await
                    }
                }
                Expr::Conditional {
                    test,
                    consequent,
                    alternate,
                    ..
                } => {
                    if self.eval(test, env).await?.is_truthy() {
                        self.eval(consequent, env).await
                    } else {
                        self.eval(alternate, env).await
                    }
                }
                Expr::Assign {
                    op,
                    target,
                    value,
                    span,
                } => self.eval_assign(*op, target, value, *span, env).await,
                Expr::Sequence { exprs, .. } => {
                    let mut last = Value::Undefined;
                    for e in exprs {
                        last = self.eval(e, env).await?;
                    }
                    Ok(last)
                }
                Expr::Member { .. } | Expr::Call { .. } => Ok(self.eval_chain(expr, env).await?.unwrap_or_default()),
                Expr::New { callee, args, span } => {
                    let ctor = self.eval(callee, env).await?;
                    let args = self.eval_list(args, env).await?;
                    self.construct(ctor, args, &callee.describe(), *span, env).await
                }
                Expr::Spread { span, .. } => Err(self.throw_error(
                    RuntimeError::syntax_error("Unexpected spread"),
                    *span,
                )),
                Expr::Await { arg, span } => {
                    let value = self.eval(arg, env).await?;
                    self.await_value(value, *span, env).await
                }
                Expr::Yield { arg, span } => {
                    let payload = self.eval(arg, env).await?;
                    self.yield_value(payload, *span, env).await
                }
                Expr::Tag { tag, .. } => self.eval_tag(tag, env).await,
            }
        })
    }

    /// Evaluate expressions, expanding spreads
    pub(crate) async fn eval_list(&mut self, items: &[Expr], env: &Env) -> Result<Vec<Value>, Unwind> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Expr::Spread { arg, span } => {
                    let value = self.eval(arg, env).await?;
                    match value {
                        Value::Array(arr) => out.extend(arr.items()),
                        Value::Str(s) => out.extend(s.chars().map(|c| Value::Str(c.to_string()))),
                        other => {
                            return Err(self.type_error(format!("{} is not iterable", other.to_display()), *span))
                        }
                    }
                    check_array_length(out.len() as f64).map_err(|e| self.throw_error(e, *span))?;
                }
                other => out.push(self.eval(other, env).await?),
            }
        }
        Ok(out)
    }

    async fn prop_key(&mut self, key: &PropKey, env: &Env) -> Result<String, Unwind> {
        match key {
            PropKey::Static { name } => Ok(name.clone()),
            PropKey::Computed { expr } => Ok(self.eval(expr, env).await?.to_key()),
        }
    }

    /* ===================== Members & Calls ===================== */

    fn eval_chain<'a>(&'a mut self, expr: &'a Expr, env: &'a Env) -> BoxFuture<'a, ChainResult> {
        Box::pin(async move {
            match expr {
                Expr::Member {
                    object,
                    property,
                    optional,
                    span,
                } => {
                    let Some(target) = self.eval_chain(object, env).await? else {
                        return Ok(None);
                    };
                    if *optional && target.is_nullish() {
                        return Ok(None);
                    }
                    let key = self.prop_key(property, env).await?;
                    Ok(Some(self.get_member(&target, &key, *span, env).await?))
                }
                Expr::Call {
                    callee,
                    args,
                    optional,
                    span,
                } => {
                    let Some(func) = self.eval_chain(callee, env).await? else {
                        return Ok(None);
                    };
                    if *optional && func.is_nullish() {
                        return Ok(None);
                    }
                    let args = self.eval_list(args, env).await?;
                    if !matches!(func, Value::Function(_)) {
                        return Err(self.type_error(format!("{} is not a function", callee.describe()), *span));
                    }
                    Ok(Some(self.call_function(func, args, *span, env).await?))
                }
                other => Ok(Some(self.eval(other, env).await?)),
            }
        })
    }

    /// Property read, running a getter if the property has one
    pub(crate) async fn get_member(&mut self, target: &Value, key: &str, span: Span, env: &Env) -> EvalResult {
        match object::get_property(target, key) {
            Ok(Lookup::Value(value)) => Ok(value),
            Ok(Lookup::Getter(getter)) => self.call_function(getter, Vec::new(), span, env).await,
            Err(err) => Err(self.throw_error(err, span)),
        }
    }

    /// Property write, running a setter if the property has one
    pub(crate) async fn set_member(
        &mut self,
        target: &Value,
        key: &str,
        value: Value,
        span: Span,
        env: &Env,
    ) -> Result<(), Unwind> {
        match object::set_property(target, key, value.clone()) {
            Ok(SetOutcome::Done) => Ok(()),
            Ok(SetOutcome::Setter(setter)) => {
                self.call_function(setter, vec![value], span, env).await?;
                Ok(())
            }
            Err(err) => Err(self.throw_error(err, span)),
        }
    }

    /* ===================== Assignment ===================== */

    async fn reference(&mut self, target: &Expr, env: &Env) -> Result<Reference, Unwind> {
        match target {
            Expr::Ident { name, .. } => Ok(Reference::Name(name.clone())),
            Expr::Member { object, property, .. } => {
                let object = self.eval(object, env).await?;
                let key = self.prop_key(property, env).await?;
                Ok(Reference::Member(object, key))
            }
            other => Err(self.throw_error(
                RuntimeError::syntax_error("Invalid left-hand side in assignment"),
                other.span(),
            )),
        }
    }

    async fn read_reference(&mut self, reference: &Reference, span: Span, env: &Env) -> EvalResult {
        match reference {
            Reference::Name(name) => self.resolve(name, span, env),
            Reference::Member(object, key) => self.get_member(object, key, span, env).await,
        }
    }

    async fn write_reference(&mut self, reference: &Reference, value: Value, span: Span, env: &Env) -> Result<(), Unwind> {
        match reference {
            Reference::Name(name) => self.assign_name(name, value, span, env),
            Reference::Member(object, key) => self.set_member(object, key, value, span, env).await,
        }
    }

    async fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, span: Span, env: &Env) -> EvalResult {
        let reference = self.reference(target, env).await?;
        let result = match op {
            AssignOp::Assign => self.eval(value, env).await?,
            AssignOp::And | AssignOp::Or | AssignOp::Nullish => {
                let current = self.read_reference(&reference, span, env).await?;
                let keep = match op {
                    AssignOp::And => !current.is_truthy(),
                    AssignOp::Or => current.is_truthy(),
                    _ => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.eval(value, env).await?
            }
            arithmetic => {
                let current = self.read_reference(&reference, span, env).await?;
                let rhs = self.eval(value, env).await?;
                let bin = match arithmetic {
                    AssignOp::Add => BinaryOp::Add,
                    AssignOp::Sub => BinaryOp::Sub,
                    AssignOp::Mul => BinaryOp::Mul,
                    AssignOp::Div => BinaryOp::Div,
                    AssignOp::Mod => BinaryOp::Mod,
                    _ => BinaryOp::Pow,
                };
                operators::binary(bin, &current, &rhs).map_err(|e| self.throw_error(e, span))?
            }
        };
        self.write_reference(&reference, result.clone(), span, env).await?;
        Ok(result)
    }

    /* ===================== Operators ===================== */

    async fn eval_unary(&mut self, op: UnaryOp, arg: &Expr, span: Span, env: &Env) -> EvalResult {
        match (op, arg) {
            // `typeof undeclared` does not throw
            (UnaryOp::Typeof, Expr::Ident { name, .. }) => Ok(Value::from(
                self.lookup_name(name, env).map(|v| v.type_of()).unwrap_or("undefined"),
            )),
            (UnaryOp::Delete, Expr::Member { object, property, .. }) => {
                let target = self.eval(object, env).await?;
                let key = self.prop_key(property, env).await?;
                object::delete_property(&target, &key)
                    .map(Value::Bool)
                    .map_err(|e| self.throw_error(e, span))
            }
            (UnaryOp::Delete, _) => Ok(Value::Bool(true)),
            _ => {
                let value = self.eval(arg, env).await?;
                Ok(operators::unary(op, &value))
            }
        }
    }

    /* ===================== Literals ===================== */

    async fn eval_object(&mut self, props: &[Prop], span: Span, env: &Env) -> EvalResult {
        let obj = ObjectRef::new();
        for prop in props {
            match prop {
                Prop::KeyValue { key, value } => {
                    let key = self.prop_key(key, env).await?;
                    let value = self.eval(value, env).await?;
                    obj.insert(key, value);
                }
                Prop::Shorthand { name, span } => {
                    let value = self.resolve(name, *span, env)?;
                    obj.insert(name.clone(), value);
                }
                Prop::Spread { expr } => {
                    let source = self.eval(expr, env).await?;
                    for key in object::own_keys(&source) {
                        let value = self.get_member(&source, &key, span, env).await?;
                        obj.insert(key, value);
                    }
                }
                Prop::Method { key, func } => {
                    let key = self.prop_key(key, env).await?;
                    obj.insert(key, make_closure(func, env));
                }
                Prop::Getter { key, func } | Prop::Setter { key, func } => {
                    let key = self.prop_key(key, env).await?;
                    let accessor = make_closure(func, env);
                    let is_getter = matches!(prop, Prop::Getter { .. });
                    let existing = obj.lock().get(&key).cloned();
                    let (mut get, mut set) = match existing {
                        Some(Property::Accessor { get, set, .. }) => (get, set),
                        _ => (None, None),
                    };
                    if is_getter {
                        get = Some(accessor);
                    } else {
                        set = Some(accessor);
                    }
                    obj.define(
                        key,
                        Property::Accessor {
                            get,
                            set,
                            enumerable: true,
                            configurable: true,
                        },
                    );
                }
            }
        }
        Ok(Value::Object(obj))
    }

    /// Tag literal evaluated without lowering
    async fn eval_tag(&mut self, tag: &TagLiteral, env: &Env) -> EvalResult {
        let props = ObjectRef::new();
        for attr in &tag.attrs {
            match attr {
                TagAttr::Named { name, value } => {
                    let value = match value {
                        Some(expr) => self.eval_tag_value(expr, env).await?,
                        None => Value::Bool(true),
                    };
                    props.insert(name.clone(), value);
                }
                TagAttr::Spread { expr } => {
                    let source = self.eval(expr, env).await?;
                    for key in object::own_keys(&source) {
                        let value = self.get_member(&source, &key, expr.span(), env).await?;
                        props.insert(key, value);
                    }
                }
            }
        }
        let mut children = Vec::new();
        for child in &tag.children {
            match child {
                TagChild::Text { text } => children.push(Value::Str(text.clone())),
                TagChild::Expr { expr } => children.push(self.eval_tag_value(expr, env).await?),
            }
        }
        Ok(intrinsics::make_tag(&tag.type_name(), Value::Object(props), children))
    }

    /// An identifier that is `undefined` renders as its own name
    async fn eval_tag_value(&mut self, expr: &Expr, env: &Env) -> EvalResult {
        if let Expr::Ident { name, .. } = expr {
            return Ok(match self.lookup_name(name, env) {
                None | Some(Value::Undefined) => Value::Str(name.clone()),
                Some(value) => value,
            });
        }
        self.eval(expr, env).await
    }

    /* ===================== new ===================== */

    async fn construct(&mut self, ctor: Value, args: Vec<Value>, describe: &str, span: Span, env: &Env) -> EvalResult {
        let builtin = match &ctor {
            Value::Function(func) => match &**func {
                Callable::Builtin(b) => Some(b.func),
                _ => None,
            },
            _ => None,
        };
        match builtin {
            Some(func) if stdlib::is_constructor(func) => self.call_builtin(func, Value::Undefined, args, span, env).await,
            _ => Err(self.type_error(format!("{} is not a constructor", describe), span)),
        }
    }

    /* ===================== yield ===================== */

    /// Hand a tag payload to the context function named by its type
    async fn yield_value(&mut self, payload: Value, span: Span, env: &Env) -> EvalResult {
        let component = match &payload {
            Value::Object(obj) if obj.get_data("__jsx").map(|v| v.is_truthy()).unwrap_or(false) => {
                obj.get_data("type").map(|t| t.to_display()).unwrap_or_default()
            }
            _ => return Err(self.type_error("yield expects a tag literal", span)),
        };
        let handler = self.find_handler(&component).ok_or_else(|| {
            self.throw_error(
                RuntimeError::reference_error(format!("No function bound for <{}>", component)),
                span,
            )
        })?;
        self.hooks.trace.push(Trace::Yield {
            component,
            payload: Snapshot::from(&payload),
        });
        let result = self.call_untraced(handler, vec![payload], span, env).await?;
        self.await_value(result, span, env).await
    }

    /// Context entry matching the full type, then the part before `:`
    fn find_handler(&self, component: &str) -> Option<Value> {
        let names = self.context.names();
        let base = component.split(':').next().unwrap_or(component);
        [component, base].into_iter().find_map(|wanted| {
            names
                .iter()
                .find(|n| n.to_uppercase() == wanted)
                .and_then(|n| self.context.get(n))
                .filter(|v| matches!(v, Value::Function(_)))
        })
    }
}
