//! Semantic validation for parsed scripts
//!
//! Rejects code the grammar accepts but that must never reach execution:
//! duplicate lexical declarations, misplaced `break`/`continue`/`await`/`yield`,
//! and user code touching the instrumentation intrinsics.

use std::collections::HashSet;

use super::ast::*;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A lexical binding collides with another binding of the same scope
    DuplicateDeclaration { name: String, span: Span },
    /// Identifier reserved for instrumentation
    ReservedIdentifier { name: String, span: Span },
    IllegalBreak { span: Span },
    IllegalContinue { span: Span },
    MissingInitializer { span: Span },
    MissingCatchOrFinally { span: Span },
    AwaitOutsideAsync { span: Span },
    YieldOutsideScript { span: Span },
}

impl ValidationError {
    pub fn span(&self) -> Span {
        match self {
            ValidationError::DuplicateDeclaration { span, .. }
            | ValidationError::ReservedIdentifier { span, .. }
            | ValidationError::IllegalBreak { span }
            | ValidationError::IllegalContinue { span }
            | ValidationError::MissingInitializer { span }
            | ValidationError::MissingCatchOrFinally { span }
            | ValidationError::AwaitOutsideAsync { span }
            | ValidationError::YieldOutsideScript { span } => *span,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::DuplicateDeclaration { name, .. } => {
                write!(f, "Identifier '{}' has already been declared", name)
            }
            ValidationError::ReservedIdentifier { name, .. } => {
                write!(f, "'{}' is a reserved identifier", name)
            }
            ValidationError::IllegalBreak { .. } => write!(f, "Illegal break statement"),
            ValidationError::IllegalContinue { .. } => {
                write!(f, "Illegal continue statement: no surrounding iteration statement")
            }
            ValidationError::MissingInitializer { .. } => {
                write!(f, "Missing initializer in const declaration")
            }
            ValidationError::MissingCatchOrFinally { .. } => {
                write!(f, "Missing catch or finally after try")
            }
            ValidationError::AwaitOutsideAsync { .. } => write!(
                f,
                "await is only valid in async functions and the top level bodies of scripts"
            ),
            ValidationError::YieldOutsideScript { .. } => {
                write!(f, "yield is only valid at the top level of a script")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, ValidationError>;

/* ===================== Public API ===================== */

/// Names the instrumented text calls into; user code may not bind or read them
pub const RESERVED_IDENTIFIERS: &[&str] = &["__track", "__comment", "__log", "__tag"];

/// Validate a parsed script
pub fn validate_program(program: &Program) -> ValidationResult<()> {
    let mut validator = Validator::default();
    validator.scopes.push(ScopeInfo::function());
    validator.functions.push(FunctionCtx {
        is_async: true,
        is_script: true,
        loops: 0,
        breakables: 0,
    });
    validator.hoist_functions(&program.body, true)?;
    validator.statements(&program.body)
}

/* ===================== Walker ===================== */

#[derive(Default)]
struct ScopeInfo {
    lexical: HashSet<String>,
    vars: HashSet<String>,
    is_function: bool,
}

impl ScopeInfo {
    fn function() -> Self {
        Self {
            is_function: true,
            ..Default::default()
        }
    }
}

struct FunctionCtx {
    is_async: bool,
    is_script: bool,
    loops: usize,
    /// loops plus enclosing switch statements
    breakables: usize,
}

#[derive(Default)]
struct Validator {
    scopes: Vec<ScopeInfo>,
    functions: Vec<FunctionCtx>,
}

fn check_reserved(name: &str, span: Span) -> ValidationResult<()> {
    if RESERVED_IDENTIFIERS.contains(&name) {
        return Err(ValidationError::ReservedIdentifier {
            name: name.to_string(),
            span,
        });
    }
    Ok(())
}

impl Validator {
    fn current_fn(&mut self) -> &mut FunctionCtx {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    fn declare_lexical(&mut self, name: &str, span: Span) -> ValidationResult<()> {
        check_reserved(name, span)?;
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if scope.lexical.contains(name) || scope.vars.contains(name) {
            return Err(ValidationError::DuplicateDeclaration {
                name: name.to_string(),
                span,
            });
        }
        scope.lexical.insert(name.to_string());
        Ok(())
    }

    fn declare_var(&mut self, name: &str, span: Span) -> ValidationResult<()> {
        check_reserved(name, span)?;
        for scope in self.scopes.iter_mut().rev() {
            if scope.lexical.contains(name) {
                return Err(ValidationError::DuplicateDeclaration {
                    name: name.to_string(),
                    span,
                });
            }
            scope.vars.insert(name.to_string());
            if scope.is_function {
                break;
            }
        }
        Ok(())
    }

    fn declare_pattern(&mut self, kind: DeclKind, pattern: &Pattern) -> ValidationResult<()> {
        let span = pattern.span();
        for name in pattern.bound_names() {
            match kind {
                DeclKind::Var => self.declare_var(&name, span)?,
                DeclKind::Let | DeclKind::Const => self.declare_lexical(&name, span)?,
            }
        }
        self.pattern_defaults(pattern)
    }

    fn pattern_defaults(&mut self, pattern: &Pattern) -> ValidationResult<()> {
        match pattern {
            Pattern::Ident { .. } => Ok(()),
            Pattern::Object { props, rest, .. } => {
                for prop in props {
                    if let Some(default) = &prop.default {
                        self.expr(default)?;
                    }
                    self.pattern_defaults(&prop.value)?;
                }
                rest.as_deref().map_or(Ok(()), |rest| self.pattern_defaults(rest))
            }
            Pattern::Array { elems, rest, .. } => {
                for elem in elems {
                    if let Some(default) = &elem.default {
                        self.expr(default)?;
                    }
                    self.pattern_defaults(&elem.target)?;
                }
                rest.as_deref().map_or(Ok(()), |rest| self.pattern_defaults(rest))
            }
        }
    }

    /// Function declarations are visible before their statement runs
    fn hoist_functions(&mut self, body: &[Stmt], function_level: bool) -> ValidationResult<()> {
        for stmt in body {
            if let Stmt::Function { func, span } = stmt {
                if let Some(name) = &func.name {
                    if function_level {
                        self.declare_var(name, *span)?;
                    } else {
                        self.declare_lexical(name, *span)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn block(&mut self, body: &[Stmt]) -> ValidationResult<()> {
        self.scopes.push(ScopeInfo::default());
        let result = self
            .hoist_functions(body, false)
            .and_then(|_| self.statements(body));
        self.scopes.pop();
        result
    }

    fn statements(&mut self, body: &[Stmt]) -> ValidationResult<()> {
        for stmt in body {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn loop_body(&mut self, body: &Stmt) -> ValidationResult<()> {
        self.current_fn().loops += 1;
        self.current_fn().breakables += 1;
        let result = self.statement(body);
        self.current_fn().loops -= 1;
        self.current_fn().breakables -= 1;
        result
    }

    fn statement(&mut self, stmt: &Stmt) -> ValidationResult<()> {
        match stmt {
            Stmt::Block { body, .. } => self.block(body),
            Stmt::Decl { kind, decls, span } => {
                for decl in decls {
                    if *kind == DeclKind::Const && decl.init.is_none() {
                        return Err(ValidationError::MissingInitializer { span: *span });
                    }
                    if let Some(init) = &decl.init {
                        self.expr(init)?;
                    }
                    self.declare_pattern(*kind, &decl.target)?;
                }
                Ok(())
            }
            // declared during hoisting
            Stmt::Function { func, .. } => self.function(func),
            Stmt::If {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.expr(test)?;
                self.statement(consequent)?;
                if let Some(alt) = alternate {
                    self.statement(alt)?;
                }
                Ok(())
            }
            Stmt::While { test, body, .. } | Stmt::DoWhile { body, test, .. } => {
                self.expr(test)?;
                self.loop_body(body)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                self.scopes.push(ScopeInfo::default());
                let result = (|| -> ValidationResult<()> {
                    match init {
                        Some(ForInit::Decl { kind, decls }) => {
                            for decl in decls {
                                if let Some(init) = &decl.init {
                                    self.expr(init)?;
                                }
                                self.declare_pattern(*kind, &decl.target)?;
                            }
                        }
                        Some(ForInit::Expr { expr }) => self.expr(expr)?,
                        None => {}
                    }
                    if let Some(test) = test {
                        self.expr(test)?;
                    }
                    if let Some(update) = update {
                        self.expr(update)?;
                    }
                    self.loop_body(body)
                })();
                self.scopes.pop();
                result
            }
            Stmt::ForOf {
                kind,
                target,
                iterable: source,
                body,
                ..
            }
            | Stmt::ForIn {
                kind,
                target,
                object: source,
                body,
                ..
            } => {
                self.expr(source)?;
                self.scopes.push(ScopeInfo::default());
                let result = match kind {
                    Some(kind) => self.declare_pattern(*kind, target),
                    None => self.assignment_pattern(target),
                }
                .and_then(|_| self.loop_body(body));
                self.scopes.pop();
                result
            }
            Stmt::Switch {
                discriminant, cases, ..
            } => {
                self.expr(discriminant)?;
                self.current_fn().breakables += 1;
                self.scopes.push(ScopeInfo::default());
                let result = (|| -> ValidationResult<()> {
                    for case in cases {
                        self.hoist_functions(&case.body, false)?;
                    }
                    for case in cases {
                        if let Some(test) = &case.test {
                            self.expr(test)?;
                        }
                        self.statements(&case.body)?;
                    }
                    Ok(())
                })();
                self.scopes.pop();
                self.current_fn().breakables -= 1;
                result
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
                span,
            } => {
                if handler.is_none() && finalizer.is_none() {
                    return Err(ValidationError::MissingCatchOrFinally { span: *span });
                }
                self.block(block)?;
                if let Some(handler) = handler {
                    self.scopes.push(ScopeInfo::default());
                    let result = match &handler.param {
                        Some(param) => self.declare_pattern(DeclKind::Let, param),
                        None => Ok(()),
                    }
                    .and_then(|_| self.hoist_functions(&handler.body, false))
                    .and_then(|_| self.statements(&handler.body));
                    self.scopes.pop();
                    result?;
                }
                if let Some(finalizer) = finalizer {
                    self.block(finalizer)?;
                }
                Ok(())
            }
            Stmt::Return { value, .. } => match value {
                Some(value) => self.expr(value),
                None => Ok(()),
            },
            Stmt::Break { span } => {
                if self.current_fn().breakables == 0 {
                    return Err(ValidationError::IllegalBreak { span: *span });
                }
                Ok(())
            }
            Stmt::Continue { span } => {
                if self.current_fn().loops == 0 {
                    return Err(ValidationError::IllegalContinue { span: *span });
                }
                Ok(())
            }
            Stmt::Throw { value, .. } => self.expr(value),
            Stmt::Expr { expr, .. } => self.expr(expr),
            Stmt::Comment { .. } | Stmt::Empty { .. } => Ok(()),
        }
    }

    /// `for (x of ...)` without a declaration assigns to existing names
    fn assignment_pattern(&mut self, pattern: &Pattern) -> ValidationResult<()> {
        for name in pattern.bound_names() {
            check_reserved(&name, pattern.span())?;
        }
        self.pattern_defaults(pattern)
    }

    fn function(&mut self, func: &FunctionDef) -> ValidationResult<()> {
        self.functions.push(FunctionCtx {
            is_async: func.is_async,
            is_script: false,
            loops: 0,
            breakables: 0,
        });
        self.scopes.push(ScopeInfo::function());
        let result = (|| -> ValidationResult<()> {
            for param in &func.params {
                if let Some(default) = &param.default {
                    self.expr(default)?;
                }
                self.declare_pattern(DeclKind::Var, &param.target)?;
            }
            match &func.body {
                FunctionBody::Block { body } => {
                    self.hoist_functions(body, true)?;
                    self.statements(body)
                }
                FunctionBody::Expr { expr } => self.expr(expr),
            }
        })();
        self.scopes.pop();
        self.functions.pop();
        result
    }

    fn prop_key(&mut self, key: &PropKey) -> ValidationResult<()> {
        match key {
            PropKey::Static { .. } => Ok(()),
            PropKey::Computed { expr } => self.expr(expr),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) -> ValidationResult<()> {
        for expr in exprs {
            self.expr(expr)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> ValidationResult<()> {
        match expr {
            Expr::LitNum { .. } | Expr::LitStr { .. } | Expr::LitBool { .. } | Expr::LitNull { .. } => Ok(()),
            Expr::Ident { name, span } => check_reserved(name, *span),
            Expr::Template { exprs, .. } => self.exprs(exprs),
            Expr::Array { items, .. } => self.exprs(items),
            Expr::Sequence { exprs, .. } => self.exprs(exprs),
            Expr::Object { props, .. } => {
                for prop in props {
                    match prop {
                        Prop::KeyValue { key, value } => {
                            self.prop_key(key)?;
                            self.expr(value)?;
                        }
                        Prop::Shorthand { name, span } => check_reserved(name, *span)?,
                        Prop::Spread { expr } => self.expr(expr)?,
                        Prop::Method { key, func } | Prop::Getter { key, func } | Prop::Setter { key, func } => {
                            self.prop_key(key)?;
                            self.function(func)?;
                        }
                    }
                }
                Ok(())
            }
            Expr::Function { func, .. } => self.function(func),
            Expr::Unary { arg, .. }
            | Expr::Update { arg, .. }
            | Expr::Spread { arg, .. } => self.expr(arg),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.expr(test)?;
                self.expr(consequent)?;
                self.expr(alternate)
            }
            Expr::Assign { target, value, .. } => {
                self.expr(target)?;
                self.expr(value)
            }
            Expr::Member { object, property, .. } => {
                self.expr(object)?;
                self.prop_key(property)
            }
            Expr::Call { callee, args, .. } | Expr::New { callee, args, .. } => {
                self.expr(callee)?;
                self.exprs(args)
            }
            Expr::Await { arg, span } => {
                if !self.current_fn().is_async {
                    return Err(ValidationError::AwaitOutsideAsync { span: *span });
                }
                self.expr(arg)
            }
            Expr::Yield { arg, span } => {
                if !self.current_fn().is_script {
                    return Err(ValidationError::YieldOutsideScript { span: *span });
                }
                self.expr(arg)
            }
            Expr::Tag { tag, .. } => {
                for attr in &tag.attrs {
                    match attr {
                        TagAttr::Named { value: Some(value), .. } => self.expr(value)?,
                        TagAttr::Named { value: None, .. } => {}
                        TagAttr::Spread { expr } => self.expr(expr)?,
                    }
                }
                for child in &tag.children {
                    if let TagChild::Expr { expr } = child {
                        self.expr(expr)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse_program;

    fn validate(source: &str) -> ValidationResult<()> {
        let program = parse_program(source).expect("Should parse");
        validate_program(&program)
    }

    #[test]
    fn test_valid_script() {
        let source = r#"
            const a = 1
            let b = [1, 2]
            var c = { a }
            function helper(x) { return x * 2 }
            for (const item of b) {
                if (item > 1) { break }
                continue
            }
            return helper(a) + c.a
        "#;
        assert!(validate(source).is_ok());
    }

    #[test]
    fn test_duplicate_top_level_declarations() {
        let err = validate("const a = 1\nlet a = 2").unwrap_err();
        assert_eq!(err.to_string(), "Identifier 'a' has already been declared");
        assert_eq!(err.span().line, 2);

        assert!(validate("let a = 1\nvar a = 2").is_err());
        assert!(validate("var a = 1\nconst a = 2").is_err());
        assert!(validate("function a() {}\nlet a = 2").is_err());
    }

    #[test]
    fn test_redeclaring_var_is_allowed() {
        assert!(validate("var a = 1\nvar a = 2").is_ok());
    }

    #[test]
    fn test_shadowing_in_nested_block_is_allowed() {
        assert!(validate("const a = 1\n{ const a = 2 }\nfor (let a = 0; a < 1; a++) { let a = 3 }").is_ok());
    }

    #[test]
    fn test_param_conflicts_with_let() {
        assert!(validate("function f(a) { let a = 1 }").is_err());
        assert!(validate("function f(a) { var a = 1 }").is_ok());
    }

    #[test]
    fn test_reserved_intrinsics() {
        let err = validate("__track(1, 0)").unwrap_err();
        assert_eq!(err.to_string(), "'__track' is a reserved identifier");
        assert!(validate("const __log = 1").is_err());
    }

    #[test]
    fn test_break_and_continue_placement() {
        assert!(matches!(validate("break"), Err(ValidationError::IllegalBreak { .. })));
        assert!(matches!(
            validate("switch (x) { case 1: continue }"),
            Err(ValidationError::IllegalContinue { .. })
        ));
        assert!(validate("switch (x) { case 1: break }").is_ok());
        assert!(validate("while (true) { [1].forEach(() => { break }) }").is_err());
    }

    #[test]
    fn test_const_without_initializer() {
        assert!(matches!(
            validate("const a"),
            Err(ValidationError::MissingInitializer { .. })
        ));
    }

    #[test]
    fn test_try_requires_handler() {
        assert!(matches!(
            validate("try { a() }"),
            Err(ValidationError::MissingCatchOrFinally { .. })
        ));
        assert!(validate("try { a() } finally { b() }").is_ok());
    }

    #[test]
    fn test_await_placement() {
        assert!(validate("await fetch()").is_ok());
        assert!(validate("async function f() { await g() }").is_ok());
        assert!(matches!(
            validate("function f() { await g() }"),
            Err(ValidationError::AwaitOutsideAsync { .. })
        ));
    }

    #[test]
    fn test_yield_only_at_script_level() {
        assert!(validate("yield <Message>hi</Message>").is_ok());
        assert!(matches!(
            validate("function f() { yield <Message>hi</Message> }"),
            Err(ValidationError::YieldOutsideScript { .. })
        ));
    }
}
