//! Instrumentation pass
//!
//! Re-emits a validated [`Program`] as script text in which every statement is
//! preceded by a `__track(line, depth)` call on its own generated line,
//! statement comments become `__comment(text, line)` calls, `console.log`
//! calls go through `__log` and tag literals become `__tag` calls. A
//! [`SourceMap`] entry is recorded at the start of every emitted statement and
//! expression.

use super::ast::*;
use super::source_map::SourceMap;
use crate::runtime::value::format_number;

/// Output of the instrumentation pass
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub code: String,
    pub source_map: SourceMap,
    /// Number of `__track` calls emitted
    pub statement_count: usize,
}

pub fn instrument(program: &Program) -> Instrumented {
    let mut emitter = Emitter::default();
    emitter.statement_list(&program.body);
    if emitter.column != 1 {
        emitter.write("\n");
    }
    Instrumented {
        code: emitter.out,
        source_map: emitter.map,
        statement_count: emitter.statements,
    }
}

/// JSON-compatible double-quoted literal, kept on one line
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{{{:x}}}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn quote_template_chunk(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::StrictEq => "===",
        BinaryOp::StrictNe => "!==",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::UShr => ">>>",
        BinaryOp::In => "in",
        BinaryOp::InstanceOf => "instanceof",
    }
}

fn logical_op_str(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "&&",
        LogicalOp::Or => "||",
        LogicalOp::Nullish => "??",
    }
}

fn assign_op_str(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Mod => "%=",
        AssignOp::Pow => "**=",
        AssignOp::And => "&&=",
        AssignOp::Or => "||=",
        AssignOp::Nullish => "??=",
    }
}

fn unary_op_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "!",
        UnaryOp::Neg => "-",
        UnaryOp::Plus => "+",
        UnaryOp::BitNot => "~",
        UnaryOp::Typeof => "typeof ",
        UnaryOp::Void => "void ",
        UnaryOp::Delete => "delete ",
    }
}

/// Expressions that never need parentheses as an operand
fn is_atomic(expr: &Expr) -> bool {
    match expr {
        Expr::LitNum { .. }
        | Expr::LitStr { .. }
        | Expr::LitBool { .. }
        | Expr::LitNull { .. }
        | Expr::Template { .. }
        | Expr::Ident { .. }
        | Expr::Array { .. }
        | Expr::Object { .. }
        | Expr::Member { .. }
        | Expr::Call { .. }
        | Expr::New { .. }
        | Expr::Tag { .. } => true,
        Expr::Function { func, .. } => !func.is_arrow,
        _ => false,
    }
}

/// `new` only accepts a primary followed by property accesses
fn is_constructor_path(expr: &Expr) -> bool {
    match expr {
        Expr::Ident { .. } => true,
        Expr::Member {
            object, optional: false, ..
        } => is_constructor_path(object),
        _ => false,
    }
}

/// An expression statement must not start with `{` or `function`
fn starts_like_statement(expr: &Expr) -> bool {
    match expr {
        Expr::Object { .. } => true,
        Expr::Function { func, .. } => !func.is_arrow,
        Expr::Member { object, .. } => starts_like_statement(object),
        Expr::Call { callee, .. } => starts_like_statement(callee),
        Expr::Assign { target, .. } => starts_like_statement(target),
        Expr::Update { arg, prefix: false, .. } => starts_like_statement(arg),
        Expr::Sequence { exprs, .. } => exprs.first().map(starts_like_statement).unwrap_or(false),
        _ => false,
    }
}

fn is_console_log(callee: &Expr) -> bool {
    match callee {
        Expr::Member {
            object,
            property: PropKey::Static { name },
            optional: false,
            ..
        } => name == "log" && matches!(object.as_ref(), Expr::Ident { name, .. } if name == "console"),
        _ => false,
    }
}

struct Emitter {
    out: String,
    line: usize,
    column: usize,
    depth: usize,
    statements: usize,
    map: SourceMap,
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            out: String::new(),
            line: 1,
            column: 1,
            depth: 0,
            statements: 0,
            map: SourceMap::new(),
        }
    }
}

impl Emitter {
    fn write(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.out.push_str(text);
    }

    fn mark(&mut self, original: Span) {
        let generated = Span::new(self.line, self.column);
        self.map.add(generated, original);
    }

    fn start_line(&mut self) {
        if self.column != 1 {
            self.write("\n");
        }
        let indent = "  ".repeat(self.depth);
        self.write(&indent);
    }

    /* ===================== Statements ===================== */

    fn statement_list(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Empty { .. } => {}
            Stmt::Comment { text, span } => {
                self.start_line();
                self.mark(*span);
                let call = format!("__comment({}, {});", quote_string(text), span.line);
                self.write(&call);
            }
            _ => {
                let span = stmt.span();
                self.start_line();
                self.mark(span);
                let track = format!("__track({}, {}); ", span.line, self.depth);
                self.write(&track);
                self.statements += 1;
                self.statement_body(stmt);
            }
        }
    }

    /// `{ ... }` with the contents one level deeper
    fn braced(&mut self, body: &[Stmt]) {
        self.write("{");
        self.depth += 1;
        self.statement_list(body);
        self.depth -= 1;
        self.start_line();
        self.write("}");
    }

    /// Loop and branch bodies always become blocks
    fn nested(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { body, .. } => self.braced(body),
            other => self.braced(std::slice::from_ref(other)),
        }
    }

    fn statement_body(&mut self, stmt: &Stmt) {
        self.mark(stmt.span());
        match stmt {
            Stmt::Block { body, .. } => self.braced(body),
            Stmt::Decl { kind, decls, .. } => {
                self.declaration(*kind, decls);
                self.write(";");
            }
            Stmt::Function { func, .. } => self.function(func),
            Stmt::If {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.write("if (");
                self.expr(test);
                self.write(") ");
                self.nested(consequent);
                if let Some(alt) = alternate {
                    self.write(" else ");
                    self.nested(alt);
                }
            }
            Stmt::While { test, body, .. } => {
                self.write("while (");
                self.expr(test);
                self.write(") ");
                self.nested(body);
            }
            Stmt::DoWhile { body, test, .. } => {
                self.write("do ");
                self.nested(body);
                self.write(" while (");
                self.expr(test);
                self.write(");");
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                self.write("for (");
                match init {
                    Some(ForInit::Decl { kind, decls }) => self.declaration(*kind, decls),
                    Some(ForInit::Expr { expr }) => self.expr(expr),
                    None => {}
                }
                self.write("; ");
                if let Some(test) = test {
                    self.expr(test);
                }
                self.write("; ");
                if let Some(update) = update {
                    self.expr(update);
                }
                self.write(") ");
                self.nested(body);
            }
            Stmt::ForOf {
                kind,
                target,
                iterable,
                body,
                ..
            } => {
                self.write("for (");
                if let Some(kind) = kind {
                    self.write(kind.as_str());
                    self.write(" ");
                }
                self.pattern(target);
                self.write(" of ");
                self.assignment_level(iterable);
                self.write(") ");
                self.nested(body);
            }
            Stmt::ForIn {
                kind,
                target,
                object,
                body,
                ..
            } => {
                self.write("for (");
                if let Some(kind) = kind {
                    self.write(kind.as_str());
                    self.write(" ");
                }
                self.pattern(target);
                self.write(" in ");
                self.expr(object);
                self.write(") ");
                self.nested(body);
            }
            Stmt::Switch {
                discriminant, cases, ..
            } => {
                self.write("switch (");
                self.expr(discriminant);
                self.write(") {");
                self.depth += 1;
                for case in cases {
                    self.start_line();
                    match &case.test {
                        Some(test) => {
                            self.write("case ");
                            self.expr(test);
                            self.write(":");
                        }
                        None => self.write("default:"),
                    }
                    self.statement_list(&case.body);
                }
                self.depth -= 1;
                self.start_line();
                self.write("}");
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                self.write("try ");
                self.braced(block);
                if let Some(handler) = handler {
                    self.write(" catch ");
                    if let Some(param) = &handler.param {
                        self.write("(");
                        self.pattern(param);
                        self.write(") ");
                    }
                    self.braced(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.write(" finally ");
                    self.braced(finalizer);
                }
            }
            Stmt::Return { value, .. } => {
                self.write("return");
                if let Some(value) = value {
                    self.write(" ");
                    self.expr(value);
                }
                self.write(";");
            }
            Stmt::Break { .. } => self.write("break;"),
            Stmt::Continue { .. } => self.write("continue;"),
            Stmt::Throw { value, .. } => {
                self.write("throw ");
                self.expr(value);
                self.write(";");
            }
            Stmt::Expr { expr, .. } => {
                if starts_like_statement(expr) {
                    self.write("(");
                    self.expr(expr);
                    self.write(")");
                } else {
                    self.expr(expr);
                }
                self.write(";");
            }
            Stmt::Comment { .. } | Stmt::Empty { .. } => {}
        }
    }

    fn declaration(&mut self, kind: DeclKind, decls: &[Declarator]) {
        self.write(kind.as_str());
        self.write(" ");
        for (i, decl) in decls.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.pattern(&decl.target);
            if let Some(init) = &decl.init {
                self.write(" = ");
                self.assignment_level(init);
            }
        }
    }

    /* ===================== Functions & Patterns ===================== */

    fn function(&mut self, func: &FunctionDef) {
        if func.is_async {
            self.write("async ");
        }
        if !func.is_arrow {
            self.write("function");
            if let Some(name) = &func.name {
                self.write(" ");
                self.write(name);
            }
        }
        self.params(&func.params);
        if func.is_arrow {
            self.write(" =>");
        }
        self.write(" ");
        match &func.body {
            FunctionBody::Block { body } => self.braced(body),
            FunctionBody::Expr { expr } => {
                if matches!(expr.as_ref(), Expr::Object { .. } | Expr::Sequence { .. }) {
                    self.write("(");
                    self.expr(expr);
                    self.write(")");
                } else {
                    self.expr(expr);
                }
            }
        }
    }

    fn params(&mut self, params: &[Param]) {
        self.write("(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            if param.rest {
                self.write("...");
            }
            self.pattern(&param.target);
            if let Some(default) = &param.default {
                self.write(" = ");
                self.assignment_level(default);
            }
        }
        self.write(")");
    }

    fn pattern(&mut self, pattern: &Pattern) {
        self.mark(pattern.span());
        match pattern {
            Pattern::Ident { name, .. } => self.write(name),
            Pattern::Object { props, rest, .. } => {
                self.write("{ ");
                for (i, prop) in props.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.write(&prop.key);
                    let shorthand = matches!(&prop.value, Pattern::Ident { name, .. } if *name == prop.key);
                    if !shorthand {
                        self.write(": ");
                        self.pattern(&prop.value);
                    }
                    if let Some(default) = &prop.default {
                        self.write(" = ");
                        self.assignment_level(default);
                    }
                }
                if let Some(rest) = rest {
                    if !props.is_empty() {
                        self.write(", ");
                    }
                    self.write("...");
                    self.pattern(rest);
                }
                self.write(" }");
            }
            Pattern::Array { elems, rest, .. } => {
                self.write("[");
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.pattern(&elem.target);
                    if let Some(default) = &elem.default {
                        self.write(" = ");
                        self.assignment_level(default);
                    }
                }
                if let Some(rest) = rest {
                    if !elems.is_empty() {
                        self.write(", ");
                    }
                    self.write("...");
                    self.pattern(rest);
                }
                self.write("]");
            }
        }
    }

    /* ===================== Expressions ===================== */

    fn parenthesized(&mut self, expr: &Expr) {
        self.write("(");
        self.expr(expr);
        self.write(")");
    }

    /// Operand of an operator, call or member access
    fn operand(&mut self, expr: &Expr) {
        if is_atomic(expr) {
            self.expr(expr);
        } else {
            self.parenthesized(expr);
        }
    }

    /// Position where the grammar expects an `assignment`
    fn assignment_level(&mut self, expr: &Expr) {
        if matches!(expr, Expr::Sequence { .. }) {
            self.parenthesized(expr);
        } else {
            self.expr(expr);
        }
    }

    fn arguments(&mut self, args: &[Expr]) {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.assignment_level(arg);
        }
    }

    fn prop_key(&mut self, key: &PropKey) {
        match key {
            PropKey::Static { name } => self.write(&quote_string(name)),
            PropKey::Computed { expr } => {
                self.write("[");
                self.assignment_level(expr);
                self.write("]");
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        self.mark(expr.span());
        match expr {
            Expr::LitNum { v, .. } => self.write(&format_number(*v)),
            Expr::LitStr { v, .. } => self.write(&quote_string(v)),
            Expr::LitBool { v, .. } => self.write(if *v { "true" } else { "false" }),
            Expr::LitNull { .. } => self.write("null"),
            Expr::Template { quasis, exprs, .. } => {
                self.write("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    self.write(&quote_template_chunk(quasi));
                    if let Some(sub) = exprs.get(i) {
                        self.write("${");
                        self.expr(sub);
                        self.write("}");
                    }
                }
                self.write("`");
            }
            Expr::Ident { name, .. } => self.write(name),
            Expr::Array { items, .. } => {
                self.write("[");
                self.arguments(items);
                self.write("]");
            }
            Expr::Object { props, .. } => {
                self.write("{");
                for (i, prop) in props.iter().enumerate() {
                    self.write(if i > 0 { ", " } else { " " });
                    self.object_prop(prop);
                }
                self.write(if props.is_empty() { "}" } else { " }" });
            }
            Expr::Function { func, .. } => self.function(func),
            Expr::Unary { op, arg, .. } => {
                self.write(unary_op_str(*op));
                self.operand(arg);
            }
            Expr::Update { op, prefix, arg, .. } => {
                let token = match op {
                    UpdateOp::Inc => "++",
                    UpdateOp::Dec => "--",
                };
                if *prefix {
                    self.write(token);
                    self.operand(arg);
                } else {
                    self.operand(arg);
                    self.write(token);
                }
            }
            Expr::Binary { op, left, right, .. } => {
                self.operand(left);
                self.write(" ");
                self.write(binary_op_str(*op));
                self.write(" ");
                self.operand(right);
            }
            Expr::Logical { op, left, right, .. } => {
                self.operand(left);
                self.write(" ");
                self.write(logical_op_str(*op));
                self.write(" ");
                self.operand(right);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.operand(test);
                self.write(" ? ");
                self.assignment_level(consequent);
                self.write(" : ");
                self.assignment_level(alternate);
            }
            Expr::Assign { op, target, value, .. } => {
                self.expr(target);
                self.write(" ");
                self.write(assign_op_str(*op));
                self.write(" ");
                self.assignment_level(value);
            }
            Expr::Sequence { exprs, .. } => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.assignment_level(e);
                }
            }
            Expr::Member {
                object,
                property,
                optional,
                ..
            } => {
                self.operand(object);
                match property {
                    PropKey::Static { name } => {
                        self.write(if *optional { "?." } else { "." });
                        self.write(name);
                    }
                    PropKey::Computed { expr } => {
                        self.write(if *optional { "?.[" } else { "[" });
                        self.expr(expr);
                        self.write("]");
                    }
                }
            }
            Expr::Call {
                callee,
                args,
                optional,
                ..
            } => {
                if is_console_log(callee) {
                    self.write("__log(");
                    self.expr(callee);
                    if !args.is_empty() {
                        self.write(", ");
                    }
                    self.arguments(args);
                    self.write(")");
                    return;
                }
                self.operand(callee);
                self.write(if *optional { "?.(" } else { "(" });
                self.arguments(args);
                self.write(")");
            }
            Expr::New { callee, args, .. } => {
                self.write("new ");
                if is_constructor_path(callee) {
                    self.expr(callee);
                } else {
                    self.parenthesized(callee);
                }
                self.write("(");
                self.arguments(args);
                self.write(")");
            }
            Expr::Spread { arg, .. } => {
                self.write("...");
                self.assignment_level(arg);
            }
            Expr::Await { arg, .. } => {
                self.write("await ");
                self.operand(arg);
            }
            Expr::Yield { arg, .. } => {
                self.write("yield ");
                self.assignment_level(arg);
            }
            Expr::Tag { tag, .. } => self.tag(tag),
        }
    }

    fn object_prop(&mut self, prop: &Prop) {
        match prop {
            Prop::KeyValue { key, value } => {
                self.prop_key(key);
                self.write(": ");
                self.assignment_level(value);
            }
            Prop::Shorthand { name, span } => {
                self.mark(*span);
                self.write(name);
            }
            Prop::Spread { expr } => {
                self.write("...");
                self.assignment_level(expr);
            }
            Prop::Method { key, func } => {
                if func.is_async {
                    self.write("async ");
                }
                self.prop_key(key);
                self.method_tail(func);
            }
            Prop::Getter { key, func } => {
                self.write("get ");
                self.prop_key(key);
                self.method_tail(func);
            }
            Prop::Setter { key, func } => {
                self.write("set ");
                self.prop_key(key);
                self.method_tail(func);
            }
        }
    }

    fn method_tail(&mut self, func: &FunctionDef) {
        self.params(&func.params);
        self.write(" ");
        match &func.body {
            FunctionBody::Block { body } => self.braced(body),
            FunctionBody::Expr { expr } => {
                self.write("{ return ");
                self.expr(expr);
                self.write("; }");
            }
        }
    }

    /* ===================== Tag Literals ===================== */

    /// Tag children and attribute values: a bare identifier that is
    /// `undefined` renders as its own name
    fn tag_value(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident { name, span } => {
                self.write("(typeof ");
                self.mark(*span);
                self.write(name);
                self.write(" === \"undefined\" ? ");
                self.write(&quote_string(name));
                self.write(" : ");
                self.write(name);
                self.write(")");
            }
            other => self.assignment_level(other),
        }
    }

    fn tag(&mut self, tag: &TagLiteral) {
        self.write("__tag(");
        self.write(&quote_string(&tag.type_name()));
        self.write(", {");
        for (i, attr) in tag.attrs.iter().enumerate() {
            self.write(if i > 0 { ", " } else { " " });
            match attr {
                TagAttr::Named { name, value } => {
                    self.write(&quote_string(name));
                    self.write(": ");
                    match value {
                        Some(value) => self.tag_value(value),
                        None => self.write("true"),
                    }
                }
                TagAttr::Spread { expr } => {
                    self.write("...");
                    self.assignment_level(expr);
                }
            }
        }
        self.write(if tag.attrs.is_empty() { "}, [" } else { " }, [" });
        for (i, child) in tag.children.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            match child {
                TagChild::Text { text } => self.write(&quote_string(text)),
                TagChild::Expr { expr } => self.tag_value(expr),
            }
        }
        self.write("])");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse_program;

    fn emit(source: &str) -> Instrumented {
        instrument(&parse_program(source).expect("Should parse"))
    }

    #[test]
    fn test_every_statement_on_its_own_tracked_line() {
        let out = emit("const a = 1; const b = 2\nreturn a + b");
        let lines: Vec<&str> = out.code.lines().collect();
        assert_eq!(lines[0], "__track(1, 0); const a = 1;");
        assert_eq!(lines[1], "__track(1, 0); const b = 2;");
        assert_eq!(lines[2], "__track(2, 0); return a + b;");
        assert_eq!(out.statement_count, 3);
    }

    #[test]
    fn test_nested_depth() {
        let out = emit("for (const x of xs) {\n  if (x) y()\n}");
        let lines: Vec<&str> = out.code.lines().map(str::trim).collect();
        assert_eq!(lines[0], "__track(1, 0); for (const x of xs) {");
        assert_eq!(lines[1], "__track(2, 1); if (x) {");
        assert_eq!(lines[2], "__track(2, 2); y();");
    }

    #[test]
    fn test_comments_become_calls() {
        let out = emit("// hello\nconst a = 1");
        assert!(out.code.starts_with("__comment(\"hello\", 1);\n"));
    }

    #[test]
    fn test_console_log_is_wrapped() {
        let out = emit("console.log('a', 1)");
        assert_eq!(out.code.trim(), "__track(1, 0); __log(console.log, \"a\", 1);");
    }

    #[test]
    fn test_tag_lowering() {
        let out = emit("yield <Button label=\"Go\" primary>Hi {name}</Button>");
        assert_eq!(
            out.code.trim(),
            "__track(1, 0); yield __tag(\"BUTTON\", { \"label\": \"Go\", \"primary\": true }, [\"Hi \", (typeof name === \"undefined\" ? \"name\" : name)]);"
        );
    }

    #[test]
    fn test_rest_patterns_are_emitted() {
        let out = emit("const [a, ...r] = xs\nconst { b, ...o } = obj\nconst [...all] = xs");
        let lines: Vec<&str> = out.code.lines().collect();
        assert_eq!(lines[0], "__track(1, 0); const [a, ...r] = xs;");
        assert_eq!(lines[1], "__track(2, 0); const { b, ...o } = obj;");
        assert_eq!(lines[2], "__track(3, 0); const [...all] = xs;");
    }

    #[test]
    fn test_operands_are_parenthesized() {
        let out = emit("x = (a + b) * -(-c)");
        assert_eq!(out.code.trim(), "__track(1, 0); x = (a + b) * (-(-c));");
    }

    #[test]
    fn test_object_statement_is_parenthesized() {
        let out = emit("({ a: 1 }).a");
        assert_eq!(out.code.trim(), "__track(1, 0); ({ \"a\": 1 }.a);");
    }

    #[test]
    fn test_output_reparses() {
        let source = r#"
            async function load({ id, tags = [] }, ...rest) {
                const r = await fetch(`/items/${id}?q=${"a`b"}`)
                return r?.items ?? []
            }
            let total = 0
            for (let i = 0; i < 3; i++) { total += i }
            switch (total) { case 3: total++; break; default: total = 0 }
            try { throw new Error("x") } catch (e) { total = e.message } finally { total += "!" }
            const obj = { get v() { return 1 }, ["k" + 1]: 2, m() { return 1 } }
            do { total-- } while (false)
            return [total, obj, typeof missing, load]
        "#;
        let out = emit(source);
        let reparsed = parse_program(&out.code);
        assert!(reparsed.is_ok(), "{:?}\n{}", reparsed.err(), out.code);
    }

    #[test]
    fn test_source_map_points_back_to_original_lines() {
        let out = emit("const a = 1\n\n\nfoo(a)");
        let program = parse_program(&out.code).unwrap();
        let call_span = program.body.last().unwrap().span();
        let original = out.source_map.original_position(call_span).unwrap();
        assert_eq!(original.line, 4);
    }
}
