//! PEST-based parser for scripts
//!
//! Builds the [`Program`] tree from `script.pest`. Used twice per compile:
//! once on the script as written and once on the instrumented text.

use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::ast::*;
use super::markup;
use crate::runtime::value::format_number;

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "compiler/script.pest"]
struct ScriptParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Input does not match the grammar
    PestError { message: String, line: usize, column: usize },
    /// Input matched but does not form a valid tree
    BuildError { message: String, line: usize, column: usize },
}

impl ParseError {
    fn build(message: impl Into<String>, span: Span) -> Self {
        ParseError::BuildError {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError { message, .. } | ParseError::BuildError { message, .. } => message,
        }
    }

    pub fn position(&self) -> (usize, usize) {
        match self {
            ParseError::PestError { line, column, .. } | ParseError::BuildError { line, column, .. } => {
                (*line, *column)
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, column) = self.position();
        write!(f, "{} ({}:{})", self.message(), line, column)
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        ParseError::PestError {
            message: format!("Unexpected token: {}", err.variant.message()),
            line,
            column,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Public API ===================== */

/// Parse a whole script
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let mut pairs = ScriptParser::parse(Rule::program, source)?;
    let program = match pairs.next() {
        Some(pair) => pair,
        None => return Err(ParseError::build("Empty parse result", Span::new(1, 1))),
    };
    Ok(Program {
        body: build_statement_list(program.into_inner())?,
    })
}

/* ===================== Pair Helpers ===================== */

fn span_of(pair: &Pair<Rule>) -> Span {
    let (line, column) = pair.line_col();
    Span::new(line, column)
}

/// Keyword and comment pairs carry no structure of their own
fn is_noise(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::COMMENT
            | Rule::EOI
            | Rule::kw_var
            | Rule::kw_let
            | Rule::kw_const
            | Rule::kw_function
            | Rule::kw_async
            | Rule::kw_yield
            | Rule::kw_return
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_while
            | Rule::kw_do
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_throw
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
            | Rule::kw_new
            | Rule::kw_of
            | Rule::kw_in
            | Rule::kw_switch
            | Rule::kw_case
            | Rule::kw_default
            | Rule::kw_get
            | Rule::kw_set
    )
}

fn significant(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pair.into_inner().filter(|p| !is_noise(p.as_rule()))
}

fn has_child(pair: &Pair<Rule>, rule: Rule) -> bool {
    pair.clone().into_inner().any(|p| p.as_rule() == rule)
}

fn next_pair<'i>(
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
    span: Span,
) -> ParseResult<Pair<'i, Rule>> {
    inner
        .next()
        .ok_or_else(|| ParseError::build(format!("Expected {}", what), span))
}

/* ===================== Statements ===================== */

fn comment_stmt(pair: &Pair<Rule>) -> Stmt {
    Stmt::Comment {
        text: markup::comment_text(pair.as_str()),
        span: span_of(pair),
    }
}

/// Statements in order, with comments between them kept as `Stmt::Comment`
fn build_statement_list<'i>(pairs: impl Iterator<Item = Pair<'i, Rule>>) -> ParseResult<Vec<Stmt>> {
    let mut body = Vec::new();
    for pair in pairs {
        match pair.as_rule() {
            Rule::COMMENT => body.push(comment_stmt(&pair)),
            Rule::EOI => {}
            _ => {
                let trailing = trailing_comments(&pair);
                body.push(build_statement(pair)?);
                body.extend(trailing);
            }
        }
    }
    Ok(body)
}

/// Comments a statement swallowed after its last token.
///
/// Implicit whitespace before a trailing optional element (`";"?`) is kept
/// even when the element is absent, so comments following a statement can end
/// up nested inside it.
fn trailing_comments(stmt: &Pair<Rule>) -> Vec<Stmt> {
    let input = stmt.get_input();
    let comments: Vec<Pair<Rule>> = stmt
        .clone()
        .into_inner()
        .flatten()
        .filter(|p| p.as_rule() == Rule::COMMENT)
        .collect();

    let mut boundary = stmt.as_span().end();
    let mut trailing = Vec::new();
    for comment in comments.iter().rev() {
        let gap = &input[comment.as_span().end()..boundary];
        if !gap.chars().all(|c| c.is_whitespace() || c == ';') {
            break;
        }
        trailing.push(comment_stmt(comment));
        boundary = comment.as_span().start();
    }
    trailing.reverse();
    trailing
}

fn build_statement(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::block => Ok(Stmt::Block {
            body: build_statement_list(pair.into_inner())?,
            span,
        }),
        Rule::empty_stmt => Ok(Stmt::Empty { span }),
        Rule::var_decl_stmt => {
            let decl = next_pair(&mut significant(pair), "declaration", span)?;
            let (kind, decls) = build_var_decl(decl)?;
            Ok(Stmt::Decl { kind, decls, span })
        }
        Rule::function_decl => Ok(Stmt::Function {
            func: Arc::new(build_function(pair, false)?),
            span,
        }),
        Rule::if_stmt => {
            let mut inner = significant(pair);
            let test = build_expression(next_pair(&mut inner, "condition", span)?)?;
            let consequent = build_statement(next_pair(&mut inner, "statement", span)?)?;
            let alternate = match inner.next() {
                Some(p) => Some(Box::new(build_statement(p)?)),
                None => None,
            };
            Ok(Stmt::If {
                test,
                consequent: Box::new(consequent),
                alternate,
                span,
            })
        }
        Rule::while_stmt => {
            let mut inner = significant(pair);
            let test = build_expression(next_pair(&mut inner, "condition", span)?)?;
            let body = build_statement(next_pair(&mut inner, "loop body", span)?)?;
            Ok(Stmt::While {
                test,
                body: Box::new(body),
                span,
            })
        }
        Rule::do_while_stmt => {
            let mut inner = significant(pair);
            let body = build_statement(next_pair(&mut inner, "loop body", span)?)?;
            let test = build_expression(next_pair(&mut inner, "condition", span)?)?;
            Ok(Stmt::DoWhile {
                body: Box::new(body),
                test,
                span,
            })
        }
        Rule::for_stmt => build_for(pair, span),
        Rule::switch_stmt => {
            let mut inner = significant(pair);
            let discriminant = build_expression(next_pair(&mut inner, "switch value", span)?)?;
            let cases = inner.map(build_switch_case).collect::<ParseResult<Vec<_>>>()?;
            Ok(Stmt::Switch {
                discriminant,
                cases,
                span,
            })
        }
        Rule::try_stmt => {
            let mut block = Vec::new();
            let mut handler = None;
            let mut finalizer = None;
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::block => block = build_statement_list(part.into_inner())?,
                    Rule::catch_clause => {
                        let mut param = None;
                        let mut body = Vec::new();
                        for p in significant(part) {
                            if p.as_rule() == Rule::block {
                                body = build_statement_list(p.into_inner())?;
                            } else {
                                param = Some(build_pattern(p)?);
                            }
                        }
                        handler = Some(CatchClause { param, body });
                    }
                    Rule::finally_clause => {
                        let fin_span = span_of(&part);
                        let b = next_pair(&mut significant(part), "finally block", fin_span)?;
                        finalizer = Some(build_statement_list(b.into_inner())?);
                    }
                    other => {
                        return Err(ParseError::build(
                            format!("Unexpected rule in try statement: {:?}", other),
                            span,
                        ))
                    }
                }
            }
            Ok(Stmt::Try {
                block,
                handler,
                finalizer,
                span,
            })
        }
        Rule::return_stmt => {
            let value = match significant(pair).next() {
                Some(p) => Some(build_expression(p)?),
                None => None,
            };
            Ok(Stmt::Return { value, span })
        }
        Rule::break_stmt => Ok(Stmt::Break { span }),
        Rule::continue_stmt => Ok(Stmt::Continue { span }),
        Rule::throw_stmt => {
            let value = build_expression(next_pair(&mut significant(pair), "expression", span)?)?;
            Ok(Stmt::Throw { value, span })
        }
        Rule::expr_stmt => {
            let expr = build_expression(next_pair(&mut significant(pair), "expression", span)?)?;
            Ok(Stmt::Expr { expr, span })
        }
        other => Err(ParseError::build(
            format!("Unexpected statement rule: {:?}", other),
            span,
        )),
    }
}

fn build_decl_kind(pair: Pair<Rule>) -> DeclKind {
    match pair.as_str().trim() {
        "const" => DeclKind::Const,
        "let" => DeclKind::Let,
        _ => DeclKind::Var,
    }
}

fn build_var_decl(pair: Pair<Rule>) -> ParseResult<(DeclKind, Vec<Declarator>)> {
    // var_decl = { decl_kind ~ declarator ~ ("," ~ declarator)* }
    let span = span_of(&pair);
    let mut inner = significant(pair);
    let kind = build_decl_kind(next_pair(&mut inner, "declaration kind", span)?);
    let mut decls = Vec::new();
    for declarator in inner {
        let d_span = span_of(&declarator);
        let mut parts = significant(declarator);
        let target = build_pattern(next_pair(&mut parts, "binding", d_span)?)?;
        let init = match parts.next() {
            Some(default) => Some(build_default_value(default)?),
            None => None,
        };
        decls.push(Declarator { target, init });
    }
    Ok((kind, decls))
}

fn build_default_value(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = span_of(&pair);
    build_expression(next_pair(&mut significant(pair), "default value", span)?)
}

fn build_for(pair: Pair<Rule>, span: Span) -> ParseResult<Stmt> {
    let mut inner = significant(pair);
    let head = next_pair(&mut inner, "loop head", span)?;
    let body = Box::new(build_statement(next_pair(&mut inner, "loop body", span)?)?);

    let head_rule = head.as_rule();
    match head_rule {
        Rule::for_of_head | Rule::for_in_head => {
            let mut kind = None;
            let mut target = None;
            let mut source = None;
            for part in significant(head) {
                match part.as_rule() {
                    Rule::decl_kind => kind = Some(build_decl_kind(part)),
                    Rule::identifier | Rule::object_pattern | Rule::array_pattern if target.is_none() => {
                        target = Some(build_pattern(part)?)
                    }
                    _ => source = Some(build_expression(part)?),
                }
            }
            let target = target.ok_or_else(|| ParseError::build("Expected loop binding", span))?;
            let source = source.ok_or_else(|| ParseError::build("Expected loop source", span))?;
            if head_rule == Rule::for_of_head {
                Ok(Stmt::ForOf {
                    kind,
                    target,
                    iterable: source,
                    body,
                    span,
                })
            } else {
                Ok(Stmt::ForIn {
                    kind,
                    target,
                    object: source,
                    body,
                    span,
                })
            }
        }
        Rule::for_classic_head => {
            let mut init = None;
            let mut test = None;
            let mut update = None;
            for part in significant(head) {
                let part_span = span_of(&part);
                match part.as_rule() {
                    Rule::for_init => {
                        let p = next_pair(&mut significant(part), "loop initializer", part_span)?;
                        init = Some(if p.as_rule() == Rule::var_decl {
                            let (kind, decls) = build_var_decl(p)?;
                            ForInit::Decl { kind, decls }
                        } else {
                            ForInit::Expr {
                                expr: build_expression(p)?,
                            }
                        });
                    }
                    Rule::for_test => {
                        test = Some(build_expression(next_pair(&mut significant(part), "loop test", part_span)?)?)
                    }
                    Rule::for_update => {
                        update = Some(build_expression(next_pair(
                            &mut significant(part),
                            "loop update",
                            part_span,
                        )?)?)
                    }
                    _ => {}
                }
            }
            Ok(Stmt::For {
                init,
                test,
                update,
                body,
                span,
            })
        }
        other => Err(ParseError::build(format!("Unexpected loop head: {:?}", other), span)),
    }
}

fn build_switch_case(pair: Pair<Rule>) -> ParseResult<SwitchCase> {
    // switch_case = { (case_test | default_label) ~ ":" ~ statement* }
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let label = next_pair(&mut inner, "case label", span)?;
    let test = match label.as_rule() {
        Rule::case_test => {
            let label_span = span_of(&label);
            Some(build_expression(next_pair(&mut significant(label), "case value", label_span)?)?)
        }
        _ => None,
    };
    Ok(SwitchCase {
        test,
        body: build_statement_list(inner)?,
    })
}

/* ===================== Functions & Patterns ===================== */

/// Build `function_decl`, `function_expr` or `arrow_function`
fn build_function(pair: Pair<Rule>, is_arrow: bool) -> ParseResult<FunctionDef> {
    let span = span_of(&pair);
    let is_async = has_child(&pair, Rule::kw_async);
    let mut name = None;
    let mut params = Vec::new();
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::params => params = build_params(part)?,
            Rule::arrow_params => {
                let p_span = span_of(&part);
                let inner = next_pair(&mut significant(part), "parameters", p_span)?;
                params = if inner.as_rule() == Rule::identifier {
                    vec![Param {
                        target: Pattern::Ident {
                            name: inner.as_str().to_string(),
                            span: span_of(&inner),
                        },
                        default: None,
                        rest: false,
                    }]
                } else {
                    build_params(inner)?
                };
            }
            Rule::function_body => {
                body = Some(FunctionBody::Block {
                    body: build_statement_list(part.into_inner())?,
                })
            }
            _ => {
                body = Some(FunctionBody::Expr {
                    expr: Box::new(build_expression(part)?),
                })
            }
        }
    }

    let body = body.ok_or_else(|| ParseError::build("Expected function body", span))?;
    Ok(FunctionDef {
        name,
        params,
        body,
        is_async,
        is_arrow,
    })
}

fn build_params(pair: Pair<Rule>) -> ParseResult<Vec<Param>> {
    let mut params = Vec::new();
    for param in significant(pair) {
        let span = span_of(&param);
        let mut inner = significant(param);
        let first = next_pair(&mut inner, "parameter", span)?;
        if first.as_rule() == Rule::rest_param {
            let id = next_pair(&mut significant(first), "rest parameter name", span)?;
            params.push(Param {
                target: Pattern::Ident {
                    name: id.as_str().to_string(),
                    span: span_of(&id),
                },
                default: None,
                rest: true,
            });
            continue;
        }
        let target = build_pattern(first)?;
        let default = match inner.next() {
            Some(d) => Some(build_default_value(d)?),
            None => None,
        };
        params.push(Param {
            target,
            default,
            rest: false,
        });
    }
    Ok(params)
}

fn build_pattern(pair: Pair<Rule>) -> ParseResult<Pattern> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::identifier => Ok(Pattern::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::object_pattern => {
            let mut props = Vec::new();
            let mut rest = None;
            for prop in significant(pair) {
                let prop_span = span_of(&prop);
                if prop.as_rule() == Rule::pattern_rest {
                    rest = Some(Box::new(build_rest(prop)?));
                    continue;
                }
                let mut key = String::new();
                let mut value = None;
                let mut default = None;
                for part in significant(prop) {
                    match part.as_rule() {
                        Rule::property_name => key = part.as_str().to_string(),
                        Rule::default_value => default = Some(build_default_value(part)?),
                        _ => value = Some(build_pattern(part)?),
                    }
                }
                let value = value.unwrap_or_else(|| Pattern::Ident {
                    name: key.clone(),
                    span: prop_span,
                });
                props.push(PatternProp { key, value, default });
            }
            Ok(Pattern::Object { props, rest, span })
        }
        Rule::array_pattern => {
            let mut elems = Vec::new();
            let mut rest = None;
            for elem in significant(pair) {
                let elem_span = span_of(&elem);
                if elem.as_rule() == Rule::pattern_rest {
                    rest = Some(Box::new(build_rest(elem)?));
                    continue;
                }
                let mut inner = significant(elem);
                let target = build_pattern(next_pair(&mut inner, "binding", elem_span)?)?;
                let default = match inner.next() {
                    Some(d) => Some(build_default_value(d)?),
                    None => None,
                };
                elems.push(PatternElem { target, default });
            }
            Ok(Pattern::Array { elems, rest, span })
        }
        other => Err(ParseError::build(format!("Unexpected binding pattern: {:?}", other), span)),
    }
}

fn build_rest(pair: Pair<Rule>) -> ParseResult<Pattern> {
    let span = span_of(&pair);
    build_pattern(next_pair(&mut significant(pair), "rest element", span)?)
}

/* ===================== Expressions ===================== */

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::op_nullish, Assoc::Left))
            .op(Op::infix(Rule::op_or, Assoc::Left))
            .op(Op::infix(Rule::op_and, Assoc::Left))
            .op(Op::infix(Rule::op_bit_or, Assoc::Left))
            .op(Op::infix(Rule::op_bit_xor, Assoc::Left))
            .op(Op::infix(Rule::op_bit_and, Assoc::Left))
            .op(Op::infix(Rule::op_eq, Assoc::Left)
                | Op::infix(Rule::op_ne, Assoc::Left)
                | Op::infix(Rule::op_strict_eq, Assoc::Left)
                | Op::infix(Rule::op_strict_ne, Assoc::Left))
            .op(Op::infix(Rule::op_lt, Assoc::Left)
                | Op::infix(Rule::op_le, Assoc::Left)
                | Op::infix(Rule::op_gt, Assoc::Left)
                | Op::infix(Rule::op_ge, Assoc::Left)
                | Op::infix(Rule::op_instanceof, Assoc::Left)
                | Op::infix(Rule::op_in, Assoc::Left))
            .op(Op::infix(Rule::op_shl, Assoc::Left)
                | Op::infix(Rule::op_shr, Assoc::Left)
                | Op::infix(Rule::op_ushr, Assoc::Left))
            .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
            .op(Op::infix(Rule::op_mul, Assoc::Left)
                | Op::infix(Rule::op_div, Assoc::Left)
                | Op::infix(Rule::op_mod, Assoc::Left))
            .op(Op::infix(Rule::op_pow, Assoc::Right))
    })
}

enum InfixKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn infix_kind(rule: Rule) -> Option<InfixKind> {
    use InfixKind::*;
    Some(match rule {
        Rule::op_nullish => Logical(LogicalOp::Nullish),
        Rule::op_or => Logical(LogicalOp::Or),
        Rule::op_and => Logical(LogicalOp::And),
        Rule::op_strict_eq => Binary(BinaryOp::StrictEq),
        Rule::op_strict_ne => Binary(BinaryOp::StrictNe),
        Rule::op_eq => Binary(BinaryOp::Eq),
        Rule::op_ne => Binary(BinaryOp::Ne),
        Rule::op_le => Binary(BinaryOp::Le),
        Rule::op_ge => Binary(BinaryOp::Ge),
        Rule::op_lt => Binary(BinaryOp::Lt),
        Rule::op_gt => Binary(BinaryOp::Gt),
        Rule::op_ushr => Binary(BinaryOp::UShr),
        Rule::op_shr => Binary(BinaryOp::Shr),
        Rule::op_shl => Binary(BinaryOp::Shl),
        Rule::op_instanceof => Binary(BinaryOp::InstanceOf),
        Rule::op_in => Binary(BinaryOp::In),
        Rule::op_bit_or => Binary(BinaryOp::BitOr),
        Rule::op_bit_xor => Binary(BinaryOp::BitXor),
        Rule::op_bit_and => Binary(BinaryOp::BitAnd),
        Rule::op_add => Binary(BinaryOp::Add),
        Rule::op_sub => Binary(BinaryOp::Sub),
        Rule::op_pow => Binary(BinaryOp::Pow),
        Rule::op_mul => Binary(BinaryOp::Mul),
        Rule::op_div => Binary(BinaryOp::Div),
        Rule::op_mod => Binary(BinaryOp::Mod),
        _ => return None,
    })
}

fn assign_op(raw: &str) -> AssignOp {
    match raw {
        "+=" => AssignOp::Add,
        "-=" => AssignOp::Sub,
        "*=" => AssignOp::Mul,
        "/=" => AssignOp::Div,
        "%=" => AssignOp::Mod,
        "**=" => AssignOp::Pow,
        "&&=" => AssignOp::And,
        "||=" => AssignOp::Or,
        "??=" => AssignOp::Nullish,
        _ => AssignOp::Assign,
    }
}

fn is_simple_target(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident { .. } | Expr::Member { optional: false, .. })
}

fn build_expression(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::expression => {
            let mut exprs = significant(pair)
                .map(build_expression)
                .collect::<ParseResult<Vec<_>>>()?;
            if exprs.len() == 1 {
                exprs.pop().ok_or_else(|| ParseError::build("Expected expression", span))
            } else {
                Ok(Expr::Sequence { exprs, span })
            }
        }
        Rule::assignment => {
            let mut inner = significant(pair);
            let first = next_pair(&mut inner, "expression", span)?;
            let left = build_expression(first)?;
            let Some(op) = inner.next() else {
                return Ok(left);
            };
            let value = build_expression(next_pair(&mut inner, "assigned value", span)?)?;
            if !is_simple_target(&left) {
                return Err(ParseError::build("Invalid left-hand side in assignment", left.span()));
            }
            Ok(Expr::Assign {
                op: assign_op(op.as_str()),
                target: Box::new(left),
                value: Box::new(value),
                span,
            })
        }
        Rule::arrow_function => Ok(Expr::Function {
            func: Arc::new(build_function(pair, true)?),
            span,
        }),
        Rule::function_expr => Ok(Expr::Function {
            func: Arc::new(build_function(pair, false)?),
            span,
        }),
        Rule::yield_expr => {
            let arg = build_expression(next_pair(&mut significant(pair), "yielded value", span)?)?;
            Ok(Expr::Yield {
                arg: Box::new(arg),
                span,
            })
        }
        Rule::conditional => {
            let mut inner = significant(pair);
            let test = build_expression(next_pair(&mut inner, "expression", span)?)?;
            let Some(consequent) = inner.next() else {
                return Ok(test);
            };
            let consequent = build_expression(consequent)?;
            let alternate = build_expression(next_pair(&mut inner, "alternate branch", span)?)?;
            Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
                span,
            })
        }
        Rule::binary => build_binary(pair),
        Rule::unary => build_unary(pair),
        Rule::postfix => {
            let mut inner = significant(pair);
            let arg = build_expression(next_pair(&mut inner, "expression", span)?)?;
            match inner.next() {
                None => Ok(arg),
                Some(op) => {
                    if !is_simple_target(&arg) {
                        return Err(ParseError::build(
                            "Invalid left-hand side expression in postfix operation",
                            span,
                        ));
                    }
                    Ok(Expr::Update {
                        op: if op.as_str() == "++" { UpdateOp::Inc } else { UpdateOp::Dec },
                        prefix: false,
                        arg: Box::new(arg),
                        span,
                    })
                }
            }
        }
        Rule::call_member => {
            let mut inner = significant(pair);
            let base = build_expression(next_pair(&mut inner, "expression", span)?)?;
            inner.try_fold(base, |acc, link| build_chain_link(acc, link, span))
        }
        Rule::new_expr => {
            let mut inner = significant(pair);
            let callee_pair = next_pair(&mut inner, "constructor", span)?;
            let mut callee_parts = significant(callee_pair);
            let base = build_expression(next_pair(&mut callee_parts, "constructor", span)?)?;
            let callee = callee_parts.try_fold(base, |acc, link| build_chain_link(acc, link, span))?;
            let args = match inner.next() {
                Some(args) => build_arguments(args)?,
                None => Vec::new(),
            };
            Ok(Expr::New {
                callee: Box::new(callee),
                args,
                span,
            })
        }
        Rule::paren_expr => build_expression(next_pair(&mut significant(pair), "expression", span)?),
        Rule::spread => {
            let arg = build_expression(next_pair(&mut significant(pair), "spread value", span)?)?;
            Ok(Expr::Spread {
                arg: Box::new(arg),
                span,
            })
        }
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::number => Ok(Expr::LitNum {
            v: parse_number(pair.as_str(), span)?,
            span,
        }),
        Rule::string => Ok(Expr::LitStr {
            v: string_value(pair),
            span,
        }),
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
            span,
        }),
        Rule::null_lit => Ok(Expr::LitNull { span }),
        Rule::template => build_template(pair),
        Rule::array_literal => Ok(Expr::Array {
            items: significant(pair)
                .map(build_expression)
                .collect::<ParseResult<Vec<_>>>()?,
            span,
        }),
        Rule::object_literal => Ok(Expr::Object {
            props: significant(pair)
                .map(build_object_member)
                .collect::<ParseResult<Vec<_>>>()?,
            span,
        }),
        Rule::tag_literal => Ok(Expr::Tag {
            tag: Box::new(build_tag(pair)?),
            span,
        }),
        other => Err(ParseError::build(
            format!("Unexpected expression rule: {:?}", other),
            span,
        )),
    }
}

fn build_binary(pair: Pair<Rule>) -> ParseResult<Expr> {
    pratt()
        .map_primary(build_expression)
        .map_infix(|lhs, op, rhs| {
            let left = lhs?;
            let right = rhs?;
            let span = left.span();
            match infix_kind(op.as_rule()) {
                Some(InfixKind::Binary(op)) => Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                }),
                Some(InfixKind::Logical(op)) => Ok(Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                }),
                None => Err(ParseError::build(
                    format!("Unexpected operator: {}", op.as_str()),
                    span_of(&op),
                )),
            }
        })
        .parse(significant(pair))
}

fn build_unary(pair: Pair<Rule>) -> ParseResult<Expr> {
    let parts: Vec<Pair<Rule>> = significant(pair).collect();
    let mut parts = parts.into_iter().rev();
    let operand = match parts.next() {
        Some(p) => build_expression(p)?,
        None => return Err(ParseError::build("Expected operand", Span::new(1, 1))),
    };

    parts.try_fold(operand, |arg, op| {
        let span = span_of(&op);
        let arg = Box::new(arg);
        let unary = |op: UnaryOp| -> ParseResult<Expr> { Ok(Expr::Unary { op, arg: arg.clone(), span }) };
        match op.as_rule() {
            Rule::op_await => Ok(Expr::Await { arg: arg.clone(), span }),
            Rule::op_pre_inc | Rule::op_pre_dec => {
                if !is_simple_target(&arg) {
                    return Err(ParseError::build(
                        "Invalid left-hand side expression in prefix operation",
                        span,
                    ));
                }
                Ok(Expr::Update {
                    op: if op.as_rule() == Rule::op_pre_inc { UpdateOp::Inc } else { UpdateOp::Dec },
                    prefix: true,
                    arg: arg.clone(),
                    span,
                })
            }
            Rule::op_typeof => unary(UnaryOp::Typeof),
            Rule::op_void => unary(UnaryOp::Void),
            Rule::op_delete => unary(UnaryOp::Delete),
            Rule::op_not => unary(UnaryOp::Not),
            Rule::op_neg => unary(UnaryOp::Neg),
            Rule::op_plus => unary(UnaryOp::Plus),
            Rule::op_bit_not => unary(UnaryOp::BitNot),
            other => Err(ParseError::build(format!("Unexpected prefix operator: {:?}", other), span)),
        }
    })
}

fn build_chain_link(object: Expr, link: Pair<Rule>, span: Span) -> ParseResult<Expr> {
    let link_span = span_of(&link);
    match link.as_rule() {
        Rule::member_dot | Rule::member_opt => {
            let optional = link.as_rule() == Rule::member_opt;
            let name = next_pair(&mut significant(link), "property name", link_span)?;
            Ok(Expr::Member {
                object: Box::new(object),
                property: PropKey::Static {
                    name: name.as_str().to_string(),
                },
                optional,
                span,
            })
        }
        Rule::member_index | Rule::opt_index => {
            let optional = link.as_rule() == Rule::opt_index;
            let index = build_expression(next_pair(&mut significant(link), "index", link_span)?)?;
            Ok(Expr::Member {
                object: Box::new(object),
                property: PropKey::Computed { expr: Box::new(index) },
                optional,
                span,
            })
        }
        Rule::call_args => Ok(Expr::Call {
            callee: Box::new(object),
            args: build_arguments(link)?,
            optional: false,
            span,
        }),
        Rule::opt_call => {
            let args = next_pair(&mut significant(link), "arguments", link_span)?;
            Ok(Expr::Call {
                callee: Box::new(object),
                args: build_arguments(args)?,
                optional: true,
                span,
            })
        }
        other => Err(ParseError::build(format!("Unexpected member access: {:?}", other), link_span)),
    }
}

fn build_arguments(pair: Pair<Rule>) -> ParseResult<Vec<Expr>> {
    significant(pair).map(build_expression).collect()
}

fn build_object_member(pair: Pair<Rule>) -> ParseResult<Prop> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::spread => {
            let expr = build_expression(next_pair(&mut significant(pair), "spread value", span)?)?;
            Ok(Prop::Spread { expr })
        }
        Rule::shorthand_prop => {
            let id = next_pair(&mut significant(pair), "property name", span)?;
            Ok(Prop::Shorthand {
                name: id.as_str().to_string(),
                span: span_of(&id),
            })
        }
        Rule::keyed_prop => {
            let mut inner = significant(pair);
            let key = build_prop_key(next_pair(&mut inner, "property key", span)?)?;
            let value = build_expression(next_pair(&mut inner, "property value", span)?)?;
            Ok(Prop::KeyValue { key, value })
        }
        Rule::getter_prop | Rule::setter_prop | Rule::method_prop => {
            let rule = pair.as_rule();
            let is_async = has_child(&pair, Rule::kw_async);
            let mut key = None;
            let mut params = Vec::new();
            let mut body = Vec::new();
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::params => params = build_params(part)?,
                    Rule::function_body => body = build_statement_list(part.into_inner())?,
                    _ => key = Some(build_prop_key(part)?),
                }
            }
            let key = key.ok_or_else(|| ParseError::build("Expected property key", span))?;
            let func = Arc::new(FunctionDef {
                name: match &key {
                    PropKey::Static { name } => Some(name.clone()),
                    PropKey::Computed { .. } => None,
                },
                params,
                body: FunctionBody::Block { body },
                is_async,
                is_arrow: false,
            });
            Ok(match rule {
                Rule::getter_prop => Prop::Getter { key, func },
                Rule::setter_prop => Prop::Setter { key, func },
                _ => Prop::Method { key, func },
            })
        }
        other => Err(ParseError::build(format!("Unexpected object member: {:?}", other), span)),
    }
}

fn build_prop_key(pair: Pair<Rule>) -> ParseResult<PropKey> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::computed_key => {
            let expr = build_expression(next_pair(&mut significant(pair), "computed key", span)?)?;
            Ok(PropKey::Computed { expr: Box::new(expr) })
        }
        Rule::string => Ok(PropKey::Static {
            name: string_value(pair),
        }),
        Rule::number => Ok(PropKey::Static {
            name: format_number(parse_number(pair.as_str(), span)?),
        }),
        _ => Ok(PropKey::Static {
            name: pair.as_str().to_string(),
        }),
    }
}

/* ===================== Literals ===================== */

fn parse_number(raw: &str, span: Span) -> ParseResult<f64> {
    let radix = match raw.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0b") | Some("0B") => Some(2),
        Some("0o") | Some("0O") => Some(8),
        _ => None,
    };
    let parsed = match radix {
        Some(radix) => u64::from_str_radix(&raw[2..], radix).map(|n| n as f64).ok(),
        None => raw.parse::<f64>().ok(),
    };
    parsed.ok_or_else(|| ParseError::build(format!("Invalid number literal: {}", raw), span))
}

/// Unescaped value of a `string` pair
fn string_value(pair: Pair<Rule>) -> String {
    let raw = pair.as_str();
    unescape(&raw[1..raw.len() - 1])
}

/// Resolve backslash escapes of a string or template chunk
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            break;
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => out.push_str(&hex),
                }
            }
            'u' => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => out.push('\u{FFFD}'),
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn build_template(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = span_of(&pair);
    let mut quasis = Vec::new();
    let mut exprs = Vec::new();
    let mut current = String::new();
    for part in pair.into_inner() {
        let part_span = span_of(&part);
        match part.as_rule() {
            Rule::template_chars => current.push_str(&unescape(part.as_str())),
            Rule::template_subst => {
                quasis.push(std::mem::take(&mut current));
                exprs.push(build_expression(next_pair(
                    &mut significant(part),
                    "substitution",
                    part_span,
                )?)?);
            }
            _ => {}
        }
    }
    quasis.push(current);
    Ok(Expr::Template { quasis, exprs, span })
}

/* ===================== Tag Literals ===================== */

fn build_tag(pair: Pair<Rule>) -> ParseResult<TagLiteral> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let name_pair = next_pair(&mut inner, "tag name", span)?;
    let (name, qualifier) = markup::split_tag_name(name_pair.as_str());

    let mut attrs = Vec::new();
    let mut children = Vec::new();
    for part in inner {
        let part_span = span_of(&part);
        match part.as_rule() {
            Rule::tag_attr => attrs.push(build_tag_attr(part)?),
            Rule::tag_text => children.push(TagChild::Text {
                text: markup::normalize_text(part.as_str()),
            }),
            Rule::tag_embed => {
                if let Some(expr) = significant(part).next() {
                    children.push(TagChild::Expr {
                        expr: build_expression(expr)?,
                    });
                }
            }
            Rule::tag_literal => children.push(TagChild::Expr {
                expr: Expr::Tag {
                    tag: Box::new(build_tag(part)?),
                    span: part_span,
                },
            }),
            _ => {}
        }
    }

    Ok(TagLiteral {
        name,
        qualifier,
        attrs,
        children: markup::html_to_markdown(children),
    })
}

fn build_tag_attr(pair: Pair<Rule>) -> ParseResult<TagAttr> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let first = next_pair(&mut inner, "attribute", span)?;
    if first.as_rule() == Rule::tag_spread {
        let expr = build_expression(next_pair(&mut significant(first), "spread value", span)?)?;
        return Ok(TagAttr::Spread { expr });
    }

    let name = first.as_str().to_string();
    let value = match inner.next() {
        None => None,
        Some(v) if v.as_rule() == Rule::string => Some(Expr::LitStr {
            span: span_of(&v),
            v: string_value(v),
        }),
        Some(v) => {
            let v_span = span_of(&v);
            Some(build_expression(next_pair(&mut significant(v), "attribute value", v_span)?)?)
        }
    };
    Ok(TagAttr::Named { name, value })
}
