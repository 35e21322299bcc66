//! Abstract Syntax Tree node types
//!
//! The same tree shape is produced for the script as written and for the
//! instrumented text emitted from it. Spans always refer to the text that was
//! parsed, so runtime spans are instrumented positions.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/* ===================== Positions ===================== */

/// 1-based line and column of the first character of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/* ===================== Statements ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Var => "var",
            DeclKind::Let => "let",
            DeclKind::Const => "const",
        }
    }
}

/// Statement AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
        span: Span,
    },
    Decl {
        kind: DeclKind,
        decls: Vec<Declarator>,
        span: Span,
    },
    Function {
        func: Arc<FunctionDef>,
        span: Span,
    },
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
        span: Span,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    ForOf {
        kind: Option<DeclKind>,
        target: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    ForIn {
        kind: Option<DeclKind>,
        target: Pattern,
        object: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
        span: Span,
    },
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Throw {
        value: Expr,
        span: Span,
    },
    Expr {
        expr: Expr,
        span: Span,
    },
    /// Statement-level comment, text already stripped of its delimiters
    Comment {
        text: String,
        span: Span,
    },
    Empty {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. }
            | Stmt::Decl { span, .. }
            | Stmt::Function { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::For { span, .. }
            | Stmt::ForOf { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Throw { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::Comment { span, .. }
            | Stmt::Empty { span } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ForInit {
    Decl { kind: DeclKind, decls: Vec<Declarator> },
    Expr { expr: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for the `default:` label
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

/* ===================== Functions & Patterns ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_arrow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FunctionBody {
    Block { body: Vec<Stmt> },
    Expr { expr: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub target: Pattern,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Pattern {
    Ident { name: String, span: Span },
    Object {
        props: Vec<PatternProp>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    Array {
        elems: Vec<PatternElem>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
}

impl Pattern {
    /// Every identifier the pattern binds, in source order
    pub fn bound_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Ident { name, .. } => out.push(name.clone()),
            Pattern::Object { props, rest, .. } => {
                for prop in props {
                    prop.value.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
            }
            Pattern::Array { elems, rest, .. } => {
                for elem in elems {
                    elem.target.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
            }
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Pattern::Ident { span, .. } | Pattern::Object { span, .. } | Pattern::Array { span, .. } => {
                *span
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternProp {
    pub key: String,
    pub value: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternElem {
    pub target: Pattern,
    pub default: Option<Expr>,
}

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
    Nullish,
}

/// Property key of a member access or object literal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PropKey {
    Static { name: String },
    Computed { expr: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Prop {
    KeyValue { key: PropKey, value: Expr },
    Shorthand { name: String, span: Span },
    Spread { expr: Expr },
    Method { key: PropKey, func: Arc<FunctionDef> },
    Getter { key: PropKey, func: Arc<FunctionDef> },
    Setter { key: PropKey, func: Arc<FunctionDef> },
}

/// Markup-like literal: `<Name:qualifier attr={expr}>text {expr}</Name:qualifier>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagLiteral {
    pub name: String,
    pub qualifier: Option<String>,
    pub attrs: Vec<TagAttr>,
    pub children: Vec<TagChild>,
}

impl TagLiteral {
    /// Uppercased `NAME` or `NAME:QUALIFIER`
    pub fn type_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}:{}", self.name.to_uppercase(), q.to_uppercase()),
            None => self.name.to_uppercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TagAttr {
    Named { name: String, value: Option<Expr> },
    Spread { expr: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TagChild {
    Text { text: String },
    Expr { expr: Expr },
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    LitNum { v: f64, span: Span },
    LitStr { v: String, span: Span },
    LitBool { v: bool, span: Span },
    LitNull { span: Span },
    Template { quasis: Vec<String>, exprs: Vec<Expr>, span: Span },
    Ident { name: String, span: Span },
    Array { items: Vec<Expr>, span: Span },
    Object { props: Vec<Prop>, span: Span },
    Function { func: Arc<FunctionDef>, span: Span },
    Unary { op: UnaryOp, arg: Box<Expr>, span: Span },
    Update { op: UpdateOp, prefix: bool, arg: Box<Expr>, span: Span },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr>, span: Span },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr>, span: Span },
    Conditional { test: Box<Expr>, consequent: Box<Expr>, alternate: Box<Expr>, span: Span },
    Assign { op: AssignOp, target: Box<Expr>, value: Box<Expr>, span: Span },
    Sequence { exprs: Vec<Expr>, span: Span },
    Member { object: Box<Expr>, property: PropKey, optional: bool, span: Span },
    Call { callee: Box<Expr>, args: Vec<Expr>, optional: bool, span: Span },
    New { callee: Box<Expr>, args: Vec<Expr>, span: Span },
    Spread { arg: Box<Expr>, span: Span },
    Await { arg: Box<Expr>, span: Span },
    Yield { arg: Box<Expr>, span: Span },
    Tag { tag: Box<TagLiteral>, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::LitNum { span, .. }
            | Expr::LitStr { span, .. }
            | Expr::LitBool { span, .. }
            | Expr::LitNull { span }
            | Expr::Template { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Function { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Update { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Sequence { span, .. }
            | Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Spread { span, .. }
            | Expr::Await { span, .. }
            | Expr::Yield { span, .. }
            | Expr::Tag { span, .. } => *span,
        }
    }

    /// Source-like rendering of a callee, used in "is not a function" messages
    pub fn describe(&self) -> String {
        match self {
            Expr::Ident { name, .. } => name.clone(),
            Expr::Member { object, property, .. } => match property {
                PropKey::Static { name } => format!("{}.{}", object.describe(), name),
                PropKey::Computed { .. } => format!("{}[...]", object.describe()),
            },
            Expr::Call { callee, .. } => format!("{}(...)", callee.describe()),
            Expr::LitStr { v, .. } => format!("\"{}\"", v),
            Expr::LitNum { v, .. } => v.to_string(),
            _ => "expression".to_string(),
        }
    }
}

/// A parsed script: top-level statements in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
}
