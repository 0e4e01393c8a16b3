//! Abstract syntax produced by the parser.

use crate::token::CodeRange;

/// One segment of an l-value's access chain, applied left to right after
/// the root identifier.
#[derive(Debug, Clone)]
pub enum Access {
    Field(String),
    Index(Expr),
}

/// An l-value: a root identifier plus zero or more field/index accesses.
/// `:=` only ever has an empty chain (bare identifier only).
#[derive(Debug, Clone)]
pub struct LValue {
    pub root: String,
    pub chain: Vec<Access>,
    pub range: CodeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// A field declaration inside a `struct` definition template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Mutable,
    Bind,
    Reactive,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    /// `None` for a bare mutable field, which defaults to `Int(0)`.
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i32),
    Char(i32),
    Str(String),
    Ident(String, CodeRange),
    /// `[expr]` in primary position: allocate a zero-initialized array.
    ArrayAlloc(Box<Expr>),
    /// `struct Ident`: instantiate a struct from its template.
    StructAlloc(String, CodeRange),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Field {
        target: Box<Expr>,
        name: String,
        range: CodeRange,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        range: CodeRange,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        range: CodeRange,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Import(Vec<String>),
    StructDef(StructDef),
    FuncDef(FuncDef),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        els: Vec<Stmt>,
    },
    Loop(Vec<Stmt>),
    Break,
    Return(Option<Expr>),
    Print(Expr),
    Println(Expr),
    Assign(LValue, Expr),
    Bind(String, Expr),
    ReactiveAssign(LValue, Expr),
    Expr(Expr),
}
