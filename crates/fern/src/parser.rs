//! Recursive-descent parser: tokens to AST.
//!
//! Precedence (lowest to highest):
//! ternary → `||` → `&&` → comparisons (non-associative) → additive →
//! multiplicative → postfix (`.field`, `[expr]`, `(args)`, chained
//! left-to-right) → unary minus → primary.

use crate::{
    ast::{Access, BinOp, CmpOp, Expr, FieldDecl, FieldKind, FuncDef, LValue, Stmt, StructDef, UnaryOp},
    error::CompileError,
    token::{CodeRange, Keyword, Token, TokenKind},
};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: u32,
}

type PResult<T> = Result<T, CompileError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, loop_depth: 0 }
    }

    /// Parses a whole module: a sequence of statements until EOF.
    pub fn parse_module(mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    // ---- token plumbing ----

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_range(&self) -> CodeRange {
        self.tokens[self.pos].range
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.err(&format!("expected `{kind}`, found `{}`", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.err(&format!("expected identifier, found `{other}`"))),
        }
    }

    fn err(&self, message: &str) -> CompileError {
        CompileError::Parse {
            message: message.to_owned(),
            at: self.peek_range(),
        }
    }

    fn eat_semis(&mut self) {
        while self.eat(&TokenKind::Semi) {}
    }

    // ---- statements ----

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        self.eat_semis();
        while !self.eat(&TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
            self.eat_semis();
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let stmt = match self.peek().clone() {
            TokenKind::Keyword(Keyword::Import) => {
                self.advance();
                let mut path = vec![self.expect_ident()?];
                while self.eat(&TokenKind::Dot) {
                    path.push(self.expect_ident()?);
                }
                Stmt::Import(path)
            }
            TokenKind::Keyword(Keyword::Struct) => {
                self.advance();
                Stmt::StructDef(self.parse_struct_def()?)
            }
            TokenKind::Keyword(Keyword::Func) => {
                self.advance();
                Stmt::FuncDef(self.parse_func_def()?)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::Loop) => {
                self.advance();
                self.loop_depth += 1;
                let body = self.parse_block();
                self.loop_depth -= 1;
                Stmt::Loop(body?)
            }
            TokenKind::Keyword(Keyword::Break) => {
                if self.loop_depth == 0 {
                    return Err(self.err("`break` outside of a loop"));
                }
                self.advance();
                Stmt::Break
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if matches!(self.peek(), TokenKind::Semi | TokenKind::RBrace) {
                    Stmt::Return(None)
                } else {
                    Stmt::Return(Some(self.parse_expr()?))
                }
            }
            TokenKind::Keyword(Keyword::Print) => {
                self.advance();
                Stmt::Print(self.parse_expr()?)
            }
            TokenKind::Keyword(Keyword::Println) => {
                self.advance();
                Stmt::Println(self.parse_expr()?)
            }
            _ => self.parse_assignment_or_expr_stmt()?,
        };
        self.eat_semis();
        Ok(stmt)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.advance(); // if
        let cond = self.parse_expr()?;
        let then = self.parse_block()?;
        let els = if self.eat(&TokenKind::Keyword(Keyword::Else)) {
            if matches!(self.peek(), TokenKind::Keyword(Keyword::If)) {
                vec![self.parse_if()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If { cond, then, els })
    }

    fn parse_struct_def(&mut self) -> PResult<StructDef> {
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;
        let mut fields = Vec::new();
        self.eat_semis();
        while !self.eat(&TokenKind::RBrace) {
            let fname = self.expect_ident()?;
            let (kind, init) = if self.eat(&TokenKind::Assign) {
                (FieldKind::Mutable, Some(self.parse_expr()?))
            } else if self.eat(&TokenKind::Bind) {
                (FieldKind::Bind, Some(self.parse_expr()?))
            } else if self.eat(&TokenKind::ReactiveBind) {
                (FieldKind::Reactive, Some(self.parse_expr()?))
            } else {
                (FieldKind::Mutable, None)
            };
            fields.push(FieldDecl { name: fname, kind, init });
            self.eat_semis();
        }
        Ok(StructDef { name, fields })
    }

    fn parse_func_def(&mut self) -> PResult<FuncDef> {
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                params.push(self.expect_ident()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }
        // `break` cannot cross a function boundary, even when the `func` is
        // textually nested inside a `loop`.
        let outer_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block();
        self.loop_depth = outer_loop_depth;
        Ok(FuncDef { name, params, body: body? })
    }

    /// Parses one of: `:=` bind, `=` assign, `::=` reactive assign, or a bare
    /// expression statement. The grammar defers the choice until an operand
    /// has already been parsed as an expression.
    fn parse_assignment_or_expr_stmt(&mut self) -> PResult<Stmt> {
        let lhs = self.parse_expr()?;
        if self.eat(&TokenKind::Bind) {
            let Expr::Ident(name, _) = lhs else {
                return Err(self.err("`:=` requires a bare identifier on the left"));
            };
            let rhs = self.parse_expr()?;
            return Ok(Stmt::Bind(name, rhs));
        }
        if self.eat(&TokenKind::Assign) {
            let lvalue = to_lvalue(lhs)?;
            let rhs = self.parse_expr()?;
            return Ok(Stmt::Assign(lvalue, rhs));
        }
        if self.eat(&TokenKind::ReactiveBind) {
            let lvalue = to_lvalue(lhs)?;
            let rhs = self.parse_expr()?;
            return Ok(Stmt::ReactiveAssign(lvalue, rhs));
        }
        Ok(Stmt::Expr(lhs))
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let cond = self.parse_or()?;
        if self.eat(&TokenKind::Question) {
            let then = self.parse_ternary()?;
            self.expect(&TokenKind::Colon)?;
            let els = self.parse_ternary()?;
            Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            })
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.parse_comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::LtEq,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::GtEq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::Minus) {
            let expr = self.parse_unary()?;
            Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            })
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let range = self.peek_range();
                let name = self.expect_ident()?;
                expr = Expr::Field {
                    target: Box::new(expr),
                    name,
                    range,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let range = self.peek_range();
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                    range,
                };
            } else if self.eat(&TokenKind::LParen) {
                let range = self.peek_range();
                let mut args = Vec::new();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                }
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    range,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let range = self.peek_range();
        match self.peek().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            TokenKind::Char(c) => {
                self.advance();
                Ok(Expr::Char(c))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name, range))
            }
            TokenKind::Keyword(Keyword::Struct) => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(Expr::StructAlloc(name, range))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let size = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::ArrayAlloc(Box::new(size)))
            }
            other => Err(self.err(&format!("unexpected token `{other}`"))),
        }
    }
}

/// Reinterprets an already-parsed postfix expression as an l-value path.
/// Only `Ident`, `.field`, and `[index]` chains are valid; a `Call` anywhere
/// in the chain is a parse error: the l-value grammar has no calls.
fn to_lvalue(expr: Expr) -> PResult<LValue> {
    fn collect(expr: Expr, chain: &mut Vec<Access>) -> PResult<(String, CodeRange)> {
        match expr {
            Expr::Ident(name, range) => Ok((name, range)),
            Expr::Field { target, name, .. } => {
                let root = collect(*target, chain)?;
                chain.push(Access::Field(name));
                Ok(root)
            }
            Expr::Index { target, index, .. } => {
                let root = collect(*target, chain)?;
                chain.push(Access::Index(*index));
                Ok(root)
            }
            _ => Err(CompileError::Parse {
                message: "invalid l-value: only identifiers, field access, and indexing are assignable".to_owned(),
                at: CodeRange::default(),
            }),
        }
    }
    let mut chain = Vec::new();
    let (root, range) = collect(expr, &mut chain)?;
    Ok(LValue { root, chain, range })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Vec<Stmt> {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse_module().unwrap()
    }

    #[test]
    fn assignment_forms() {
        let stmts = parse("x = 1; y := 2; z ::= x + y;");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Stmt::Assign(..)));
        assert!(matches!(stmts[1], Stmt::Bind(..)));
        assert!(matches!(stmts[2], Stmt::ReactiveAssign(..)));
    }

    #[test]
    fn nested_lvalue_path() {
        let stmts = parse("a.b[0].c = 1;");
        let Stmt::Assign(lvalue, _) = &stmts[0] else { panic!("expected assign") };
        assert_eq!(lvalue.root, "a");
        assert_eq!(lvalue.chain.len(), 3);
    }

    #[test]
    fn bind_rejects_path() {
        let tokens = Lexer::new("a.b := 1;").tokenize().unwrap();
        assert!(Parser::new(tokens).parse_module().is_err());
    }

    #[test]
    fn ternary_is_lowest_precedence_and_right_assoc() {
        let stmts = parse("x = a ? b : c ? d : e;");
        assert!(matches!(stmts[0], Stmt::Assign(..)));
    }

    #[test]
    fn struct_and_func_defs() {
        let stmts = parse("struct C { x = 0; step := 1; next ::= x + step; } func mk() { return struct C; }");
        assert!(matches!(stmts[0], Stmt::StructDef(_)));
        assert!(matches!(stmts[1], Stmt::FuncDef(_)));
    }

    #[test]
    fn array_alloc_vs_index() {
        let stmts = parse("arr = [3]; x = arr[0];");
        assert!(matches!(stmts[0], Stmt::Assign(..)));
        let Stmt::Assign(_, rhs) = &stmts[1] else { panic!() };
        assert!(matches!(rhs, Expr::Index { .. }));
    }
}
