//! Tokenizer: turns source text into a flat token stream.
//!
//! Out of scope per the language design (a thin collaborator): this module
//! owns only the character-level rules fixed by the grammar. It has no
//! knowledge of statements or expressions.

use crate::{
    error::CompileError,
    token::{CodeLoc, CodeRange, Keyword, Token, TokenKind},
};

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenizes the whole input, including a trailing [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let start = self.loc();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    range: CodeRange { start, end: start },
                });
                break;
            };
            let kind = self.next_token(c)?;
            let end = self.loc();
            tokens.push(Token {
                kind,
                range: CodeRange { start, end },
            });
        }
        Ok(tokens)
    }

    fn next_token(&mut self, c: u8) -> Result<TokenKind, CompileError> {
        match c {
            b'0'..=b'9' => Ok(self.lex_int()),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Ok(self.lex_ident_or_keyword()),
            b'\'' => self.lex_char(),
            b'"' => self.lex_string(),
            b':' => {
                self.advance();
                if self.peek() == Some(b'=') {
                    self.advance();
                    Ok(TokenKind::Bind)
                } else if self.peek() == Some(b':') && self.peek_at(1) == Some(b'=') {
                    self.advance();
                    self.advance();
                    Ok(TokenKind::ReactiveBind)
                } else {
                    Ok(TokenKind::Colon)
                }
            }
            b'=' => {
                self.advance();
                if self.eat(b'=') {
                    Ok(TokenKind::EqEq)
                } else {
                    Ok(TokenKind::Assign)
                }
            }
            b'!' => {
                self.advance();
                if self.eat(b'=') {
                    Ok(TokenKind::NotEq)
                } else {
                    Ok(TokenKind::Bang)
                }
            }
            b'<' => {
                self.advance();
                if self.eat(b'=') {
                    Ok(TokenKind::LtEq)
                } else {
                    Ok(TokenKind::Lt)
                }
            }
            b'>' => {
                self.advance();
                if self.eat(b'=') {
                    Ok(TokenKind::GtEq)
                } else {
                    Ok(TokenKind::Gt)
                }
            }
            b'&' => {
                self.advance();
                if self.eat(b'&') {
                    Ok(TokenKind::AndAnd)
                } else {
                    Err(self.lex_error("expected `&&`"))
                }
            }
            b'|' => {
                self.advance();
                if self.eat(b'|') {
                    Ok(TokenKind::OrOr)
                } else {
                    Err(self.lex_error("expected `||`"))
                }
            }
            b'+' => {
                self.advance();
                Ok(TokenKind::Plus)
            }
            b'-' => {
                self.advance();
                Ok(TokenKind::Minus)
            }
            b'*' => {
                self.advance();
                Ok(TokenKind::Star)
            }
            b'/' => {
                self.advance();
                Ok(TokenKind::Slash)
            }
            b'%' => {
                self.advance();
                Ok(TokenKind::Percent)
            }
            b'(' => {
                self.advance();
                Ok(TokenKind::LParen)
            }
            b')' => {
                self.advance();
                Ok(TokenKind::RParen)
            }
            b'{' => {
                self.advance();
                Ok(TokenKind::LBrace)
            }
            b'}' => {
                self.advance();
                Ok(TokenKind::RBrace)
            }
            b'[' => {
                self.advance();
                Ok(TokenKind::LBracket)
            }
            b']' => {
                self.advance();
                Ok(TokenKind::RBracket)
            }
            b',' => {
                self.advance();
                Ok(TokenKind::Comma)
            }
            b';' => {
                self.advance();
                Ok(TokenKind::Semi)
            }
            b'.' => {
                self.advance();
                Ok(TokenKind::Dot)
            }
            b'?' => {
                self.advance();
                Ok(TokenKind::Question)
            }
            other => {
                self.advance();
                Err(self.lex_error(&format!("unrecognized character `{}`", other as char)))
            }
        }
    }

    fn lex_int(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii digits");
        // Overflow saturates rather than failing lexing; spec arithmetic is 32-bit wrapping
        // from this point on, but the literal itself should not panic on huge inputs.
        let value = text.parse::<i64>().unwrap_or(i64::MAX);
        TokenKind::Int(value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
    }

    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii ident").to_owned();
        match Keyword::from_word(&text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text),
        }
    }

    fn lex_escape(&mut self) -> Result<i32, CompileError> {
        let Some(c) = self.peek() else {
            return Err(self.lex_error("unterminated escape sequence"));
        };
        self.advance();
        Ok(match c {
            b'n' => '\n' as i32,
            b't' => '\t' as i32,
            b'r' => '\r' as i32,
            b'0' => 0,
            b'\'' => '\'' as i32,
            b'"' => '"' as i32,
            b'\\' => '\\' as i32,
            other => return Err(self.lex_error(&format!("invalid escape `\\{}`", other as char))),
        })
    }

    fn lex_char(&mut self) -> Result<TokenKind, CompileError> {
        self.advance(); // opening '
        let value = match self.peek() {
            Some(b'\\') => {
                self.advance();
                self.lex_escape()?
            }
            Some(_) => {
                let c = self.advance_char().expect("byte peek above confirmed a char follows");
                c as i32
            }
            None => return Err(self.lex_error("unterminated char literal")),
        };
        if self.peek() != Some(b'\'') {
            return Err(self.lex_error("unterminated char literal"));
        }
        self.advance();
        Ok(TokenKind::Char(value))
    }

    fn lex_string(&mut self) -> Result<TokenKind, CompileError> {
        self.advance(); // opening "
        let mut s = String::new();
        loop {
            match self.peek() {
                None => return Err(self.lex_error("unterminated string literal")),
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let code = self.lex_escape()?;
                    s.push(char::from_u32(code as u32).unwrap_or('\u{fffd}'));
                }
                Some(_) => {
                    let c = self.advance_char().expect("byte peek above confirmed a char follows");
                    s.push(c);
                }
            }
        }
        Ok(TokenKind::Str(s))
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'#') => {
                    let start = self.loc();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(CompileError::Lex {
                                    message: "unterminated comment".to_owned(),
                                    at: CodeRange { start, end: start },
                                });
                            }
                            Some(b'#') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Decodes the full Unicode scalar starting at `pos`, without advancing.
    /// `pos` always sits on a char boundary: every other cursor move steps
    /// by a single ASCII byte or by a whole scalar via [`Self::advance_char`].
    fn peek_char(&self) -> Option<char> {
        let rest = self.src.get(self.pos..)?;
        if rest.is_empty() {
            return None;
        }
        std::str::from_utf8(rest).ok()?.chars().next()
    }

    /// Advances past one full Unicode scalar (which may be several bytes),
    /// so a multi-byte code point is consumed as a single `char`/`i32`
    /// rather than split across its UTF-8 bytes.
    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += 1;
            if c == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn loc(&self) -> CodeLoc {
        CodeLoc {
            line: self.line,
            col: self.col,
        }
    }

    fn lex_error(&self, message: &str) -> CompileError {
        let at = self.loc();
        CompileError::Lex {
            message: message.to_owned(),
            at: CodeRange { start: at, end: at },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn longest_match_on_colon_forms() {
        assert_eq!(kinds(":"), vec![TokenKind::Colon, TokenKind::Eof]);
        assert_eq!(kinds(":="), vec![TokenKind::Bind, TokenKind::Eof]);
        assert_eq!(kinds("::="), vec![TokenKind::ReactiveBind, TokenKind::Eof]);
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("== != >= <= && ||"),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::GtEq,
                TokenKind::LtEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn delimited_comment_is_not_line_terminated() {
        assert_eq!(kinds("1 # a\nb # 2"), vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]);
    }

    #[test]
    fn char_escapes() {
        assert_eq!(kinds(r"'\n'"), vec![TokenKind::Char('\n' as i32), TokenKind::Eof]);
    }

    #[test]
    fn string_with_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str("a\nb".to_owned()), TokenKind::Eof]
        );
    }

    #[test]
    fn non_ascii_char_literal_is_one_code_point() {
        assert_eq!(kinds("'é'"), vec![TokenKind::Char('é' as i32), TokenKind::Eof]);
    }

    #[test]
    fn non_ascii_string_literal_keeps_each_scalar_as_one_char() {
        assert_eq!(kinds(r#""café""#), vec![TokenKind::Str("café".to_owned()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_comment_is_fatal() {
        assert!(Lexer::new("1 # oops").tokenize().is_err());
    }

    #[test]
    fn unrecognized_character_fails_with_position() {
        let err = Lexer::new("x = 1 @ 2").tokenize().unwrap_err();
        match err {
            CompileError::Lex { at, .. } => assert_eq!(at.start.col, 7),
            _ => panic!("expected lex error"),
        }
    }
}
