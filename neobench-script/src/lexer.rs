use std::fmt;

use crate::error::ParseError;

/// A single token. String-ish tokens carry their text without the
/// surrounding quotes; interior characters are passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    /// Back-quoted identifier, without the back-ticks.
    Quoted(String),
    Punct(char),
    Newline,
    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Int(i) => write!(f, "{i}"),
            Tok::Float(v) => write!(f, "{v}"),
            Tok::Str(s) => write!(f, "\"{s}\""),
            Tok::Ident(s) | Tok::Quoted(s) => write!(f, "{s}"),
            Tok::Punct(c) => write!(f, "{c}"),
            Tok::Newline => write!(f, "end of line"),
            Tok::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    /// Byte offset of the first character of the token.
    pub start: usize,
    pub line: u32,
    pub col: u32,
}

/// Cypher-compatible tokenizer.
///
/// Whitespace is skipped; newlines are skipped too unless `newlines` is
/// set, in which case they come back as tokens so line-oriented
/// meta-commands know where to stop. `//` comments run to end of line and
/// are always dropped.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    pub newlines: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
            col: 1,
            newlines: false,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    /// Rewind to a previously observed token position.
    pub fn seek(&mut self, pos: usize, line: u32, col: u32) {
        self.pos = pos;
        self.line = line;
        self.col = col;
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek_char() {
            match ch {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' if !self.newlines => {
                    self.bump();
                }
                '/' if self.peek_second() == Some('/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self, file: &str) -> Result<Token, ParseError> {
        self.skip_trivia();

        let (start, line, col) = (self.pos, self.line, self.col);
        let token = |tok| Token {
            tok,
            start,
            line,
            col,
        };

        let Some(ch) = self.peek_char() else {
            return Ok(token(Tok::Eof));
        };

        if ch == '\n' {
            self.bump();
            return Ok(token(Tok::Newline));
        }
        if ch.is_ascii_digit() {
            return self.number(file).map(token);
        }
        if ch.is_alphabetic() || ch == '_' {
            let mut text = String::new();
            while let Some(c) = self.peek_char() {
                if c.is_alphanumeric() || c == '_' {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return Ok(token(Tok::Ident(text)));
        }
        if ch == '"' {
            self.bump();
            let mut text = String::new();
            loop {
                match self.bump() {
                    Some('"') => return Ok(token(Tok::Str(text))),
                    // Escapes are passed through verbatim; the database is
                    // the one that interprets them.
                    Some('\\') => {
                        text.push('\\');
                        if let Some(c) = self.bump() {
                            text.push(c);
                        }
                    }
                    Some(c) => text.push(c),
                    None => {
                        return Err(ParseError::new("unterminated string", file, line, col));
                    }
                }
            }
        }
        if ch == '`' {
            self.bump();
            let mut text = String::new();
            loop {
                match self.bump() {
                    Some('`') => return Ok(token(Tok::Quoted(text))),
                    Some(c) => text.push(c),
                    None => {
                        return Err(ParseError::new(
                            "unterminated back-quoted identifier",
                            file,
                            line,
                            col,
                        ));
                    }
                }
            }
        }

        self.bump();
        Ok(token(Tok::Punct(ch)))
    }

    fn number(&mut self, file: &str) -> Result<Tok, ParseError> {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let second = self.peek_second();
            let digits_follow = match second {
                Some('+' | '-') => true,
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if digits_follow {
                is_float = true;
                text.push('e');
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    text.push(sign);
                    self.bump();
                }
                let mut exp_digits = false;
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        exp_digits = true;
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                if !exp_digits {
                    return Err(ParseError::new(
                        format!("malformed number literal: '{text}'"),
                        file,
                        line,
                        col,
                    ));
                }
            }
        }

        if is_float {
            text.parse::<f64>().map(Tok::Float).map_err(|_| {
                ParseError::new(format!("malformed number literal: '{text}'"), file, line, col)
            })
        } else {
            text.parse::<i64>().map(Tok::Int).map_err(|_| {
                ParseError::new(
                    format!("integer literal out of range: '{text}'"),
                    file,
                    line,
                    col,
                )
            })
        }
    }

    /// Consume raw text until the first `;` outside a string literal or
    /// comment, or end of input. Whitespace is preserved; comments are
    /// dropped; the terminating `;` is consumed but not included.
    pub fn raw_query(&mut self) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                ';' => {
                    self.bump();
                    break;
                }
                '/' if self.peek_second() == Some('/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '"' | '\'' => {
                    let quote = ch;
                    out.push(ch);
                    self.bump();
                    while let Some(c) = self.bump() {
                        out.push(c);
                        if c == '\\' {
                            if let Some(esc) = self.bump() {
                                out.push(esc);
                            }
                            continue;
                        }
                        if c == quote {
                            break;
                        }
                    }
                }
                '`' => {
                    out.push(ch);
                    self.bump();
                    while let Some(c) = self.bump() {
                        out.push(c);
                        if c == '`' {
                            break;
                        }
                    }
                }
                _ => {
                    out.push(ch);
                    self.bump();
                }
            }
        }
        out
    }
}
