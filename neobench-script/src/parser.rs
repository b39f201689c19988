use std::collections::BTreeSet;

use crate::error::ParseError;
use crate::expr::Expr;
use crate::lexer::{Lexer, Tok, Token};
use crate::script::{Command, Script, SleepUnit};

/// Parse one script. `name` is the path the script came from (or
/// `builtin:<id>`) and is used in error messages and for resolving
/// `csv(..)` paths.
///
/// The parser is total: malformed input produces a located error, never a
/// panic. The first error wins.
pub fn parse(name: &str, source: &str, weight: f64) -> Result<Script, ParseError> {
    let mut parser = Parser::new(name, source);
    let mut commands = Vec::new();
    let mut autocommit = false;

    loop {
        let t = parser.peek()?.clone();
        match &t.tok {
            Tok::Eof => break,
            Tok::Newline => {
                parser.next()?;
            }
            Tok::Punct(':') => {
                if let Some(command) = parser.meta_command(&mut autocommit)? {
                    commands.push(command);
                }
            }
            Tok::Punct('\\') => {
                return Err(parser.error_at(
                    &t,
                    "meta-commands now use ':' rather than '\\' as prefix",
                ));
            }
            _ => commands.push(parser.query_command(&t)?),
        }
    }

    Ok(Script {
        name: name.to_string(),
        weight,
        readonly: false,
        autocommit,
        commands,
    })
}

struct Parser<'a> {
    file: String,
    lexer: Lexer<'a>,
    // Pushback stack for lookahead; Next pops this before asking the
    // lexer, which is what makes the two-token list-comprehension
    // disambiguation possible.
    stack: Vec<Token>,
}

impl<'a> Parser<'a> {
    fn new(file: &str, source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        // Meta-commands are line-oriented, so newlines are tokens here.
        lexer.newlines = true;
        Parser {
            file: file.to_string(),
            lexer,
            stack: Vec::new(),
        }
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.stack.is_empty() {
            let t = self.lexer.next_token(&self.file)?;
            self.stack.push(t);
        }
        Ok(self.stack.last().expect("just pushed"))
    }

    fn peek_tok(&mut self) -> Result<Tok, ParseError> {
        Ok(self.peek()?.tok.clone())
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        if let Some(t) = self.stack.pop() {
            return Ok(t);
        }
        self.lexer.next_token(&self.file)
    }

    fn push(&mut self, t: Token) {
        self.stack.push(t);
    }

    fn error_at(&self, t: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(message, &self.file, t.line, t.col)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, &self.file, self.lexer.line(), self.lexer.col())
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        let t = self.next()?;
        if t.tok == Tok::Punct(c) {
            Ok(())
        } else {
            Err(self.error_at(&t, format!("expected '{c}', got '{}'", t.tok)))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        let t = self.next()?;
        match t.tok {
            Tok::Ident(s) | Tok::Quoted(s) => Ok(s),
            other => Err(ParseError::new(
                format!("expected identifier, got '{other}'"),
                &self.file,
                t.line,
                t.col,
            )),
        }
    }

    fn meta_command(&mut self, autocommit: &mut bool) -> Result<Option<Command>, ParseError> {
        self.next()?; // the ':'
        let cmd_tok = self.next()?;
        let cmd = match &cmd_tok.tok {
            Tok::Ident(s) => s.clone(),
            other => {
                return Err(self.error_at(
                    &cmd_tok,
                    format!("expected meta command name, got '{other}'"),
                ));
            }
        };

        match cmd.as_str() {
            "set" => {
                let var = self.ident()?;
                let expr = self.expr()?;
                Ok(Some(Command::Set { var, expr }))
            }
            "sleep" => {
                let duration = self.expr()?;
                let unit = match self.peek_tok()? {
                    Tok::Newline | Tok::Eof => SleepUnit::Seconds,
                    _ => {
                        let t = self.next()?;
                        let unit_text = t.tok.to_string();
                        match unit_text.as_str() {
                            "s" => SleepUnit::Seconds,
                            "ms" => SleepUnit::Millis,
                            "us" => SleepUnit::Micros,
                            _ => {
                                return Err(self.error_at(
                                    &t,
                                    format!(
                                        ":sleep command must use 'us', 'ms', or 's' unit \
                                         argument - or none. got: {unit_text}"
                                    ),
                                ));
                            }
                        }
                    }
                };
                Ok(Some(Command::Sleep { duration, unit }))
            }
            "opt" => {
                let option = self.ident()?;
                match option.as_str() {
                    "autocommit" => {
                        *autocommit = true;
                        Ok(None)
                    }
                    _ => Err(self.error_here(format!("unknown script option: '{option}'"))),
                }
            }
            _ => Err(self.error_at(&cmd_tok, format!("unexpected meta command: ':{cmd}'"))),
        }
    }

    /// Read a query command verbatim, from the start of the token the
    /// top-level loop peeked at, up to the terminating `;`.
    fn query_command(&mut self, first: &Token) -> Result<Command, ParseError> {
        self.next()?; // pop the peeked first token
        debug_assert!(self.stack.is_empty());
        self.lexer.seek(first.start, first.line, first.col);
        let text = self.lexer.raw_query();
        let (remote_params, local_params) = extract_params(&text, &self.file);
        Ok(Command::Query {
            text,
            remote_params,
            local_params,
        })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        loop {
            match self.peek_tok()? {
                Tok::Punct(op @ ('+' | '-')) => {
                    self.next()?;
                    let rhs = self.term()?;
                    lhs = Expr::Call {
                        name: op.to_string(),
                        args: vec![lhs, rhs],
                    };
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.factor()?;
        loop {
            match self.peek_tok()? {
                Tok::Punct(op @ ('*' | '/' | '%')) => {
                    self.next()?;
                    let rhs = self.factor()?;
                    lhs = Expr::Call {
                        name: op.to_string(),
                        args: vec![lhs, rhs],
                    };
                }
                Tok::Punct('[') => {
                    self.next()?;
                    let index = self.expr()?;
                    self.expect(']')?;
                    lhs = Expr::Index {
                        src: Box::new(lhs),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let t = self.next()?;
        let tok = t.tok.clone();
        match tok {
            Tok::Int(i) => Ok(Expr::Int(i)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::Ident(name) => {
                if name == "true" && self.peek_tok()? != Tok::Punct('(') {
                    return Ok(Expr::Bool(true));
                }
                if name == "false" && self.peek_tok()? != Tok::Punct('(') {
                    return Ok(Expr::Bool(false));
                }
                self.expect('(')?;
                let mut args = Vec::new();
                while self.peek_tok()? != Tok::Punct(')') {
                    if !args.is_empty() {
                        self.expect(',')?;
                    }
                    args.push(self.expr()?);
                }
                self.next()?; // ')'
                Ok(Expr::Call { name, args })
            }
            Tok::Punct('(') => {
                let inner = self.expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            Tok::Punct('-') => {
                let n = self.next()?;
                match n.tok {
                    Tok::Int(i) => Ok(Expr::Int(-i)),
                    Tok::Float(f) => Ok(Expr::Float(-f)),
                    other => Err(ParseError::new(
                        format!("unexpected token, expected number after minus sign: '{other}'"),
                        &self.file,
                        n.line,
                        n.col,
                    )),
                }
            }
            Tok::Punct('$') => Ok(Expr::Var(self.ident()?)),
            Tok::Punct('[') => {
                // Telling lists from comprehensions needs two tokens of
                // lookahead: step forward once, peek, then push back.
                let p1 = self.next()?;
                let p1_is_ident = matches!(p1.tok, Tok::Ident(_));
                let p2_is_in =
                    matches!(&self.peek()?.tok, Tok::Ident(s) if s.eq_ignore_ascii_case("in"));
                self.push(p1);

                if p1_is_ident && p2_is_in {
                    return self.list_comprehension();
                }

                let mut items = Vec::new();
                while self.peek_tok()? != Tok::Punct(']') {
                    if !items.is_empty() {
                        self.expect(',')?;
                    }
                    items.push(self.expr()?);
                }
                self.next()?; // ']'
                Ok(Expr::List(items))
            }
            Tok::Punct('{') => {
                let mut entries = Vec::new();
                while self.peek_tok()? != Tok::Punct('}') {
                    if !entries.is_empty() {
                        self.expect(',')?;
                    }
                    let key = self.ident()?;
                    self.expect(':')?;
                    let value = self.expr()?;
                    entries.push((key, value));
                }
                self.next()?; // '}'
                Ok(Expr::Map(entries))
            }
            other => Err(self.error_at(
                &t,
                format!("unexpected token, expected expression: '{other}'"),
            )),
        }
    }

    fn list_comprehension(&mut self) -> Result<Expr, ParseError> {
        let item = self.ident()?;
        let kw_tok = self.next()?;
        let keyword = kw_tok.tok.to_string();
        if !keyword.eq_ignore_ascii_case("in") {
            return Err(self.error_at(
                &kw_tok,
                format!(
                    "don't know what '[ {item} {keyword} ..' means, \
                     did you mean to add a comma after '{item}'"
                ),
            ));
        }
        let src = self.expr()?;
        self.expect('|')?;
        let out = self.expr()?;
        self.expect(']')?;
        Ok(Expr::ListComp {
            item,
            src: Box::new(src),
            out: Box::new(out),
        })
    }
}

/// Scan a query's text for the parameters it references: `$name`,
/// `{name}` and `` {`name`} `` are sent as driver parameters, `$$name` is
/// substituted client-side. Anything that doesn't match those patterns is
/// left alone; a lexing error just ends the scan.
fn extract_params(query: &str, file: &str) -> (Vec<String>, Vec<String>) {
    let mut remote = BTreeSet::new();
    let mut local = BTreeSet::new();

    let mut lexer = Lexer::new(query);
    let mut pending: Option<Token> = None;

    fn take(lexer: &mut Lexer<'_>, pending: &mut Option<Token>, file: &str) -> Option<Token> {
        if let Some(t) = pending.take() {
            return Some(t);
        }
        lexer.next_token(file).ok()
    }

    loop {
        let Some(t) = take(&mut lexer, &mut pending, file) else {
            break;
        };
        match t.tok {
            Tok::Eof => break,
            Tok::Punct('$') => {
                let Some(n1) = take(&mut lexer, &mut pending, file) else {
                    break;
                };
                match n1.tok {
                    Tok::Punct('$') => {
                        let Some(n2) = take(&mut lexer, &mut pending, file) else {
                            break;
                        };
                        match n2.tok {
                            Tok::Ident(name) | Tok::Quoted(name) => {
                                local.insert(name);
                            }
                            _ => pending = Some(n2),
                        }
                    }
                    Tok::Ident(name) | Tok::Quoted(name) => {
                        remote.insert(name);
                    }
                    _ => pending = Some(n1),
                }
            }
            // '{' is ambiguous; only the exact pattern `{ ident }` is a
            // parameter reference.
            Tok::Punct('{') => {
                let Some(n1) = take(&mut lexer, &mut pending, file) else {
                    break;
                };
                match n1.tok {
                    Tok::Ident(name) | Tok::Quoted(name) => {
                        let Some(n2) = take(&mut lexer, &mut pending, file) else {
                            break;
                        };
                        if n2.tok == Tok::Punct('}') {
                            remote.insert(name);
                        } else {
                            pending = Some(n2);
                        }
                    }
                    _ => pending = Some(n1),
                }
            }
            _ => {}
        }
    }

    (
        remote.into_iter().collect(),
        local.into_iter().collect(),
    )
}
