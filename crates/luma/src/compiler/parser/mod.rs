// Recursive-descent statement parser over the token stream. Expressions are
// handled by the Pratt layer in expr_parser.rs. The parser keeps going after
// an error where it can, resynchronizing at the next statement boundary, so
// one pass can report several problems.

pub mod ast;
pub mod error;
mod expr_parser;

use crate::compiler::lexer::{LuaLexer, LuaToken, LuaTokenKind, Position};
use ast::{Block, Expr, FuncBody, FuncName, Meta, Stat};
use error::{SyntaxError, SyntaxErrorKind};
use smol_str::SmolStr;

pub struct LuaParser {
    tokens: Vec<LuaToken>,
    pos: usize,
    /// Comment text waiting to be attached, with the comment's line.
    pending_comments: Vec<(String, u32)>,
    errors: Vec<SyntaxError>,
    /// Open delimiters/blocks awaiting their closer, for unclosed-delimiter
    /// diagnostics: (opening token, position).
    delimiters: Vec<(LuaTokenKind, Position)>,
    /// Line of the most recently consumed non-comment token.
    last_line: u32,
}

impl LuaParser {
    /// Parse a full chunk. On failure returns every error collected during
    /// the recovery passes, in source order.
    pub fn parse(source: &str) -> Result<Block, Vec<SyntaxError>> {
        let tokens = LuaLexer::new(source).tokenize().map_err(|e| vec![e])?;
        let mut parser = LuaParser {
            tokens,
            pos: 0,
            pending_comments: Vec::new(),
            errors: Vec::new(),
            delimiters: Vec::new(),
            last_line: 1,
        };

        let block = parser.parse_block();
        if parser.peek_kind() != LuaTokenKind::TkEof {
            let tok = parser.peek().clone();
            parser.record_error(SyntaxError::new(
                SyntaxErrorKind::UnexpectedToken,
                format!("unexpected {} near end of chunk", tok.kind.describe()),
                tok.position,
            ));
        }

        if parser.errors.is_empty() {
            Ok(block)
        } else {
            Err(parser.errors)
        }
    }

    // ---- token cursor -----------------------------------------------------

    fn peek_raw(&self) -> &LuaToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Move over comment tokens, stashing their text for attachment to
    /// statement metadata.
    fn drain_comments(&mut self) {
        while self.peek_raw().kind.is_comment() {
            let line = self.tokens[self.pos].position.line;
            if let Some(text) = self.tokens[self.pos].text() {
                self.pending_comments.push((text.to_string(), line));
            }
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> &LuaToken {
        self.drain_comments();
        self.peek_raw()
    }

    fn peek_kind(&mut self) -> LuaTokenKind {
        self.peek().kind
    }

    /// Lookahead past the next (non-comment) token.
    fn peek_ahead(&mut self, n: usize) -> LuaTokenKind {
        self.drain_comments();
        let mut idx = self.pos;
        let mut remaining = n;
        while idx < self.tokens.len() {
            if self.tokens[idx].kind.is_comment() {
                idx += 1;
                continue;
            }
            if remaining == 0 {
                return self.tokens[idx].kind;
            }
            remaining -= 1;
            idx += 1;
        }
        LuaTokenKind::TkEof
    }

    fn next(&mut self) -> LuaToken {
        self.drain_comments();
        let token = self.peek_raw().clone();
        if token.kind != LuaTokenKind::TkEof {
            self.pos += 1;
        }
        self.last_line = token.position.line;
        token
    }

    fn accept(&mut self, kind: LuaTokenKind) -> Option<LuaToken> {
        if self.peek_kind() == kind {
            Some(self.next())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: LuaTokenKind) -> Result<LuaToken, SyntaxError> {
        let found = self.peek().clone();
        if found.kind == kind {
            Ok(self.next())
        } else if found.kind == LuaTokenKind::TkEof {
            Err(SyntaxError::new(
                SyntaxErrorKind::UnexpectedEnd,
                format!("{} expected near <eof>", kind.describe()),
                found.position,
            ))
        } else {
            Err(SyntaxError::new(
                SyntaxErrorKind::ExpectedToken,
                format!(
                    "{} expected near {}",
                    kind.describe(),
                    found.kind.describe()
                ),
                found.position,
            ))
        }
    }

    fn expect_name(&mut self) -> Result<(SmolStr, Position), SyntaxError> {
        let token = self.expect(LuaTokenKind::TkName)?;
        let name = token.name().cloned().unwrap_or_default();
        Ok((name, token.position))
    }

    /// Expect the closing half of a delimiter pair opened at `open_pos`.
    fn expect_close(
        &mut self,
        close: LuaTokenKind,
        open: LuaTokenKind,
        open_pos: Position,
    ) -> Result<LuaToken, SyntaxError> {
        self.delimiters.pop();
        if self.peek_kind() == close {
            return Ok(self.next());
        }
        let found = self.peek().clone();
        let kind = if found.kind == LuaTokenKind::TkEof {
            SyntaxErrorKind::UnclosedDelimiter
        } else {
            SyntaxErrorKind::ExpectedToken
        };
        Err(SyntaxError::new(
            kind,
            format!(
                "{} expected (to close {} at line {}) near {}",
                close.describe(),
                open.describe(),
                open_pos.line,
                found.kind.describe()
            ),
            found.position,
        ))
    }

    fn open_delimiter(&mut self, kind: LuaTokenKind, position: Position) {
        self.delimiters.push((kind, position));
    }

    fn record_error(&mut self, error: SyntaxError) {
        self.errors.push(error);
    }

    // ---- blocks and statements -------------------------------------------

    fn at_block_end(&mut self) -> bool {
        matches!(
            self.peek_kind(),
            LuaTokenKind::TkEnd
                | LuaTokenKind::TkElse
                | LuaTokenKind::TkElseIf
                | LuaTokenKind::TkUntil
                | LuaTokenKind::TkEof
        )
    }

    fn parse_block(&mut self) -> Block {
        let mut stats = Vec::new();
        while !self.at_block_end() {
            let leading = std::mem::take(&mut self.pending_comments);
            match self.parse_stat() {
                Ok(Some(mut stat)) => {
                    let stat_line = stat.position().line;
                    // Pull in any comment sitting right after the statement.
                    self.drain_comments();
                    let meta = stat.meta_mut();
                    meta.leading_comments = leading.into_iter().map(|(text, _)| text).collect();
                    // A comment on the statement's own line trails it; later
                    // lines lead the next statement instead.
                    let trailing_line = self.pending_comments.first().map(|(_, line)| *line);
                    if trailing_line == Some(stat_line) {
                        meta.trailing_comment = Some(self.pending_comments.remove(0).0);
                    }
                    let is_return = matches!(stat, Stat::Return { .. });
                    stats.push(stat);
                    if is_return {
                        if !self.at_block_end() {
                            let tok = self.peek().clone();
                            self.record_error(SyntaxError::new(
                                SyntaxErrorKind::UnexpectedToken,
                                "'return' must be the last statement in a block".to_string(),
                                tok.position,
                            ));
                            self.resync();
                        }
                        break;
                    }
                }
                Ok(None) => {
                    // Empty statement; keep the comments for the next one.
                    let mut merged = leading;
                    merged.append(&mut self.pending_comments);
                    self.pending_comments = merged;
                }
                Err(error) => {
                    self.record_error(error);
                    self.resync();
                }
            }
        }
        stats
    }

    /// Skip tokens until a plausible statement boundary.
    fn resync(&mut self) {
        use LuaTokenKind::*;
        loop {
            match self.peek_kind() {
                TkSemicolon => {
                    self.next();
                    return;
                }
                TkEof | TkEnd | TkElse | TkElseIf | TkUntil | TkLocal | TkIf | TkWhile | TkFor
                | TkRepeat | TkFunction | TkReturn | TkBreak | TkDo => return,
                _ => {
                    self.next();
                }
            }
        }
    }

    fn parse_stat(&mut self) -> Result<Option<Stat>, SyntaxError> {
        use LuaTokenKind::*;
        let token = self.peek().clone();
        let position = token.position;
        match token.kind {
            TkSemicolon => {
                self.next();
                Ok(None)
            }
            TkIf => self.parse_if(position).map(Some),
            TkWhile => self.parse_while(position).map(Some),
            TkDo => {
                self.next();
                self.open_delimiter(TkDo, position);
                let body = self.parse_block();
                self.expect_close(TkEnd, TkDo, position)?;
                Ok(Some(Stat::Do(body, Meta::at(position))))
            }
            TkFor => self.parse_for(position).map(Some),
            TkRepeat => self.parse_repeat(position).map(Some),
            TkFunction => self.parse_function_stat(position).map(Some),
            TkLocal => self.parse_local(position).map(Some),
            TkReturn => self.parse_return(position).map(Some),
            TkBreak => {
                self.next();
                Ok(Some(Stat::Break(Meta::at(position))))
            }
            TkGoto => {
                self.next();
                let (name, _) = self.expect_name()?;
                Ok(Some(Stat::Goto(name, Meta::at(position))))
            }
            TkDbColon => {
                self.next();
                let (name, _) = self.expect_name()?;
                self.expect(TkDbColon)?;
                Ok(Some(Stat::Label(name, Meta::at(position))))
            }
            _ => self.parse_expr_stat(position).map(Some),
        }
    }

    fn parse_if(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        self.next();
        self.open_delimiter(TkIf, position);
        let mut arms = Vec::new();

        let cond = self.parse_expr_top()?;
        self.expect(TkThen)?;
        let body = self.parse_block();
        arms.push((cond, body));

        let mut else_block = None;
        loop {
            match self.peek_kind() {
                TkElseIf => {
                    self.next();
                    let cond = self.parse_expr_top()?;
                    self.expect(TkThen)?;
                    let body = self.parse_block();
                    arms.push((cond, body));
                }
                TkElse => {
                    self.next();
                    else_block = Some(self.parse_block());
                    self.expect_close(TkEnd, TkIf, position)?;
                    break;
                }
                _ => {
                    self.expect_close(TkEnd, TkIf, position)?;
                    break;
                }
            }
        }

        Ok(Stat::If {
            arms,
            else_block,
            meta: Meta::at(position),
        })
    }

    fn parse_while(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        self.next();
        self.open_delimiter(TkWhile, position);
        let cond = self.parse_expr_top()?;
        self.expect(TkDo)?;
        let body = self.parse_block();
        self.expect_close(TkEnd, TkWhile, position)?;
        Ok(Stat::While {
            cond,
            body,
            meta: Meta::at(position),
        })
    }

    fn parse_repeat(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        self.next();
        let body = self.parse_block();
        self.expect(TkUntil)?;
        let cond = self.parse_expr_top()?;
        Ok(Stat::Repeat {
            body,
            cond,
            meta: Meta::at(position),
        })
    }

    fn parse_for(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        self.next();
        self.open_delimiter(TkFor, position);
        let (first, _) = self.expect_name()?;

        if self.accept(TkAssign).is_some() {
            // Numeric: for i = start, limit [, step] do
            let start = self.parse_expr_top()?;
            self.expect(TkComma)?;
            let limit = self.parse_expr_top()?;
            let step = if self.accept(TkComma).is_some() {
                Some(self.parse_expr_top()?)
            } else {
                None
            };
            self.expect(TkDo)?;
            let body = self.parse_block();
            self.expect_close(TkEnd, TkFor, position)?;
            return Ok(Stat::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
                meta: Meta::at(position),
            });
        }

        // Generic: for a, b in explist do
        let mut names = vec![first];
        while self.accept(TkComma).is_some() {
            names.push(self.expect_name()?.0);
        }
        self.expect(TkIn)?;
        let exprs = self.parse_explist()?;
        self.expect(TkDo)?;
        let body = self.parse_block();
        self.expect_close(TkEnd, TkFor, position)?;
        Ok(Stat::GenericFor {
            names,
            exprs,
            body,
            meta: Meta::at(position),
        })
    }

    fn parse_function_stat(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        self.next();
        let (base, _) = self.expect_name()?;
        let mut path = Vec::new();
        while self.accept(TkDot).is_some() {
            path.push(self.expect_name()?.0);
        }
        let method = if self.accept(TkColon).is_some() {
            Some(self.expect_name()?.0)
        } else {
            None
        };
        let name = FuncName { base, path, method };
        let is_method = name.method.is_some();
        let mut body = self.parse_funcbody(position, Some(name.dotted()))?;
        if is_method {
            body.params.insert(0, SmolStr::new("self"));
        }
        Ok(Stat::Function {
            name,
            body: Box::new(body),
            meta: Meta::at(position),
        })
    }

    fn parse_local(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        self.next();
        if self.accept(TkFunction).is_some() {
            let (name, name_pos) = self.expect_name()?;
            let body = self.parse_funcbody(name_pos, Some(name.to_string()))?;
            return Ok(Stat::LocalFunction {
                name,
                body: Box::new(body),
                meta: Meta::at(position),
            });
        }

        let mut names = vec![self.expect_name()?.0];
        while self.accept(TkComma).is_some() {
            names.push(self.expect_name()?.0);
        }
        let values = if self.accept(TkAssign).is_some() {
            self.parse_explist()?
        } else {
            Vec::new()
        };
        Ok(Stat::Local {
            names,
            values,
            meta: Meta::at(position),
        })
    }

    fn parse_return(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        self.next();
        let exprs = if self.at_block_end() || self.peek_kind() == TkSemicolon {
            Vec::new()
        } else {
            self.parse_explist()?
        };
        self.accept(TkSemicolon);
        Ok(Stat::Return {
            exprs,
            meta: Meta::at(position),
        })
    }

    /// Expression statement: either a call or the start of an assignment.
    fn parse_expr_stat(&mut self, position: Position) -> Result<Stat, SyntaxError> {
        use LuaTokenKind::*;
        let first = self.parse_suffixed_expr()?;

        if self.peek_kind() == TkAssign || self.peek_kind() == TkComma {
            let mut targets = vec![first];
            while self.accept(TkComma).is_some() {
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(target, Expr::Name(..) | Expr::Index { .. }) {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedToken,
                        "cannot assign to this expression".to_string(),
                        target.position(),
                    ));
                }
            }
            self.expect(TkAssign)?;
            let values = self.parse_explist()?;
            return Ok(Stat::Assign {
                targets,
                values,
                meta: Meta::at(position),
            });
        }

        if matches!(first, Expr::Call { .. } | Expr::MethodCall { .. }) {
            return Ok(Stat::Call(first, Meta::at(position)));
        }

        Err(SyntaxError::new(
            SyntaxErrorKind::UnexpectedToken,
            "syntax error: expression is not a statement".to_string(),
            position,
        ))
    }

    fn parse_explist(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut exprs = vec![self.parse_expr_top()?];
        while self.accept(LuaTokenKind::TkComma).is_some() {
            exprs.push(self.parse_expr_top()?);
        }
        Ok(exprs)
    }

    fn parse_funcbody(
        &mut self,
        position: Position,
        name: Option<String>,
    ) -> Result<FuncBody, SyntaxError> {
        use LuaTokenKind::*;
        let open = self.expect(TkLeftParen)?;
        self.open_delimiter(TkFunction, position);

        let mut params = Vec::new();
        let mut is_vararg = false;
        if self.peek_kind() != TkRightParen {
            loop {
                match self.peek_kind() {
                    TkDots => {
                        self.next();
                        is_vararg = true;
                        break;
                    }
                    TkName => {
                        params.push(self.expect_name()?.0);
                    }
                    _ => {
                        let tok = self.peek().clone();
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::ExpectedToken,
                            format!("<name> or '...' expected near {}", tok.kind.describe()),
                            tok.position,
                        ));
                    }
                }
                if self.accept(TkComma).is_none() {
                    break;
                }
            }
        }
        self.expect_close(TkRightParen, TkLeftParen, open.position)?;

        let block = self.parse_block();
        self.expect(TkEnd)?;

        Ok(FuncBody {
            params,
            is_vararg,
            block,
            position,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Block {
        LuaParser::parse(source).expect("parse failed")
    }

    #[test]
    fn statement_positions_match_first_token() {
        let block = parse("local a = 1\n  return a");
        assert_eq!(block[0].position(), Position::new(1, 1));
        assert_eq!(block[1].position(), Position::new(2, 3));
    }

    #[test]
    fn leading_and_trailing_comments_attach() {
        let block = parse("-- first\n-- second\nlocal a = 1 -- trailing\nreturn a");
        let meta = block[0].meta();
        assert_eq!(meta.leading_comments, vec!["first", "second"]);
        assert_eq!(meta.trailing_comment.as_deref(), Some("trailing"));
        assert!(block[1].meta().trailing_comment.is_none());
    }

    #[test]
    fn local_function_and_method_sugar() {
        let block = parse("local function f() end\nfunction t.a:m(x) end");
        assert!(matches!(&block[0], Stat::LocalFunction { name, .. } if name == "f"));
        match &block[1] {
            Stat::Function { name, body, .. } => {
                assert_eq!(name.dotted(), "t.a:m");
                assert_eq!(body.params[0], "self");
                assert_eq!(body.params[1], "x");
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn numeric_and_generic_for() {
        let block = parse("for i = 1, 10, 2 do end\nfor k, v in pairs(t) do end");
        assert!(matches!(&block[0], Stat::NumericFor { step: Some(_), .. }));
        assert!(matches!(&block[1], Stat::GenericFor { names, .. } if names.len() == 2));
    }

    #[test]
    fn return_must_be_last() {
        let errs = LuaParser::parse("return 1\nlocal x = 2").unwrap_err();
        assert!(errs[0].message.contains("last statement"));
    }

    #[test]
    fn recovers_and_reports_multiple_errors() {
        let errs = LuaParser::parse("local = 1\nlocal y = 2 +\nreturn y").unwrap_err();
        assert!(errs.len() >= 2, "expected several errors, got {:?}", errs);
    }

    #[test]
    fn unclosed_delimiter_diagnostics() {
        let errs = LuaParser::parse("if x then\nlocal y = 1\n").unwrap_err();
        assert!(
            errs.iter()
                .any(|e| e.kind == SyntaxErrorKind::UnclosedDelimiter
                    || e.kind == SyntaxErrorKind::UnexpectedEnd),
            "got {:?}",
            errs
        );
    }
}
