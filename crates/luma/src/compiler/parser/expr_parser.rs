// Pratt expression layer. Binary operators are driven by a
// (left_bp, right_bp) table; right-associative operators set
// left_bp > right_bp so the recursion leans right. Unary operators bind
// tighter than '*' but looser than '^', giving -2^2 == -(2^2) and
// -a*b == (-a)*b.

use super::LuaParser;
use super::ast::{BinOp, Expr, Meta, TableItem, UnOp};
use super::error::{SyntaxError, SyntaxErrorKind};
use crate::compiler::lexer::{LuaTokenKind, TokenValue};

/// Binding power of unary `not # - ~`.
const UNARY_BP: u8 = 21;

/// Binding powers per binary token, lowest band first.
fn binary_op(kind: LuaTokenKind) -> Option<(u8, u8, BinOp)> {
    use LuaTokenKind::*;
    let entry = match kind {
        TkOr => (1, 2, BinOp::Or),
        TkAnd => (3, 4, BinOp::And),
        TkLt => (5, 6, BinOp::Lt),
        TkGt => (5, 6, BinOp::Gt),
        TkLe => (5, 6, BinOp::Le),
        TkGe => (5, 6, BinOp::Ge),
        TkEq => (5, 6, BinOp::Eq),
        TkNe => (5, 6, BinOp::Ne),
        TkBitOr => (7, 8, BinOp::BOr),
        TkBitXor => (9, 10, BinOp::BXor),
        TkBitAnd => (11, 12, BinOp::BAnd),
        TkShl => (13, 14, BinOp::Shl),
        TkShr => (13, 14, BinOp::Shr),
        // Right-associative: left > right.
        TkConcat => (16, 15, BinOp::Concat),
        TkPlus => (17, 18, BinOp::Add),
        TkMinus => (17, 18, BinOp::Sub),
        TkMul => (19, 20, BinOp::Mul),
        TkDiv => (19, 20, BinOp::Div),
        TkIDiv => (19, 20, BinOp::IDiv),
        TkMod => (19, 20, BinOp::Mod),
        // Right-associative and above unary.
        TkPow => (24, 23, BinOp::Pow),
        _ => return None,
    };
    Some(entry)
}

fn unary_op(kind: LuaTokenKind) -> Option<UnOp> {
    use LuaTokenKind::*;
    match kind {
        TkMinus => Some(UnOp::Neg),
        TkNot => Some(UnOp::Not),
        TkLen => Some(UnOp::Len),
        TkBitXor => Some(UnOp::BNot),
        _ => None,
    }
}

impl LuaParser {
    pub(super) fn parse_expr_top(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_unit()?;

        loop {
            let Some((left_bp, right_bp, op)) = binary_op(self.peek_kind()) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.next();
            let rhs = self.parse_expr_bp(right_bp)?;
            // The node starts where its leftmost operand starts.
            let start = lhs.position();
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                meta: Meta::at(start),
            };
        }

        Ok(lhs)
    }

    /// Atoms and prefix-unary expressions.
    fn parse_unit(&mut self) -> Result<Expr, SyntaxError> {
        use LuaTokenKind::*;
        let token = self.peek().clone();
        let position = token.position;

        if let Some(op) = unary_op(token.kind) {
            self.next();
            let operand = self.parse_expr_bp(UNARY_BP)?;
            return Ok(Expr::UnOp {
                op,
                operand: Box::new(operand),
                meta: Meta::at(position),
            });
        }

        match token.kind {
            TkNil => {
                self.next();
                Ok(Expr::Nil(Meta::at(position)))
            }
            TkTrue => {
                self.next();
                Ok(Expr::True(Meta::at(position)))
            }
            TkFalse => {
                self.next();
                Ok(Expr::False(Meta::at(position)))
            }
            TkInt => {
                let value = match self.next().value {
                    TokenValue::Int(i) => i,
                    _ => 0,
                };
                Ok(Expr::Int(value, Meta::at(position)))
            }
            TkFloat => {
                let value = match self.next().value {
                    TokenValue::Float(f) => f,
                    _ => 0.0,
                };
                Ok(Expr::Float(value, Meta::at(position)))
            }
            TkString => {
                let value = match self.next().value {
                    TokenValue::Str(s) => s,
                    _ => String::new(),
                };
                Ok(Expr::Str(value, Meta::at(position)))
            }
            TkDots => {
                self.next();
                Ok(Expr::Vararg(Meta::at(position)))
            }
            TkFunction => {
                self.next();
                let body = self.parse_funcbody(position, None)?;
                Ok(Expr::Function(Box::new(body), Meta::at(position)))
            }
            TkLeftBrace => self.parse_table_constructor(),
            TkName | TkLeftParen => self.parse_suffixed_expr(),
            TkEof => Err(SyntaxError::new(
                SyntaxErrorKind::UnexpectedEnd,
                "unexpected end of chunk: expression expected".to_string(),
                position,
            )),
            other => Err(SyntaxError::new(
                SyntaxErrorKind::UnexpectedToken,
                format!("unexpected {}: expression expected", other.describe()),
                position,
            )),
        }
    }

    /// `Name` or `(expr)`, then any run of index/call/method suffixes.
    pub(super) fn parse_suffixed_expr(&mut self) -> Result<Expr, SyntaxError> {
        use LuaTokenKind::*;
        let token = self.peek().clone();
        let position = token.position;

        let mut expr = match token.kind {
            TkName => {
                let tok = self.next();
                Expr::Name(tok.name().cloned().unwrap_or_default(), Meta::at(position))
            }
            TkLeftParen => {
                let open = self.next();
                self.open_delimiter(TkLeftParen, open.position);
                let inner = self.parse_expr_top()?;
                self.expect_close(TkRightParen, TkLeftParen, open.position)?;
                Expr::Paren(Box::new(inner), Meta::at(position))
            }
            other => {
                return Err(SyntaxError::new(
                    SyntaxErrorKind::UnexpectedToken,
                    format!("unexpected {}: expression expected", other.describe()),
                    position,
                ));
            }
        };

        loop {
            match self.peek_kind() {
                TkDot => {
                    self.next();
                    let (name, name_pos) = self.expect_name()?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(Expr::Str(name.to_string(), Meta::at(name_pos))),
                        meta: Meta::at(position),
                    };
                }
                TkLeftBracket => {
                    let open = self.next();
                    self.open_delimiter(TkLeftBracket, open.position);
                    let key = self.parse_expr_top()?;
                    self.expect_close(TkRightBracket, TkLeftBracket, open.position)?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(key),
                        meta: Meta::at(position),
                    };
                }
                TkColon => {
                    self.next();
                    let (name, _) = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall {
                        obj: Box::new(expr),
                        name,
                        args,
                        meta: Meta::at(position),
                    };
                }
                TkLeftParen => {
                    // A '(' opening on a fresh line after a complete prefix
                    // expression is the classic split-statement ambiguity.
                    let paren_line = self.peek().position.line;
                    if paren_line > self.last_line {
                        let pos = self.peek().position;
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::UnexpectedToken,
                            "ambiguous syntax (function call x new statement) near '('"
                                .to_string(),
                            pos,
                        ));
                    }
                    let args = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        meta: Meta::at(position),
                    };
                }
                TkString | TkLeftBrace => {
                    let args = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        meta: Meta::at(position),
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Call arguments: parenthesized list, single string, or single table.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        use LuaTokenKind::*;
        match self.peek_kind() {
            TkString => {
                let tok = self.next();
                let text = match tok.value {
                    TokenValue::Str(s) => s,
                    _ => String::new(),
                };
                Ok(vec![Expr::Str(text, Meta::at(tok.position))])
            }
            TkLeftBrace => Ok(vec![self.parse_table_constructor()?]),
            TkLeftParen => {
                let open = self.next();
                self.open_delimiter(TkLeftParen, open.position);
                let args = if self.peek_kind() == TkRightParen {
                    Vec::new()
                } else {
                    self.parse_explist()?
                };
                self.expect_close(TkRightParen, TkLeftParen, open.position)?;
                Ok(args)
            }
            other => {
                let pos = self.peek().position;
                Err(SyntaxError::new(
                    SyntaxErrorKind::ExpectedToken,
                    format!("function arguments expected near {}", other.describe()),
                    pos,
                ))
            }
        }
    }

    fn parse_table_constructor(&mut self) -> Result<Expr, SyntaxError> {
        use LuaTokenKind::*;
        let open = self.expect(TkLeftBrace)?;
        self.open_delimiter(TkLeftBrace, open.position);
        let mut items = Vec::new();

        while self.peek_kind() != TkRightBrace {
            match self.peek_kind() {
                TkLeftBracket => {
                    let bracket = self.next();
                    self.open_delimiter(TkLeftBracket, bracket.position);
                    let key = self.parse_expr_top()?;
                    self.expect_close(TkRightBracket, TkLeftBracket, bracket.position)?;
                    self.expect(TkAssign)?;
                    let value = self.parse_expr_top()?;
                    items.push(TableItem::Keyed(key, value));
                }
                TkName if self.peek_ahead(1) == TkAssign => {
                    let (name, _) = self.expect_name()?;
                    self.expect(TkAssign)?;
                    let value = self.parse_expr_top()?;
                    items.push(TableItem::Named(name, value));
                }
                _ => {
                    items.push(TableItem::Positional(self.parse_expr_top()?));
                }
            }
            if self.accept(TkComma).is_none() && self.accept(TkSemicolon).is_none() {
                break;
            }
        }

        self.expect_close(TkRightBrace, TkLeftBrace, open.position)?;
        Ok(Expr::Table(items, Meta::at(open.position)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::LuaParser;
    use super::super::ast::{BinOp, Expr, Stat, UnOp};

    fn parse_return_expr(source: &str) -> Expr {
        let block = LuaParser::parse(source).expect("parse failed");
        match block.into_iter().next_back() {
            Some(Stat::Return { mut exprs, .. }) => exprs.remove(0),
            other => panic!("expected return, got {:?}", other),
        }
    }

    fn binop(expr: &Expr) -> (BinOp, &Expr, &Expr) {
        match expr {
            Expr::BinOp { op, lhs, rhs, .. } => (*op, lhs, rhs),
            other => panic!("expected binop, got {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        // 2^3^2 parses as 2^(3^2)
        let expr = parse_return_expr("return 2^3^2");
        let (op, lhs, rhs) = binop(&expr);
        assert_eq!(op, BinOp::Pow);
        assert!(matches!(lhs, Expr::Int(2, _)));
        assert!(matches!(rhs, Expr::BinOp { op: BinOp::Pow, .. }));
    }

    #[test]
    fn concat_is_right_associative() {
        // a..b..c parses as a..(b..c)
        let expr = parse_return_expr("return a..b..c");
        let (op, _, rhs) = binop(&expr);
        assert_eq!(op, BinOp::Concat);
        assert!(matches!(rhs, Expr::BinOp { op: BinOp::Concat, .. }));
    }

    #[test]
    fn unary_minus_binds_below_power() {
        // -2^2 parses as -(2^2)
        let expr = parse_return_expr("return -2^2");
        match expr {
            Expr::UnOp {
                op: UnOp::Neg,
                operand,
                ..
            } => assert!(matches!(*operand, Expr::BinOp { op: BinOp::Pow, .. })),
            other => panic!("expected unary, got {:?}", other),
        }
    }

    #[test]
    fn unary_minus_binds_above_mul() {
        // -a*b parses as (-a)*b
        let expr = parse_return_expr("return -a*b");
        let (op, lhs, _) = binop(&expr);
        assert_eq!(op, BinOp::Mul);
        assert!(matches!(lhs, Expr::UnOp { op: UnOp::Neg, .. }));
    }

    #[test]
    fn concat_binds_tighter_than_shift() {
        // "7"..3 << 1 parses as ("7"..3) << 1
        let expr = parse_return_expr(r#"return "7" .. 3 << 1"#);
        let (op, lhs, _) = binop(&expr);
        assert_eq!(op, BinOp::Shl);
        assert!(matches!(lhs, Expr::BinOp { op: BinOp::Concat, .. }));
    }

    #[test]
    fn comparison_below_bitwise_or() {
        // a | b == c parses as a | (b == c)? No: == is band 5, | is band 7,
        // so == binds looser: (a | b) == c.
        let expr = parse_return_expr("return a | b == c");
        let (op, lhs, _) = binop(&expr);
        assert_eq!(op, BinOp::Eq);
        assert!(matches!(lhs, Expr::BinOp { op: BinOp::BOr, .. }));
    }

    #[test]
    fn suffix_chain() {
        let expr = parse_return_expr("return a.b[1](2):m(3)");
        assert!(matches!(expr, Expr::MethodCall { name, .. } if name == "m"));
    }

    #[test]
    fn paren_wraps_call() {
        let expr = parse_return_expr("return (f())");
        assert!(matches!(expr, Expr::Paren(..)));
    }

    #[test]
    fn table_constructor_fields() {
        let expr = parse_return_expr("return {1, x = 2, [3] = 4, f()}");
        match expr {
            Expr::Table(items, _) => assert_eq!(items.len(), 4),
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn ambiguous_call_across_lines_is_rejected() {
        let errs = LuaParser::parse("f()\n(g)()").unwrap_err();
        assert!(errs.iter().any(|e| e.message.contains("ambiguous")));
    }
}
