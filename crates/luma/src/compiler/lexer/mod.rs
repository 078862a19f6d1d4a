// Tokenizer: source text to tokens with positions. Comments come out as
// ordinary tokens so the parser can attach them to AST metadata.

pub mod token;

use crate::compiler::parser::error::{SyntaxError, SyntaxErrorKind};
use smol_str::SmolStr;
pub use token::{LuaToken, LuaTokenKind, Position, TokenValue, keyword_kind};

pub struct LuaLexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl LuaLexer {
    pub fn new(source: &str) -> Self {
        LuaLexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input. The result always ends with an eof token;
    /// any failure carries the position of the offending lexeme.
    pub fn tokenize(mut self) -> Result<Vec<LuaToken>, SyntaxError> {
        let mut tokens = Vec::new();

        // Shebang line is skipped entirely.
        if self.peek() == '#' && self.peek_at(1) == '!' {
            while !self.at_eof() && self.peek() != '\n' {
                self.bump();
            }
        }

        loop {
            self.skip_whitespace();
            if self.at_eof() {
                tokens.push(LuaToken::simple(LuaTokenKind::TkEof, self.position()));
                break;
            }
            let token = self.lex_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_at(&self, offset: usize) -> char {
        self.chars.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn bump(&mut self) -> char {
        let ch = self.peek();
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), ' ' | '\t' | '\r' | '\n') {
            self.bump();
        }
    }

    fn error(&self, kind: SyntaxErrorKind, message: String, position: Position) -> SyntaxError {
        SyntaxError {
            kind,
            message,
            position,
        }
    }

    fn lex_token(&mut self) -> Result<LuaToken, SyntaxError> {
        let start = self.position();
        let ch = self.peek();

        match ch {
            '0'..='9' => self.lex_number(start),
            '.' if self.peek_at(1).is_ascii_digit() => self.lex_number(start),
            'a'..='z' | 'A'..='Z' | '_' => Ok(self.lex_name(start)),
            '"' | '\'' => {
                self.bump();
                self.lex_short_string(ch, start)
            }
            '[' => {
                // Long bracket or plain '['.
                if self.peek_at(1) == '[' || self.peek_at(1) == '=' {
                    let save = (self.pos, self.line, self.column);
                    self.bump();
                    let level = self.skip_eq_run();
                    if self.peek() == '[' {
                        self.bump();
                        let text = self.lex_long_bracket_body(level, start, false)?;
                        return Ok(LuaToken {
                            kind: LuaTokenKind::TkString,
                            value: TokenValue::Str(text),
                            position: start,
                        });
                    }
                    if level > 0 {
                        return Err(self.error(
                            SyntaxErrorKind::IllegalCharacter,
                            "invalid long string delimiter".to_string(),
                            start,
                        ));
                    }
                    (self.pos, self.line, self.column) = save;
                }
                self.bump();
                Ok(LuaToken::simple(LuaTokenKind::TkLeftBracket, start))
            }
            '-' => {
                self.bump();
                if self.peek() != '-' {
                    return Ok(LuaToken::simple(LuaTokenKind::TkMinus, start));
                }
                self.bump();
                self.lex_comment(start)
            }
            _ => self.lex_symbol(start),
        }
    }

    fn lex_name(&mut self, start: Position) -> LuaToken {
        let begin = self.pos;
        while matches!(self.peek(), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_') {
            self.bump();
        }
        let text: String = self.chars[begin..self.pos].iter().collect();
        match keyword_kind(&text) {
            Some(kind) => LuaToken::simple(kind, start),
            None => LuaToken {
                kind: LuaTokenKind::TkName,
                value: TokenValue::Name(SmolStr::new(text)),
                position: start,
            },
        }
    }

    fn lex_symbol(&mut self, start: Position) -> Result<LuaToken, SyntaxError> {
        use LuaTokenKind::*;
        let ch = self.bump();
        let kind = match ch {
            '+' => TkPlus,
            '*' => TkMul,
            '%' => TkMod,
            '^' => TkPow,
            '#' => TkLen,
            '&' => TkBitAnd,
            '|' => TkBitOr,
            '(' => TkLeftParen,
            ')' => TkRightParen,
            '{' => TkLeftBrace,
            '}' => TkRightBrace,
            ']' => TkRightBracket,
            ';' => TkSemicolon,
            ',' => TkComma,
            '/' => {
                if self.peek() == '/' {
                    self.bump();
                    TkIDiv
                } else {
                    TkDiv
                }
            }
            '~' => {
                if self.peek() == '=' {
                    self.bump();
                    TkNe
                } else {
                    TkBitXor
                }
            }
            '<' => match self.peek() {
                '=' => {
                    self.bump();
                    TkLe
                }
                '<' => {
                    self.bump();
                    TkShl
                }
                _ => TkLt,
            },
            '>' => match self.peek() {
                '=' => {
                    self.bump();
                    TkGe
                }
                '>' => {
                    self.bump();
                    TkShr
                }
                _ => TkGt,
            },
            '=' => {
                if self.peek() == '=' {
                    self.bump();
                    TkEq
                } else {
                    TkAssign
                }
            }
            ':' => {
                if self.peek() == ':' {
                    self.bump();
                    TkDbColon
                } else {
                    TkColon
                }
            }
            '.' => {
                if self.peek() == '.' {
                    self.bump();
                    if self.peek() == '.' {
                        self.bump();
                        TkDots
                    } else {
                        TkConcat
                    }
                } else {
                    TkDot
                }
            }
            other => {
                return Err(self.error(
                    SyntaxErrorKind::IllegalCharacter,
                    format!("unexpected symbol near '{}'", other),
                    start,
                ));
            }
        };
        Ok(LuaToken::simple(kind, start))
    }

    fn lex_comment(&mut self, start: Position) -> Result<LuaToken, SyntaxError> {
        // Already past "--". A long bracket makes it a block comment.
        if self.peek() == '[' {
            let save = (self.pos, self.line, self.column);
            self.bump();
            let level = self.skip_eq_run();
            if self.peek() == '[' {
                self.bump();
                let text = self.lex_long_bracket_body(level, start, true)?;
                return Ok(LuaToken {
                    kind: LuaTokenKind::TkLongComment,
                    value: TokenValue::Str(text),
                    position: start,
                });
            }
            (self.pos, self.line, self.column) = save;
        }

        let begin = self.pos;
        while !self.at_eof() && self.peek() != '\n' && self.peek() != '\r' {
            self.bump();
        }
        let text: String = self.chars[begin..self.pos].iter().collect();
        Ok(LuaToken {
            kind: LuaTokenKind::TkShortComment,
            value: TokenValue::Str(text.trim().to_string()),
            position: start,
        })
    }

    /// Count the `=` run between long-bracket halves.
    fn skip_eq_run(&mut self) -> usize {
        let mut level = 0;
        while self.peek() == '=' {
            self.bump();
            level += 1;
        }
        level
    }

    /// Body of `[=*[ ... ]=*]`, cursor just past the opening bracket.
    fn lex_long_bracket_body(
        &mut self,
        level: usize,
        start: Position,
        is_comment: bool,
    ) -> Result<String, SyntaxError> {
        // A newline right after the opening bracket is dropped.
        if self.peek() == '\r' {
            self.bump();
            if self.peek() == '\n' {
                self.bump();
            }
        } else if self.peek() == '\n' {
            self.bump();
        }

        let mut text = String::new();
        loop {
            if self.at_eof() {
                let (kind, what) = if is_comment {
                    (SyntaxErrorKind::UnterminatedComment, "comment")
                } else {
                    (SyntaxErrorKind::UnterminatedString, "string")
                };
                return Err(self.error(
                    kind,
                    format!("unfinished long {} (starting at line {})", what, start.line),
                    self.position(),
                ));
            }
            if self.peek() == ']' {
                let save = (self.pos, self.line, self.column);
                self.bump();
                let mut eqs = 0;
                while self.peek() == '=' {
                    self.bump();
                    eqs += 1;
                }
                if eqs == level && self.peek() == ']' {
                    self.bump();
                    return Ok(text);
                }
                (self.pos, self.line, self.column) = save;
                text.push(self.bump());
            } else {
                text.push(self.bump());
            }
        }
    }

    fn lex_short_string(&mut self, quote: char, start: Position) -> Result<LuaToken, SyntaxError> {
        let mut text = String::new();
        loop {
            if self.at_eof() || self.peek() == '\n' {
                return Err(self.error(
                    SyntaxErrorKind::UnterminatedString,
                    "unfinished string".to_string(),
                    start,
                ));
            }
            let ch = self.bump();
            if ch == quote {
                break;
            }
            if ch != '\\' {
                text.push(ch);
                continue;
            }
            let esc_pos = self.position();
            let esc = self.bump();
            match esc {
                'n' => text.push('\n'),
                't' => text.push('\t'),
                'r' => text.push('\r'),
                'a' => text.push('\u{7}'),
                'b' => text.push('\u{8}'),
                'f' => text.push('\u{c}'),
                'v' => text.push('\u{b}'),
                '\\' => text.push('\\'),
                '"' => text.push('"'),
                '\'' => text.push('\''),
                '\n' => text.push('\n'),
                'x' => {
                    let mut value = 0u32;
                    for _ in 0..2 {
                        let d = self.peek().to_digit(16).ok_or_else(|| {
                            self.error(
                                SyntaxErrorKind::UnterminatedString,
                                "hexadecimal digit expected".to_string(),
                                esc_pos,
                            )
                        })?;
                        self.bump();
                        value = value * 16 + d;
                    }
                    text.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                }
                'u' => {
                    if self.peek() != '{' {
                        return Err(self.error(
                            SyntaxErrorKind::UnterminatedString,
                            "missing '{' in \\u{xxxx}".to_string(),
                            esc_pos,
                        ));
                    }
                    self.bump();
                    let mut value = 0u32;
                    while self.peek() != '}' {
                        let d = self.peek().to_digit(16).ok_or_else(|| {
                            self.error(
                                SyntaxErrorKind::UnterminatedString,
                                "hexadecimal digit expected".to_string(),
                                esc_pos,
                            )
                        })?;
                        self.bump();
                        value = value.saturating_mul(16).saturating_add(d);
                    }
                    self.bump();
                    text.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                }
                'z' => {
                    while matches!(self.peek(), ' ' | '\t' | '\r' | '\n') {
                        self.bump();
                    }
                }
                '0'..='9' => {
                    let mut value = esc.to_digit(10).unwrap_or(0);
                    for _ in 0..2 {
                        if let Some(d) = self.peek().to_digit(10) {
                            self.bump();
                            value = value * 10 + d;
                        } else {
                            break;
                        }
                    }
                    if value > 255 {
                        return Err(self.error(
                            SyntaxErrorKind::UnterminatedString,
                            "decimal escape too large".to_string(),
                            esc_pos,
                        ));
                    }
                    text.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                }
                other => {
                    return Err(self.error(
                        SyntaxErrorKind::UnterminatedString,
                        format!("invalid escape sequence '\\{}'", other),
                        esc_pos,
                    ));
                }
            }
        }
        Ok(LuaToken {
            kind: LuaTokenKind::TkString,
            value: TokenValue::Str(text),
            position: start,
        })
    }

    fn lex_number(&mut self, start: Position) -> Result<LuaToken, SyntaxError> {
        let begin = self.pos;

        let token = if self.peek() == '0' && matches!(self.peek_at(1), 'x' | 'X') {
            self.bump();
            self.bump();
            self.lex_hex_number(start)?
        } else {
            self.lex_decimal_number(begin, start)?
        };

        // A number must not run straight into a name.
        if matches!(self.peek(), 'a'..='z' | 'A'..='Z' | '_') {
            return Err(self.error(
                SyntaxErrorKind::MalformedNumber,
                "malformed number".to_string(),
                start,
            ));
        }

        Ok(token)
    }

    fn lex_decimal_number(
        &mut self,
        begin: usize,
        start: Position,
    ) -> Result<LuaToken, SyntaxError> {
        let mut is_float = false;

        while self.peek().is_ascii_digit() {
            self.bump();
        }
        if self.peek() == '.' {
            is_float = true;
            self.bump();
            while self.peek().is_ascii_digit() {
                self.bump();
            }
        }
        if matches!(self.peek(), 'e' | 'E') {
            is_float = true;
            self.bump();
            if matches!(self.peek(), '+' | '-') {
                self.bump();
            }
            if !self.peek().is_ascii_digit() {
                return Err(self.error(
                    SyntaxErrorKind::MalformedNumber,
                    "malformed number".to_string(),
                    start,
                ));
            }
            while self.peek().is_ascii_digit() {
                self.bump();
            }
        }

        let text: String = self.chars[begin..self.pos].iter().collect();
        if is_float {
            let value: f64 = text.parse().map_err(|_| {
                self.error(
                    SyntaxErrorKind::MalformedNumber,
                    "malformed number".to_string(),
                    start,
                )
            })?;
            Ok(LuaToken {
                kind: LuaTokenKind::TkFloat,
                value: TokenValue::Float(value),
                position: start,
            })
        } else {
            // Decimal literals that overflow i64 become floats, as in Lua.
            match text.parse::<i64>() {
                Ok(value) => Ok(LuaToken {
                    kind: LuaTokenKind::TkInt,
                    value: TokenValue::Int(value),
                    position: start,
                }),
                Err(_) => {
                    let value: f64 = text.parse().map_err(|_| {
                        self.error(
                            SyntaxErrorKind::MalformedNumber,
                            "malformed number".to_string(),
                            start,
                        )
                    })?;
                    Ok(LuaToken {
                        kind: LuaTokenKind::TkFloat,
                        value: TokenValue::Float(value),
                        position: start,
                    })
                }
            }
        }
    }

    /// Hex literal, cursor past "0x". Handles plain integers (wrapping
    /// modulo 2^64) and hex floats with a binary exponent.
    fn lex_hex_number(&mut self, start: Position) -> Result<LuaToken, SyntaxError> {
        let mut mantissa: f64 = 0.0;
        let mut int_value: u64 = 0;
        let mut digits = 0;

        while let Some(d) = self.peek().to_digit(16) {
            self.bump();
            mantissa = mantissa * 16.0 + d as f64;
            int_value = int_value.wrapping_mul(16).wrapping_add(d as u64);
            digits += 1;
        }

        let mut is_float = false;
        if self.peek() == '.' {
            is_float = true;
            self.bump();
            let mut scale = 1.0 / 16.0;
            while let Some(d) = self.peek().to_digit(16) {
                self.bump();
                mantissa += d as f64 * scale;
                scale /= 16.0;
                digits += 1;
            }
        }

        if digits == 0 {
            return Err(self.error(
                SyntaxErrorKind::MalformedNumber,
                "malformed number".to_string(),
                start,
            ));
        }

        let mut exponent: i32 = 0;
        if matches!(self.peek(), 'p' | 'P') {
            is_float = true;
            self.bump();
            let negative = match self.peek() {
                '-' => {
                    self.bump();
                    true
                }
                '+' => {
                    self.bump();
                    false
                }
                _ => false,
            };
            if !self.peek().is_ascii_digit() {
                return Err(self.error(
                    SyntaxErrorKind::MalformedNumber,
                    "malformed number".to_string(),
                    start,
                ));
            }
            while let Some(d) = self.peek().to_digit(10) {
                self.bump();
                exponent = exponent.saturating_mul(10).saturating_add(d as i32);
            }
            if negative {
                exponent = -exponent;
            }
        }

        if is_float {
            Ok(LuaToken {
                kind: LuaTokenKind::TkFloat,
                value: TokenValue::Float(mantissa * 2f64.powi(exponent)),
                position: start,
            })
        } else {
            Ok(LuaToken {
                kind: LuaTokenKind::TkInt,
                value: TokenValue::Int(int_value as i64),
                position: start,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<LuaTokenKind> {
        LuaLexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn first(source: &str) -> LuaToken {
        LuaLexer::new(source).tokenize().unwrap().remove(0)
    }

    #[test]
    fn tokens_end_with_eof_in_order() {
        let tokens = LuaLexer::new("local x = 1\nreturn x").tokenize().unwrap();
        assert_eq!(tokens.last().unwrap().kind, LuaTokenKind::TkEof);
        for pair in tokens.windows(2) {
            assert!(pair[0].position <= pair[1].position);
        }
    }

    #[test]
    fn decimal_literals() {
        assert_eq!(first("42").value, TokenValue::Int(42));
        assert_eq!(first("0").value, TokenValue::Int(0));
        assert_eq!(first("3.5").value, TokenValue::Float(3.5));
        assert_eq!(first(".2e2").value, TokenValue::Float(20.0));
        assert_eq!(first("2.E-1").value, TokenValue::Float(0.2));
        assert_eq!(first("0e12").value, TokenValue::Float(0.0));
        assert_eq!(first("0.").value, TokenValue::Float(0.0));
    }

    #[test]
    fn hex_literals() {
        assert_eq!(first("0xFF").value, TokenValue::Int(255));
        assert_eq!(first("0x10").value, TokenValue::Int(16));
        assert_eq!(first("0xF0.0").value, TokenValue::Float(240.0));
        assert_eq!(first("0xABCp-3").value, TokenValue::Float(343.5));
        assert_eq!(first("0x1p0").value, TokenValue::Float(1.0));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            first(r#""a\tb\n\65""#).value,
            TokenValue::Str("a\tb\nA".to_string())
        );
        assert_eq!(first(r#"'\x41'"#).value, TokenValue::Str("A".to_string()));
        assert_eq!(
            first("\"\\u{48}i\"").value,
            TokenValue::Str("Hi".to_string())
        );
    }

    #[test]
    fn long_strings_drop_first_newline() {
        assert_eq!(
            first("[[\nhello]]").value,
            TokenValue::Str("hello".to_string())
        );
        assert_eq!(
            first("[==[a]=]b]==]").value,
            TokenValue::Str("a]=]b".to_string())
        );
    }

    #[test]
    fn comments_are_tokens() {
        let tokens = LuaLexer::new("-- hi\nlocal x --[[ block ]] = 1")
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].kind, LuaTokenKind::TkShortComment);
        assert_eq!(tokens[0].text(), Some("hi"));
        assert!(tokens.iter().any(|t| t.kind == LuaTokenKind::TkLongComment));
    }

    #[test]
    fn operator_disambiguation() {
        assert_eq!(
            kinds("a .. b ... // / ~ ~= :: :"),
            vec![
                LuaTokenKind::TkName,
                LuaTokenKind::TkConcat,
                LuaTokenKind::TkName,
                LuaTokenKind::TkDots,
                LuaTokenKind::TkIDiv,
                LuaTokenKind::TkDiv,
                LuaTokenKind::TkBitXor,
                LuaTokenKind::TkNe,
                LuaTokenKind::TkDbColon,
                LuaTokenKind::TkColon,
                LuaTokenKind::TkEof,
            ]
        );
    }

    #[test]
    fn rejects_unfinished_string() {
        let err = LuaLexer::new("local s = \"oops").tokenize().unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedString);
        assert_eq!(err.position.line, 1);
    }

    #[test]
    fn rejects_malformed_number() {
        let err = LuaLexer::new("return 0x").tokenize().unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::MalformedNumber);
        let err = LuaLexer::new("return 12abc").tokenize().unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::MalformedNumber);
    }

    #[test]
    fn shebang_is_skipped() {
        let tokens = LuaLexer::new("#!/usr/bin/env lua\nreturn 1")
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].kind, LuaTokenKind::TkReturn);
        assert_eq!(tokens[0].position.line, 2);
    }
}
