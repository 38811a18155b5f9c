//! Hand-rolled recursive-descent parser for the snippet dialect.
//!
//! Statements are separated by newlines or semicolons; newlines inside
//! brackets are whitespace, so a call may span lines. `#` starts a comment
//! that runs to end of line.

use super::ast::{BinOp, Expr, Program, Stmt, UnaryOp};
use std::fmt;

/// A parse failure with the source position it happened at. The sanitizer
/// surfaces this as the `syntax-error` rejection reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}, column {}", self.message, self.line, self.column)
    }
}

impl std::error::Error for ParseError {}

const KEYWORDS: &[&str] = &[
    "import", "from", "as", "and", "or", "not", "True", "False", "None",
];

/// Parse a snippet into a [`Program`].
pub fn parse(input: &str) -> Result<Program, ParseError> {
    ParserState::new(input).parse_program()
}

struct ParserState<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
    // While inside ( or [, newlines are plain whitespace.
    bracket_depth: usize,
}

impl<'a> ParserState<'a> {
    fn new(input: &'a str) -> Self {
        ParserState {
            input,
            bytes: input.as_bytes(),
            position: 0,
            bracket_depth: 0,
        }
    }

    // --- Basic utils ---

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input[self.position..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.position += c.len_utf8();
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let consumed = &self.input[..self.position.min(self.input.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rsplit('\n')
            .next()
            .map(|l| l.chars().count())
            .unwrap_or(0)
            + 1;
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }

    /// Skip spaces, tabs, comments, and (inside brackets) newlines.
    fn skip_inline_ws(&mut self) {
        while !self.is_eof() {
            let byte = self.bytes[self.position];
            match byte {
                b' ' | b'\t' | b'\r' => self.advance(),
                b'\n' if self.bracket_depth > 0 => self.advance(),
                b'#' => {
                    while !self.is_eof() && self.bytes[self.position] != b'\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Skip whitespace including newlines and comments, between statements.
    fn skip_blank(&mut self) {
        while !self.is_eof() {
            let byte = self.bytes[self.position];
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' | b';' => self.advance(),
                b'#' => {
                    while !self.is_eof() && self.bytes[self.position] != b'\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_inline_ws();
        if self.current_char() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected '{expected}', found {}",
                describe(self.current_char())
            )))
        }
    }

    /// Consume `ch` if it is next (after inline whitespace).
    fn eat_char(&mut self, ch: char) -> bool {
        self.skip_inline_ws();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// True if the next token is the given word, without consuming it.
    fn peek_word(&mut self, word: &str) -> bool {
        self.skip_inline_ws();
        if !self.input[self.position..].starts_with(word) {
            return false;
        }
        let after = self.position + word.len();
        match self.input[after..].chars().next() {
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => false,
            _ => true,
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_word(word) {
            self.position += word.len();
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ParseError> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{word}'")))
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_inline_ws();
        let start = self.position;
        match self.current_char() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.advance(),
            found => {
                return Err(self.error(format!(
                    "expected identifier, found {}",
                    describe(found)
                )))
            }
        }
        while let Some(c) = self.current_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.input[start..self.position].to_string())
    }

    fn parse_non_keyword_identifier(&mut self) -> Result<String, ParseError> {
        let name = self.parse_identifier()?;
        if KEYWORDS.contains(&name.as_str()) {
            return Err(self.error(format!("'{name}' is a reserved word")));
        }
        Ok(name)
    }

    fn parse_dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.parse_non_keyword_identifier()?;
        while self.current_char() == Some('.') {
            self.advance();
            name.push('.');
            name.push_str(&self.parse_non_keyword_identifier()?);
        }
        Ok(name)
    }

    // --- Statements ---

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_blank();
            if self.is_eof() {
                break;
            }
            stmts.push(self.parse_stmt()?);
            self.expect_stmt_end()?;
        }
        Ok(Program { stmts })
    }

    fn expect_stmt_end(&mut self) -> Result<(), ParseError> {
        self.skip_inline_ws();
        match self.current_char() {
            None | Some('\n') | Some(';') => Ok(()),
            found => Err(self.error(format!(
                "expected end of statement, found {}",
                describe(found)
            ))),
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        if self.eat_word("import") {
            let module = self.parse_dotted_name()?;
            let alias = if self.eat_word("as") {
                Some(self.parse_non_keyword_identifier()?)
            } else {
                None
            };
            return Ok(Stmt::Import { module, alias });
        }
        if self.eat_word("from") {
            let module = self.parse_dotted_name()?;
            self.expect_word("import")?;
            let mut names = Vec::new();
            loop {
                if self.eat_char('*') {
                    names.push("*".to_string());
                } else {
                    names.push(self.parse_non_keyword_identifier()?);
                }
                if !self.eat_char(',') {
                    break;
                }
            }
            return Ok(Stmt::FromImport { module, names });
        }

        let expr = self.parse_expr()?;
        self.skip_inline_ws();
        if self.current_char() == Some('=') && self.peek_char(1) != Some('=') {
            self.advance();
            let value = self.parse_expr()?;
            return match expr {
                Expr::Name(name) => Ok(Stmt::Assign { name, value }),
                _ => Err(self.error("only plain names can be assigned to")),
            };
        }
        Ok(Stmt::Expr(expr))
    }

    // --- Expressions, lowest precedence first ---

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat_word("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.eat_word("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat_word("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_additive()?;
        self.skip_inline_ws();
        let op = match (self.current_char(), self.peek_char(1)) {
            (Some('='), Some('=')) => Some((BinOp::Eq, 2)),
            (Some('!'), Some('=')) => Some((BinOp::Ne, 2)),
            (Some('<'), Some('=')) => Some((BinOp::Le, 2)),
            (Some('>'), Some('=')) => Some((BinOp::Ge, 2)),
            (Some('<'), _) => Some((BinOp::Lt, 1)),
            (Some('>'), _) => Some((BinOp::Gt, 1)),
            _ => None,
        };
        if let Some((op, len)) = op {
            for _ in 0..len {
                self.advance();
            }
            let rhs = self.parse_additive()?;
            return Ok(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.skip_inline_ws();
            let op = match self.current_char() {
                Some('+') => BinOp::Add,
                Some('-') => BinOp::Sub,
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

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_inline_ws();
            let op = match (self.current_char(), self.peek_char(1)) {
                (Some('*'), _) => {
                    self.advance();
                    BinOp::Mul
                }
                (Some('/'), Some('/')) => {
                    self.advance();
                    self.advance();
                    BinOp::FloorDiv
                }
                (Some('/'), _) => {
                    self.advance();
                    BinOp::Div
                }
                (Some('%'), _) => {
                    self.advance();
                    BinOp::Mod
                }
                _ => break,
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_inline_ws();
        if self.current_char() == Some('-') {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            self.skip_inline_ws();
            match self.current_char() {
                Some('(') => {
                    self.advance();
                    self.bracket_depth += 1;
                    let (args, kwargs) = self.parse_call_args()?;
                    self.bracket_depth -= 1;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Some('.') => {
                    self.advance();
                    let name = self.parse_identifier()?;
                    expr = Expr::Attr {
                        obj: Box::new(expr),
                        name,
                    };
                }
                Some('[') => {
                    self.advance();
                    self.bracket_depth += 1;
                    let index = self.parse_expr()?;
                    self.bracket_depth -= 1;
                    self.expect_char(']')?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Arguments up to and including the closing parenthesis. Keyword
    /// arguments must follow positional ones.
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        loop {
            self.skip_inline_ws();
            if self.current_char() == Some(')') {
                self.advance();
                break;
            }
            // Lookahead for `name=` (but not `name==`).
            let checkpoint = self.position;
            let mut parsed_kwarg = false;
            if matches!(self.current_char(), Some(c) if c.is_ascii_alphabetic() || c == '_') {
                if let Ok(name) = self.parse_identifier() {
                    self.skip_inline_ws();
                    if self.current_char() == Some('=') && self.peek_char(1) != Some('=') {
                        self.advance();
                        let value = self.parse_expr()?;
                        kwargs.push((name, value));
                        parsed_kwarg = true;
                    }
                }
                if !parsed_kwarg {
                    self.position = checkpoint;
                }
            }
            if !parsed_kwarg {
                let value = self.parse_expr()?;
                if !kwargs.is_empty() {
                    return Err(
                        self.error("positional argument after keyword argument")
                    );
                }
                args.push(value);
            }
            self.skip_inline_ws();
            match self.current_char() {
                Some(',') => self.advance(),
                Some(')') => {
                    self.advance();
                    break;
                }
                found => {
                    return Err(self.error(format!(
                        "expected ',' or ')' in argument list, found {}",
                        describe(found)
                    )))
                }
            }
        }
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        self.skip_inline_ws();
        match self.current_char() {
            Some('(') => {
                self.advance();
                self.bracket_depth += 1;
                let expr = self.parse_expr()?;
                self.bracket_depth -= 1;
                self.expect_char(')')?;
                Ok(expr)
            }
            Some('[') => {
                self.advance();
                self.bracket_depth += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_inline_ws();
                    if self.current_char() == Some(']') {
                        self.advance();
                        break;
                    }
                    items.push(self.parse_expr()?);
                    self.skip_inline_ws();
                    match self.current_char() {
                        Some(',') => self.advance(),
                        Some(']') => {
                            self.advance();
                            break;
                        }
                        found => {
                            return Err(self.error(format!(
                                "expected ',' or ']' in list, found {}",
                                describe(found)
                            )))
                        }
                    }
                }
                self.bracket_depth -= 1;
                Ok(Expr::List(items))
            }
            Some(quote @ ('\'' | '"')) => self.parse_string(quote),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                if self.eat_word("True") {
                    return Ok(Expr::Bool(true));
                }
                if self.eat_word("False") {
                    return Ok(Expr::Bool(false));
                }
                if self.eat_word("None") {
                    return Ok(Expr::NoneLit);
                }
                let name = self.parse_identifier()?;
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(self.error(format!("unexpected keyword '{name}'")));
                }
                Ok(Expr::Name(name))
            }
            found => Err(self.error(format!("expected expression, found {}", describe(found)))),
        }
    }

    fn parse_number(&mut self) -> Result<Expr, ParseError> {
        let start = self.position;
        while matches!(self.current_char(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.current_char() == Some('.')
            && matches!(self.peek_char(1), Some(c) if c.is_ascii_digit())
        {
            is_float = true;
            self.advance();
            while matches!(self.current_char(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.current_char(), Some('e') | Some('E')) {
            let mut offset = 1;
            if matches!(self.peek_char(1), Some('+') | Some('-')) {
                offset = 2;
            }
            if matches!(self.peek_char(offset), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..=offset {
                    self.advance();
                }
                while matches!(self.current_char(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }
        let text = &self.input[start..self.position];
        if is_float {
            text.parse::<f64>()
                .map(Expr::Float)
                .map_err(|_| self.error(format!("invalid number literal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Expr::Int)
                .map_err(|_| self.error(format!("integer literal '{text}' is out of range")))
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<Expr, ParseError> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.current_char() {
                None | Some('\n') => {
                    return Err(self.error("unterminated string literal"));
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.current_char() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        found => {
                            return Err(self.error(format!(
                                "unknown escape sequence: \\{}",
                                describe(found)
                            )))
                        }
                    };
                    value.push(escaped);
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Ok(Expr::Str(value))
    }
}

fn describe(ch: Option<char>) -> String {
    match ch {
        Some('\n') => "end of line".to_string(),
        Some(c) => format!("'{c}'"),
        None => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_and_arithmetic() {
        let program = parse("result_value = 2 + 2 * 3").unwrap();
        assert_eq!(program.stmts.len(), 1);
        match &program.stmts[0] {
            Stmt::Assign { name, value } => {
                assert_eq!(name, "result_value");
                // Multiplication binds tighter than addition.
                match value {
                    Expr::Binary { op: BinOp::Add, rhs, .. } => {
                        assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
                    }
                    other => panic!("unexpected expr: {other:?}"),
                }
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn parses_method_chain_with_kwargs() {
        let program =
            parse("result_df = employees.sort_by('Salary', descending=True).head(5)").unwrap();
        match &program.stmts[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Call { func, args, .. } => {
                    assert_eq!(args.len(), 1);
                    assert!(matches!(**func, Expr::Attr { ref name, .. } if name == "head"));
                }
                other => panic!("unexpected expr: {other:?}"),
            },
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn parses_import_forms() {
        let program = parse("import os\nimport  os as o\nfrom os import system, popen").unwrap();
        assert_eq!(
            program.stmts[0],
            Stmt::Import {
                module: "os".into(),
                alias: None
            }
        );
        assert_eq!(
            program.stmts[1],
            Stmt::Import {
                module: "os".into(),
                alias: Some("o".into())
            }
        );
        assert_eq!(
            program.stmts[2],
            Stmt::FromImport {
                module: "os".into(),
                names: vec!["system".into(), "popen".into()]
            }
        );
    }

    #[test]
    fn semicolons_and_comments_separate_statements() {
        let program = parse("a = 1; b = 2  # trailing comment\nc = a + b").unwrap();
        assert_eq!(program.stmts.len(), 3);
    }

    #[test]
    fn newlines_inside_brackets_are_whitespace() {
        let program = parse("x = group_agg(\n    sales,\n    by='Region',\n    agg='mean'\n)").unwrap();
        assert_eq!(program.stmts.len(), 1);
    }

    #[test]
    fn subscript_and_comparison() {
        let program = parse("big = t['Salary'] > 100000").unwrap();
        match &program.stmts[0] {
            Stmt::Assign { value, .. } => {
                assert!(matches!(value, Expr::Binary { op: BinOp::Gt, .. }));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn rejects_assignment_to_call() {
        let err = parse("f(x) = 2").unwrap_err();
        assert!(err.message.contains("assigned"));
    }

    #[test]
    fn error_carries_position() {
        let err = parse("x = (1 +").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.column > 1);
    }

    #[test]
    fn star_import_parses() {
        let program = parse("from os import *").unwrap();
        assert_eq!(
            program.stmts[0],
            Stmt::FromImport {
                module: "os".into(),
                names: vec!["*".into()]
            }
        );
    }
}
