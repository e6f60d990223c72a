//! Recursive-descent compiler for the supported SQL dialect.
//!
//! Five statement forms are recognised:
//!
//! ```text
//! SELECT (* | col, ...) FROM t [WHERE cond (AND cond)*] [ORDER BY col [ASC|DESC]]
//!        [LIMIT (?|n)] [OFFSET (?|n)]
//! SELECT COUNT(*) [AS alias] FROM t [WHERE ...]
//! INSERT INTO t (col, ...) VALUES (value, ...)
//! UPDATE t SET col = value, ... [WHERE ...]
//! DELETE FROM t [WHERE ...]
//!
//! cond  := col (= | != | <> | > | >= | < | <= | LIKE | IS) value
//! value := ? | 'string' | number | NULL | TRUE | FALSE
//! ```
//!
//! Keywords are case-insensitive and any whitespace separates tokens.
//! Compilation never fails: when the parser meets something outside the
//! dialect (`OR`, joins, subqueries, parentheses in `WHERE`) it stops, keeps
//! everything it understood so far and returns a descriptor with
//! [`ParsedStatement::is_complete`] set to `false`.

use bulwark_storage::{Direction, FilterOp, OrderBy};
use serde_json::{Number, Value};

use crate::lexer::{SpannedToken, Token, tokenize};
use crate::parsed::{Operand, Operation, ParsedStatement, WhereClause};

/// Words that can never be bare column or table names.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "ORDER", "BY", "LIMIT", "OFFSET", "INSERT",
    "INTO", "VALUES", "UPDATE", "SET", "DELETE", "JOIN", "ON", "GROUP", "HAVING", "UNION", "AS",
];

/// Compile a SQL string into a [`ParsedStatement`].
///
/// Never fails. Statements that leave the supported dialect come back with
/// [`ParsedStatement::is_complete`] set to `false` and a `warn` log naming
/// where compilation stopped.
#[must_use]
pub fn compile(sql: &str) -> ParsedStatement {
    let tokens = tokenize(sql);
    let param_count = tokens
        .iter()
        .filter(|t| matches!(t.token, Token::Placeholder(_)))
        .count();
    let mut parser = Parser {
        tokens,
        index: 0,
        stmt: ParsedStatement {
            param_count,
            ..ParsedStatement::default()
        },
    };

    match parser.statement() {
        Ok(()) => parser.stmt.complete = true,
        Err(gap) => {
            tracing::warn!(
                sql,
                position = gap.position,
                expected = gap.expected,
                found = %gap.found,
                "Statement only partially compiled"
            );
        },
    }
    parser.stmt
}

/// Where and why compilation stopped.
#[derive(Debug)]
struct Gap {
    expected: &'static str,
    found: String,
    position: usize,
}

type Step<T> = Result<T, Gap>;

struct Parser<'a> {
    tokens: Vec<SpannedToken<'a>>,
    index: usize,
    stmt: ParsedStatement,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Step<()> {
        if self.keyword("SELECT") {
            self.select()?;
        } else if self.keyword("INSERT") {
            self.insert()?;
        } else if self.keyword("UPDATE") {
            self.update()?;
        } else if self.keyword("DELETE") {
            self.delete()?;
        } else {
            return Err(self.gap("SELECT, INSERT, UPDATE or DELETE"));
        }
        self.matches(&Token::Semicolon);
        self.expect_eof()
    }

    fn select(&mut self) -> Step<()> {
        self.stmt.op = Operation::Select;
        if let Token::Word(word) = self.current().token
            && word.eq_ignore_ascii_case("COUNT")
            && self.peek_is(&Token::LParen)
        {
            self.advance();
            self.expect(&Token::LParen, "(")?;
            self.expect(&Token::Star, "*")?;
            self.expect(&Token::RParen, ")")?;
            self.stmt.op = Operation::Count;
            self.stmt.count_alias = Some(format!("{word}(*)"));
            if self.keyword("AS") {
                self.stmt.count_alias = Some(self.identifier("alias")?);
            }
        } else if !self.matches(&Token::Star) {
            let column = self.identifier("column name or *")?;
            self.stmt.columns.push(column);
            while self.matches(&Token::Comma) {
                let column = self.identifier("column name")?;
                self.stmt.columns.push(column);
            }
        }

        self.expect_keyword("FROM")?;
        self.stmt.table = self.identifier("table name")?;
        self.where_clause()?;
        self.order_by()?;
        if self.keyword("LIMIT") {
            self.stmt.limit = Some(self.bound("LIMIT value")?);
        }
        if self.keyword("OFFSET") {
            self.stmt.offset = Some(self.bound("OFFSET value")?);
        }
        Ok(())
    }

    fn insert(&mut self) -> Step<()> {
        self.stmt.op = Operation::Insert;
        self.expect_keyword("INTO")?;
        self.stmt.table = self.identifier("table name")?;
        self.expect(&Token::LParen, "(")?;
        let column = self.identifier("column name")?;
        self.stmt.columns.push(column);
        while self.matches(&Token::Comma) {
            let column = self.identifier("column name")?;
            self.stmt.columns.push(column);
        }
        self.expect(&Token::RParen, ")")?;

        // Positional binding until an explicit VALUES list is understood.
        self.stmt.values = (0..self.stmt.columns.len()).map(Operand::Param).collect();

        self.expect_keyword("VALUES")?;
        self.expect(&Token::LParen, "(")?;
        let mut values = vec![self.operand()?];
        while self.matches(&Token::Comma) {
            values.push(self.operand()?);
        }
        self.expect(&Token::RParen, ")")?;
        if values.len() != self.stmt.columns.len() {
            return Err(self.gap("one value per column"));
        }
        self.stmt.values = values;
        Ok(())
    }

    fn update(&mut self) -> Step<()> {
        self.stmt.op = Operation::Update;
        self.stmt.table = self.identifier("table name")?;
        self.expect_keyword("SET")?;
        loop {
            let column = self.identifier("column name")?;
            self.expect(&Token::Eq, "=")?;
            let value = self.operand()?;
            self.stmt.set_columns.push(column);
            self.stmt.values.push(value);
            if !self.matches(&Token::Comma) {
                break;
            }
        }
        self.where_clause()
    }

    fn delete(&mut self) -> Step<()> {
        self.stmt.op = Operation::Delete;
        self.expect_keyword("FROM")?;
        self.stmt.table = self.identifier("table name")?;
        self.where_clause()
    }

    // ------------------------------------------------------------------
    // Clauses
    // ------------------------------------------------------------------

    fn where_clause(&mut self) -> Step<()> {
        if !self.keyword("WHERE") {
            return Ok(());
        }
        loop {
            let clause = self.condition()?;
            self.stmt.where_clauses.push(clause);
            if !self.keyword("AND") {
                return Ok(());
            }
        }
    }

    fn condition(&mut self) -> Step<WhereClause> {
        let column = self.identifier("column name")?;
        let op = match &self.current().token {
            Token::Eq => FilterOp::Eq,
            Token::NotEq => FilterOp::NotEq,
            Token::Gt => FilterOp::Gt,
            Token::Gte => FilterOp::Gte,
            Token::Lt => FilterOp::Lt,
            Token::Lte => FilterOp::Lte,
            t if t.is_keyword("LIKE") => FilterOp::Like,
            t if t.is_keyword("IS") => FilterOp::Is,
            _ => return Err(self.gap("comparison operator")),
        };
        self.advance();
        let operand = self.operand()?;
        Ok(WhereClause {
            column,
            op,
            operand,
        })
    }

    fn order_by(&mut self) -> Step<()> {
        if !self.keyword("ORDER") {
            return Ok(());
        }
        self.expect_keyword("BY")?;
        let field = self.identifier("column name")?;
        let direction = if self.keyword("DESC") {
            Direction::Desc
        } else {
            self.keyword("ASC");
            Direction::Asc
        };
        self.stmt.order_by = Some(OrderBy { field, direction });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    fn identifier(&mut self, expected: &'static str) -> Step<String> {
        let mut name = self.name_part(expected)?;
        // `table.column` resolves to `column`.
        while self.current().token == Token::Dot {
            self.advance();
            name = self.name_part(expected)?;
        }
        Ok(name)
    }

    fn name_part(&mut self, expected: &'static str) -> Step<String> {
        let name = match &self.current().token {
            Token::Word(w) if !RESERVED.iter().any(|r| w.eq_ignore_ascii_case(r)) => {
                (*w).to_string()
            },
            Token::QuotedIdent(w) => (*w).to_string(),
            _ => return Err(self.gap(expected)),
        };
        self.advance();
        Ok(name)
    }

    fn operand(&mut self) -> Step<Operand> {
        let negative = self.matches(&Token::Minus);
        let operand = match &self.current().token {
            Token::Number(raw) => Operand::Literal(number(raw, negative)),
            _ if negative => return Err(self.gap("number")),
            Token::Placeholder(index) => Operand::Param(*index),
            Token::Str(s) => Operand::Literal(Value::String(s.clone())),
            t if t.is_keyword("NULL") => Operand::Literal(Value::Null),
            t if t.is_keyword("TRUE") => Operand::Literal(Value::Bool(true)),
            t if t.is_keyword("FALSE") => Operand::Literal(Value::Bool(false)),
            _ => return Err(self.gap("? or literal value")),
        };
        self.advance();
        Ok(operand)
    }

    fn bound(&mut self, expected: &'static str) -> Step<Operand> {
        let operand = match &self.current().token {
            Token::Placeholder(index) => Operand::Param(*index),
            Token::Number(raw) => match raw.parse::<u64>() {
                Ok(n) => Operand::Literal(Value::from(n)),
                Err(_) => return Err(self.gap(expected)),
            },
            _ => return Err(self.gap(expected)),
        };
        self.advance();
        Ok(operand)
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    /// Consumes the keyword if it is next.
    fn keyword(&mut self, kw: &str) -> bool {
        if self.current().token.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &'static str) -> Step<()> {
        if self.keyword(kw) {
            Ok(())
        } else {
            Err(self.gap(kw))
        }
    }

    /// Consumes the token if it matches.
    fn matches(&mut self, token: &Token<'_>) -> bool {
        if &self.current().token == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token<'_>, expected: &'static str) -> Step<()> {
        if self.matches(token) {
            Ok(())
        } else {
            Err(self.gap(expected))
        }
    }

    fn expect_eof(&self) -> Step<()> {
        if self.current().token == Token::Eof {
            Ok(())
        } else {
            Err(self.gap("end of statement"))
        }
    }

    fn current(&self) -> &SpannedToken<'a> {
        static EOF: SpannedToken<'static> = SpannedToken {
            token: Token::Eof,
            position: 0,
        };
        self.tokens.get(self.index).unwrap_or(&EOF)
    }

    fn peek_is(&self, token: &Token<'_>) -> bool {
        self.tokens
            .get(self.index.saturating_add(1))
            .is_some_and(|t| &t.token == token)
    }

    fn advance(&mut self) {
        if self.index.saturating_add(1) < self.tokens.len() {
            self.index = self.index.saturating_add(1);
        }
    }

    fn gap(&self, expected: &'static str) -> Gap {
        let current = self.current();
        Gap {
            expected,
            found: current.token.describe(),
            position: current.position,
        }
    }
}

fn number(raw: &str, negative: bool) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(if negative { n.saturating_neg() } else { n });
    }
    raw.parse::<f64>()
        .ok()
        .and_then(|f| Number::from_f64(if negative { -f } else { f }))
        .map_or(Value::Null, Value::Number)
}
