//! Query Parser - Recursive descent over the constrained SELECT grammar
//!
//! ```text
//! SELECT item [, item]* [FROM table]
//!   [WHERE cond [(AND|OR) cond]*]
//!   [GROUP BY col [, col]*]
//!   [ORDER BY col [ASC|DESC] [, ...]*]
//!   [LIMIT n] [;]
//! item := * | col [[AS] alias] | AGG(col | *) [[AS] alias]
//! cond := col (= | != | <> | > | < | >= | <=) literal | col IS [NOT] NULL
//! ```
//!
//! A missing FROM clause parses (as `from: None`) so the retry loop can fix
//! it; the engine rejects it.

use crate::error::QueryError;
use crate::query::ast::{
    AggregateArg, AggregateFunc, CompareOp, Condition, Connective, Literal, OrderKey, Predicate,
    SelectItem, SelectStatement, WhereClause,
};
use crate::query::lexer::{tokenize, Token};

const CLAUSE_KEYWORDS: &[&str] = &["from", "where", "group", "order", "limit"];
const UNSUPPORTED: &[&str] = &[
    "join", "union", "having", "with", "distinct", "offset", "over", "insert", "update", "delete",
];

pub fn parse_query(text: &str) -> Result<SelectStatement, QueryError> {
    let tokens = tokenize(text)?;
    Parser { tokens, pos: 0 }.parse_statement()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().map_or(false, |t| t.is_keyword(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", keyword.to_uppercase())))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expectation: &str) -> QueryError {
        match self.peek() {
            Some(token) => QueryError::Syntax(format!("{}, found '{}'", expectation, token.describe())),
            None => QueryError::Syntax(format!("{}, found end of query", expectation)),
        }
    }

    fn at_clause_boundary(&self) -> bool {
        match self.peek() {
            None | Some(Token::Semicolon) => true,
            Some(token) => CLAUSE_KEYWORDS.iter().any(|k| token.is_keyword(k)),
        }
    }

    fn check_unsupported(&self) -> Result<(), QueryError> {
        if let Some(Token::Ident(word)) = self.peek() {
            let lower = word.to_ascii_lowercase();
            if UNSUPPORTED.contains(&lower.as_str()) {
                return Err(QueryError::Syntax(format!(
                    "{} is not supported; only single-table SELECT with WHERE, GROUP BY, ORDER BY and LIMIT",
                    word.to_uppercase()
                )));
            }
        }
        Ok(())
    }

    /// Column name in a column position.
    fn identifier(&mut self, what: &str) -> Result<String, QueryError> {
        self.check_unsupported()?;
        match self.peek() {
            Some(Token::Ident(word)) if !is_reserved(word) => {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            Some(Token::QuotedIdent(name)) | Some(Token::DoubleQuoted(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("expected {}", what))),
        }
    }

    fn optional_alias(&mut self) -> Result<Option<String>, QueryError> {
        if self.eat_keyword("as") {
            return self.identifier("alias after AS").map(Some);
        }
        match self.peek() {
            Some(Token::Ident(word)) if !is_reserved(word) && !is_unsupported(word) => {
                let word = word.clone();
                self.pos += 1;
                Ok(Some(word))
            }
            Some(Token::QuotedIdent(_)) => self.identifier("alias").map(Some),
            _ => Ok(None),
        }
    }

    fn parse_statement(mut self) -> Result<SelectStatement, QueryError> {
        self.check_unsupported()?;
        self.expect_keyword("select")?;
        self.check_unsupported()?;

        let mut projections = vec![self.select_item()?];
        while self.eat(&Token::Comma) {
            projections.push(self.select_item()?);
        }

        let from = if self.eat_keyword("from") {
            Some(self.identifier("table name after FROM")?)
        } else {
            None
        };

        let filter = if self.eat_keyword("where") {
            Some(self.where_clause()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.eat_keyword("group") {
            self.expect_keyword("by")?;
            group_by.push(self.identifier("GROUP BY column")?);
            while self.eat(&Token::Comma) {
                group_by.push(self.identifier("GROUP BY column")?);
            }
        }

        let mut order_by = Vec::new();
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            order_by.push(self.order_key()?);
            while self.eat(&Token::Comma) {
                order_by.push(self.order_key()?);
            }
        }

        let limit = if self.eat_keyword("limit") {
            match self.peek().cloned() {
                Some(Token::Number(n)) => {
                    self.pos += 1;
                    Some(n.parse::<usize>().map_err(|_| {
                        QueryError::Syntax(format!("LIMIT needs a non-negative whole number, found '{}'", n))
                    })?)
                }
                _ => return Err(self.unexpected("expected a number after LIMIT")),
            }
        } else {
            None
        };

        while self.eat(&Token::Semicolon) {}
        if self.peek().is_some() {
            self.check_unsupported()?;
            return Err(self.unexpected("expected end of query"));
        }

        Ok(SelectStatement {
            projections,
            from,
            filter,
            group_by,
            order_by,
            limit,
        })
    }

    fn select_item(&mut self) -> Result<SelectItem, QueryError> {
        if self.eat(&Token::Star) {
            return Ok(SelectItem::Wildcard);
        }
        if self.at_clause_boundary() {
            return Err(self.unexpected("expected a column or aggregate in SELECT"));
        }

        if let (Some(Token::Ident(word)), Some(Token::LParen)) = (self.peek(), self.tokens.get(self.pos + 1)) {
            let func = AggregateFunc::from_name(word).ok_or_else(|| {
                QueryError::Syntax(format!(
                    "function {} is not supported; use SUM, AVG, COUNT, MIN or MAX",
                    word.to_uppercase()
                ))
            })?;
            self.pos += 2;
            self.check_unsupported()?;
            let arg = if self.eat(&Token::Star) {
                AggregateArg::Star
            } else {
                AggregateArg::Column(self.identifier("column inside aggregate")?)
            };
            if !self.eat(&Token::RParen) {
                return Err(self.unexpected(&format!("expected ')' to close {}", func.as_str())));
            }
            if arg == AggregateArg::Star && func != AggregateFunc::Count {
                return Err(QueryError::Syntax(format!(
                    "{}(*) is not valid; only COUNT(*) accepts *",
                    func.as_str()
                )));
            }
            let alias = self.optional_alias()?;
            return Ok(SelectItem::Aggregate { func, arg, alias });
        }

        let name = self.identifier("column in SELECT")?;
        let alias = self.optional_alias()?;
        Ok(SelectItem::Column { name, alias })
    }

    fn where_clause(&mut self) -> Result<WhereClause, QueryError> {
        let first = self.condition()?;
        let mut rest = Vec::new();
        loop {
            let connective = if self.eat_keyword("and") {
                Connective::And
            } else if self.eat_keyword("or") {
                Connective::Or
            } else {
                break;
            };
            rest.push((connective, self.condition()?));
        }
        Ok(WhereClause { first, rest })
    }

    fn condition(&mut self) -> Result<Condition, QueryError> {
        if self.peek() == Some(&Token::LParen) {
            return Err(QueryError::Syntax(
                "parentheses in WHERE are not supported; conditions are combined left to right".to_string(),
            ));
        }
        let column = self.identifier("column in WHERE condition")?;

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            self.expect_keyword("null")?;
            let predicate = if negated { Predicate::IsNotNull } else { Predicate::IsNull };
            return Ok(Condition { column, predicate });
        }

        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::NotEq) => CompareOp::NotEq,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::GtEq) => CompareOp::GtEq,
            Some(Token::LtEq) => CompareOp::LtEq,
            _ => return Err(self.unexpected(&format!("expected a comparison operator after '{}'", column))),
        };
        self.pos += 1;

        let value = match self.peek().cloned() {
            Some(Token::Number(n)) => Literal::Number(n),
            Some(Token::Str(s)) | Some(Token::DoubleQuoted(s)) => Literal::Text(s),
            // Bare words are read as text, e.g. `WHERE uf = SP`.
            Some(Token::Ident(word)) if !is_reserved(&word) => Literal::Text(word),
            _ => return Err(self.unexpected(&format!("expected a value after {}", op.symbol()))),
        };
        self.pos += 1;

        Ok(Condition {
            column,
            predicate: Predicate::Compare { op, value },
        })
    }

    fn order_key(&mut self) -> Result<OrderKey, QueryError> {
        // ORDER BY may repeat an aggregate expression instead of its name.
        let column = if let (Some(Token::Ident(word)), Some(Token::LParen)) =
            (self.peek(), self.tokens.get(self.pos + 1))
        {
            match AggregateFunc::from_name(word) {
                Some(_) => match self.select_item()? {
                    item @ SelectItem::Aggregate { .. } => item.output_name(),
                    _ => return Err(self.unexpected("expected ORDER BY column")),
                },
                None => return Err(self.unexpected("expected ORDER BY column")),
            }
        } else {
            self.identifier("ORDER BY column")?
        };
        let descending = if self.eat_keyword("desc") {
            true
        } else {
            self.eat_keyword("asc");
            false
        };
        Ok(OrderKey { column, descending })
    }
}

fn is_reserved(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    [
        "select", "from", "where", "and", "or", "group", "order", "by", "asc", "desc", "limit",
        "as", "is", "not", "null",
    ]
    .contains(&lower.as_str())
}

fn is_unsupported(word: &str) -> bool {
    UNSUPPORTED.contains(&word.to_ascii_lowercase().as_str())
}
