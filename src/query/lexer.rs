//! Query Lexer - Splits query text into tokens

use crate::error::QueryError;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Bare word; keywords are recognized by the parser, case-insensitively.
    Ident(String),
    /// Back-tick delimited identifier.
    QuotedIdent(String),
    /// Single-quoted string.
    Str(String),
    /// Double-quoted text. A column name in column positions, a string in value positions.
    DoubleQuoted(String),
    Number(String),
    Comma,
    LParen,
    RParen,
    Star,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Semicolon,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(word) if word.eq_ignore_ascii_case(keyword))
    }

    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) | Token::Number(s) => s.clone(),
            Token::QuotedIdent(s) => format!("`{}`", s),
            Token::Str(s) => format!("'{}'", s),
            Token::DoubleQuoted(s) => format!("\"{}\"", s),
            Token::Comma => ",".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Star => "*".to_string(),
            Token::Eq => "=".to_string(),
            Token::NotEq => "!=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Lt => "<".to_string(),
            Token::GtEq => ">=".to_string(),
            Token::LtEq => "<=".to_string(),
            Token::Semicolon => ";".to_string(),
        }
    }
}

fn read_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), QueryError> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            // Doubled quote is an escaped quote.
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        if c == '\\' && chars.get(i + 1) == Some(&quote) {
            out.push(quote);
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(QueryError::Syntax(format!(
        "unterminated {} starting at position {}",
        if quote == '`' { "identifier" } else { "string" },
        start
    )))
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::LtEq);
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::NotEq);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i, '\'')?;
                tokens.push(Token::Str(text));
                i = next;
            }
            '"' => {
                let (text, next) = read_quoted(&chars, i, '"')?;
                tokens.push(Token::DoubleQuoted(text));
                i = next;
            }
            '`' => {
                let (text, next) = read_quoted(&chars, i, '`')?;
                tokens.push(Token::QuotedIdent(text));
                i = next;
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '.') && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Normalized headers may start with a digit, e.g. `1o_trimestre`.
                let word_follows = i < chars.len() && (chars[i].is_alphabetic() || chars[i] == '_');
                if c.is_ascii_digit() && word_follows {
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                        i += 1;
                    }
                    tokens.push(Token::Ident(chars[start..i].iter().collect()));
                } else {
                    tokens.push(Token::Number(chars[start..i].iter().collect()));
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(QueryError::Syntax(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )));
            }
        }
    }

    Ok(tokens)
}
