//! Restricted evaluator for `#...#` option values.
//!
//! Option files may compute a value at load time, most commonly to build a
//! path below the data pool. Only string literals, `+` concatenation and
//! calls to functions the [`ExpressionContext`] explicitly allows are
//! accepted:
//!
//! ```text
//! expr   = term ('+' term)*
//! term   = string | call
//! string = '...' | "..."
//! call   = ident '(' [string (',' string)*] ')'
//! ```

use crate::errors::{CmbsError, CmbsResult};
use std::path::{Path, PathBuf};

/// Default location of the observational data pool.
pub const DEFAULT_DATA_POOL: &str = "/pool/SEP/";

/// Environment variable overriding [`DEFAULT_DATA_POOL`].
pub const DATA_POOL_ENV: &str = "SEP";

/// Supplies the functions callable from an option expression.
pub trait ExpressionContext {
    /// Call `name` with `args`.
    ///
    /// Implementations return [`CmbsError::Expression`] for any function they
    /// do not allow.
    fn call(&self, name: &str, args: &[String]) -> CmbsResult<String>;
}

/// The functions available to option files during a normal run.
#[derive(Debug, Clone)]
pub struct StandardContext {
    data_pool: PathBuf,
    tempdir: PathBuf,
}

impl StandardContext {
    pub fn new(data_pool: impl Into<PathBuf>, tempdir: impl Into<PathBuf>) -> Self {
        Self {
            data_pool: data_pool.into(),
            tempdir: tempdir.into(),
        }
    }

    /// Take the data pool from `$SEP`, falling back to [`DEFAULT_DATA_POOL`].
    pub fn from_env(tempdir: &Path) -> Self {
        let pool = std::env::var(DATA_POOL_ENV).unwrap_or_else(|_| DEFAULT_DATA_POOL.to_string());
        Self::new(pool, tempdir)
    }
}

impl ExpressionContext for StandardContext {
    fn call(&self, name: &str, args: &[String]) -> CmbsResult<String> {
        let path = match name {
            "get_data_pool_directory" => &self.data_pool,
            "get_temporary_directory" => &self.tempdir,
            _ => {
                return Err(CmbsError::Expression {
                    expression: name.to_string(),
                    message: "function is not allowed in option files".to_string(),
                })
            }
        };
        if !args.is_empty() {
            return Err(CmbsError::Expression {
                expression: name.to_string(),
                message: format!("takes no arguments, {} given", args.len()),
            });
        }
        Ok(path.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Evaluator<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a dyn ExpressionContext,
}

impl Evaluator<'_> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self) -> Result<String, CmbsError> {
        let mut out = self.term()?;
        while self.peek() == Some(&Token::Plus) {
            self.next();
            out.push_str(&self.term()?);
        }
        match self.peek() {
            None => Ok(out),
            Some(t) => Err(syntax(format!("unexpected {t:?}"))),
        }
    }

    fn term(&mut self) -> Result<String, CmbsError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            Some(Token::Ident(name)) => {
                if self.next() != Some(Token::LParen) {
                    return Err(syntax(format!("expected '(' after {name}")));
                }
                let args = self.args()?;
                self.ctx.call(&name, &args)
            }
            Some(t) => Err(syntax(format!("unexpected {t:?}"))),
            None => Err(syntax("unexpected end of expression".to_string())),
        }
    }

    fn args(&mut self) -> Result<Vec<String>, CmbsError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            match self.next() {
                Some(Token::Str(s)) => args.push(s),
                _ => return Err(syntax("arguments must be string literals".to_string())),
            }
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(syntax("expected ',' or ')'".to_string())),
            }
        }
    }
}

fn syntax(message: String) -> CmbsError {
    CmbsError::Expression {
        expression: String::new(),
        message,
    }
}

/// Evaluate the interior of a `#...#` option value.
pub fn evaluate(expr: &str, ctx: &dyn ExpressionContext) -> CmbsResult<String> {
    let with_expression = |e: CmbsError| match e {
        CmbsError::Expression { message, .. } => CmbsError::Expression {
            expression: expr.to_string(),
            message,
        },
        other => other,
    };

    let tokens = tokenize(expr).map_err(|message| CmbsError::Expression {
        expression: expr.to_string(),
        message,
    })?;
    if tokens.is_empty() {
        return Err(CmbsError::Expression {
            expression: expr.to_string(),
            message: "empty expression".to_string(),
        });
    }

    let mut evaluator = Evaluator {
        tokens,
        pos: 0,
        ctx,
    };
    evaluator.expr().map_err(with_expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StandardContext {
        StandardContext::new("/pool/SEP/", "/scratch/tmp/")
    }

    #[test]
    fn literal() {
        assert_eq!(evaluate("'abc'", &ctx()).unwrap(), "abc");
    }

    #[test]
    fn concatenation() {
        let out = evaluate(
            "get_data_pool_directory() + \"data/\" + 'gpcp.nc'",
            &ctx(),
        )
        .unwrap();
        assert_eq!(out, "/pool/SEP/data/gpcp.nc");
    }

    #[test]
    fn temporary_directory() {
        assert_eq!(
            evaluate("get_temporary_directory()", &ctx()).unwrap(),
            "/scratch/tmp/"
        );
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = evaluate("__import__('os')", &ctx()).unwrap_err();
        match err {
            CmbsError::Expression { expression, .. } => assert_eq!(expression, "__import__('os')"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn attribute_access_is_rejected() {
        assert!(evaluate("os.system('ls')", &ctx()).is_err());
    }

    #[test]
    fn arguments_are_checked() {
        assert!(evaluate("get_data_pool_directory('x')", &ctx()).is_err());
    }

    #[test]
    fn syntax_errors() {
        assert!(evaluate("", &ctx()).is_err());
        assert!(evaluate("'open", &ctx()).is_err());
        assert!(evaluate("'a' +", &ctx()).is_err());
        assert!(evaluate("'a' 'b'", &ctx()).is_err());
        assert!(evaluate("get_temporary_directory(", &ctx()).is_err());
    }
}
