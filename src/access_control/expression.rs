//! Access expressions
//!
//! Rules carry a small boolean expression that is parsed once, when the rule
//! set is built, and evaluated for every matching request.
//!
//! ## Syntax
//!
//! ```text
//! permitAll
//! hasRole('ADMIN')
//! hasAnyRole('ADMIN', 'STAFF') or hasAuthority('SCOPE_write')
//! #user == 'alice' and not hasRole('SUSPENDED')
//! (#tenant != 'internal' || hasRole('ROOT')) && !denyAll
//! ```
//!
//! Precedence is `not` over `and` over `or`; binary operators associate to
//! the left and short-circuit. Keywords are case-insensitive.

use crate::error::ExpressionError;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Maximum nesting depth accepted by the parser
pub const MAX_EXPR_DEPTH: usize = 32;

/// Maximum length of an expression source
pub const MAX_EXPR_LENGTH: usize = 1024;

/// Default prefix turning a logical role (`ADMIN`) into an authority (`ROLE_ADMIN`)
pub const DEFAULT_ROLE_PREFIX: &str = "ROLE_";

/// Parsed access expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessExpression {
    PermitAll,
    DenyAll,
    /// Any of the logical roles, prefix applied at evaluation time
    HasAnyRole(Vec<String>),
    /// Any of the raw authority tokens
    HasAnyAuthority(Vec<String>),
    /// Compare a captured path variable with a literal
    Variable {
        name: String,
        op: CompareOp,
        value: String,
    },
    And(Box<AccessExpression>, Box<AccessExpression>),
    Or(Box<AccessExpression>, Box<AccessExpression>),
    Not(Box<AccessExpression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Equal => write!(f, "=="),
            CompareOp::NotEqual => write!(f, "!="),
        }
    }
}

/// Everything an expression may look at for one request
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Authorities after role hierarchy expansion
    pub authorities: &'a HashSet<String>,
    /// Variables captured by the matched path pattern
    pub variables: &'a HashMap<String, String>,
    pub role_prefix: &'a str,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        authorities: &'a HashSet<String>,
        variables: &'a HashMap<String, String>,
    ) -> Self {
        Self {
            authorities,
            variables,
            role_prefix: DEFAULT_ROLE_PREFIX,
        }
    }

    pub fn with_role_prefix(mut self, role_prefix: &'a str) -> Self {
        self.role_prefix = role_prefix;
        self
    }

    fn has_role(&self, role: &str) -> bool {
        if role.starts_with(self.role_prefix) {
            self.authorities.contains(role)
        } else {
            self.authorities
                .contains(&format!("{}{}", self.role_prefix, role))
        }
    }
}

impl AccessExpression {
    pub fn has_role(role: impl Into<String>) -> Self {
        AccessExpression::HasAnyRole(vec![role.into()])
    }

    pub fn has_authority(authority: impl Into<String>) -> Self {
        AccessExpression::HasAnyAuthority(vec![authority.into()])
    }

    pub fn var_eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        AccessExpression::Variable {
            name: name.into(),
            op: CompareOp::Equal,
            value: value.into(),
        }
    }

    pub fn and(self, other: AccessExpression) -> Self {
        AccessExpression::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: AccessExpression) -> Self {
        AccessExpression::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        AccessExpression::Not(Box::new(self))
    }

    /// Evaluate against a request context. Never fails: an undefined
    /// variable makes its comparison false.
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> bool {
        match self {
            AccessExpression::PermitAll => true,
            AccessExpression::DenyAll => false,
            AccessExpression::HasAnyRole(roles) => roles.iter().any(|r| ctx.has_role(r)),
            AccessExpression::HasAnyAuthority(authorities) => {
                authorities.iter().any(|a| ctx.authorities.contains(a))
            }
            AccessExpression::Variable { name, op, value } => match ctx.variables.get(name) {
                Some(actual) => match op {
                    CompareOp::Equal => actual == value,
                    CompareOp::NotEqual => actual != value,
                },
                None => false,
            },
            AccessExpression::And(left, right) => left.evaluate(ctx) && right.evaluate(ctx),
            AccessExpression::Or(left, right) => left.evaluate(ctx) || right.evaluate(ctx),
            AccessExpression::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// Parse an expression
    ///
    /// # Grammar
    ///
    /// ```text
    /// expr    ::= and (('or' | '||') and)*
    /// and     ::= not (('and' | '&&') not)*
    /// not     ::= ('not' | '!') not | primary
    /// primary ::= '(' expr ')' | 'permitAll' | 'denyAll' | 'true' | 'false'
    ///           | name '(' (arg (',' arg)*)? ')'
    ///           | '#' name ('==' | '!=') string
    /// arg     ::= string | name
    /// ```
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        if input.len() > MAX_EXPR_LENGTH {
            return Err(ExpressionError::TooLong {
                max: MAX_EXPR_LENGTH,
                length: input.len(),
            });
        }

        let tokens = tokenize(input)?;
        let mut parser = Parser::new(&tokens);
        let expr = parser.parse_or(0)?;
        if let Some(token) = parser.current() {
            return Err(ExpressionError::Syntax(format!(
                "unexpected {} after end of expression",
                token
            )));
        }
        Ok(expr)
    }
}

/// Quote a literal with whichever quote character it does not contain.
/// Literals have no escapes, so one holding both kinds cannot be written back.
fn quoted(value: &str) -> String {
    if value.contains('\'') {
        format!("\"{}\"", value)
    } else {
        format!("'{}'", value)
    }
}

impl fmt::Display for AccessExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(items: &[String]) -> String {
            items
                .iter()
                .map(|i| quoted(i))
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            AccessExpression::PermitAll => write!(f, "permitAll"),
            AccessExpression::DenyAll => write!(f, "denyAll"),
            AccessExpression::HasAnyRole(roles) if roles.len() == 1 => {
                write!(f, "hasRole({})", list(roles))
            }
            AccessExpression::HasAnyRole(roles) => write!(f, "hasAnyRole({})", list(roles)),
            AccessExpression::HasAnyAuthority(a) if a.len() == 1 => {
                write!(f, "hasAuthority({})", list(a))
            }
            AccessExpression::HasAnyAuthority(a) => write!(f, "hasAnyAuthority({})", list(a)),
            AccessExpression::Variable { name, op, value } => {
                write!(f, "#{} {} {}", name, op, quoted(value))
            }
            AccessExpression::And(l, r) => write!(f, "({} and {})", l, r),
            AccessExpression::Or(l, r) => write!(f, "({} or {})", l, r),
            AccessExpression::Not(inner) => write!(f, "not {}", inner),
        }
    }
}

// ===== TOKENIZER =====

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    And,
    Or,
    Not,
    LeftParen,
    RightParen,
    Comma,
    Hash,
    Equal,
    NotEqual,
    Identifier(String),
    StringLiteral(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => write!(f, "'and'"),
            Token::Or => write!(f, "'or'"),
            Token::Not => write!(f, "'not'"),
            Token::LeftParen => write!(f, "'('"),
            Token::RightParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::Hash => write!(f, "'#'"),
            Token::Equal => write!(f, "'=='"),
            Token::NotEqual => write!(f, "'!='"),
            Token::Identifier(name) => write!(f, "identifier '{}'", name),
            Token::StringLiteral(value) => write!(f, "string '{}'", value),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | '#' => {
                chars.next();
                tokens.push(match ch {
                    '(' => Token::LeftParen,
                    ')' => Token::RightParen,
                    ',' => Token::Comma,
                    _ => Token::Hash,
                });
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(ExpressionError::Syntax(
                        "single '=' not allowed, use '=='".into(),
                    ));
                }
                tokens.push(Token::Equal);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::NotEqual);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if_eq(&ch).is_none() {
                    return Err(ExpressionError::Syntax(format!(
                        "single '{}' not allowed, use '{}{}'",
                        ch, ch, ch
                    )));
                }
                tokens.push(if ch == '&' { Token::And } else { Token::Or });
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => {
                            return Err(ExpressionError::Syntax(
                                "unterminated string literal".into(),
                            ));
                        }
                    }
                }
                tokens.push(Token::StringLiteral(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
                    ident.push(c);
                }
                tokens.push(match ident.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Identifier(ident),
                });
            }
            _ => {
                return Err(ExpressionError::Syntax(format!(
                    "unexpected character '{}'",
                    ch
                )));
            }
        }
    }

    Ok(tokens)
}

// ===== PARSER =====

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(token) if *token == expected => Ok(()),
            Some(token) => Err(ExpressionError::Syntax(format!(
                "expected {}, got {}",
                expected, token
            ))),
            None => Err(ExpressionError::Syntax(format!(
                "expected {}, got end of input",
                expected
            ))),
        }
    }

    fn check_depth(depth: usize) -> Result<(), ExpressionError> {
        if depth > MAX_EXPR_DEPTH {
            return Err(ExpressionError::TooDeep {
                max: MAX_EXPR_DEPTH,
            });
        }
        Ok(())
    }

    fn parse_or(&mut self, depth: usize) -> Result<AccessExpression, ExpressionError> {
        Self::check_depth(depth)?;
        let mut left = self.parse_and(depth)?;
        while matches!(self.current(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and(depth)?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn parse_and(&mut self, depth: usize) -> Result<AccessExpression, ExpressionError> {
        let mut left = self.parse_not(depth)?;
        while matches!(self.current(), Some(Token::And)) {
            self.advance();
            let right = self.parse_not(depth)?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn parse_not(&mut self, depth: usize) -> Result<AccessExpression, ExpressionError> {
        if matches!(self.current(), Some(Token::Not)) {
            self.advance();
            Self::check_depth(depth + 1)?;
            return Ok(self.parse_not(depth + 1)?.negate());
        }
        self.parse_primary(depth)
    }

    fn parse_primary(&mut self, depth: usize) -> Result<AccessExpression, ExpressionError> {
        match self.advance() {
            Some(Token::LeftParen) => {
                let expr = self.parse_or(depth + 1)?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Some(Token::Hash) => self.parse_variable(),
            Some(Token::Identifier(name)) => self.parse_call(name),
            Some(token) => Err(ExpressionError::Syntax(format!(
                "expected expression, got {}",
                token
            ))),
            None => Err(ExpressionError::Syntax(
                "expected expression, got end of input".into(),
            )),
        }
    }

    fn parse_variable(&mut self) -> Result<AccessExpression, ExpressionError> {
        let name = match self.advance() {
            Some(Token::Identifier(name)) => name.clone(),
            _ => {
                return Err(ExpressionError::Syntax(
                    "expected variable name after '#'".into(),
                ));
            }
        };
        let op = match self.advance() {
            Some(Token::Equal) => CompareOp::Equal,
            Some(Token::NotEqual) => CompareOp::NotEqual,
            _ => {
                return Err(ExpressionError::Syntax(format!(
                    "expected '==' or '!=' after #{}",
                    name
                )));
            }
        };
        let value = match self.advance() {
            Some(Token::StringLiteral(value)) => value.clone(),
            _ => {
                return Err(ExpressionError::Syntax(format!(
                    "expected string literal in comparison with #{}",
                    name
                )));
            }
        };
        Ok(AccessExpression::Variable { name, op, value })
    }

    fn parse_call(&mut self, name: &str) -> Result<AccessExpression, ExpressionError> {
        let args = if matches!(self.current(), Some(Token::LeftParen)) {
            self.advance();
            Some(self.parse_args()?)
        } else {
            None
        };

        let arity = |expected: &'static str, actual: usize| ExpressionError::Arity {
            name: name.to_string(),
            expected,
            actual,
        };

        match (name, args) {
            ("permitAll" | "true", None) => Ok(AccessExpression::PermitAll),
            ("denyAll" | "false", None) => Ok(AccessExpression::DenyAll),
            ("permitAll", Some(args)) if args.is_empty() => Ok(AccessExpression::PermitAll),
            ("denyAll", Some(args)) if args.is_empty() => Ok(AccessExpression::DenyAll),
            ("permitAll" | "denyAll", Some(args)) => Err(arity("0", args.len())),
            ("hasRole", Some(args)) if args.len() == 1 => Ok(AccessExpression::HasAnyRole(args)),
            ("hasAuthority", Some(args)) if args.len() == 1 => {
                Ok(AccessExpression::HasAnyAuthority(args))
            }
            ("hasRole" | "hasAuthority", Some(args)) => Err(arity("1", args.len())),
            ("hasAnyRole", Some(args)) if !args.is_empty() => {
                Ok(AccessExpression::HasAnyRole(args))
            }
            ("hasAnyAuthority", Some(args)) if !args.is_empty() => {
                Ok(AccessExpression::HasAnyAuthority(args))
            }
            ("hasAnyRole" | "hasAnyAuthority", Some(args)) => Err(arity("1 or more", args.len())),
            ("hasRole" | "hasAuthority" | "hasAnyRole" | "hasAnyAuthority", None) => {
                Err(ExpressionError::Syntax(format!("expected '(' after {}", name)))
            }
            _ => Err(ExpressionError::UnknownFunction(name.to_string())),
        }
    }

    // Called after '('; consumes the closing ')'
    fn parse_args(&mut self) -> Result<Vec<String>, ExpressionError> {
        let mut args = Vec::new();
        if matches!(self.current(), Some(Token::RightParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            match self.advance() {
                Some(Token::StringLiteral(value)) | Some(Token::Identifier(value)) => {
                    args.push(value.clone())
                }
                Some(token) => {
                    return Err(ExpressionError::Syntax(format!(
                        "expected argument, got {}",
                        token
                    )));
                }
                None => {
                    return Err(ExpressionError::Syntax(
                        "unterminated argument list".into(),
                    ));
                }
            }
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RightParen) => return Ok(args),
                _ => {
                    return Err(ExpressionError::Syntax(
                        "expected ',' or ')' in argument list".into(),
                    ));
                }
            }
        }
    }
}
