//! Recursive descent parser for rule expressions.
//!
//! Grammar:
//! ```text
//! rule       := or_expr
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := primary (AND primary)*
//! primary    := '(' or_expr ')' | comparison
//! comparison := operand op operand
//! operand    := ['-' | '+'] number | variable
//! op         := '<' | '>' | '<=' | '>=' | '=='
//! ```

use super::lexer::{tokenize, CompareOp, Token, Variable};
use super::{Bindings, RuleError};

/// Maximum accepted rule length, in characters.
pub const MAX_RULE_LEN: usize = 1024;

/// Maximum parenthesis nesting depth.
pub const MAX_DEPTH: usize = 32;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(Variable),
    Literal(f64),
}

impl Operand {
    fn value(&self, bindings: &Bindings) -> f64 {
        match self {
            Operand::Var(v) => bindings.get(*v),
            Operand::Literal(n) => *n,
        }
    }
}

/// Typed rule AST.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpr {
    Comparison {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Box<RuleExpr>, Box<RuleExpr>),
    Or(Box<RuleExpr>, Box<RuleExpr>),
}

impl RuleExpr {
    /// Evaluate against bound variables. NaN never compares true.
    pub fn eval(&self, bindings: &Bindings) -> bool {
        match self {
            RuleExpr::Comparison { left, op, right } => {
                let l = left.value(bindings);
                let r = right.value(bindings);
                match op {
                    CompareOp::Lt => l < r,
                    CompareOp::Gt => l > r,
                    CompareOp::Le => l <= r,
                    CompareOp::Ge => l >= r,
                    CompareOp::Eq => l == r,
                }
            }
            RuleExpr::And(a, b) => a.eval(bindings) && b.eval(bindings),
            RuleExpr::Or(a, b) => a.eval(bindings) || b.eval(bindings),
        }
    }
}

/// Parse a rule string into an AST.
pub fn parse(input: &str) -> Result<RuleExpr, RuleError> {
    let len = input.chars().count();
    if len > MAX_RULE_LEN {
        return Err(RuleError::TooLong {
            len,
            max: MAX_RULE_LEN,
        });
    }

    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(RuleError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;

    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(RuleError::UnexpectedToken(format!("{t:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<RuleExpr, RuleError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = RuleExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<RuleExpr, RuleError> {
        let mut left = self.parse_primary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_primary()?;
            left = RuleExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<RuleExpr, RuleError> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            self.depth += 1;
            if self.depth > MAX_DEPTH {
                return Err(RuleError::TooDeep(MAX_DEPTH));
            }
            let inner = self.parse_or()?;
            match self.advance() {
                Some(Token::RParen) => {}
                Some(t) => return Err(RuleError::UnexpectedToken(format!("{t:?}"))),
                None => return Err(RuleError::UnexpectedEnd("')'")),
            }
            self.depth -= 1;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<RuleExpr, RuleError> {
        let left = self.parse_operand()?;
        let op = match self.advance() {
            Some(Token::Op(op)) => op,
            Some(t) => return Err(RuleError::UnexpectedToken(format!("{t:?}"))),
            None => return Err(RuleError::UnexpectedEnd("comparison operator")),
        };
        let right = self.parse_operand()?;
        Ok(RuleExpr::Comparison { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, RuleError> {
        match self.advance() {
            Some(Token::Var(v)) => Ok(Operand::Var(v)),
            Some(Token::Number(n)) => Ok(Operand::Literal(n)),
            Some(sign @ (Token::Minus | Token::Plus)) => match self.advance() {
                Some(Token::Number(n)) if sign == Token::Minus => Ok(Operand::Literal(-n)),
                Some(Token::Number(n)) => Ok(Operand::Literal(n)),
                Some(t) => Err(RuleError::UnexpectedToken(format!("{t:?}"))),
                None => Err(RuleError::UnexpectedEnd("number")),
            },
            Some(t) => Err(RuleError::UnexpectedToken(format!("{t:?}"))),
            None => Err(RuleError::UnexpectedEnd("operand")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_comparison() {
        let expr = parse("dvi > 0.3").unwrap();
        assert_eq!(
            expr,
            RuleExpr::Comparison {
                left: Operand::Var(Variable::Dvi),
                op: CompareOp::Gt,
                right: Operand::Literal(0.3),
            }
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("dvi > 1 OR dbi > 1 AND dwi > 1").unwrap();
        match expr {
            RuleExpr::Or(left, right) => {
                assert!(matches!(*left, RuleExpr::Comparison { .. }));
                assert!(matches!(*right, RuleExpr::And(_, _)));
            }
            other => panic!("expected OR at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_parentheses_group() {
        let expr = parse("(dvi > 1 OR dbi > 1) AND dwi > 1").unwrap();
        assert!(matches!(expr, RuleExpr::And(_, _)));
    }

    #[test]
    fn test_negative_literal() {
        let expr = parse("dbi < -0.1").unwrap();
        if let RuleExpr::Comparison { right, .. } = expr {
            assert_eq!(right, Operand::Literal(-0.1));
        } else {
            panic!("expected comparison");
        }
    }

    #[test]
    fn test_literal_on_left() {
        assert!(parse("0.2 <= dwi").is_ok());
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse(""), Err(RuleError::Empty)));
        assert!(matches!(parse("   "), Err(RuleError::Empty)));
        assert!(matches!(parse("dvi >"), Err(RuleError::UnexpectedEnd(_))));
        assert!(matches!(parse("(dvi > 1"), Err(RuleError::UnexpectedEnd(_))));
        assert!(parse("dvi > 1)").is_err());
        assert!(parse("dvi > 1 AND").is_err());
        assert!(parse("dvi dbi").is_err());
        assert!(parse("dvi > - dbi").is_err());
        assert!(parse("AND dvi > 1").is_err());
        assert!(parse("dvi > 1 > 2").is_err());
    }

    #[test]
    fn test_limits() {
        let long = format!("dvi > {}", "1".repeat(MAX_RULE_LEN));
        assert!(matches!(parse(&long), Err(RuleError::TooLong { .. })));

        let deep = format!("{}dvi > 1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&deep), Err(RuleError::TooDeep(_))));

        let ok = format!("{}dvi > 1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse(&ok).is_ok());
    }
}
