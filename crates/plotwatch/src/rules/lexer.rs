//! Tokenizer for rule expressions.
//!
//! Only numeric literals, the three delta variables, comparison operators,
//! `AND`/`OR` and parentheses are accepted. Everything else is rejected here,
//! before the parser ever sees it.

use super::RuleError;

/// The delta variables a rule can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Dvi,
    Dbi,
    Dwi,
}

impl Variable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::Dvi => "dvi",
            Variable::Dbi => "dbi",
            Variable::Dwi => "dwi",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Var(Variable),
    Op(CompareOp),
    And,
    Or,
    Minus,
    Plus,
    LParen,
    RParen,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, RuleError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (c, or_equal) {
                    ('<', true) => CompareOp::Le,
                    ('<', false) => CompareOp::Lt,
                    (_, true) => CompareOp::Ge,
                    (_, false) => CompareOp::Gt,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            '=' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(RuleError::UnexpectedCharacter { ch: c, pos: i });
                }
                tokens.push(Token::Op(CompareOp::Eq));
                i += 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value: f64 = text
                    .parse()
                    .map_err(|_| RuleError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "dvi" => Token::Var(Variable::Dvi),
                    "dbi" => Token::Var(Variable::Dbi),
                    "dwi" => Token::Var(Variable::Dwi),
                    _ => return Err(RuleError::UnknownIdentifier(word)),
                };
                tokens.push(token);
            }
            _ => return Err(RuleError::UnexpectedCharacter { ch: c, pos: i }),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_comparison() {
        let tokens = tokenize("dvi >= 0.3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Var(Variable::Dvi),
                Token::Op(CompareOp::Ge),
                Token::Number(0.3)
            ]
        );
    }

    #[test]
    fn test_tokenize_keywords_case_insensitive() {
        let tokens = tokenize("DVI < 1 and dbi == .5 OR (dwi > -2)").unwrap();
        assert!(tokens.contains(&Token::And));
        assert!(tokens.contains(&Token::Or));
        assert!(tokens.contains(&Token::Number(0.5)));
        assert!(tokens.contains(&Token::Minus));
    }

    #[test]
    fn test_rejects_foreign_identifiers() {
        assert!(matches!(
            tokenize("__import__"),
            Err(RuleError::UnexpectedCharacter { ch: '_', .. })
        ));
        assert!(matches!(
            tokenize("ndvi > 0"),
            Err(RuleError::UnknownIdentifier(_))
        ));
        assert!(matches!(
            tokenize("dvi > 0 and exit"),
            Err(RuleError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_characters() {
        for bad in ["dvi > 0; 1", "dvi = 1", "dvi != 1", "dvi * 2 > 1", "'dvi'", "dvi > 1e3"] {
            assert!(tokenize(bad).is_err(), "expected rejection: {bad}");
        }
    }

    #[test]
    fn test_invalid_number() {
        assert!(matches!(
            tokenize("dvi > 1.2.3"),
            Err(RuleError::InvalidNumber(_))
        ));
    }
}
