//! Recursive-descent parser, one function per precedence level.

use twinwatch_core::TwinQuery;

use crate::ast::{BinaryOp, Expression, Literal, TwinRef, UnaryOp};
use crate::error::ParseError;
use crate::lexer::{tokenize, Spanned, Token};

/// Nesting limit; deeper input is rejected instead of overflowing the stack.
const MAX_DEPTH: usize = 200;

/// Parse expression text. Pure: the same text always yields the same tree.
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: input.chars().count(),
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek_spanned() {
        return Err(ParseError::new(extra.position, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_spanned().map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.peek_spanned().map(|s| s.position).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(id)) if id.eq_ignore_ascii_case(keyword))
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(t) if *t == expected => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ParseError::new(self.position(), format!("expected {}", what))),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(self.position(), "expression nested too deeply"));
        }
        Ok(())
    }

    // ── Binary levels ───────────────────────────────────────────

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        self.enter()?;
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Pipe)) || self.peek_keyword("OR") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expression::binary(BinaryOp::Or, left, right);
        }
        self.depth -= 1;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_equality()?;
        while matches!(self.peek(), Some(Token::Amp)) || self.peek_keyword("AND") {
            self.pos += 1;
            let right = self.parse_equality()?;
            left = Expression::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_power()?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    /// `^` is right-associative: `a ^ b ^ c` is `a ^ (b ^ c)`.
    fn parse_power(&mut self) -> Result<Expression, ParseError> {
        let base = self.parse_unary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.pos += 1;
            self.enter()?;
            let exponent = self.parse_power()?;
            self.depth -= 1;
            return Ok(Expression::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let op = if matches!(self.peek(), Some(Token::Minus)) {
            Some(UnaryOp::Neg)
        } else if matches!(self.peek(), Some(Token::Bang)) || self.peek_keyword("NOT") {
            Some(UnaryOp::Not)
        } else {
            None
        };
        let Some(op) = op else {
            return self.parse_primary();
        };

        self.pos += 1;
        self.enter()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;

        Ok(match (op, operand) {
            (UnaryOp::Neg, Expression::Literal(Literal::Number { value, unit })) => {
                Expression::Literal(Literal::Number { value: -value, unit })
            }
            (op, operand) => Expression::unary(op, operand),
        })
    }

    // ── Atoms ───────────────────────────────────────────────────

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let position = self.position();
        let Some(spanned) = self.advance() else {
            return Err(ParseError::new(position, "unexpected end of expression"));
        };

        match spanned.token {
            Token::Number { value, unit } => Ok(Expression::Literal(Literal::Number { value, unit })),
            Token::Str(text) => Ok(Expression::Literal(Literal::Text(text))),
            Token::Bracket(name) => Ok(bracket_reference(name)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(ident) => self.parse_identifier(ident, position),
            other => Err(ParseError::new(position, format!("unexpected token {:?}", other))),
        }
    }

    fn parse_identifier(&mut self, ident: String, position: usize) -> Result<Expression, ParseError> {
        let upper = ident.to_ascii_uppercase();
        match upper.as_str() {
            "TRUE" => return Ok(Expression::Literal(Literal::Bool(true))),
            "FALSE" => return Ok(Expression::Literal(Literal::Bool(false))),
            "NULL" => return Ok(Expression::Literal(Literal::Null)),
            "AND" | "OR" | "NOT" => {
                return Err(ParseError::new(position, format!("unexpected keyword {}", upper)));
            }
            _ => {}
        }

        if !matches!(self.peek(), Some(Token::LParen)) {
            return Ok(Expression::Variable(ident));
        }
        self.pos += 1;
        let args = self.parse_arguments()?;

        if upper == "UNDER" {
            return match args.as_slice() {
                [Expression::Twin(TwinRef { query: TwinQuery::Related, model })] => Ok(Expression::Twin(TwinRef {
                    query: TwinQuery::Under,
                    model: model.clone(),
                })),
                _ => Err(ParseError::new(position, "UNDER expects a single [model] argument")),
            };
        }
        Ok(Expression::Call(upper, args))
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(ParseError::new(self.position(), "expected ',' or ')'")),
            }
        }
    }
}

/// `[dtmi:...]` names a model and becomes a twin reference; any other
/// bracketed text is a variable.
fn bracket_reference(name: String) -> Expression {
    if name.contains(':') {
        Expression::Twin(TwinRef {
            query: TwinQuery::Related,
            model: name,
        })
    } else {
        Expression::Variable(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Expression {
        Expression::number(v)
    }

    fn var(name: &str) -> Expression {
        Expression::variable(name)
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("a + b * c").unwrap(),
            Expression::binary(BinaryOp::Add, var("a"), Expression::binary(BinaryOp::Mul, var("b"), var("c")))
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(
            parse("a - b - c").unwrap(),
            Expression::binary(BinaryOp::Sub, Expression::binary(BinaryOp::Sub, var("a"), var("b")), var("c"))
        );
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(
            parse("2 ^ 3 ^ 2").unwrap(),
            Expression::binary(BinaryOp::Pow, num(2.0), Expression::binary(BinaryOp::Pow, num(3.0), num(2.0)))
        );
    }

    #[test]
    fn unary_binds_tighter_than_power() {
        assert_eq!(
            parse("-x ^ 2").unwrap(),
            Expression::binary(BinaryOp::Pow, Expression::unary(UnaryOp::Neg, var("x")), num(2.0))
        );
        assert_eq!(parse("-5").unwrap(), num(-5.0));
    }

    #[test]
    fn logical_keywords_and_symbols_agree() {
        assert_eq!(parse("a AND b OR NOT c").unwrap(), parse("a & b | !c").unwrap());
        assert_eq!(parse("a and b").unwrap(), parse("a & b").unwrap());
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(
            parse("a | b & c").unwrap(),
            Expression::binary(BinaryOp::Or, var("a"), Expression::binary(BinaryOp::And, var("b"), var("c")))
        );
    }

    #[test]
    fn comparison_binds_tighter_than_equality() {
        assert_eq!(
            parse("a < b == c > d").unwrap(),
            Expression::binary(
                BinaryOp::Eq,
                Expression::binary(BinaryOp::Lt, var("a"), var("b")),
                Expression::binary(BinaryOp::Gt, var("c"), var("d"))
            )
        );
        assert_eq!(parse("a = b").unwrap(), parse("a == b").unwrap());
    }

    #[test]
    fn bracket_with_colon_is_twin_reference() {
        assert_eq!(
            parse("[dtmi:com:acme:Sensor;1]").unwrap(),
            Expression::Twin(TwinRef {
                query: TwinQuery::Related,
                model: "dtmi:com:acme:Sensor;1".into()
            })
        );
        assert_eq!(parse("[zone temp]").unwrap(), var("zone temp"));
    }

    #[test]
    fn under_wraps_a_model() {
        assert_eq!(
            parse("under([dtmi:com:acme:Floor;1])").unwrap(),
            Expression::Twin(TwinRef {
                query: TwinQuery::Under,
                model: "dtmi:com:acme:Floor;1".into()
            })
        );
        assert!(parse("UNDER(a, b)").is_err());
        assert!(parse("UNDER(x)").is_err());
    }

    #[test]
    fn calls_are_upper_cased() {
        assert_eq!(
            parse("max(a, 1)").unwrap(),
            Expression::Call("MAX".into(), vec![var("a"), num(1.0)])
        );
        assert_eq!(parse("NOW()").unwrap(), Expression::Call("NOW".into(), vec![]));
        assert!(matches!(parse("OPTION([dtmi:a:B;1], 0)").unwrap(), Expression::Call(name, args) if name == "OPTION" && args.len() == 2));
    }

    #[test]
    fn literals() {
        assert_eq!(parse("TRUE").unwrap(), Expression::Literal(Literal::Bool(true)));
        assert_eq!(parse("null").unwrap(), Expression::Literal(Literal::Null));
        assert_eq!(parse("'hi'").unwrap(), Expression::Literal(Literal::Text("hi".into())));
        assert_eq!(
            parse("-2.5°C").unwrap(),
            Expression::Literal(Literal::Number { value: -2.5, unit: Some("°C".into()) })
        );
    }

    #[test]
    fn malformed_input_is_an_error_not_a_panic() {
        for text in ["", "   ", "a +", "(a", "a b", "max(a,", "* 2", ")", "a AND", "NOT", "f(,)"] {
            let err = parse(text).unwrap_err();
            assert!(err.position <= text.chars().count(), "{text:?} -> {err}");
        }
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let text = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        assert!(parse(&text).is_err());
        let text = format!("{}1", "-".repeat(5000));
        assert!(parse(&text).is_err());
    }
}
