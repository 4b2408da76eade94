//! Canonical text form. `parse(&e.to_string())` reproduces any parsed `e`.

use std::fmt;

use twinwatch_core::TwinQuery;

use crate::ast::{BinaryOp, Expression, Literal, TwinRef, UnaryOp};

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number { value, unit } => {
                write!(f, "{}", value)?;
                if let Some(unit) = unit {
                    f.write_str(unit)?;
                }
                Ok(())
            }
            Literal::Bool(true) => f.write_str("true"),
            Literal::Bool(false) => f.write_str("false"),
            Literal::Text(text) => write_quoted(f, text),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for TwinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.query {
            TwinQuery::Related => write!(f, "[{}]", self.model),
            TwinQuery::Under => write!(f, "UNDER([{}])", self.model),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Variable(name) => {
                if is_bare_identifier(name) {
                    f.write_str(name)
                } else {
                    write!(f, "[{}]", name)
                }
            }
            Expression::Twin(twin) => write!(f, "{}", twin),
            Expression::Point(id) => {
                f.write_str("POINT(")?;
                write_quoted(f, id)?;
                f.write_str(")")
            }
            Expression::Unary(op, operand) => {
                f.write_str(match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                })?;
                write_operand(f, operand, operand.precedence() < crate::ast::UNARY_PRECEDENCE)
            }
            Expression::Binary(op, left, right) => {
                let p = op.precedence();
                let left_parens = left.precedence() < p || (op.is_right_assoc() && left.precedence() == p);
                let right_parens = right.precedence() < p || (!op.is_right_assoc() && right.precedence() == p);
                write_operand(f, left, left_parens)?;
                write!(f, " {} ", op)?;
                write_operand(f, right, right_parens)
            }
            Expression::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

/// Names the lexer would read back as a single identifier token that is
/// not a keyword.
fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    let keyword = ["TRUE", "FALSE", "NULL", "AND", "OR", "NOT"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(name));
    first_ok && rest_ok && !keyword
}

#[cfg(test)]
mod tests {
    use crate::parse;

    fn canonical(text: &str) -> String {
        parse(text).unwrap().to_string()
    }

    #[test]
    fn minimal_parentheses() {
        assert_eq!(canonical("(a + b) * c"), "(a + b) * c");
        assert_eq!(canonical("a + (b * c)"), "a + b * c");
        assert_eq!(canonical("(a - b) - c"), "a - b - c");
        assert_eq!(canonical("a - (b - c)"), "a - (b - c)");
        assert_eq!(canonical("(2 ^ 3) ^ 2"), "(2 ^ 3) ^ 2");
        assert_eq!(canonical("2 ^ (3 ^ 2)"), "2 ^ 3 ^ 2");
        assert_eq!(canonical("-(a + b)"), "-(a + b)");
    }

    #[test]
    fn canonical_operators_and_literals() {
        assert_eq!(canonical("a AND b OR NOT c"), "a & b | !c");
        assert_eq!(canonical("a = TRUE"), "a == true");
        assert_eq!(canonical("x <> NULL"), "x != null");
    }

    #[test]
    fn numbers_keep_units_and_minimal_form() {
        assert_eq!(canonical("5.50°C + 10% - 12h"), "5.5°C + 10% - 12h");
        assert_eq!(canonical("1.0"), "1");
        assert_eq!(canonical("-0.25"), "-0.25");
    }

    #[test]
    fn names_are_bracketed_only_when_needed() {
        assert_eq!(canonical("[simple]"), "simple");
        assert_eq!(canonical("[zone air temp]"), "[zone air temp]");
        assert_eq!(canonical("[and]"), "[and]");
        assert_eq!(canonical("under([dtmi:a:Floor;1])"), "UNDER([dtmi:a:Floor;1])");
    }

    #[test]
    fn strings_escape_quotes() {
        assert_eq!(canonical(r#"'say "hi"'"#), r#""say \"hi\"""#);
    }
}
