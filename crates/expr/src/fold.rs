//! Constant folding: literal-only sub-trees collapse to a single literal.

use crate::ast::{BinaryOp, Expression, Literal};
use crate::eval::{evaluate, MapScope, Value};

/// Fold literal-only unary and binary sub-trees, e.g. `5 * 10 + 1000` to
/// `1050`. Sub-trees whose evaluation fails are left as written.
pub fn fold_constants(expr: &Expression) -> Expression {
    match expr {
        Expression::Unary(op, operand) => {
            let operand = fold_constants(operand);
            let folded = Expression::unary(*op, operand);
            try_fold(&folded, None).unwrap_or(folded)
        }
        Expression::Binary(op, left, right) => {
            let left = fold_constants(left);
            let right = fold_constants(right);
            let unit = shared_unit(*op, &left, &right);
            let folded = Expression::binary(*op, left, right);
            try_fold(&folded, unit).unwrap_or(folded)
        }
        Expression::Call(name, args) => Expression::Call(name.clone(), args.iter().map(fold_constants).collect()),
        other => other.clone(),
    }
}

fn is_literal(expr: &Expression) -> bool {
    match expr {
        Expression::Literal(_) => true,
        Expression::Unary(_, operand) => is_literal(operand),
        Expression::Binary(_, l, r) => is_literal(l) && is_literal(r),
        _ => false,
    }
}

/// `+`/`-` of two literals with the same non-percent unit keep that unit.
fn shared_unit(op: BinaryOp, left: &Expression, right: &Expression) -> Option<String> {
    if !matches!(op, BinaryOp::Add | BinaryOp::Sub) {
        return None;
    }
    match (left, right) {
        (
            Expression::Literal(Literal::Number { unit: Some(a), .. }),
            Expression::Literal(Literal::Number { unit: Some(b), .. }),
        ) if a == b && a != "%" => Some(a.clone()),
        _ => None,
    }
}

fn try_fold(expr: &Expression, unit: Option<String>) -> Option<Expression> {
    if !is_literal(expr) {
        return None;
    }
    match evaluate(expr, &MapScope::default()).ok()? {
        Value::Number(value) => Some(Expression::Literal(Literal::Number { value, unit })),
        Value::Bool(b) => Some(Expression::Literal(Literal::Bool(b))),
        Value::Text(t) => Some(Expression::Literal(Literal::Text(t))),
        Value::Null => Some(Expression::Literal(Literal::Null)),
    }
}
