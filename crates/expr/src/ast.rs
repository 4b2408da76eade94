use serde::{Deserialize, Serialize};
use twinwatch_core::{ModelId, TwinId, TwinQuery};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Numeric literal with an optional unit suffix (`5°C`, `10%`, `12h`).
    Number { value: f64, unit: Option<String> },
    Bool(bool),
    Text(String),
    Null,
}

impl Literal {
    pub fn number(value: f64) -> Self {
        Literal::Number { value, unit: None }
    }
}

/// A reference to "the twin of this model" relative to the rule's origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TwinRef {
    pub query: TwinQuery,
    pub model: ModelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div => 6,
            BinaryOp::Pow => 7,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "|",
            BinaryOp::And => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

/// Precedence of prefix operators; tighter than every binary operator.
pub const UNARY_PRECEDENCE: u8 = 8;
/// Precedence of literals, names, calls and references.
pub const ATOM_PRECEDENCE: u8 = 9;

/// Immutable expression tree.
///
/// `Point` never comes out of the parser; the binder substitutes it for a
/// resolved `Twin` reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Literal),
    Variable(String),
    Twin(TwinRef),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    /// Function call; the name is stored upper-cased.
    Call(String, Vec<Expression>),
    Point(TwinId),
}

/// Something an expression depends on from outside itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Variable(String),
    Twin(TwinRef),
}

impl Expression {
    pub fn number(value: f64) -> Self {
        Expression::Literal(Literal::number(value))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary(op, Box::new(operand))
    }

    pub fn precedence(&self) -> u8 {
        match self {
            Expression::Binary(op, _, _) => op.precedence(),
            Expression::Unary(_, _) => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }

    /// Visit every node, parents before children, left to right.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expression)) {
        visit(self);
        match self {
            Expression::Unary(_, operand) => operand.walk(visit),
            Expression::Binary(_, left, right) => {
                left.walk(visit);
                right.walk(visit);
            }
            Expression::Call(_, args) => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expression::Literal(_) | Expression::Variable(_) | Expression::Twin(_) | Expression::Point(_) => {}
        }
    }

    /// Variables and twin references in first-use order, without duplicates.
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        self.walk(&mut |node| {
            let r = match node {
                Expression::Variable(name) => Reference::Variable(name.clone()),
                Expression::Twin(twin) => Reference::Twin(twin.clone()),
                _ => return,
            };
            if !refs.contains(&r) {
                refs.push(r);
            }
        });
        refs
    }

    /// Names of referenced variables, in first-use order.
    pub fn variables(&self) -> Vec<String> {
        self.references()
            .into_iter()
            .filter_map(|r| match r {
                Reference::Variable(name) => Some(name),
                Reference::Twin(_) => None,
            })
            .collect()
    }

    /// Concrete point ids, in first-use order.
    pub fn points(&self) -> Vec<TwinId> {
        let mut ids: Vec<TwinId> = Vec::new();
        self.walk(&mut |node| {
            if let Expression::Point(id) = node {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        });
        ids
    }

    /// True when no twin references remain.
    pub fn is_bound(&self) -> bool {
        let mut bound = true;
        self.walk(&mut |node| {
            if matches!(node, Expression::Twin(_)) {
                bound = false;
            }
        });
        bound
    }
}
