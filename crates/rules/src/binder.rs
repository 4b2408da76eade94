//! Graph binder: resolves twin references in an expression to concrete
//! point twins, relative to an origin twin.
//!
//! Binding runs in two steps. The expression is first expanded: macros are
//! inlined, `OPTION` picks its first alternative that binds and every
//! distinct twin reference is resolved once. The cartesian product over the
//! distinct references then yields one bound expression per combination, in
//! twin-id order, capped by `max_expansions`. A reference used twice in one
//! expression always lands on the same point.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use twinwatch_core::{EngineConfig, PathEdge, TwinId};
use twinwatch_expr::{Expression, TwinRef};
use twinwatch_graph::{Resolution, TwinGraph};

use crate::error::BindError;
use crate::schema::MacroTable;
use crate::validation::fuzzy::fuzzy_match;

/// An expression with every twin reference replaced by a point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundExpression {
    pub expr: Expression,
    /// Point ids the expression reads, in first-use order.
    pub points: Vec<TwinId>,
    /// Hops taken from the origin, concatenated over the distinct references.
    pub path: Vec<PathEdge>,
}

/// Distinct twin references met while expanding, with their candidates.
#[derive(Default)]
struct Expansion {
    references: Vec<(TwinRef, Vec<Resolution>)>,
    macros: Vec<String>,
}

pub struct Binder<'a> {
    graph: &'a dyn TwinGraph,
    macros: Option<&'a MacroTable>,
    symbols: HashSet<String>,
    max_search_depth: usize,
    max_expansions: usize,
}

impl<'a> Binder<'a> {
    pub fn new(graph: &'a dyn TwinGraph, config: &EngineConfig) -> Self {
        Self {
            graph,
            macros: None,
            symbols: HashSet::new(),
            max_search_depth: config.max_search_depth,
            max_expansions: config.max_expansions.max(1),
        }
    }

    pub fn with_macros(mut self, macros: &'a MacroTable) -> Self {
        self.macros = Some(macros);
        self
    }

    /// Names that stay symbolic (rule parameters).
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    /// Bind every twin reference in `expr` from `origin`.
    pub fn bind(&self, expr: &Expression, origin: &str) -> Result<Vec<BoundExpression>, BindError> {
        let mut expansion = Expansion::default();
        let template = self.expand(expr, origin, &mut expansion)?;
        let references = expansion.references;

        let total = references
            .iter()
            .try_fold(1usize, |acc, (_, found)| acc.checked_mul(found.len()))
            .filter(|n| *n <= self.max_expansions);
        let Some(total) = total else {
            let mut candidates: Vec<TwinId> = Vec::new();
            for r in references.iter().flat_map(|(_, found)| found) {
                if !candidates.contains(&r.twin_id) {
                    candidates.push(r.twin_id.clone());
                }
            }
            return Err(BindError::Ambiguous {
                reference: expr.to_string(),
                candidates,
            });
        };

        let mut bound = Vec::with_capacity(total);
        for mut combination in 0..total {
            // Mixed radix; the last reference varies fastest.
            let mut picks = vec![0usize; references.len()];
            for (slot, (_, found)) in references.iter().enumerate().rev() {
                picks[slot] = combination % found.len();
                combination /= found.len();
            }

            let mut chosen: HashMap<&TwinRef, &TwinId> = HashMap::new();
            let mut path = Vec::new();
            for ((twin, found), pick) in references.iter().zip(&picks) {
                chosen.insert(twin, &found[*pick].twin_id);
                path.extend(found[*pick].path.iter().cloned());
            }
            let expr = substitute(&template, &chosen);
            bound.push(BoundExpression {
                points: expr.points(),
                expr,
                path,
            });
        }
        Ok(bound)
    }

    /// Bind requiring exactly one result.
    pub fn bind_single(&self, expr: &Expression, origin: &str) -> Result<BoundExpression, BindError> {
        let mut bound = self.bind(expr, origin)?;
        if bound.len() == 1 {
            return Ok(bound.remove(0));
        }
        Err(BindError::Ambiguous {
            reference: expr.to_string(),
            candidates: bound.iter().map(|b| b.points.join("+")).collect(),
        })
    }

    /// Symbols `expr` depends on, looking through macro bodies.
    pub fn dependencies(&self, expr: &Expression) -> Result<Vec<String>, BindError> {
        let mut deps = Vec::new();
        let mut stack = Vec::new();
        self.collect_dependencies(expr, &mut stack, &mut deps)?;
        Ok(deps)
    }

    fn collect_dependencies(
        &self,
        expr: &Expression,
        stack: &mut Vec<String>,
        deps: &mut Vec<String>,
    ) -> Result<(), BindError> {
        for name in expr.variables() {
            if self.symbols.contains(&name) {
                if !deps.contains(&name) {
                    deps.push(name);
                }
            } else if let Some(body) = self.macro_body(&name) {
                self.enter_macro(&name, stack)?;
                self.collect_dependencies(body, stack, deps)?;
                stack.pop();
            }
        }
        Ok(())
    }

    // ── Expansion ───────────────────────────────────────────────────

    /// Inline macros, settle `OPTION` and resolve each distinct twin
    /// reference. Twin references stay in the returned tree.
    fn expand(&self, expr: &Expression, origin: &str, expansion: &mut Expansion) -> Result<Expression, BindError> {
        match expr {
            Expression::Literal(_) | Expression::Point(_) => Ok(expr.clone()),
            Expression::Twin(twin) => {
                if !expansion.references.iter().any(|(seen, _)| seen == twin) {
                    let found = self.resolve_twin(twin, origin)?;
                    expansion.references.push((twin.clone(), found));
                }
                Ok(expr.clone())
            }
            Expression::Variable(name) => self.expand_variable(name, origin, expansion),
            Expression::Unary(op, operand) => Ok(Expression::unary(*op, self.expand(operand, origin, expansion)?)),
            Expression::Binary(op, left, right) => {
                let left = self.expand(left, origin, expansion)?;
                let right = self.expand(right, origin, expansion)?;
                Ok(Expression::binary(*op, left, right))
            }
            Expression::Call(name, args) if name == "OPTION" => self.expand_option(args, origin, expansion),
            Expression::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.expand(arg, origin, expansion))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expression::Call(name.clone(), args))
            }
        }
    }

    fn resolve_twin(&self, twin: &TwinRef, origin: &str) -> Result<Vec<Resolution>, BindError> {
        let found = self.graph.resolve(origin, twin.query, &twin.model, self.max_search_depth);
        if found.is_empty() {
            return Err(BindError::NotFound {
                model: twin.model.clone(),
                origin: origin.to_string(),
            });
        }
        if found.len() > self.max_expansions {
            return Err(BindError::Ambiguous {
                reference: Expression::Twin(twin.clone()).to_string(),
                candidates: found.into_iter().map(|r| r.twin_id).collect(),
            });
        }
        Ok(found)
    }

    fn expand_variable(&self, name: &str, origin: &str, expansion: &mut Expansion) -> Result<Expression, BindError> {
        if self.symbols.contains(name) {
            return Ok(Expression::Variable(name.to_string()));
        }
        let Some(body) = self.macro_body(name) else {
            let mut known: Vec<&str> = self.symbols.iter().map(String::as_str).collect();
            if let Some(macros) = self.macros {
                known.extend(macros.keys().map(String::as_str));
            }
            known.sort_unstable();
            return Err(BindError::UnknownVariable {
                name: name.to_string(),
                suggestion: fuzzy_match(name, &known).map(str::to_string),
            });
        };
        self.enter_macro(name, &mut expansion.macros)?;
        let result = self.expand(body, origin, expansion);
        expansion.macros.pop();
        result
    }

    /// First argument that binds wins; the call is replaced by it.
    fn expand_option(&self, args: &[Expression], origin: &str, expansion: &mut Expansion) -> Result<Expression, BindError> {
        let mut last_error = BindError::Unsupported("OPTION() needs at least one argument".to_string());
        for arg in args {
            let resolved_before = expansion.references.len();
            match self.expand(arg, origin, expansion) {
                Ok(expr) => return Ok(expr),
                Err(e @ BindError::Circular { .. }) => return Err(e),
                Err(e) => {
                    expansion.references.truncate(resolved_before);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    // ── Macros ──────────────────────────────────────────────────────

    fn macro_body(&self, name: &str) -> Option<&'a Expression> {
        self.macros.and_then(|m| m.get(name))
    }

    fn enter_macro(&self, name: &str, stack: &mut Vec<String>) -> Result<(), BindError> {
        if stack.iter().any(|s| s == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(BindError::Circular { chain });
        }
        stack.push(name.to_string());
        Ok(())
    }
}

fn substitute(expr: &Expression, chosen: &HashMap<&TwinRef, &TwinId>) -> Expression {
    match expr {
        Expression::Twin(twin) => match chosen.get(twin) {
            Some(id) => Expression::Point((*id).clone()),
            None => expr.clone(),
        },
        Expression::Unary(op, operand) => Expression::unary(*op, substitute(operand, chosen)),
        Expression::Binary(op, left, right) => {
            Expression::binary(*op, substitute(left, chosen), substitute(right, chosen))
        }
        Expression::Call(name, args) => {
            Expression::Call(name.clone(), args.iter().map(|a| substitute(a, chosen)).collect())
        }
        Expression::Literal(_) | Expression::Variable(_) | Expression::Point(_) => expr.clone(),
    }
}
