use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::EvalError;
use crate::models::properties::PropertyKey;

/// Handle into an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// One arithmetic node. Composite nodes hold exactly two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Base fact quantity, bound to a number by instantiation
    Placeholder(PropertyKey),
    Addition(ExprId, ExprId),
    Subtraction(ExprId, ExprId),
    Product(ExprId, ExprId),
    Fraction(ExprId, ExprId),
}

impl Expr {
    pub fn operands(&self) -> Option<(ExprId, ExprId)> {
        match *self {
            Expr::Placeholder(_) => None,
            Expr::Addition(a, b)
            | Expr::Subtraction(a, b)
            | Expr::Product(a, b)
            | Expr::Fraction(a, b) => Some((a, b)),
        }
    }

    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Expr::Placeholder(_) => None,
            Expr::Addition(..) => Some("+"),
            Expr::Subtraction(..) => Some("-"),
            Expr::Product(..) => Some("*"),
            Expr::Fraction(..) => Some("/"),
        }
    }
}

/// Index-addressed store of expression nodes.
///
/// Nodes are hash-consed: building a structurally identical node twice
/// returns the same [`ExprId`], so shared sub-expressions exist once.
/// Operands always precede the node using them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<Expr>,
    #[serde(skip)]
    interned: HashMap<Expr, ExprId>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, expr: Expr) -> ExprId {
        if let Some(&id) = self.interned.get(&expr) {
            return id;
        }
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(expr);
        self.interned.insert(expr, id);
        id
    }

    pub fn placeholder(&mut self, key: PropertyKey) -> ExprId {
        self.intern(Expr::Placeholder(key))
    }

    pub fn add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.intern(Expr::Addition(a, b))
    }

    pub fn sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.intern(Expr::Subtraction(a, b))
    }

    pub fn mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.intern(Expr::Product(a, b))
    }

    pub fn div(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.intern(Expr::Fraction(a, b))
    }

    pub fn get(&self, id: ExprId) -> Option<&Expr> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Evaluate `id` given a value for every placeholder it reaches.
    /// Shared sub-expressions are evaluated once.
    pub fn eval(&self, id: ExprId, values: &HashMap<PropertyKey, f64>) -> Result<f64, EvalError> {
        let mut memo = HashMap::new();
        self.eval_memo(id, values, &mut memo)
    }

    fn eval_memo(
        &self,
        id: ExprId,
        values: &HashMap<PropertyKey, f64>,
        memo: &mut HashMap<ExprId, f64>,
    ) -> Result<f64, EvalError> {
        if let Some(&v) = memo.get(&id) {
            return Ok(v);
        }
        let expr = *self.get(id).ok_or(EvalError::UnknownExpr(id))?;

        let value = match expr {
            Expr::Placeholder(key) => *values.get(&key).ok_or(EvalError::UnboundPlaceholder(key))?,
            Expr::Addition(a, b) => self.eval_memo(a, values, memo)? + self.eval_memo(b, values, memo)?,
            Expr::Subtraction(a, b) => self.eval_memo(a, values, memo)? - self.eval_memo(b, values, memo)?,
            Expr::Product(a, b) => self.eval_memo(a, values, memo)? * self.eval_memo(b, values, memo)?,
            Expr::Fraction(a, b) => {
                let numerator = self.eval_memo(a, values, memo)?;
                let denominator = self.eval_memo(b, values, memo)?;
                if denominator == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                numerator / denominator
            }
        };

        memo.insert(id, value);
        Ok(value)
    }

    /// All placeholders reachable from `id`, sorted.
    pub fn placeholders(&self, id: ExprId) -> Vec<PropertyKey> {
        let mut found = BTreeSet::new();
        let mut stack = vec![id];
        let mut seen = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            match self.get(current) {
                Some(Expr::Placeholder(key)) => {
                    found.insert(*key);
                }
                Some(expr) => {
                    if let Some((a, b)) = expr.operands() {
                        stack.push(a);
                        stack.push(b);
                    }
                }
                None => {}
            }
        }

        found.into_iter().collect()
    }

    /// Render as a fully parenthesised string, e.g. `(quantity_1) - (quantity_2)`.
    pub fn render(&self, id: ExprId) -> String {
        match self.get(id) {
            None => format!("<{}>", id),
            Some(Expr::Placeholder(key)) => key.to_string(),
            Some(expr) => {
                let (a, b) = match expr.operands() {
                    Some(ops) => ops,
                    None => return format!("<{}>", id),
                };
                format!(
                    "({}) {} ({})",
                    self.render(a),
                    expr.symbol().unwrap_or("?"),
                    self.render(b)
                )
            }
        }
    }

    /// Rebuild the interning table, e.g. after deserialization.
    pub fn reindex(&mut self) {
        self.interned = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, expr)| (*expr, ExprId(i as u32)))
            .collect();
    }
}
