use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A symbolic angle expression over named parameters.
///
/// Expressions are compared and hashed structurally (constants by their bit
/// pattern), which is what lets the parameter expression table deduplicate
/// them by content.
#[derive(Debug, Clone)]
pub enum ParamExpr {
    Constant(f64),
    Parameter(String),
    Neg(Box<ParamExpr>),
    Add(Box<ParamExpr>, Box<ParamExpr>),
    Sub(Box<ParamExpr>, Box<ParamExpr>),
    Mul(Box<ParamExpr>, Box<ParamExpr>),
}

impl ParamExpr {
    pub fn parameter(name: impl Into<String>) -> Self {
        ParamExpr::Parameter(name.into())
    }

    /// The sorted set of parameter names appearing in this expression.
    pub fn parameters(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_parameters(&mut names);
        names
    }

    fn collect_parameters(&self, names: &mut BTreeSet<String>) {
        match self {
            ParamExpr::Constant(_) => {}
            ParamExpr::Parameter(name) => {
                names.insert(name.clone());
            }
            ParamExpr::Neg(inner) => inner.collect_parameters(names),
            ParamExpr::Add(lhs, rhs) | ParamExpr::Sub(lhs, rhs) | ParamExpr::Mul(lhs, rhs) => {
                lhs.collect_parameters(names);
                rhs.collect_parameters(names);
            }
        }
    }

    /// Evaluates against a parameter-name lookup.
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> f64) -> f64 {
        match self {
            ParamExpr::Constant(value) => *value,
            ParamExpr::Parameter(name) => lookup(name),
            ParamExpr::Neg(inner) => -inner.evaluate(lookup),
            ParamExpr::Add(lhs, rhs) => lhs.evaluate(lookup) + rhs.evaluate(lookup),
            ParamExpr::Sub(lhs, rhs) => lhs.evaluate(lookup) - rhs.evaluate(lookup),
            ParamExpr::Mul(lhs, rhs) => lhs.evaluate(lookup) * rhs.evaluate(lookup),
        }
    }
}

impl PartialEq for ParamExpr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamExpr::Constant(lhs), ParamExpr::Constant(rhs)) => {
                lhs.to_bits() == rhs.to_bits()
            }
            (ParamExpr::Parameter(lhs), ParamExpr::Parameter(rhs)) => lhs == rhs,
            (ParamExpr::Neg(lhs), ParamExpr::Neg(rhs)) => lhs == rhs,
            (ParamExpr::Add(a, b), ParamExpr::Add(c, d))
            | (ParamExpr::Sub(a, b), ParamExpr::Sub(c, d))
            | (ParamExpr::Mul(a, b), ParamExpr::Mul(c, d)) => a == c && b == d,
            _ => false,
        }
    }
}

impl Eq for ParamExpr {}

impl Hash for ParamExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ParamExpr::Constant(value) => value.to_bits().hash(state),
            ParamExpr::Parameter(name) => name.hash(state),
            ParamExpr::Neg(inner) => inner.hash(state),
            ParamExpr::Add(lhs, rhs) | ParamExpr::Sub(lhs, rhs) | ParamExpr::Mul(lhs, rhs) => {
                lhs.hash(state);
                rhs.hash(state);
            }
        }
    }
}

impl fmt::Display for ParamExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamExpr::Constant(value) => write!(f, "{value}"),
            ParamExpr::Parameter(name) => f.write_str(name),
            ParamExpr::Neg(inner) => write!(f, "-({inner})"),
            ParamExpr::Add(lhs, rhs) => write!(f, "({lhs} + {rhs})"),
            ParamExpr::Sub(lhs, rhs) => write!(f, "({lhs} - {rhs})"),
            ParamExpr::Mul(lhs, rhs) => write!(f, "({lhs} * {rhs})"),
        }
    }
}

impl From<f64> for ParamExpr {
    fn from(value: f64) -> Self {
        ParamExpr::Constant(value)
    }
}

/// An angle argument of a rotation gate.
///
/// Input circuits carry constants and symbolic expressions; template circuits
/// carry indices into the template's flat parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Angle {
    Expr(ParamExpr),
    /// An index into the template parameter vector.
    Index(usize),
}

impl Angle {
    pub fn value(value: f64) -> Self {
        Angle::Expr(ParamExpr::Constant(value))
    }

    pub fn expr(&self) -> Option<&ParamExpr> {
        match self {
            Angle::Expr(expr) => Some(expr),
            Angle::Index(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn structural_equality_and_hashing() {
        let lhs = ParamExpr::Add(
            Box::new(ParamExpr::parameter("a")),
            Box::new(ParamExpr::Constant(1.5)),
        );
        let rhs = ParamExpr::Add(
            Box::new(ParamExpr::parameter("a")),
            Box::new(ParamExpr::Constant(1.5)),
        );
        assert_eq!(lhs, rhs);

        let mut set = HashMap::new();
        set.insert(lhs, 0usize);
        assert!(set.contains_key(&rhs));
    }

    #[test]
    fn evaluation_walks_the_tree() {
        let expr = ParamExpr::Mul(
            Box::new(ParamExpr::Sub(
                Box::new(ParamExpr::parameter("a")),
                Box::new(ParamExpr::Constant(1.0)),
            )),
            Box::new(ParamExpr::Constant(3.0)),
        );
        let value = expr.evaluate(&|name| if name == "a" { 2.0 } else { 0.0 });
        assert_eq!(value, 3.0);
    }

    #[test]
    fn parameters_are_sorted_and_deduplicated() {
        let expr = ParamExpr::Add(
            Box::new(ParamExpr::parameter("b")),
            Box::new(ParamExpr::Add(
                Box::new(ParamExpr::parameter("a")),
                Box::new(ParamExpr::parameter("b")),
            )),
        );
        let names: Vec<String> = expr.parameters().into_iter().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
