//! The deduplicated table of symbolic parameter expressions.

use std::collections::{BTreeSet, HashMap};

use crate::circuit::ParamExpr;
use crate::error::SamplexConstructionError;

/// A content-addressed table of parameter expressions.
///
/// Nodes reference expressions by index instead of embedding them, so that a
/// single vectorized pass per `sample` call evaluates every distinct
/// expression exactly once.
#[derive(Debug, Clone, Default)]
pub struct ParameterExpressionTable {
    expressions: Vec<ParamExpr>,
    index: HashMap<ParamExpr, usize>,
    parameters: BTreeSet<String>,
}

impl ParameterExpressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expression, returning the index of an equal existing entry if
    /// one is present.
    pub fn append(&mut self, expression: ParamExpr) -> usize {
        if let Some(&idx) = self.index.get(&expression) {
            return idx;
        }
        let idx = self.expressions.len();
        self.parameters
            .extend(expression.parameters().into_iter());
        self.index.insert(expression.clone(), idx);
        self.expressions.push(expression);
        idx
    }

    pub fn num_expressions(&self) -> usize {
        self.expressions.len()
    }

    pub fn expressions(&self) -> &[ParamExpr] {
        &self.expressions
    }

    /// The sorted names of the free parameters expecting values at sampling
    /// time.
    pub fn parameters(&self) -> Vec<String> {
        self.parameters.iter().cloned().collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Evaluates every expression against values given in sorted parameter
    /// order, producing an array indexed by expression id.
    pub fn evaluate(&self, values: &[f64]) -> Result<Vec<f64>, SamplexConstructionError> {
        if values.len() != self.parameters.len() {
            return Err(SamplexConstructionError::ParameterCountMismatch {
                expected: self.parameters.len(),
                found: values.len(),
            });
        }
        let positions: HashMap<&str, usize> = self
            .parameters
            .iter()
            .enumerate()
            .map(|(position, name)| (name.as_str(), position))
            .collect();
        let lookup = |name: &str| positions.get(name).map_or(0.0, |&position| values[position]);
        Ok(self
            .expressions
            .iter()
            .map(|expression| expression.evaluate(&lookup))
            .collect())
    }
}

/// A monotonically increasing template parameter index allocator.
#[derive(Debug, Clone, Default)]
pub struct ParamIter {
    next: usize,
}

impl ParamIter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next index that will be handed out.
    pub fn peek(&self) -> usize {
        self.next
    }

    pub fn advance(&mut self) -> usize {
        let idx = self.next;
        self.next += 1;
        idx
    }

    /// The number of indices handed out so far.
    pub fn count(&self) -> usize {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_deduplicates_by_content() {
        let mut table = ParameterExpressionTable::new();
        let first = table.append(ParamExpr::parameter("a"));
        let second = table.append(ParamExpr::Constant(0.25));
        let third = table.append(ParamExpr::parameter("a"));
        assert_eq!(first, third);
        assert_ne!(first, second);
        assert_eq!(table.num_expressions(), 2);
    }

    #[test]
    fn evaluation_uses_sorted_parameter_order() {
        let mut table = ParameterExpressionTable::new();
        let b_idx = table.append(ParamExpr::parameter("b"));
        let a_idx = table.append(ParamExpr::parameter("a"));
        assert_eq!(table.parameters(), vec!["a".to_string(), "b".to_string()]);

        let values = table.evaluate(&[1.0, 2.0]).unwrap();
        assert_eq!(values[a_idx], 1.0);
        assert_eq!(values[b_idx], 2.0);
    }

    #[test]
    fn evaluation_rejects_wrong_value_counts() {
        let mut table = ParameterExpressionTable::new();
        table.append(ParamExpr::parameter("a"));
        assert!(table.evaluate(&[]).is_err());
        assert!(table.evaluate(&[0.0, 1.0]).is_err());
    }
}
