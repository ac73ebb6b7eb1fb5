//! Solver models and their decoding into concrete memory.
use std::collections::HashMap;
use std::sync::Arc;

use crate::expr::{Expr, ExprKind};
use crate::memory::RegionKey;
use crate::types::{Sort, Value};

pub mod decoder;

pub use decoder::{DecodedRegion, ModelDecoder};

/// A satisfying assignment returned by a solver, opaque except through these lookups.
pub trait Model {
    /// Value of the constant `name`, if the model fixes it.
    fn constant(&self, name: &str, sort: Sort) -> Option<Value>;

    /// Interpretation of the base-read function of the input collection of `region`.
    fn function(&self, region: &RegionKey) -> Option<&FunctionInterpretation>;
}

/// A finite function table with an optional `else` value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionInterpretation {
    entries: HashMap<Vec<Value>, Value>,
    default: Option<Value>,
}

impl FunctionInterpretation {
    pub fn new(default: Option<Value>) -> Self {
        Self {
            entries: HashMap::new(),
            default,
        }
    }

    pub fn insert(&mut self, args: Vec<Value>, value: Value) {
        self.entries.insert(args, value);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Vec<Value>, &Value)> {
        self.entries.iter()
    }

    pub fn default_value(&self) -> Option<Value> {
        self.default
    }

    pub fn apply(&self, args: &[Value]) -> Option<Value> {
        self.entries.get(args).copied().or(self.default)
    }
}

/// An explicit model, built by solver backends and by tests.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    constants: HashMap<Arc<str>, Value>,
    functions: HashMap<RegionKey, FunctionInterpretation>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the value of the constant `c`.
    ///
    /// # Panics
    ///
    /// Panics if `c` is not a constant or `value` has another sort.
    pub fn set(&mut self, c: &Expr, value: Value) {
        match c.kind() {
            ExprKind::Const { name, sort, .. } => {
                assert_eq!(*sort, value.sort(), "Sort mismatch: assigning {} to {}", value, c);
                self.constants.insert(name.clone(), value);
            }
            _ => panic!("{} is not a constant", c),
        }
    }

    pub fn set_named(&mut self, name: &str, value: Value) {
        self.constants.insert(Arc::from(name), value);
    }

    pub fn set_function(&mut self, region: RegionKey, f: FunctionInterpretation) {
        assert!(
            f.entries().all(|(_, v)| v.sort() == region.sort),
            "Sort mismatch: function values of {}",
            region
        );
        self.functions.insert(region, f);
    }

    /// Number of interpreted constants and functions.
    pub fn len(&self) -> usize {
        self.constants.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.functions.is_empty()
    }
}

impl Model for Assignment {
    fn constant(&self, name: &str, sort: Sort) -> Option<Value> {
        self.constants.get(name).copied().filter(|v| v.sort() == sort)
    }

    fn function(&self, region: &RegionKey) -> Option<&FunctionInterpretation> {
        self.functions.get(region)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::memory::TypeTag;

    #[test]
    fn test_assignment_counts_functions() {
        let mut model = Assignment::new();
        assert!(model.is_empty());
        let key = RegionKey::array_length(&TypeTag::new("int[]"), Sort::bv(32));
        model.set_function(key.clone(), FunctionInterpretation::new(Some(Value::bv(3, 32))));
        assert!(!model.is_empty());
        assert_eq!(model.len(), 1);
        model.set_named("x", Value::bv(1, 32));
        assert_eq!(model.len(), 2);
        assert_eq!(model.constant("x", Sort::bv(32)), Some(Value::bv(1, 32)));
        assert_eq!(model.constant("x", Sort::Bool), None);
        assert_eq!(model.function(&key).and_then(|f| f.apply(&[])), Some(Value::bv(3, 32)));
    }
}
