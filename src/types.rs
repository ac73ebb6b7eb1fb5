//! Sorts and concrete values.
//!
//! Every expression carries a [`Sort`]. Bit-vectors are signed two's-complement integers of a fixed
//! width, references live in their own sort so that the heap address partition
//! (see [`address`][crate::address]) can be applied to them without looking at the bits.
use std::fmt;

use crate::address::Address;
use crate::utils::{bv_normalize, bv_signed_max, bv_signed_min};

/// The sort (type) of an expression.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Sort {
    Bool,
    /// Signed bit-vector of the given width (1..=64).
    Bv(u32),
    /// Heap reference.
    Address,
}

impl Sort {
    /// Creates a bit-vector sort.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not in `1..=64`.
    pub fn bv(width: u32) -> Self {
        assert!(
            (1..=64).contains(&width),
            "Bit-vector width should be in the range 1..=64, got {}",
            width
        );
        Sort::Bv(width)
    }

    pub fn is_bool(self) -> bool {
        matches!(self, Sort::Bool)
    }
    pub fn is_bv(self) -> bool {
        matches!(self, Sort::Bv(_))
    }
    pub fn is_address(self) -> bool {
        matches!(self, Sort::Address)
    }

    /// Width of a bit-vector sort.
    ///
    /// # Panics
    ///
    /// Panics if the sort is not a bit-vector.
    pub fn width(self) -> u32 {
        match self {
            Sort::Bv(w) => w,
            _ => panic!("Sort {} has no width", self),
        }
    }

    /// Smallest signed value of a bit-vector sort.
    pub fn min_value(self) -> i64 {
        bv_signed_min(self.width())
    }

    /// Largest signed value of a bit-vector sort.
    pub fn max_value(self) -> i64 {
        bv_signed_max(self.width())
    }

    /// The canonical default (sample) value of this sort.
    ///
    /// Reads of absent allocated keys and model completion both use it.
    pub fn default_value(self) -> Value {
        match self {
            Sort::Bool => Value::Bool(false),
            Sort::Bv(width) => Value::Bv { value: 0, width },
            Sort::Address => Value::Address(Address::NULL),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Bv(w) => write!(f, "Bv{}", w),
            Sort::Address => write!(f, "Address"),
        }
    }
}

/// A concrete value, as produced by model evaluation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Value {
    Bool(bool),
    Bv { value: i64, width: u32 },
    Address(Address),
}

impl Value {
    /// Creates a bit-vector value, wrapping `value` into `width` bits.
    pub fn bv(value: i64, width: u32) -> Self {
        Value::Bv {
            value: bv_normalize(value as i128, width),
            width,
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Bv { width, .. } => Sort::Bv(*width),
            Value::Address(_) => Sort::Address,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bv { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Bv { value, width } => write!(f, "{}#{}", value, width),
            Value::Address(a) => write!(f, "{}", a),
        }
    }
}
