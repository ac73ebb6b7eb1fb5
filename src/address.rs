//! Heap reference space.
//!
//! Concrete addresses are split into two disjoint ranges around the null address:
//!
//! ```text
//!   input objects        null      allocated objects
//!   ... -3 -2 -1          0          1 2 3 ...
//! ```
//!
//! Objects allocated during execution get positive addresses, growing upwards. Objects of the unknown
//! initial heap get negative addresses, growing downwards. The range is decided by the value alone,
//! so an address coming back from a solver model can be classified without extra bookkeeping.
use std::fmt::{Display, Formatter};

use crate::expr::SymbolId;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(i64);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AddressKind {
    Allocated,
    Null,
    Input,
}

impl Address {
    pub const NULL: Address = Address(0);
    /// The first address handed out to a freshly allocated object.
    pub const INITIAL_ALLOCATED: Address = Address(1);
    /// The first address handed out to an object of the initial heap.
    pub const INITIAL_INPUT: Address = Address(-1);

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Return the internal representation of the address.
    pub const fn get(self) -> i64 {
        self.0
    }

    pub const fn is_allocated(self) -> bool {
        self.0 >= Self::INITIAL_ALLOCATED.0
    }

    pub const fn is_input(self) -> bool {
        self.0 <= Self::INITIAL_INPUT.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    pub const fn kind(self) -> AddressKind {
        if self.is_allocated() {
            AddressKind::Allocated
        } else if self.is_input() {
            AddressKind::Input
        } else {
            AddressKind::Null
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            AddressKind::Allocated => write!(f, "0x{}", self.0),
            AddressKind::Null => write!(f, "null"),
            AddressKind::Input => write!(f, "in{}", -self.0),
        }
    }
}

/// Per-state address allocator. Both ranges move monotonically away from null.
#[derive(Debug, Clone)]
pub struct AddressCounter {
    next_allocated: i64,
    next_input: i64,
}

impl Default for AddressCounter {
    fn default() -> Self {
        Self {
            next_allocated: Address::INITIAL_ALLOCATED.0,
            next_input: Address::INITIAL_INPUT.0,
        }
    }
}

impl AddressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_allocated(&mut self) -> Address {
        let a = Address(self.next_allocated);
        self.next_allocated = self
            .next_allocated
            .checked_add(1)
            .unwrap_or_else(|| panic!("Allocated address space is exhausted"));
        a
    }

    pub fn fresh_input(&mut self) -> Address {
        let a = Address(self.next_input);
        self.next_input = self
            .next_input
            .checked_sub(1)
            .unwrap_or_else(|| panic!("Input address space is exhausted"));
        a
    }

    /// Number of objects allocated so far.
    pub fn allocated_count(&self) -> u64 {
        (self.next_allocated - Address::INITIAL_ALLOCATED.0) as u64
    }

    /// Number of input objects handed out so far.
    pub fn input_count(&self) -> u64 {
        (Address::INITIAL_INPUT.0 - self.next_input) as u64
    }
}

/// A heap reference leaf: either a concrete address or a symbolic (unknown-at-entry) object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum HeapRef {
    Concrete(Address),
    Symbolic(SymbolId),
}

impl HeapRef {
    pub const NULL: HeapRef = HeapRef::Concrete(Address::NULL);

    pub fn is_concrete(&self) -> bool {
        matches!(self, HeapRef::Concrete(_))
    }

    /// Two references are distinct by construction when both are concrete with different
    /// addresses, or when one is a freshly allocated object and the other is symbolic.
    pub fn trivially_distinct(&self, other: &HeapRef) -> bool {
        match (self, other) {
            (HeapRef::Concrete(a), HeapRef::Concrete(b)) => a != b,
            (HeapRef::Concrete(a), HeapRef::Symbolic(_)) | (HeapRef::Symbolic(_), HeapRef::Concrete(a)) => {
                a.is_allocated()
            }
            (HeapRef::Symbolic(_), HeapRef::Symbolic(_)) => false,
        }
    }
}

impl Display for HeapRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapRef::Concrete(a) => write!(f, "{}", a),
            HeapRef::Symbolic(s) => write!(f, "ref{}", s.get()),
        }
    }
}
