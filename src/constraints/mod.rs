//! Path constraint stores.

pub mod equality;
pub mod numeric;
pub mod path;

pub use equality::EqualityConstraints;
pub use numeric::{Comparison, Linear, NumericConstraints, RelOp};
pub use path::PathConstraints;
